mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use edge_auth::{AuthConfig, Authenticator, CloudFrontEvent, IdpClient, JwksSet, ReqwestIdpClient};
use tokio::io::AsyncReadExt;

#[derive(Debug, Parser)]
#[command(name = "edge-auth", about = "Cognito hosted-UI gate for CloudFront viewer requests")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML, or JSON by `.json` extension)
    #[arg(long, global = true, default_value = "edge-auth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one viewer-request event through the authenticator and print the outcome
    Handle {
        /// Event file; `-` or omitted reads stdin
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Validate the configuration
    CheckConfig,
    /// Print the hosted UI login redirect for a request
    LoginUrl {
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        uri: String,
        #[arg(long, default_value = "")]
        querystring: String,
    },
    /// Fetch the user pool key set and list its key ids
    Jwks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AuthConfig::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    logging::init(config.log_level())?;

    match cli.command {
        Commands::Handle { event } => {
            let raw = read_event(event.as_deref()).await?;
            let event: CloudFrontEvent =
                serde_json::from_str(&raw).context("Event is not a CloudFront viewer-request event")?;
            let authenticator = Authenticator::new(config, ReqwestIdpClient::new()?);
            let outcome = authenticator.handle_event(event).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::CheckConfig => {
            let summary = serde_json::json!({
                "ok": true,
                "issuer": config.issuer(),
                "jwks_url": config.jwks_url(),
                "token_endpoint": config.token_endpoint(),
                "user_pool_app_id": config.user_pool_app_id(),
                "user_pool_domain": config.user_pool_domain(),
                "cookie_expiration_days": config.cookie_expiration_days(),
                "enable_logout": config.enable_logout(),
                "logout_path": config.logout_path(),
            });
            pout(cli.json, summary, &format!("Config OK ({})", config.issuer()))?;
        }
        Commands::LoginUrl { host, uri, querystring } => {
            let authenticator = Authenticator::new(config, ReqwestIdpClient::new()?);
            let url = authenticator.authorize_url(&host, &uri, &querystring);
            pout(cli.json, serde_json::json!({ "location": url }), &url)?;
        }
        Commands::Jwks => {
            let client = Arc::new(ReqwestIdpClient::new()?);
            let authenticator = Authenticator::with_client(config, client.clone());
            let cache = authenticator.verifier().key_cache();

            let body = client.get_json(cache.jwks_url()).await?;
            let set: JwksSet = serde_json::from_value(body).context("Unexpected JWKS document")?;
            let usable = cache.cache_jwks(&set);

            let kids: Vec<_> = set.keys.iter().filter_map(|k| k.kid.clone()).collect();
            let text = format!("{usable} usable key(s) at {}: {}", cache.jwks_url(), kids.join(", "));
            pout(
                cli.json,
                serde_json::json!({ "jwks_url": cache.jwks_url(), "kids": kids, "usable": usable }),
                &text,
            )?;
        }
    }

    Ok(())
}

async fn read_event(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => {
            fs::read_to_string(p).with_context(|| format!("Failed to read event {}", p.display()))
        }
        _ => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read event from stdin")?;
            Ok(raw)
        }
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
