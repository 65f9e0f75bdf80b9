mod common;

use std::sync::Arc;
use std::time::SystemTime;

use common::*;
use edge_auth::{Authenticator, CloudFrontEvent, EdgeResponse, Error, HandlerOutcome};
use serde_json::json;

fn authenticator(idp: FakeIdp) -> (Authenticator<FakeIdp>, Arc<FakeIdp>) {
    let idp = Arc::new(idp);
    (Authenticator::with_client(config(), idp.clone()), idp)
}

fn respond(outcome: HandlerOutcome) -> EdgeResponse {
    match outcome {
        HandlerOutcome::Respond(resp) => resp,
        HandlerOutcome::Forward(req) => panic!("expected a response, request was forwarded: {req:?}"),
    }
}

fn login_url(state: &str) -> String {
    format!(
        "https://{DOMAIN}/authorize?redirect_uri=https://{HOST}&response_type=code&client_id={APP_ID}&state={state}"
    )
}

#[tokio::test]
async fn valid_session_is_forwarded_unchanged() {
    let (auth, idp) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let cookie = format!("foo=bar; {}", id_token_cookie(APP_ID, "toto", &id_token("toto")));
    let req = request("/lol", "param=1", Some(&cookie));

    let outcome = auth.handle(req.clone()).await.unwrap();
    assert_eq!(outcome, HandlerOutcome::Forward(req.clone()));
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        serde_json::to_value(&req).unwrap()
    );

    // Second request is served from the key cache.
    auth.handle(req).await.unwrap();
    assert_eq!(idp.fetches(), 1);
}

#[tokio::test]
async fn session_is_scoped_to_the_configured_app_client() {
    let config = edge_auth::AuthConfig::from_value(&params("ABC123")).unwrap();
    let auth = Authenticator::new(config, FakeIdp::new(Some(jwks_with_signing_key())));
    let token = sign(&id_claims("toto", "ABC123"), SIGNING_KID, SIGNING_KEY_PEM);
    let cookie = format!(
        "{}; {}",
        id_token_cookie(APP_ID, "toto", &id_token("toto")),
        id_token_cookie("ABC123", "toto", &token)
    );
    let req = request("/lol", "", Some(&cookie));

    assert_eq!(auth.handle(req.clone()).await.unwrap(), HandlerOutcome::Forward(req));
}

#[tokio::test]
async fn lambda_event_is_unwrapped() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let cookie = id_token_cookie(APP_ID, "toto", &id_token("toto"));
    let req = request("/lol", "", Some(&cookie));
    let event: CloudFrontEvent = serde_json::from_value(json!({
        "Records": [{
            "cf": {
                "config": { "distributionId": "EDFDVBD6EXAMPLE" },
                "request": serde_json::to_value(&req).unwrap()
            }
        }]
    }))
    .unwrap();

    let outcome = auth.handle_event(event).await.unwrap();
    assert_eq!(outcome, HandlerOutcome::Forward(req));
}

#[tokio::test]
async fn anonymous_request_redirects_to_login_with_state() {
    let (auth, idp) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));

    let resp = respond(auth.handle(request("/lol", "param=1", None)).await.unwrap());
    assert_eq!(resp.status, "302");
    assert_eq!(resp.location(), Some(login_url("/lol%3Fparam%3D1").as_str()));
    assert!(resp.set_cookies().is_empty());
    assert_eq!(idp.fetches(), 0);

    let resp = respond(auth.handle(request("/lol", "", None)).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
}

#[tokio::test]
async fn expired_token_redirects_to_login() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let mut claims = id_claims("toto", APP_ID);
    claims["exp"] = json!(now_secs() - 10);
    let token = sign(&claims, SIGNING_KID, SIGNING_KEY_PEM);
    let cookie = id_token_cookie(APP_ID, "toto", &token);

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
}

#[tokio::test]
async fn forged_signature_redirects_to_login() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    // Signed with a key that does not belong to the advertised kid.
    let token = sign(&id_claims("toto", APP_ID), SIGNING_KID, ROTATED_KEY_PEM);
    let cookie = id_token_cookie(APP_ID, "toto", &token);

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
}

#[tokio::test]
async fn cookie_of_another_app_client_is_ignored() {
    let (auth, idp) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let other = "otherappclientid0000000000";
    let cookie = id_token_cookie(other, "toto", &sign(&id_claims("toto", other), SIGNING_KID, SIGNING_KEY_PEM));

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
    assert_eq!(idp.fetches(), 0);
}

#[tokio::test]
async fn token_for_another_audience_is_rejected() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let token = sign(&id_claims("toto", "otherappclientid0000000000"), SIGNING_KID, SIGNING_KEY_PEM);
    let cookie = id_token_cookie(APP_ID, "toto", &token);

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
}

#[tokio::test]
async fn access_token_is_not_a_session() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let now = now_secs();
    let claims = json!({
        "sub": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
        "token_use": "access",
        "client_id": APP_ID,
        "username": "toto",
        "iss": issuer(),
        "exp": now + 300,
        "iat": now,
    });
    let cookie = id_token_cookie(APP_ID, "toto", &sign(&claims, SIGNING_KID, SIGNING_KEY_PEM));

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
}

#[tokio::test]
async fn rotated_key_is_fetched_on_miss() {
    let (auth, idp) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let cookie = id_token_cookie(APP_ID, "toto", &id_token("toto"));
    auth.handle(request("/lol", "", Some(&cookie))).await.unwrap();
    assert_eq!(idp.fetches(), 1);

    *idp.jwks.lock().unwrap() = Some(jwks_with_both_keys());
    let rotated = sign(&id_claims("toto", APP_ID), ROTATED_KID, ROTATED_KEY_PEM);
    let req = request("/lol", "", Some(&id_token_cookie(APP_ID, "toto", &rotated)));

    let outcome = auth.handle(req.clone()).await.unwrap();
    assert_eq!(outcome, HandlerOutcome::Forward(req));
    assert_eq!(idp.fetches(), 2);
    assert!(auth.verifier().key_cache().contains(SIGNING_KID));
    assert!(auth.verifier().key_cache().contains(ROTATED_KID));
}

#[tokio::test]
async fn unknown_kid_redirects_to_login() {
    let (auth, idp) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let token = sign(&id_claims("toto", APP_ID), ROTATED_KID, ROTATED_KEY_PEM);
    let cookie = id_token_cookie(APP_ID, "toto", &token);

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
    assert_eq!(idp.fetches(), 1);
}

#[tokio::test]
async fn unreachable_key_set_redirects_to_login() {
    let (auth, idp) = authenticator(FakeIdp::new(None));
    let cookie = id_token_cookie(APP_ID, "toto", &id_token("toto"));

    let resp = respond(auth.handle(request("/lol", "", Some(&cookie))).await.unwrap());
    assert_eq!(resp.location(), Some(login_url("/lol").as_str()));
    assert_eq!(idp.fetches(), 1);
    assert!(auth.verifier().key_cache().is_empty());
}

#[tokio::test]
async fn logout_without_session_returns_to_host() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));

    let resp = respond(auth.handle(request("/logout", "", None)).await.unwrap());
    assert_eq!(resp.status, "302");
    assert_eq!(resp.location(), Some(HOST));
    assert!(resp.set_cookies().is_empty());

    let v = serde_json::to_value(&resp).unwrap();
    assert_eq!(
        v["headers"]["cache-control"][0]["value"],
        "no-cache, no-store, max-age=0, must-revalidate"
    );
    assert_eq!(v["headers"]["pragma"][0]["value"], "no-cache");
}

#[tokio::test]
async fn logout_clears_session_cookies() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let token = id_token("toto");
    let cookie = id_token_cookie(APP_ID, "toto", &token);

    let resp = respond(auth.handle(request("/logout", "", Some(&cookie))).await.unwrap());
    assert_eq!(
        resp.location(),
        Some(format!("https://{DOMAIN}/logout?logout_uri=https://{HOST}&client_id={APP_ID}").as_str())
    );

    let cookies = resp.set_cookies();
    let prefix = format!("CognitoIdentityServiceProvider.{APP_ID}");
    assert_eq!(cookies.len(), 5);
    assert!(cookies[0].starts_with(&format!("{prefix}.toto.accessToken=0;")));
    assert!(cookies[1].starts_with(&format!("{prefix}.toto.idToken={token};")));
    assert!(cookies[2].starts_with(&format!("{prefix}.toto.refreshToken=0;")));
    assert!(cookies[3].starts_with(&format!("{prefix}.toto.tokenScopesString=")));
    assert!(cookies[4].starts_with(&format!("{prefix}.LastAuthUser=toto;")));
    assert!(
        cookies
            .iter()
            .all(|c| c.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT") && c.contains(&format!("Domain={HOST}")))
    );
}

#[tokio::test]
async fn expired_session_can_still_log_out() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let mut claims = id_claims("toto", APP_ID);
    claims["exp"] = json!(now_secs() - 10);
    let cookie = id_token_cookie(APP_ID, "toto", &sign(&claims, SIGNING_KID, SIGNING_KEY_PEM));

    let resp = respond(auth.handle(request("/logout", "", Some(&cookie))).await.unwrap());
    assert!(resp.location().unwrap().starts_with(&format!("https://{DOMAIN}/logout?")));
    assert_eq!(resp.set_cookies().len(), 5);
}

#[tokio::test]
async fn authorization_code_is_exchanged_for_session_cookies() {
    let token = id_token("toto");
    let idp = FakeIdp::new(Some(jwks_with_signing_key())).with_token_response(json!({
        "access_token": "eyJz9sdfsdfsdfsd",
        "refresh_token": "dn43ud8uj32nk2je",
        "id_token": token,
        "token_type": "Bearer",
        "expires_in": 3600
    }));
    let (auth, idp) = authenticator(idp);

    let resp = respond(
        auth.handle(request("/", "code=XYZ&state=%2Fdashboard", None))
            .await
            .unwrap(),
    );
    assert_eq!(resp.location(), Some("/dashboard"));

    let cookies = resp.set_cookies();
    let prefix = format!("CognitoIdentityServiceProvider.{APP_ID}");
    assert_eq!(cookies.len(), 5);
    assert!(cookies[0].starts_with(&format!("{prefix}.toto.accessToken=eyJz9sdfsdfsdfsd;")));
    assert!(cookies[1].starts_with(&format!("{prefix}.toto.idToken={token};")));
    assert!(cookies[2].starts_with(&format!("{prefix}.toto.refreshToken=dn43ud8uj32nk2je;")));
    assert!(cookies[4].starts_with(&format!("{prefix}.LastAuthUser=toto;")));

    let expires = cookies[0]
        .split("; ")
        .find_map(|attr| attr.strip_prefix("Expires="))
        .unwrap();
    assert!(httpdate::parse_http_date(expires).unwrap() > SystemTime::now());

    let posts = idp.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, format!("https://{DOMAIN}/oauth2/token"));
    let form = &posts[0].form;
    for (k, v) in [
        ("grant_type", "authorization_code"),
        ("client_id", APP_ID),
        ("code", "XYZ"),
        ("redirect_uri", &format!("https://{HOST}")),
    ] {
        assert!(form.contains(&(k.to_string(), v.to_string())), "missing {k}");
    }
}

#[tokio::test]
async fn cookie_lifetime_beyond_the_bound_is_refused_at_construction() {
    let mut p = params(APP_ID);
    p["cookie_expiration_days"] = json!(3_000_000);
    let err = edge_auth::AuthConfig::from_value(&p).unwrap_err();
    assert!(err.to_string().contains("cookie_expiration_days"), "{err}");

    p["cookie_expiration_days"] = json!(edge_auth::MAX_COOKIE_EXPIRATION_DAYS);
    let idp = FakeIdp::new(Some(jwks_with_signing_key())).with_token_response(json!({
        "access_token": "eyJz9sdfsdfsdfsd",
        "refresh_token": "dn43ud8uj32nk2je",
        "id_token": id_token("toto"),
        "token_type": "Bearer",
        "expires_in": 3600
    }));
    let auth = Authenticator::new(edge_auth::AuthConfig::from_value(&p).unwrap(), idp);

    let resp = respond(
        auth.handle(request("/", "code=XYZ&state=%2Fdashboard", None))
            .await
            .unwrap(),
    );
    assert_eq!(resp.location(), Some("/dashboard"));
    assert_eq!(resp.set_cookies().len(), 5);
}

#[tokio::test]
async fn failed_exchange_is_an_error() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));

    let err = auth
        .handle(request("/", "code=XYZ&state=%2Fdashboard", None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TokenExchange(_)));
}

#[tokio::test]
async fn missing_host_is_an_invalid_request() {
    let (auth, _) = authenticator(FakeIdp::new(Some(jwks_with_signing_key())));
    let mut req = request("/lol", "", None);
    req.headers.as_mut().unwrap().remove("host");

    let err = auth.handle(req).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}
