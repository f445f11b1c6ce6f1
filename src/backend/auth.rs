use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::common::Session;
use crate::config::AppConfig;

use super::Error;

/// How long the loopback port stays open waiting for the browser.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SIGNED_IN_PAGE: &str =
    "<html><body><h3>Signed in</h3><p>You can close this tab and go back to Lobby.</p></body></html>";
const DENIED_PAGE: &str =
    "<html><body><h3>Sign-in canceled</h3><p>You can close this tab.</p></body></html>";

/// Proof-key pair for one sign-in attempt. The challenge goes out with the
/// browser; the verifier never leaves this process.
#[derive(Debug)]
struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(hex::encode(bytes))
    }

    fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

/// Run the whole browser sign-in dance and return the session.
///
/// The loopback listener binds before the browser opens so the redirect
/// cannot race us. Stray requests on the port (favicon fetches and the
/// like) are answered and ignored.
pub async fn sign_in(http: &reqwest::Client, config: &AppConfig) -> Result<Session, Error> {
    let pkce = PkcePair::generate();
    let redirect = format!("http://127.0.0.1:{}/callback", config.redirect_port);

    let listener = TcpListener::bind(("127.0.0.1", config.redirect_port)).await?;

    let authorize = authorize_url(config, &pkce.challenge, &redirect)?;
    log::info!("Opening browser for {} sign-in", config.oauth_provider);
    open::that(authorize.as_str())
        .map_err(|err| Error::Auth(format!("could not open a browser: {err}")))?;

    let code = tokio::time::timeout(CALLBACK_TIMEOUT, wait_for_callback(&listener))
        .await
        .map_err(|_| Error::Auth("timed out waiting for the browser".to_string()))??;

    exchange_code(http, config, &code, &pkce.verifier).await
}

/// Revoke the token server-side. An already-dead token is not an error; the
/// caller drops the local session either way.
pub async fn sign_out(
    http: &reqwest::Client,
    config: &AppConfig,
    access_token: &str,
) -> Result<(), Error> {
    let url = format!("{}/logout", config.auth_url());
    let response = http
        .post(url)
        .header("apikey", &config.anon_key)
        .bearer_auth(access_token)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() && status != StatusCode::UNAUTHORIZED {
        log::warn!("Logout returned {status}");
    }
    Ok(())
}

fn authorize_url(config: &AppConfig, challenge: &str, redirect: &str) -> Result<Url, Error> {
    let mut url = Url::parse(&format!("{}/authorize", config.auth_url()))
        .map_err(|err| Error::Auth(format!("bad backend url: {err}")))?;
    url.query_pairs_mut()
        .append_pair("provider", &config.oauth_provider)
        .append_pair("redirect_to", redirect)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "s256");
    Ok(url)
}

async fn wait_for_callback(listener: &TcpListener) -> Result<String, Error> {
    loop {
        let (stream, _) = listener.accept().await?;
        match handle_callback_request(stream).await? {
            Some(code) => return Ok(code),
            None => continue,
        }
    }
}

/// Answer one HTTP request on the loopback port. `Ok(None)` means the
/// request was unrelated and the listener should keep waiting.
async fn handle_callback_request(mut stream: TcpStream) -> Result<Option<String>, Error> {
    let mut buffer = vec![0u8; 4096];
    let read = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..read]);

    let Some(target) = request_target(&request) else {
        respond(&mut stream, 400, "Bad request").await;
        return Ok(None);
    };
    if !target.starts_with("/callback") {
        respond(&mut stream, 404, "Not found").await;
        return Ok(None);
    }

    match callback_result(target) {
        Ok(code) => {
            respond(&mut stream, 200, SIGNED_IN_PAGE).await;
            Ok(Some(code))
        }
        Err(reason) => {
            respond(&mut stream, 200, DENIED_PAGE).await;
            Err(Error::Auth(reason))
        }
    }
}

/// Request-target of a GET, from the first request line.
fn request_target(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Some(target),
        _ => None,
    }
}

/// Pull the auth code out of a `/callback` request target, or the reason
/// the provider sent us back empty-handed.
fn callback_result(target: &str) -> Result<String, String> {
    let url = match Url::parse(&format!("http://127.0.0.1{target}")) {
        Ok(url) => url,
        Err(_) => return Err("malformed callback request".to_string()),
    };

    let mut code = None;
    let mut denial = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error_description" => denial = Some(value.into_owned()),
            "error" if denial.is_none() => denial = Some(value.into_owned()),
            _ => {}
        }
    }

    match (code, denial) {
        (Some(code), None) => Ok(code),
        (_, Some(reason)) => Err(reason),
        (None, None) => Err("the callback carried no auth code".to_string()),
    }
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Bad Request",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        log::debug!("Could not answer the callback request: {err}");
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

async fn exchange_code(
    http: &reqwest::Client,
    config: &AppConfig,
    code: &str,
    verifier: &str,
) -> Result<Session, Error> {
    let url = format!("{}/token?grant_type=pkce", config.auth_url());
    let response = http
        .post(url)
        .header("apikey", &config.anon_key)
        .json(&serde_json::json!({
            "auth_code": code,
            "code_verifier": verifier,
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Auth(format!("token exchange returned {status}: {body}")));
    }

    let token: TokenResponse = response.json().await?;
    Ok(session_from_token(token))
}

fn session_from_token(token: TokenResponse) -> Session {
    let username = username_from_metadata(&token.user.user_metadata, token.user.email.as_deref());
    let avatar_url = token
        .user
        .user_metadata
        .get("avatar_url")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Session {
        user_id: token.user.id,
        username,
        avatar_url,
        access_token: token.access_token,
    }
}

/// Providers disagree on where the display name lives; take the first key
/// that holds one, then the email local part.
fn username_from_metadata(metadata: &serde_json::Value, email: Option<&str>) -> String {
    for key in ["full_name", "name", "user_name", "preferred_username"] {
        if let Some(name) = metadata.get(key).and_then(|v| v.as_str()) {
            if !name.trim().is_empty() {
                return name.to_string();
            }
        }
    }
    email
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "someone".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_challenge_matches_rfc_7636_vector() {
        let pair = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_generated_verifier_is_64_hex_chars() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 64);
        assert!(pair.verifier.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!pair.challenge.is_empty());
    }

    #[test]
    fn test_authorize_url_carries_the_pkce_params() {
        let config = AppConfig {
            supabase_url: "https://x.supabase.co".to_string(),
            anon_key: "anon".to_string(),
            oauth_provider: "github".to_string(),
            redirect_port: 8910,
        };
        let url = authorize_url(&config, "challenge123", "http://127.0.0.1:8910/callback").unwrap();
        let text = url.as_str();
        assert!(text.starts_with("https://x.supabase.co/auth/v1/authorize?"));
        assert!(text.contains("provider=github"));
        assert!(text.contains("code_challenge=challenge123"));
        assert!(text.contains("code_challenge_method=s256"));
        assert!(text.contains("redirect_to=http%3A%2F%2F127.0.0.1%3A8910%2Fcallback"));
    }

    #[test]
    fn test_callback_code_is_extracted() {
        assert_eq!(
            callback_result("/callback?code=abc-123"),
            Ok("abc-123".to_string())
        );
    }

    #[test]
    fn test_callback_denial_is_reported_decoded() {
        let result = callback_result("/callback?error=access_denied&error_description=User%20said%20no");
        assert_eq!(result, Err("User said no".to_string()));
    }

    #[test]
    fn test_callback_without_code_is_an_error() {
        assert!(callback_result("/callback").is_err());
        assert!(callback_result("/callback?state=xyz").is_err());
    }

    #[test]
    fn test_request_target_parses_only_gets() {
        assert_eq!(
            request_target("GET /callback?code=1 HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some("/callback?code=1")
        );
        assert_eq!(request_target("POST / HTTP/1.1\r\n\r\n"), None);
        assert_eq!(request_target(""), None);
    }

    #[test]
    fn test_username_prefers_metadata_then_email() {
        let meta = json!({ "full_name": "Ada Lovelace", "user_name": "ada" });
        assert_eq!(username_from_metadata(&meta, None), "Ada Lovelace");

        let meta = json!({ "user_name": "ada" });
        assert_eq!(username_from_metadata(&meta, Some("a@b.c")), "ada");

        let meta = json!({});
        assert_eq!(username_from_metadata(&meta, Some("grace@navy.mil")), "grace");
        assert_eq!(username_from_metadata(&meta, None), "someone");
    }

    #[test]
    fn test_session_from_token_reads_the_avatar() {
        let token = TokenResponse {
            access_token: "jwt".to_string(),
            user: AuthUser {
                id: "user-1".to_string(),
                email: Some("ada@example.com".to_string()),
                user_metadata: json!({
                    "user_name": "ada",
                    "avatar_url": "https://example.com/ada.png",
                }),
            },
        };
        let session = session_from_token(token);
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.username, "ada");
        assert_eq!(session.avatar_url.as_deref(), Some("https://example.com/ada.png"));
        assert_eq!(session.access_token, "jwt");
    }
}
