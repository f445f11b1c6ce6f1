use reqwest::StatusCode;

use crate::common::{Message, Session};
use crate::config::AppConfig;

use super::Error;

/// Messages fetched per page. A short page means history is exhausted.
pub const PAGE_SIZE: usize = 50;

const MESSAGES_TABLE: &str = "messages";

/// One fetched page, already re-sorted oldest-first for display.
#[derive(Debug)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub exhausted: bool,
}

/// Fetch up to `PAGE_SIZE` rows starting `offset` rows back from the newest.
pub async fn fetch_page(
    http: &reqwest::Client,
    config: &AppConfig,
    session: Option<&Session>,
    offset: usize,
) -> Result<HistoryPage, Error> {
    let url = format!("{}/{}", config.rest_url(), MESSAGES_TABLE);
    let response = http
        .get(url)
        .header("apikey", &config.anon_key)
        .bearer_auth(bearer(config, session))
        .query(&[
            ("select", "*"),
            ("order", "created_at.desc"),
            ("offset", &offset.to_string()),
            ("limit", &PAGE_SIZE.to_string()),
        ])
        .send()
        .await?;
    let rows: Vec<Message> = check(response).await?.json().await?;
    Ok(page_from_rows(rows))
}

/// Insert one message as the signed-in user. The row comes back to us over
/// the realtime channel, so we ask the backend not to echo it here.
pub async fn insert_message(
    http: &reqwest::Client,
    config: &AppConfig,
    session: &Session,
    content: &str,
) -> Result<(), Error> {
    let url = format!("{}/{}", config.rest_url(), MESSAGES_TABLE);
    let response = http
        .post(url)
        .header("apikey", &config.anon_key)
        .bearer_auth(&session.access_token)
        .header("Prefer", "return=minimal")
        .json(&insert_body(session, content))
        .send()
        .await?;
    check(response).await?;
    Ok(())
}

/// The wire order is newest-first so the offset counts back from the newest
/// row; flip it for display.
fn page_from_rows(mut rows: Vec<Message>) -> HistoryPage {
    let exhausted = rows.len() < PAGE_SIZE;
    rows.reverse();
    HistoryPage {
        messages: rows,
        exhausted,
    }
}

fn insert_body(session: &Session, content: &str) -> serde_json::Value {
    serde_json::json!({
        "content": content,
        "user_id": session.user_id,
        "username": session.username,
        "avatar_url": session.avatar_url,
    })
}

fn bearer<'a>(config: &'a AppConfig, session: Option<&'a Session>) -> &'a str {
    session
        .map(|s| s.access_token.as_str())
        .unwrap_or(&config.anon_key)
}

/// Map non-2xx responses to typed errors, with 401 as session expiry.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::SessionExpired);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(id: &str, secs: i64) -> Message {
        Message {
            id: id.to_string(),
            user_id: "u1".to_string(),
            content: format!("message {id}"),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            username: Some("alice".to_string()),
            avatar_url: None,
        }
    }

    #[test]
    fn test_page_is_flipped_to_oldest_first() {
        let page = page_from_rows(vec![row("c", 3), row("b", 2), row("a", 1)]);
        let ids: Vec<&str> = page.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_short_page_marks_history_exhausted() {
        assert!(page_from_rows(vec![row("a", 1)]).exhausted);
        assert!(page_from_rows(Vec::new()).exhausted);
    }

    #[test]
    fn test_full_page_leaves_more_to_fetch() {
        let rows: Vec<Message> = (0..PAGE_SIZE as i64).map(|i| row(&i.to_string(), i)).collect();
        assert!(!page_from_rows(rows).exhausted);
    }

    #[test]
    fn test_insert_body_is_attributed_to_the_session_user() {
        let session = Session {
            user_id: "user-9".to_string(),
            username: "bob".to_string(),
            avatar_url: Some("https://example.com/a.png".to_string()),
            access_token: "jwt".to_string(),
        };
        let body = insert_body(&session, "hello");
        assert_eq!(body["content"], "hello");
        assert_eq!(body["user_id"], "user-9");
        assert_eq!(body["username"], "bob");
        assert_eq!(body["avatar_url"], "https://example.com/a.png");
        // The id and timestamp are the backend's to assign.
        assert!(body.get("id").is_none());
        assert!(body.get("created_at").is_none());
    }

    #[test]
    fn test_reads_fall_back_to_the_anon_key() {
        let config = AppConfig {
            supabase_url: "https://x.supabase.co".to_string(),
            anon_key: "anon".to_string(),
            oauth_provider: "github".to_string(),
            redirect_port: 8910,
        };
        assert_eq!(bearer(&config, None), "anon");

        let session = Session {
            user_id: "u".to_string(),
            username: "n".to_string(),
            avatar_url: None,
            access_token: "jwt".to_string(),
        };
        assert_eq!(bearer(&config, Some(&session)), "jwt");
    }
}
