use std::env;

use thiserror::Error;

const ENV_URL: &str = "SUPABASE_URL";
const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_PROVIDER: &str = "LOBBY_OAUTH_PROVIDER";
const ENV_REDIRECT_PORT: &str = "LOBBY_REDIRECT_PORT";

const DEFAULT_PROVIDER: &str = "github";
const DEFAULT_REDIRECT_PORT: u16 = 8910;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set; point it at your hosted project")]
    Missing(&'static str),
    #[error("{name} is not a valid port: {value}")]
    BadPort { name: &'static str, value: String },
}

/// Backend coordinates, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Project base URL without a trailing slash, e.g. `https://xyz.supabase.co`.
    pub supabase_url: String,
    /// Public anon key. Row-level security does the real gating.
    pub anon_key: String,
    /// Provider slug the auth endpoint understands (`github`, `google`, ...).
    pub oauth_provider: String,
    /// Loopback port the sign-in redirect lands on. Must match the redirect
    /// URL allow-listed with the backend.
    pub redirect_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let supabase_url = required(ENV_URL, &lookup)?;
        let anon_key = required(ENV_ANON_KEY, &lookup)?;
        let oauth_provider = lookup(ENV_PROVIDER)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let redirect_port = match lookup(ENV_REDIRECT_PORT) {
            Some(value) => value.parse().map_err(|_| ConfigError::BadPort {
                name: ENV_REDIRECT_PORT,
                value,
            })?,
            None => DEFAULT_REDIRECT_PORT,
        };

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key,
            oauth_provider,
            redirect_port,
        })
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    /// Realtime endpoint with the websocket scheme swapped in.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{}", self.supabase_url)
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.anon_key
        )
    }
}

fn required(name: &'static str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Human label for a provider slug, for the sign-in button.
pub fn provider_label(slug: &str) -> String {
    match slug {
        "github" => "GitHub".to_string(),
        "gitlab" => "GitLab".to_string(),
        "google" => "Google".to_string(),
        "discord" => "Discord".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => "OAuth".to_string(),
            }
        }
    }
}
