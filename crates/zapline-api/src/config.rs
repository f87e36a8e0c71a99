//! Environment configuration

use serde::Deserialize;
use std::env;

/// Process configuration, read once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Cloud API version, e.g. `v19.0`.
    pub api_version: String,
    /// Legacy single-tenant fallback for the bare `/webhook` route.
    pub default_verify_token: Option<String>,
    pub default_access_token: Option<String>,
    /// Secret for validating operator bearer tokens (issuance lives in the
    /// auth collaborator).
    pub jwt_secret: String,
    pub database_url: String,
    /// Public base URL used to build media links.
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub frontend_urls: Vec<String>,
    /// Relaxes webhook signature verification.
    pub dev_mode: bool,
    pub port: u16,
    pub media_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT is not a number"))?;

        Ok(Self {
            api_version: env::var("WHATSAPP_API_VERSION").unwrap_or_else(|_| "v19.0".to_string()),
            default_verify_token: env::var("WEBHOOK_VERIFY_TOKEN").ok(),
            default_access_token: env::var("WHATSAPP_ACCESS_TOKEN").ok(),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET is required"))?,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            cors_origins: split_list(env::var("CORS_ORIGINS").ok()),
            frontend_urls: split_list(env::var("FRONTEND_URLS").ok()),
            dev_mode: env::var("DEV_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            port,
            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "./media".to_string()),
        })
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_handles_empty_and_spacing() {
        assert!(split_list(None).is_empty());
        assert_eq!(
            split_list(Some("https://a.example, https://b.example".to_string())),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(split_list(Some(" ,".to_string())).is_empty());
    }
}
