use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub cookie_secure: bool,
    /// Allowed browser origin; `None` means permissive CORS.
    pub cors_origin: Option<String>,
    pub openai_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let jwt_secret = var("ORBIT_JWT_SECRET").unwrap_or_else(|| {
            warn!("ORBIT_JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        let openai_api_key = var("OPENAI_API_KEY");
        if openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set, AI chat replies will fail");
        }

        Ok(Self {
            host: try_load("ORBIT_HOST", "0.0.0.0")?,
            port: try_load("ORBIT_PORT", "5000")?,
            db_path: try_load("ORBIT_DB_PATH", "friendsorbit.db")?,
            jwt_secret,
            cookie_secure: try_load("ORBIT_COOKIE_SECURE", "false")?,
            cors_origin: var("ORBIT_CORS_ORIGIN"),
            openai_api_key,
            llm_base_url: try_load("ORBIT_LLM_BASE_URL", orbit_api::llm::DEFAULT_BASE_URL)?,
            llm_model: try_load("ORBIT_LLM_MODEL", "gpt-3.5-turbo")?,
        })
    }
}

/// A set, non-blank environment variable.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let port: u16 = try_load("ORBIT_TEST_UNSET_PORT", "5000").unwrap();
        assert_eq!(port, 5000);
        let secure: bool = try_load("ORBIT_TEST_UNSET_SECURE", "false").unwrap();
        assert!(!secure);
    }

    #[test]
    fn bad_default_is_an_error() {
        assert!(try_load::<u16>("ORBIT_TEST_UNSET_PORT", "not-a-port").is_err());
    }
}
