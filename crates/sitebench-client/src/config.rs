use std::env;

use thiserror::Error;

use crate::notify::DEFAULT_TOAST_MS;
use crate::paths::RedirectMode;
use crate::transport::ParsePolicy;

pub const ENV_PAGE_URL: &str = "SITEBENCH_PAGE_URL";
pub const ENV_API_ROOT: &str = "SITEBENCH_API_ROOT";
pub const ENV_PARSE_POLICY: &str = "SITEBENCH_PARSE_POLICY";
pub const ENV_REDIRECT_MODE: &str = "SITEBENCH_REDIRECT_MODE";
pub const ENV_TOAST_MS: &str = "SITEBENCH_TOAST_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing SITEBENCH_PAGE_URL")]
    MissingPageUrl,
    #[error("invalid SITEBENCH_PARSE_POLICY: {0}")]
    InvalidParsePolicy(String),
    #[error("invalid SITEBENCH_REDIRECT_MODE: {0}")]
    InvalidRedirectMode(String),
    #[error("invalid SITEBENCH_TOAST_MS: {0}")]
    InvalidToastMs(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteClientConfig {
    /// URL of the page the client acts for.
    pub page_url: String,
    pub api_root: Option<String>,
    pub parse_policy: ParsePolicy,
    pub redirect_mode: RedirectMode,
    pub toast_ms: u64,
}

impl SiteClientConfig {
    #[must_use]
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            api_root: None,
            parse_policy: ParsePolicy::default(),
            redirect_mode: RedirectMode::default(),
            toast_ms: DEFAULT_TOAST_MS,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let page_url = env_non_empty(ENV_PAGE_URL).ok_or(ConfigError::MissingPageUrl)?;
        Self::from_env_with_page(page_url)
    }

    /// Like [`Self::from_env`] but with the page URL supplied by the caller.
    pub fn from_env_with_page(page_url: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(page_url);
        config.api_root = env_non_empty(ENV_API_ROOT);

        if let Some(raw) = env_non_empty(ENV_PARSE_POLICY) {
            config.parse_policy =
                ParsePolicy::parse(&raw).ok_or(ConfigError::InvalidParsePolicy(raw))?;
        }
        if let Some(raw) = env_non_empty(ENV_REDIRECT_MODE) {
            config.redirect_mode =
                RedirectMode::parse(&raw).ok_or(ConfigError::InvalidRedirectMode(raw))?;
        }
        if let Some(raw) = env_non_empty(ENV_TOAST_MS) {
            config.toast_ms = raw
                .parse::<u64>()
                .map_err(|error| ConfigError::InvalidToastMs(format!("{raw}: {error}")))?;
        }
        Ok(config)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
