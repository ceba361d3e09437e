//! Environment-driven configuration structures shared by all binaries.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::model::WithdrawalPolicy;

/// API-specific configuration (HTTP listeners + shared database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    database_max_connections: Option<u32>,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    session_cache_ttl: Duration,
}

impl ApiConfig {
    pub const DEFAULT_SESSION_CACHE_TTL_SECS: u64 = 300;

    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let ttl_secs = get_optional_number("SESSION_CACHE_TTL_SECS")?
            .unwrap_or(Self::DEFAULT_SESSION_CACHE_TTL_SECS);

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            database_max_connections: get_optional_bounded("DATABASE_MAX_CONNECTIONS")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            session_cache_ttl: Duration::from_secs(ttl_secs),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Pool size override. SQLite pools default to a single connection; a
    /// larger pool needs a file-backed database.
    pub fn database_max_connections(&self) -> Option<u32> {
        self.database_max_connections
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn session_cache_ttl(&self) -> Duration {
        self.session_cache_ttl
    }
}

/// Minimal configuration for operator tools that only touch the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    database_url: String,
}

impl DatabaseConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Balance rules that are deployment policy rather than invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    withdrawal_policy: WithdrawalPolicy,
    refund_on_reject: bool,
}

impl LedgerConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let min_amount = get_optional_bounded("WITHDRAWAL_MIN_AMOUNT")?
            .unwrap_or(WithdrawalPolicy::DEFAULT_MIN_AMOUNT);
        let step =
            get_optional_bounded("WITHDRAWAL_STEP")?.unwrap_or(WithdrawalPolicy::DEFAULT_STEP);
        let refund_on_reject = get_optional_bool("WITHDRAWAL_REFUND_ON_REJECT")?.unwrap_or(true);

        Ok(Self {
            withdrawal_policy: WithdrawalPolicy::new(min_amount, step),
            refund_on_reject,
        })
    }

    pub fn new(withdrawal_policy: WithdrawalPolicy, refund_on_reject: bool) -> Self {
        Self {
            withdrawal_policy,
            refund_on_reject,
        }
    }

    pub fn withdrawal_policy(&self) -> &WithdrawalPolicy {
        &self.withdrawal_policy
    }

    pub fn refund_on_reject(&self) -> bool {
        self.refund_on_reject
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(WithdrawalPolicy::default(), true)
    }
}

/// Discord OAuth credentials. The provider is optional as a whole: without a
/// client id the Discord sign-in route answers "not configured".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    api_base: String,
    timeout: Duration,
}

impl OAuthConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://discord.com/api";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    pub fn load_from_env() -> Result<Option<Self>, ConfigError> {
        hydrate_env_file()?;

        let Some(client_id) = get_optional_var("DISCORD_CLIENT_ID") else {
            return Ok(None);
        };
        let timeout_secs = get_optional_number("OAUTH_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS);

        Ok(Some(Self {
            client_id,
            client_secret: get_required_var("DISCORD_CLIENT_SECRET")?,
            redirect_uri: get_required_var("DISCORD_REDIRECT_URI")?,
            api_base: get_optional_var("DISCORD_API_BASE")
                .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        }))
    }

    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_number(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn get_optional_bounded<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: TryFrom<u64>,
{
    get_optional_number(key)?
        .map(|value| T::try_from(value).map_err(|_| ConfigError::OutOfRange { key, value }))
        .transpose()
}

fn get_optional_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    get_optional_var(key)
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool { key, value }),
        })
        .transpose()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("REWARDS_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("value {value} in `{key}` is out of range")]
    OutOfRange { key: &'static str, value: u64 },
    #[error("invalid boolean `{value}` in `{key}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
