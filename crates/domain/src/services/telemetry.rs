use std::{
    collections::HashMap,
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Shared observability options for binaries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
    abuse_threshold: u16,
    abuse_window: Duration,
}

impl TelemetryConfig {
    pub const DEFAULT_ABUSE_THRESHOLD: u16 = 5;
    pub const DEFAULT_ABUSE_WINDOW_SECS: u64 = 600;

    /// Loads telemetry knobs from optional environment variables prefixed with
    /// `<PREFIX>_`, e.g. `API_LOG_FILTER`. Missing entries fall back to
    /// defaults so binaries boot without extra configuration.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();
        let log_key = format!("{}_LOG_FILTER", upper);
        let metrics_key = format!("{}_METRICS_ADDRESS", upper);
        let abuse_key = format!("{}_ABUSE_THRESHOLD", upper);
        let window_key = format!("{}_ABUSE_WINDOW_SECS", upper);

        let log_filter = env::var(log_key).unwrap_or_else(|_| "info".to_string());
        let metrics_address = env::var(metrics_key).ok().and_then(|value| {
            if value.trim().is_empty() {
                None
            } else {
                Some(value)
            }
        });
        let abuse_threshold = env::var(abuse_key)
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(Self::DEFAULT_ABUSE_THRESHOLD);
        let abuse_window = env::var(window_key)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(Self::DEFAULT_ABUSE_WINDOW_SECS));

        Self {
            log_filter,
            metrics_address,
            abuse_threshold,
            abuse_window,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }

    pub fn abuse_threshold(&self) -> u16 {
        self.abuse_threshold
    }

    pub fn abuse_window(&self) -> Duration {
        self.abuse_window
    }
}

/// Guard returned after telemetry initialization.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
    abuse_threshold: u16,
    abuse_window: Duration,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn abuse_tracker(&self) -> AbuseTracker {
        AbuseTracker::new(self.abuse_threshold, self.abuse_window)
    }
}

/// Centralized helper to wire up tracing + metrics exporters once per process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = install_metrics(config)?;

    Ok(TelemetryGuard {
        metrics,
        abuse_threshold: config.abuse_threshold(),
        abuse_window: config.abuse_window(),
    })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_metrics(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let mut builder = PrometheusBuilder::new();
            if let Some(addr) = config.metrics_address() {
                let socket: SocketAddr =
                    addr.parse().map_err(|err: std::net::AddrParseError| {
                        TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
                    })?;
                builder = builder.with_http_listener(socket);
            }

            builder
                .install_recorder()
                .map(Arc::new)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))
        })
        .cloned()
}

/// Counts failed promocode guesses per caller. Attempts older than the window
/// are forgotten, so a caller is only escalated for a burst of failures.
#[derive(Clone)]
pub struct AbuseTracker {
    threshold: u16,
    window: Duration,
    inner: Arc<Mutex<HashMap<String, AbuseRecord>>>,
}

impl AbuseTracker {
    pub fn new(threshold: u16, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn record(&self, key: impl AsRef<str>) -> AbuseSignal {
        self.record_at(key, Utc::now())
    }

    pub fn record_at(&self, key: impl AsRef<str>, now: DateTime<Utc>) -> AbuseSignal {
        let key = key.as_ref().to_owned();
        let window = self.window_span();
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = guard.entry(key.clone()).or_insert(AbuseRecord {
            attempts: 0,
            first_seen: now,
            last_seen: now,
        });
        if now - entry.first_seen > window {
            entry.attempts = 0;
            entry.first_seen = now;
        }
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_seen = now;
        counter!("abuse_events_total", "state" => "probe").increment(1);

        if entry.attempts >= self.threshold {
            counter!("abuse_events_total", "state" => "escalated").increment(1);
            warn!(
                identifier = key,
                attempts = entry.attempts,
                "abuse threshold exceeded"
            );
            AbuseSignal::Escalated {
                attempts: entry.attempts,
            }
        } else {
            AbuseSignal::None
        }
    }

    /// Whether `key` has already reached the threshold inside the window.
    pub fn is_escalated(&self, key: impl AsRef<str>) -> bool {
        self.is_escalated_at(key, Utc::now())
    }

    pub fn is_escalated_at(&self, key: impl AsRef<str>, now: DateTime<Utc>) -> bool {
        let window = self.window_span();
        let guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(key.as_ref()).is_some_and(|record| {
            now - record.first_seen <= window && record.attempts >= self.threshold
        })
    }

    fn window_span(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::days(365))
    }

    pub fn reset(&self, key: impl AsRef<str>) {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.remove(key.as_ref());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbuseSignal {
    None,
    Escalated { attempts: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbuseRecord {
    pub attempts: u16,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
