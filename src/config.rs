//! Process configuration, resolved once from `MEETSLOT_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

use crate::limits::MINUTE_MS;
use crate::mail::SmtpConfig;
use crate::model::{AllowedHours, ApprovalDuration, Schedule};
use crate::tls::TlsFiles;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_path: PathBuf,
    pub calendar_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub admin_password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub schedule: Schedule,
    /// Calendar owner; receives the CC on approval mail unless `cc_email` is set.
    pub host_email: Option<String>,
    pub cc_email: Option<String>,
    /// Base for links mailed to visitors, without a trailing slash.
    pub public_url: String,
    pub smtp: Option<SmtpConfig>,
    pub google: Option<GoogleConfig>,
    pub http_timeout: Duration,
    pub tls: Option<TlsFiles>,
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }
}

/// `10-18` means slots may start from 10:00 up to, not including, 18:00.
pub fn parse_allowed_hours(value: &str) -> Option<AllowedHours> {
    let (start, end) = value.split_once('-')?;
    let start: u32 = start.trim().parse().ok()?;
    let end: u32 = end.trim().parse().ok()?;
    (start < end && end <= 24).then(|| AllowedHours::new(start, end))
}

/// `span` or `fixed:<minutes>`.
pub fn parse_approval_duration(value: &str) -> Option<ApprovalDuration> {
    match value.trim() {
        "span" => Some(ApprovalDuration::SpanToLast),
        other => {
            let minutes: i64 = other.strip_prefix("fixed:")?.trim().parse().ok()?;
            (minutes > 0).then(|| ApprovalDuration::Fixed(minutes * MINUTE_MS))
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };

        let data_dir = PathBuf::from(env.get("MEETSLOT_DATA_DIR").unwrap_or_else(|| "./data".into()));
        let metrics_port = match env.get("MEETSLOT_METRICS_PORT") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                key: "MEETSLOT_METRICS_PORT",
                value,
            })?),
            None => None,
        };

        let tz: Tz = env.parsed("MEETSLOT_TIMEZONE", chrono_tz::Asia::Seoul)?;
        let slot_minutes: i64 = env.parsed("MEETSLOT_SLOT_MINUTES", 30)?;
        if !(1..=24 * 60).contains(&slot_minutes) {
            return Err(ConfigError::Invalid {
                key: "MEETSLOT_SLOT_MINUTES",
                value: slot_minutes.to_string(),
            });
        }
        let allowed_hours = match env.get("MEETSLOT_ALLOWED_HOURS") {
            Some(value) => parse_allowed_hours(&value).ok_or(ConfigError::Invalid {
                key: "MEETSLOT_ALLOWED_HOURS",
                value,
            })?,
            None => AllowedHours::new(10, 18),
        };
        let approval_duration = match env.get("MEETSLOT_APPROVAL_DURATION") {
            Some(value) => parse_approval_duration(&value).ok_or(ConfigError::Invalid {
                key: "MEETSLOT_APPROVAL_DURATION",
                value,
            })?,
            None => ApprovalDuration::SpanToLast,
        };

        let smtp = match env.get("MEETSLOT_SMTP_HOST") {
            Some(host) => {
                let username = env.required("MEETSLOT_SMTP_USERNAME")?;
                Some(SmtpConfig {
                    host,
                    port: env.parsed("MEETSLOT_SMTP_PORT", 465)?,
                    password: env.required("MEETSLOT_SMTP_PASSWORD")?,
                    from_email: env.get("MEETSLOT_SMTP_FROM").unwrap_or_else(|| username.clone()),
                    username,
                })
            }
            None => None,
        };

        let google = match env.get("MEETSLOT_GOOGLE_CLIENT_ID") {
            Some(client_id) => Some(GoogleConfig {
                client_id,
                client_secret: env.required("MEETSLOT_GOOGLE_CLIENT_SECRET")?,
                token_path: env
                    .get("MEETSLOT_GOOGLE_TOKEN_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("token.json")),
                calendar_id: env
                    .get("MEETSLOT_GOOGLE_CALENDAR_ID")
                    .unwrap_or_else(|| "primary".into()),
            }),
            None => None,
        };

        let tls = match (env.get("MEETSLOT_TLS_CERT"), env.get("MEETSLOT_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("MEETSLOT_TLS_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("MEETSLOT_TLS_CERT")),
        };

        Ok(Self {
            bind: env.get("MEETSLOT_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: env.parsed("MEETSLOT_PORT", 5433)?,
            admin_password: env.required("MEETSLOT_ADMIN_PASSWORD")?,
            max_connections: env.parsed("MEETSLOT_MAX_CONNECTIONS", 256)?,
            compact_threshold: env.parsed("MEETSLOT_COMPACT_THRESHOLD", 1000)?,
            metrics_port,
            schedule: Schedule {
                tz,
                slot_length: slot_minutes * MINUTE_MS,
                allowed_hours,
                approval_duration,
            },
            host_email: env.get("MEETSLOT_HOST_EMAIL"),
            cc_email: env.get("MEETSLOT_CC_EMAIL"),
            public_url: env
                .get("MEETSLOT_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            smtp,
            google,
            http_timeout: Duration::from_secs(env.parsed("MEETSLOT_HTTP_TIMEOUT_SECS", 30)?),
            tls,
            data_dir,
        })
    }

    /// Recipient copied on approval mail.
    pub fn approval_cc(&self) -> Option<&str> {
        self.cc_email.as_deref().or(self.host_email.as_deref())
    }
}
