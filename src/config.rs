use crate::domain::dispatch::RetryPolicy;
use crate::domain::participant::LanguageCode;
use crate::error::{Result, SantaError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Runtime settings, loadable from a JSON file. Missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Smallest group a draw is allowed for. The engine itself only needs 2.
    pub min_participants: usize,
    /// Upper bound on concurrent sends.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
    /// Language used when none is given and for unknown codes.
    pub default_language: LanguageCode,
    pub smtp: SmtpSettings,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (usually port 587).
    #[default]
    StartTls,
    /// TLS from the first byte (usually port 465).
    Tls,
    /// No encryption. Only for local relays and test servers.
    None,
}

/// Mail server used by the SMTP transport.
///
/// Every field can be overridden from the environment: `SMTP_HOST`,
/// `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`, `SMTP_FROM`. The password is
/// never written back out.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Sender address. Falls back to `username`.
    pub from: Option<String>,
    pub security: SmtpSecurity,
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: None,
            security: SmtpSecurity::StartTls,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .field("security", &self.security)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SmtpSettings {
    /// Overrides fields with the `SMTP_*` variables `lookup` returns.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(host) = var("SMTP_HOST") {
            self.host = Some(host);
        }
        if let Some(port) = var("SMTP_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| SantaError::Config(format!("invalid SMTP_PORT `{port}`: {e}")))?;
        }
        if let Some(user) = var("SMTP_USER") {
            self.username = Some(user);
        }
        if let Some(password) = var("SMTP_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(from) = var("SMTP_FROM") {
            self.from = Some(from);
        }
        Ok(())
    }

    /// Address messages are sent from.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.username.as_deref())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_participants: 4,
            max_in_flight: 8,
            retry: RetryPolicy::default(),
            default_language: LanguageCode::from("en"),
            smtp: SmtpSettings::default(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or starts from defaults when no path is
    /// given. `SMTP_*` environment variables override the mail server.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings: Settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    SantaError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    SantaError::Config(format!("cannot parse {}: {e}", path.display()))
                })?
            }
            None => Self::default(),
        };
        settings.smtp.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_participants < 2 {
            return Err(SantaError::Config(
                "min_participants must be at least 2".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(SantaError::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SantaError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(SantaError::Config(
                "retry.multiplier must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.smtp.timeout_secs == 0 {
            return Err(SantaError::Config(
                "smtp.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.default_language.as_str().is_empty() {
            return Err(SantaError::Config(
                "default_language must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
