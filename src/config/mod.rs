//! Configuration management for ops-iam-core

use crate::domain::DirectoryFlavor;
use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Deadline applied to every HTTP request
    pub request_timeout_secs: u64,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Policy store configuration
    pub policy: PolicyConfig,
    /// Directory (LDAP / Active Directory) configuration
    pub ldap: LdapConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free connection
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// What to do when the enforcer reload fails after a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadFailureMode {
    /// Surface `AppError::Reload` to the caller (relational change is kept)
    #[default]
    Fail,
    /// Log the failure and report success
    Warn,
}

impl std::str::FromStr for ReloadFailureMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail" | "error" => Ok(Self::Fail),
            "warn" | "ignore" => Ok(Self::Warn),
            other => bail!("unknown reload failure mode '{}', expected fail or warn", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub reload_failure: ReloadFailureMode,
    /// Size of the policy store's own pool. Group transactions keep their
    /// connection while the policy command runs, so the two never share one.
    pub pool_max_connections: u32,
    /// Period of the background enforcer reload; 0 disables it
    pub reload_interval_secs: u64,
}

impl PolicyConfig {
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reload_failure: ReloadFailureMode::default(),
            pool_max_connections: 2,
            reload_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LdapConfig {
    /// Directory URL, e.g. ldaps://dc01.corp.example:636
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    /// Search roots, tried in order
    pub search_dns: Vec<String>,
    /// Attribute holding the external username (uid, sAMAccountName, ...)
    pub user_attribute: String,
    /// Explicit flavor override; derived from `user_attribute` when unset
    pub flavor_override: Option<DirectoryFlavor>,
    /// Verify the server certificate on TLS connections
    pub tls_verify: bool,
    pub starttls: bool,
    pub connect_timeout_secs: u64,
    pub operation_timeout_secs: u64,
}

impl LdapConfig {
    /// Resolve the directory flavor once from configuration.
    pub fn flavor(&self) -> DirectoryFlavor {
        self.flavor_override
            .unwrap_or_else(|| DirectoryFlavor::from_user_attribute(&self.user_attribute))
    }

    /// Whether the transport encrypts the session (LDAPS or StartTLS).
    pub fn is_encrypted(&self) -> bool {
        self.starttls || self.url.to_lowercase().starts_with("ldaps://")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Split the `&`-separated search root setting.
    pub fn parse_search_dns(raw: &str) -> Vec<String> {
        raw.split('&')
            .map(str::trim)
            .filter(|dn| !dn.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".to_string(),
            bind_dn: String::new(),
            bind_password: String::new(),
            search_dns: vec![],
            user_attribute: "uid".to_string(),
            flavor_override: None,
            tls_verify: false,
            starttls: false,
            connect_timeout_secs: 5,
            operation_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "pretty"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            metrics_enabled: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            request_timeout_secs: env::var("HTTP_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid HTTP_REQUEST_TIMEOUT_SECS")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                acquire_timeout_secs: env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("Invalid DATABASE_ACQUIRE_TIMEOUT_SECS")?,
            },
            policy: Self::policy_from_env()?,
            ldap: Self::ldap_from_env()?,
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
                metrics_enabled: env::var("METRICS_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
            },
        })
    }

    fn policy_from_env() -> Result<PolicyConfig> {
        let defaults = PolicyConfig::default();
        let pool_max_connections: u32 = env::var("POLICY_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| defaults.pool_max_connections.to_string())
            .parse()
            .context("Invalid POLICY_DB_MAX_CONNECTIONS")?;
        if pool_max_connections == 0 {
            bail!("POLICY_DB_MAX_CONNECTIONS must be at least 1");
        }

        Ok(PolicyConfig {
            reload_failure: env::var("POLICY_RELOAD_FAILURE")
                .ok()
                .map(|s| s.parse::<ReloadFailureMode>())
                .transpose()?
                .unwrap_or_default(),
            pool_max_connections,
            reload_interval_secs: env::var("POLICY_RELOAD_INTERVAL_SECS")
                .unwrap_or_else(|_| defaults.reload_interval_secs.to_string())
                .parse()
                .context("Invalid POLICY_RELOAD_INTERVAL_SECS")?,
        })
    }

    fn ldap_from_env() -> Result<LdapConfig> {
        let defaults = LdapConfig::default();
        let flavor_override = match env::var("LDAP_DIRECTORY_FLAVOR") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.parse::<DirectoryFlavor>()
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("Invalid LDAP_DIRECTORY_FLAVOR")?,
            ),
            _ => None,
        };

        Ok(LdapConfig {
            url: env::var("LDAP_HOST").unwrap_or(defaults.url),
            bind_dn: env::var("LDAP_BIND_USER_DN").unwrap_or_default(),
            bind_password: env::var("LDAP_BIND_USER_PASSWORD").unwrap_or_default(),
            search_dns: env::var("LDAP_SEARCH_DN")
                .map(|s| LdapConfig::parse_search_dns(&s))
                .unwrap_or_default(),
            user_attribute: env::var("LDAP_USER_ATTRIBUTE").unwrap_or(defaults.user_attribute),
            flavor_override,
            tls_verify: env::var("LDAP_TLS_VERIFY")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.tls_verify),
            starttls: env::var("LDAP_STARTTLS")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.starttls),
            connect_timeout_secs: env::var("LDAP_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.connect_timeout_secs.to_string())
                .parse()
                .context("Invalid LDAP_CONNECT_TIMEOUT_SECS")?,
            operation_timeout_secs: env::var("LDAP_OPERATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.operation_timeout_secs.to_string())
                .parse()
                .context("Invalid LDAP_OPERATION_TIMEOUT_SECS")?,
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
