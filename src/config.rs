//! Settings for the batch binary.
//!
//! Values come from an optional TOML file and are then overlaid by CLI
//! flags and `OPSRAMP_*` environment variables. Every field has a default
//! except the four connection values, which [`Settings::credentials`]
//! insists on. Nothing secret is compiled in.
//!
//! ```toml
//! subdomain = "acme"
//! tenant_id = "msp_123"
//! client_key = "..."
//! client_secret = "..."
//!
//! [retry]
//! max_attempts = 5
//! backoff_secs = 5
//!
//! [input]
//! server_column = "Server Name"
//! client_column = "Client Name"
//!
//! [output]
//! format = "yaml"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::Credentials;
use crate::batch::output::OutputFormat;
use crate::batch::sheet::InputColumns;
use crate::client::ClientOptions;
use crate::error::{OpsRampError, Result};
use crate::retry::RetryPolicy;

/// Everything the binary needs besides the subcommand arguments.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `{subdomain}.api.opsramp.com`.
    pub subdomain: Option<String>,
    /// Partner or client tenant id used in API paths.
    pub tenant_id: Option<String>,
    /// OAuth client key.
    pub client_key: Option<String>,
    /// OAuth client secret.
    pub client_secret: Option<String>,
    /// Throttle retry budget and backoff.
    pub retry: RetrySettings,
    /// HTTP timeouts.
    pub http: HttpSettings,
    /// Input sheet layout.
    pub input: InputColumns,
    /// Report format and location.
    pub output: OutputSettings,
}

// The secret must never reach logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("subdomain", &self.subdomain)
            .field("tenant_id", &self.tenant_id)
            .field("client_key", &self.client_key)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("retry", &self.retry)
            .field("http", &self.http)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Requests per logical call, including the first.
    pub max_attempts: u32,
    /// Wait before the first throttled retry.
    pub backoff_secs: u64,
    /// Growth factor per retry; `1.0` keeps the wait fixed.
    pub backoff_multiplier: f64,
    /// Cap for any single wait.
    pub max_backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_secs: 5,
            backoff_multiplier: 1.0,
            max_backoff_secs: 60,
        }
    }
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    /// TCP + TLS handshake limit.
    pub connect_timeout_secs: u64,
    /// Whole-request limit.
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Report format.
    pub format: OutputFormat,
    /// Report path; each driver picks a default name when unset.
    pub path: Option<PathBuf>,
}

/// Values supplied on the command line or through the environment. `Some`
/// wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--subdomain` / `OPSRAMP_SUBDOMAIN`.
    pub subdomain: Option<String>,
    /// `--tenant-id` / `OPSRAMP_TENANT_ID`.
    pub tenant_id: Option<String>,
    /// `--client-key` / `OPSRAMP_CLIENT_KEY`.
    pub client_key: Option<String>,
    /// `--client-secret` / `OPSRAMP_CLIENT_SECRET`.
    pub client_secret: Option<String>,
    /// `--format`.
    pub format: Option<OutputFormat>,
    /// `--output`.
    pub output: Option<PathBuf>,
}

/// Connection values validated by [`Settings::credentials`].
#[derive(Debug, Clone)]
pub struct Connection {
    /// API subdomain.
    pub subdomain: String,
    /// Tenant id for API paths.
    pub tenant_id: String,
    /// OAuth key and secret.
    pub credentials: Credentials,
}

impl Settings {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// `OpsRampError::Config` on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OpsRampError::Config(e.to_string()))
    }

    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// `OpsRampError::Config` when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| OpsRampError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
            .map_err(|e| OpsRampError::Config(format!("{}: {e}", path.display())))
    }

    /// Loads `path` if given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies CLI and environment values on top of the file.
    pub fn overlay(mut self, overrides: Overrides) -> Self {
        fn pick(current: &mut Option<String>, new: Option<String>) {
            if let Some(value) = new.filter(|v| !v.trim().is_empty()) {
                *current = Some(value);
            }
        }
        pick(&mut self.subdomain, overrides.subdomain);
        pick(&mut self.tenant_id, overrides.tenant_id);
        pick(&mut self.client_key, overrides.client_key);
        pick(&mut self.client_secret, overrides.client_secret);
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
        if overrides.output.is_some() {
            self.output.path = overrides.output;
        }
        self
    }

    /// The four connection values, all required.
    ///
    /// # Errors
    ///
    /// `OpsRampError::Config` listing every missing value.
    pub fn credentials(&self) -> Result<Connection> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let subdomain = present(&self.subdomain);
        let tenant_id = present(&self.tenant_id);
        let client_key = present(&self.client_key);
        let client_secret = present(&self.client_secret);

        match (subdomain, tenant_id, client_key, client_secret) {
            (Some(subdomain), Some(tenant_id), Some(key), Some(secret)) => Ok(Connection {
                subdomain,
                tenant_id,
                credentials: Credentials::new(key, secret),
            }),
            (subdomain, tenant_id, key, secret) => {
                let missing: Vec<&str> = [
                    ("subdomain", subdomain.is_none()),
                    ("tenant_id", tenant_id.is_none()),
                    ("client_key", key.is_none()),
                    ("client_secret", secret.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(OpsRampError::Config(format!(
                    "missing connection settings: {} (set them in the config file, \
                     with flags, or via OPSRAMP_* environment variables)",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Retry policy described by `[retry]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_secs(self.retry.backoff_secs);
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: base,
            max_delay: Duration::from_secs(self.retry.max_backoff_secs).max(base),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }

    /// Transport options described by `[http]` and `[retry]`.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.http.request_timeout_secs),
            retry: self.retry_policy(),
        }
    }

    /// Input sheet layout.
    pub fn input_columns(&self) -> &InputColumns {
        &self.input
    }

    /// Report path: the configured one, or `{stem}.{extension}`.
    pub fn output_path(&self, default_stem: &str) -> PathBuf {
        self.output.path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("{default_stem}.{}", self.output.format.extension()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_file() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.retry, RetrySettings::default());
        assert_eq!(settings.http.request_timeout_secs, 120);
        assert_eq!(settings.input.server_column, "Server Name");
        assert_eq!(settings.output.format, OutputFormat::Yaml);
        assert_eq!(
            settings.output_path("Unmanage_output"),
            PathBuf::from("Unmanage_output.yaml")
        );
    }

    #[test]
    fn sections_parse() {
        let settings = Settings::from_toml_str(
            r#"
            subdomain = "acme"
            tenant_id = "msp_1"

            [retry]
            max_attempts = 3
            backoff_secs = 2
            backoff_multiplier = 2.0
            max_backoff_secs = 10

            [input]
            server_column = "Host"
            sheet = "Decom"

            [output]
            format = "csv"
            path = "report.csv"
            "#,
        )
        .unwrap();
        assert_eq!(settings.subdomain.as_deref(), Some("acme"));
        assert_eq!(settings.input.server_column, "Host");
        assert_eq!(settings.input.client_column, "Client Name");
        assert_eq!(settings.input.sheet.as_deref(), Some("Decom"));
        assert_eq!(settings.output.format, OutputFormat::Csv);

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = Settings::from_toml_str("subdomian = \"typo\"").unwrap_err();
        assert!(matches!(err, OpsRampError::Config(_)));
    }

    #[test]
    fn overlay_prefers_non_blank_overrides() {
        let settings = Settings::from_toml_str("subdomain = \"file\"\ntenant_id = \"t-file\"")
            .unwrap()
            .overlay(Overrides {
                subdomain: Some("cli".into()),
                tenant_id: Some("  ".into()),
                format: Some(OutputFormat::Json),
                ..Overrides::default()
            });
        assert_eq!(settings.subdomain.as_deref(), Some("cli"));
        assert_eq!(settings.tenant_id.as_deref(), Some("t-file"));
        assert_eq!(settings.output.format, OutputFormat::Json);
    }

    #[test]
    fn credentials_list_every_missing_value() {
        let settings = Settings {
            subdomain: Some("acme".into()),
            client_key: Some(" ".into()),
            ..Settings::default()
        };
        let err = settings.credentials().unwrap_err().to_string();
        assert!(err.contains("tenant_id"));
        assert!(err.contains("client_key"));
        assert!(err.contains("client_secret"));
        assert!(!err.contains("subdomain,"));
    }

    #[test]
    fn credentials_succeed_when_complete() {
        let settings = Settings {
            subdomain: Some("acme".into()),
            tenant_id: Some("msp_1".into()),
            client_key: Some("key".into()),
            client_secret: Some("secret".into()),
            ..Settings::default()
        };
        let conn = settings.credentials().unwrap();
        assert_eq!(conn.subdomain, "acme");
        assert_eq!(conn.credentials.client_key, "key");
    }

    #[test]
    fn debug_redacts_secret() {
        let settings = Settings {
            client_secret: Some("hunter2".into()),
            ..Settings::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
