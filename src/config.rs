use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{error::ConfigError, SupportedLocales};

const DEFAULT_GEO_HEADER: &str = "X-AppEngine-Country";
const DEFAULT_GEO_DEADLINE_MS: u64 = 800;

/// A developer receiving error reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Developer {
    /// Display name.
    pub name: String,
    /// Mail address.
    pub email: String,
}

/// Where the country of a request comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Header set by the edge proxy with the ISO 3166-1 alpha-2 country code.
    pub header: String,
    /// Base URL of a lookup service answering `GET {lookup_url}/{ip}` with a
    /// country code. Takes precedence over `header` when set.
    pub lookup_url: Option<String>,
    /// Deadline of a lookup, in milliseconds.
    pub deadline_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_GEO_HEADER.to_string(),
            lookup_url: None,
            deadline_ms: DEFAULT_GEO_DEADLINE_MS,
        }
    }
}

impl GeoConfig {
    /// Returns the lookup deadline.
    #[inline]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Application configuration.
///
/// # Example
///
/// ```
/// use poem_locale::AppConfig;
///
/// let config = AppConfig::from_toml_str(
///     r#"
///     app_name = "Boilerplate"
///     environment = "testing"
///     locales = ["en", "es_ES", "fr_CA"]
///     contact_sender = "noreply@example.com"
///
///     [[developers]]
///     name = "Ada"
///     email = "ada@example.com"
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.supported_locales().len(), 3);
/// assert!(config.send_mail_developer);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name, used in error reports.
    #[serde(default)]
    pub app_name: String,
    /// Deployment environment, e.g. `production`.
    #[serde(default)]
    pub environment: String,
    /// Supported locales, the first one is the default. Empty disables
    /// localization.
    #[serde(default, deserialize_with = "deserialize_locales")]
    pub(crate) locales: SupportedLocales,
    /// Send error reports to the developers.
    #[serde(default = "default_true")]
    pub send_mail_developer: bool,
    /// Recipients of error reports.
    #[serde(default)]
    pub developers: Vec<Developer>,
    /// Sender address of outbound mails.
    #[serde(default)]
    pub contact_sender: String,
    /// Geo location settings.
    #[serde(default)]
    pub geo: GeoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            environment: String::new(),
            locales: SupportedLocales::default(),
            send_mail_developer: true,
            developers: Vec::new(),
            contact_sender: String::new(),
            geo: GeoConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(value: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(value)?)
    }

    /// Reads and parses a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            locales = config.locales.len(),
            "load configuration"
        );
        Ok(config)
    }

    /// Sets the supported locales, failing on the first malformed tag.
    pub fn with_locales<I, S>(self, locales: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            locales: SupportedLocales::parse(locales)?,
            ..self
        })
    }

    /// Returns the supported locales.
    #[inline]
    pub fn supported_locales(&self) -> &SupportedLocales {
        &self.locales
    }
}

fn default_true() -> bool {
    true
}

fn deserialize_locales<'de, D>(deserializer: D) -> Result<SupportedLocales, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let locales = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    SupportedLocales::parse(locales).map_err(serde::de::Error::custom)
}
