//! Error types.

use std::path::PathBuf;

/// A value could not be normalized into a
/// [`LocaleTag`](crate::LocaleTag).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid locale tag `{0}`, expect `ll` or `ll_RR`")]
pub struct InvalidLocaleTag(pub String);

/// A possible error value when loading the application configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("read `{path}`: {source}")]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid TOML or has the wrong shape.
    #[error("parse: {0}")]
    Toml(#[from] toml::de::Error),

    /// An entry of `locales` is not a valid locale tag.
    #[error("locales: {0}")]
    InvalidLocale(#[from] InvalidLocaleTag),
}

/// A possible error value when queueing an outbound mail.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The queue no longer accepts mails.
    #[error("mail queue is closed")]
    QueueClosed,

    /// The mail has no recipient address.
    #[error("mail has no recipient")]
    MissingRecipient,

    /// Any other failure reported by the queue backend.
    #[error("enqueue: {0}")]
    Other(String),
}
