//! Locale negotiation for Poem web applications.
//!
//! This crate decides which locale a request is served in, keeps the display
//! strings of a language picker in a shared cache, and reports failed
//! requests to the developers.
//!
//! # Table of contents
//!
//! - [Resolving the locale](#resolving-the-locale)
//! - [Pure functions](#pure-functions)
//! - [Configuration](#configuration)
//! - [Crate features](#crate-features)
//!
//! # Resolving the locale
//!
//! The [`LocaleResolver`] middleware picks the first supported locale out of
//! these sources:
//!
//! 1. a [`LocaleOverride`] inserted by an earlier middleware,
//! 2. the `hl` query parameter,
//! 3. the `hl` cookie,
//! 4. the `Accept-Language` header,
//! 5. the country the request comes from (see [`geo`]),
//! 6. the first supported locale.
//!
//! If no locale is supported at all, localization is disabled and every
//! request resolves to `en`.
//!
//! ```
//! use poem::{handler, test::TestClient, EndpointExt, Route};
//! use poem_locale::{LocaleContext, LocaleResolver, SupportedLocales};
//!
//! #[handler]
//! fn index(locale: &LocaleContext) -> String {
//!     match &locale.strings.self_name {
//!         Some(name) => format!("{} ({name})", locale.tag),
//!         None => locale.tag.to_string(),
//!     }
//! }
//!
//! let supported = SupportedLocales::parse(["en", "es_ES"]).unwrap();
//! let app = Route::new()
//!     .at("/", index)
//!     .with(LocaleResolver::new(supported));
//! let cli = TestClient::new(app);
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let resp = cli.get("/?hl=es_ES").send().await;
//! resp.assert_status_is_ok();
//! resp.assert_text("es_ES (español (España))").await;
//! # });
//! ```
//!
//! # Pure functions
//!
//! The middleware is a thin adapter over [`resolve`], which only looks at the
//! values collected in [`LocaleSources`]:
//!
//! ```
//! use poem_locale::{resolve, LocaleSources, SupportedLocales};
//!
//! let supported = SupportedLocales::parse(["en", "es_ES", "fr_CA"]).unwrap();
//! let sources = LocaleSources::new().accept_language("fr-CA,es;q=0.8");
//! assert_eq!(resolve(&sources, &supported), "fr_CA");
//! ```
//!
//! # Configuration
//!
//! [`AppConfig`] is read from TOML and feeds both
//! [`LocaleResolver::from_config`] and [`ErrorNotifier`].
//!
//! # Crate features
//!
//! |Feature           |Description                                         |
//! |------------------|----------------------------------------------------|
//! |geo-lookup        | Country lookup with an HTTP service (default)      |

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod geo;

mod accept_language;
mod config;
mod middleware;
mod negotiate;
mod notifier;
mod resolver;
mod strings;
mod tag;

pub use accept_language::{AcceptLanguage, QualityWeight};
pub use config::{AppConfig, Developer, GeoConfig};
pub use middleware::{
    LocaleContext, LocaleOverride, LocaleResolver, LocaleResolverEndpoint, COOKIE_MAX_AGE,
    LOCALE_PARAM,
};
pub use negotiate::negotiate;
pub use notifier::{
    ErrorNotifier, ErrorNotifierEndpoint, ErrorReport, MailQueue, MemoryMailQueue, OutboundMail,
};
pub use resolver::{resolve, resolve_with_source, LocaleSource, LocaleSources};
pub use strings::{
    DisplayNames, FluentDisplayNames, FluentDisplayNamesBuilder, LocaleDisplay, LocaleStrings,
    LocaleStringsCache,
};
pub use tag::{LocaleTag, SupportedLocales, FALLBACK_TAG};
