use std::sync::Arc;

use poem::{
    error::I18NError,
    i18n::{I18NResources, I18NResourcesBuilder},
};
use serde::Serialize;
use unic_langid::langid;

use crate::{
    cache::{CacheStorage, MemoryStorage},
    LocaleTag, SupportedLocales,
};

const BUILTIN_RESOURCES: &[(&str, &str)] = &[
    ("en", include_str!("../resources/locales/en/display-names.ftl")),
    ("es", include_str!("../resources/locales/es/display-names.ftl")),
    ("fr", include_str!("../resources/locales/fr/display-names.ftl")),
    ("de", include_str!("../resources/locales/de/display-names.ftl")),
    ("pt", include_str!("../resources/locales/pt/display-names.ftl")),
    ("it", include_str!("../resources/locales/it/display-names.ftl")),
];

/// Provides human readable names of locales.
pub trait DisplayNames: Send + Sync {
    /// Returns the name of `subject` written in the language of `viewer`.
    fn display_name(&self, subject: &LocaleTag, viewer: &LocaleTag) -> String;
}

impl<F> DisplayNames for F
where
    F: Fn(&LocaleTag, &LocaleTag) -> String + Send + Sync,
{
    fn display_name(&self, subject: &LocaleTag, viewer: &LocaleTag) -> String {
        (self)(subject, viewer)
    }
}

/// Display names backed by Fluent resources.
///
/// The name of the locale `xx_YY` is the message `locale-xx_YY`. A name that
/// cannot be found is replaced by the tag itself.
///
/// # Built-in names
///
/// The built-in resources are a small table, not a CLDR database. They are
/// written for English, Spanish, French, German, Portuguese and Italian
/// viewers (any other viewer sees the English names) and name these locales:
///
/// `en`, `en_US`, `en_GB`, `es`, `es_ES`, `es_MX`, `fr`, `fr_FR`, `fr_CA`,
/// `de`, `de_DE`, `pt`, `pt_BR`, `pt_PT`, `it`, `it_IT`, `ja`, `zh_CN`.
///
/// Applications supporting other locales (e.g. `nl` or `ja_JP`) show the raw
/// tag in their language picker unless they add the names with
/// [`FluentDisplayNames::builder`].
#[derive(Clone)]
pub struct FluentDisplayNames {
    resources: I18NResources,
}

impl FluentDisplayNames {
    /// Create display names from the built-in resources only.
    pub fn builtin() -> Self {
        Self::builder()
            .build()
            .expect("built-in display name resources are valid")
    }

    /// Create a builder to add resources for more locales.
    ///
    /// # Example
    ///
    /// ```
    /// use poem_locale::{DisplayNames, FluentDisplayNames, LocaleTag};
    ///
    /// let names = FluentDisplayNames::builder()
    ///     .add_ftl("nl", "locale-nl = Nederlands\nlocale-en = Engels")
    ///     .build()
    ///     .unwrap();
    ///
    /// let nl = LocaleTag::normalize("nl").unwrap();
    /// let en = LocaleTag::normalize("en").unwrap();
    /// assert_eq!(names.display_name(&nl, &nl), "Nederlands");
    /// assert_eq!(names.display_name(&en, &nl), "Engels");
    /// ```
    pub fn builder() -> FluentDisplayNamesBuilder {
        FluentDisplayNamesBuilder {
            builtin: true,
            resources: Vec::new(),
        }
    }
}

impl Default for FluentDisplayNames {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DisplayNames for FluentDisplayNames {
    fn display_name(&self, subject: &LocaleTag, viewer: &LocaleTag) -> String {
        let bundle = self.resources.negotiate_languages(&[viewer.to_langid()]);
        match bundle.text(format!("locale-{subject}")) {
            Ok(name) => name,
            Err(err) => {
                tracing::debug!(subject = %subject, viewer = %viewer, error = %err, "display name not found");
                subject.to_string()
            }
        }
    }
}

/// Builder for [`FluentDisplayNames`].
pub struct FluentDisplayNamesBuilder {
    builtin: bool,
    resources: Vec<(LocaleTag, String)>,
}

impl FluentDisplayNamesBuilder {
    /// Add FTL resources written in the language of `tag`.
    ///
    /// Tags that are not valid locale tags are ignored.
    #[must_use]
    pub fn add_ftl(mut self, tag: impl AsRef<str>, ftl: impl Into<String>) -> Self {
        match LocaleTag::normalize(tag.as_ref()) {
            Some(tag) => self.resources.push((tag, ftl.into())),
            None => tracing::warn!(tag = tag.as_ref(), "ignore display names for invalid tag"),
        }
        self
    }

    /// Skip the built-in resources.
    ///
    /// Use this when the added resources redefine built-in messages.
    #[must_use]
    pub fn without_builtin(self) -> Self {
        Self {
            builtin: false,
            ..self
        }
    }

    /// Consumes this builder and returns a [`FluentDisplayNames`] object.
    pub fn build(self) -> Result<FluentDisplayNames, I18NError> {
        let mut builder: I18NResourcesBuilder =
            I18NResources::builder().default_language(langid!("en"));

        if self.builtin {
            for (language, ftl) in BUILTIN_RESOURCES {
                builder = builder.add_ftl(*language, *ftl);
            }
        }
        for (tag, ftl) in self.resources {
            builder = builder.add_ftl(tag.to_langid().to_string(), ftl);
        }

        Ok(FluentDisplayNames {
            resources: builder.build()?,
        })
    }
}

/// Names of another supported locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleDisplay {
    /// The locale tag.
    pub tag: LocaleTag,
    /// Its name written in the current locale.
    pub foreign: String,
    /// Its name written in itself.
    pub native: String,
}

/// Display strings of the supported locales, as seen from one locale.
///
/// Used by templates to render a language picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleStrings {
    /// `true` if more than one locale is supported.
    pub enabled: bool,
    /// The current locale.
    pub tag: LocaleTag,
    /// Name of the current locale written in itself.
    pub self_name: Option<String>,
    /// Every other supported locale, in configuration order.
    pub others: Vec<LocaleDisplay>,
}

impl LocaleStrings {
    /// Builds the display strings of `supported` as seen from `tag`.
    pub fn build(tag: &LocaleTag, supported: &SupportedLocales, names: &dyn DisplayNames) -> Self {
        let enabled = supported.len() > 1;
        let mut self_name = None;
        let mut others = Vec::new();

        if enabled {
            for lt in supported {
                if lt == tag {
                    self_name = Some(names.display_name(lt, lt));
                } else {
                    others.push(LocaleDisplay {
                        tag: lt.clone(),
                        foreign: names.display_name(lt, tag),
                        native: names.display_name(lt, lt),
                    });
                }
            }
        }

        Self {
            enabled,
            tag: tag.clone(),
            self_name,
            others,
        }
    }
}

/// A shared cache of [`LocaleStrings`] keyed by locale tag.
///
/// The supported locales are assumed not to change during the lifetime of
/// the cache. Deployments that reload their configuration should bump the
/// [`version`](LocaleStringsCache::version), which is part of every key.
#[derive(Clone)]
pub struct LocaleStringsCache {
    storage: Arc<dyn CacheStorage<Arc<LocaleStrings>>>,
    names: Arc<dyn DisplayNames>,
    version: u64,
}

impl Default for LocaleStringsCache {
    fn default() -> Self {
        Self::new(MemoryStorage::new(), FluentDisplayNames::builtin())
    }
}

impl LocaleStringsCache {
    /// Create a cache using the specified storage and display names.
    pub fn new(
        storage: impl CacheStorage<Arc<LocaleStrings>> + 'static,
        names: impl DisplayNames + 'static,
    ) -> Self {
        Self {
            storage: Arc::new(storage),
            names: Arc::new(names),
            version: 1,
        }
    }

    /// Sets the configuration version. Default is `1`.
    #[must_use]
    pub fn version(self, version: u64) -> Self {
        Self { version, ..self }
    }

    /// Returns the display strings for `tag`, building and storing them on a
    /// cache miss.
    ///
    /// If another request stored the same entry first, that entry is
    /// returned.
    ///
    /// # Example
    ///
    /// ```
    /// use poem_locale::{LocaleStringsCache, LocaleTag, SupportedLocales};
    ///
    /// let cache = LocaleStringsCache::default();
    /// let supported = SupportedLocales::parse(["en", "es_ES", "fr_CA"]).unwrap();
    /// let strings = cache.get(&LocaleTag::normalize("es_ES").unwrap(), &supported);
    ///
    /// assert_eq!(strings.self_name.as_deref(), Some("español (España)"));
    /// assert_eq!(strings.others[0].foreign, "inglés");
    /// assert_eq!(strings.others[1].native, "français (Canada)");
    /// ```
    pub fn get(&self, tag: &LocaleTag, supported: &SupportedLocales) -> Arc<LocaleStrings> {
        let key = format!("{}:{}", self.version, tag);
        if let Some(strings) = self.storage.get(&key) {
            return strings;
        }

        tracing::debug!(tag = %tag, "build locale strings");
        let strings = Arc::new(LocaleStrings::build(tag, supported, &*self.names));
        self.storage.insert_if_absent(&key, strings)
    }
}
