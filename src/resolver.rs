use crate::{negotiate, AcceptLanguage, LocaleTag, SupportedLocales};

/// The source that decided a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleSource {
    /// Localization is disabled, the fallback tag was used.
    Disabled,
    /// The tag explicitly requested by the caller.
    Override,
    /// The `hl` query parameter.
    Query,
    /// The `hl` cookie.
    Cookie,
    /// The `Accept-Language` header.
    AcceptLanguage,
    /// The country the request originates from.
    Country,
    /// The first supported locale.
    Default,
}

/// Plain-value inputs of a locale resolution.
///
/// Every field is optional; absent sources are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocaleSources<'a> {
    /// A tag explicitly requested by the caller.
    pub override_tag: Option<&'a str>,
    /// Value of the `hl` query parameter.
    pub query: Option<&'a str>,
    /// Value of the `hl` cookie.
    pub cookie: Option<&'a str>,
    /// Value of the `Accept-Language` header.
    pub accept_language: Option<&'a str>,
    /// ISO 3166-1 alpha-2 code of the request's country.
    pub country: Option<&'a str>,
}

impl<'a> LocaleSources<'a> {
    /// Create an empty set of sources.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the override tag.
    #[must_use]
    pub fn override_tag(self, value: &'a str) -> Self {
        Self {
            override_tag: Some(value),
            ..self
        }
    }

    /// Sets the `hl` query parameter value.
    #[must_use]
    pub fn query(self, value: &'a str) -> Self {
        Self {
            query: Some(value),
            ..self
        }
    }

    /// Sets the `hl` cookie value.
    #[must_use]
    pub fn cookie(self, value: &'a str) -> Self {
        Self {
            cookie: Some(value),
            ..self
        }
    }

    /// Sets the `Accept-Language` header value.
    #[must_use]
    pub fn accept_language(self, value: &'a str) -> Self {
        Self {
            accept_language: Some(value),
            ..self
        }
    }

    /// Sets the country code.
    #[must_use]
    pub fn country(self, value: &'a str) -> Self {
        Self {
            country: Some(value),
            ..self
        }
    }
}

/// Resolves the locale of a request, see [`resolve_with_source`].
pub fn resolve(sources: &LocaleSources<'_>, supported: &SupportedLocales) -> LocaleTag {
    resolve_with_source(sources, supported).0
}

/// Resolves the locale of a request and reports which source decided it.
///
/// Sources are tried in this order, the first one yielding a supported tag
/// wins:
///
/// 1. the override tag,
/// 2. the `hl` query parameter,
/// 3. the `hl` cookie,
/// 4. the `Accept-Language` header, by descending quality,
/// 5. the country code,
/// 6. the first supported locale.
///
/// Steps 1 to 3 require an exact match. Steps 4 and 5 go through
/// [`negotiate`]. If `supported` is empty the result is always `en`.
///
/// # Example
///
/// ```
/// use poem_locale::{resolve, LocaleSources, SupportedLocales};
///
/// let supported = SupportedLocales::parse(["en", "es_ES", "fr_CA"]).unwrap();
/// let sources = LocaleSources::new()
///     .cookie("fr_CA")
///     .accept_language("es-ES,en;q=0.5");
/// assert_eq!(resolve(&sources, &supported), "fr_CA");
/// ```
pub fn resolve_with_source(
    sources: &LocaleSources<'_>,
    supported: &SupportedLocales,
) -> (LocaleTag, LocaleSource) {
    let Some(default_tag) = supported.default_tag() else {
        return (LocaleTag::fallback(), LocaleSource::Disabled);
    };

    let exact = [
        (sources.override_tag, LocaleSource::Override),
        (sources.query, LocaleSource::Query),
        (sources.cookie, LocaleSource::Cookie),
    ];
    for (value, source) in exact {
        if let Some(tag) = value.and_then(|value| supported.find(value)) {
            return (tag.clone(), source);
        }
    }

    if let Some(tag) = sources
        .accept_language
        .and_then(AcceptLanguage::parse)
        .and_then(|accept| negotiate(accept.sorted(), supported))
    {
        return (tag, LocaleSource::AcceptLanguage);
    }

    if let Some(tag) = sources
        .country
        .and_then(|country| negotiate([country], supported))
    {
        return (tag, LocaleSource::Country);
    }

    (default_tag.clone(), LocaleSource::Default)
}

/// Returns `true` if no source before the country code decides the
/// resolution.
///
/// Callers use this to skip a potentially slow geo lookup.
pub(crate) fn needs_country(sources: &LocaleSources<'_>, supported: &SupportedLocales) -> bool {
    !supported.is_empty()
        && matches!(
            resolve_with_source(
                &LocaleSources {
                    country: None,
                    ..*sources
                },
                supported
            )
            .1,
            LocaleSource::Default
        )
}
