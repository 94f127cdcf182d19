use std::{sync::Arc, time::Duration};

use poem::{
    error::GetDataError,
    http::{header, uri::PathAndQuery, Uri},
    middleware::{CookieJarManager, CookieJarManagerEndpoint},
    web::cookie::Cookie,
    Endpoint, FromRequest, IntoResponse, Middleware, Request, RequestBody, Response, Result,
};

use crate::{
    config::AppConfig,
    geo::{ConfiguredGeoLocator, GeoLocator, NoGeoLocator},
    resolver::{needs_country, resolve_with_source, LocaleSource, LocaleSources},
    LocaleStrings, LocaleStringsCache, LocaleTag, SupportedLocales,
};

/// Name of the cookie and of the query parameter carrying the locale tag.
pub const LOCALE_PARAM: &str = "hl";

/// Lifetime of the locale cookie: 26 weeks.
pub const COOKIE_MAX_AGE: Duration = Duration::from_secs(26 * 7 * 24 * 60 * 60);

/// A locale explicitly requested for the current request.
///
/// Insert it as request data before the [`LocaleResolver`] middleware runs,
/// e.g. from the preferences of a signed-in user. It wins over every other
/// source if it is one of the supported locales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleOverride(pub String);

/// The locale resolved for the current request.
#[derive(Debug, Clone)]
pub struct LocaleContext {
    /// The resolved locale.
    pub tag: LocaleTag,
    /// Which source decided the locale.
    pub source: LocaleSource,
    /// Display strings of the supported locales, as seen from `tag`.
    pub strings: Arc<LocaleStrings>,
}

impl<'a> FromRequest<'a> for &'a LocaleContext {
    async fn from_request(req: &'a Request, _body: &mut RequestBody) -> Result<Self> {
        Ok(req
            .extensions()
            .get::<LocaleContext>()
            .ok_or(GetDataError("poem_locale::LocaleContext"))?)
    }
}

/// Middleware that resolves the locale of every request.
///
/// The locale is taken from the first of these sources that yields a
/// supported locale: a [`LocaleOverride`], the `hl` query parameter, the
/// `hl` cookie, the `Accept-Language` header, the country of the request,
/// and finally the first supported locale.
///
/// The `hl` query parameter is removed from the request URI once read. The
/// resolved tag is written to the `hl` cookie (26 weeks) on every response,
/// error responses included: errors of the inner endpoint are turned into
/// responses here, so middlewares that need to observe them, such as
/// [`ErrorNotifier`](crate::ErrorNotifier), must be applied before this one.
/// Handlers receive the result as a [`LocaleContext`].
///
/// # Example
///
/// ```
/// use poem::{handler, http::StatusCode, test::TestClient, EndpointExt, Route};
/// use poem_locale::{LocaleContext, LocaleResolver, SupportedLocales};
///
/// #[handler]
/// fn index(locale: &LocaleContext) -> String {
///     locale.tag.to_string()
/// }
///
/// let supported = SupportedLocales::parse(["en", "es_ES", "fr_CA"]).unwrap();
/// let app = Route::new()
///     .at("/", index)
///     .with(LocaleResolver::new(supported));
/// let cli = TestClient::new(app);
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let resp = cli
///     .get("/")
///     .header("Accept-Language", "fr-CA,fr;q=0.8")
///     .send()
///     .await;
/// resp.assert_status_is_ok();
/// resp.assert_text("fr_CA").await;
/// # });
/// ```
pub struct LocaleResolver<G = ConfiguredGeoLocator> {
    supported: SupportedLocales,
    cache: LocaleStringsCache,
    geo: Arc<G>,
}

impl<G> Clone for LocaleResolver<G> {
    fn clone(&self) -> Self {
        Self {
            supported: self.supported.clone(),
            cache: self.cache.clone(),
            geo: self.geo.clone(),
        }
    }
}

impl LocaleResolver<NoGeoLocator> {
    /// Create a resolver for the specified locales, without country
    /// detection.
    pub fn new(supported: SupportedLocales) -> Self {
        Self {
            supported,
            cache: LocaleStringsCache::default(),
            geo: Arc::new(NoGeoLocator),
        }
    }
}

impl LocaleResolver<ConfiguredGeoLocator> {
    /// Create a resolver from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            supported: config.supported_locales().clone(),
            cache: LocaleStringsCache::default(),
            geo: Arc::new(ConfiguredGeoLocator::from_config(&config.geo)),
        }
    }
}

impl<G: GeoLocator> LocaleResolver<G> {
    /// Sets the country detection.
    #[must_use]
    pub fn geo_locator<T: GeoLocator>(self, geo: T) -> LocaleResolver<T> {
        LocaleResolver {
            supported: self.supported,
            cache: self.cache,
            geo: Arc::new(geo),
        }
    }

    /// Sets the cache of display strings.
    ///
    /// Share one cache between every resolver of a process.
    #[must_use]
    pub fn strings_cache(self, cache: LocaleStringsCache) -> Self {
        Self { cache, ..self }
    }

    /// Returns the supported locales.
    #[inline]
    pub fn supported_locales(&self) -> &SupportedLocales {
        &self.supported
    }

    /// Resolves the locale of `req`.
    ///
    /// Removes the `hl` query parameter from the request URI and queues the
    /// `hl` cookie in the request's cookie jar, so it requires the
    /// `CookieJarManager` middleware. The [`LocaleResolver`] middleware
    /// installs it and calls this method for every request.
    pub async fn resolve_request(
        &self,
        req: &mut Request,
        override_tag: Option<&str>,
    ) -> LocaleContext {
        let query = take_query_param(req.uri_mut(), LOCALE_PARAM);
        let cookie = req
            .cookie()
            .get(LOCALE_PARAM)
            .map(|cookie| cookie.value_str().to_string());
        let accept_language = req
            .headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        let mut sources = LocaleSources {
            override_tag,
            query: query.as_deref(),
            cookie: cookie.as_deref(),
            accept_language: accept_language.as_deref(),
            country: None,
        };

        let country = if needs_country(&sources, &self.supported) {
            self.geo.country(req).await
        } else {
            None
        };
        sources.country = country.as_deref();

        let (tag, source) = resolve_with_source(&sources, &self.supported);
        tracing::debug!(tag = %tag, source = ?source, "resolve locale");

        let mut cookie = Cookie::new_with_str(LOCALE_PARAM, tag.as_str());
        cookie.set_path("/");
        cookie.set_max_age(COOKIE_MAX_AGE);
        req.cookie().add(cookie);

        let strings = self.cache.get(&tag, &self.supported);
        LocaleContext {
            tag,
            source,
            strings,
        }
    }
}

impl<E: Endpoint, G: GeoLocator + 'static> Middleware<E> for LocaleResolver<G> {
    type Output = CookieJarManagerEndpoint<LocaleResolverEndpoint<E, G>>;

    fn transform(&self, ep: E) -> Self::Output {
        CookieJarManager::new().transform(LocaleResolverEndpoint {
            inner: ep,
            resolver: self.clone(),
        })
    }
}

/// Endpoint for the [`LocaleResolver`] middleware.
pub struct LocaleResolverEndpoint<E, G> {
    inner: E,
    resolver: LocaleResolver<G>,
}

impl<E: Endpoint, G: GeoLocator> Endpoint for LocaleResolverEndpoint<E, G> {
    type Output = Response;

    async fn call(&self, mut req: Request) -> Result<Self::Output> {
        let override_tag = req.data::<LocaleOverride>().map(|value| value.0.clone());
        let locale = self
            .resolver
            .resolve_request(&mut req, override_tag.as_deref())
            .await;
        req.extensions_mut().insert(locale);

        // The cookie jar is only flushed into successful responses.
        Ok(match self.inner.call(req).await {
            Ok(resp) => resp.into_response(),
            Err(err) => err.into_response(),
        })
    }
}

/// Removes every `name` parameter from the query of `uri` and returns the
/// first value. Other parameters are kept verbatim.
fn take_query_param(uri: &mut Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    let mut value = None;
    let mut found = false;
    let mut rest = Vec::new();

    for pair in query.split('&') {
        let decoded = serde_urlencoded::from_str::<Vec<(String, String)>>(pair)
            .ok()
            .and_then(|pairs| pairs.into_iter().next());
        match decoded {
            Some((key, v)) if key == name => {
                found = true;
                value.get_or_insert(v);
            }
            _ => rest.push(pair),
        }
    }

    if !found {
        return None;
    }

    let path_and_query = if rest.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), rest.join("&"))
    };

    let mut parts = uri.clone().into_parts();
    match PathAndQuery::try_from(path_and_query)
        .ok()
        .and_then(|path_and_query| {
            parts.path_and_query = Some(path_and_query);
            Uri::from_parts(parts).ok()
        }) {
        Some(new_uri) => *uri = new_uri,
        None => tracing::debug!(uri = %uri, "failed to remove the locale query parameter"),
    }

    value
}
