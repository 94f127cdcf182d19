//! Country detection for the last locale source.

use std::future::Future;
#[cfg(feature = "geo-lookup")]
use std::{net::IpAddr, time::Duration};

use poem::Request;

use crate::config::GeoConfig;

/// Name of the cookie caching a looked-up country code.
pub const TERRITORY_COOKIE: &str = "territory";

/// Provides the ISO 3166-1 alpha-2 country code a request originates from.
///
/// Implementations never fail: an unavailable source yields `None`.
pub trait GeoLocator: Send + Sync {
    /// Returns the country code of `req`, if known.
    fn country(&self, req: &Request) -> impl Future<Output = Option<String>> + Send;
}

/// A locator that never knows the country.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoLocator;

impl GeoLocator for NoGeoLocator {
    async fn country(&self, _req: &Request) -> Option<String> {
        None
    }
}

/// Reads the country code from a header set by an edge proxy.
#[derive(Debug, Clone)]
pub struct HeaderGeoLocator {
    header: String,
}

impl Default for HeaderGeoLocator {
    fn default() -> Self {
        Self::new(GeoConfig::default().header)
    }
}

impl HeaderGeoLocator {
    /// Create a locator reading the specified header.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl GeoLocator for HeaderGeoLocator {
    async fn country(&self, req: &Request) -> Option<String> {
        normalize_country(req.header(&self.header)?)
    }
}

fn normalize_country(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_ascii_uppercase())
}

/// Looks the country up with an HTTP service, keyed by the client IP.
///
/// The client IP is the one reported by [`RealIp`](poem::web::RealIp): the
/// `X-Real-IP`, `Forwarded` or `X-Forwarded-For` header set by a proxy, or
/// else the remote address of the connection. The service is called as `GET {base_url}/{ip}` and must answer `200` with
/// the bare country code. A successful answer is kept in the
/// [`territory`](TERRITORY_COOKIE) cookie for 26 weeks, so later requests of
/// the same client skip the lookup. Failures and timeouts are logged and
/// yield `None`.
///
/// Requires the `CookieJarManager` middleware, which
/// [`LocaleResolver`](crate::LocaleResolver) installs.
#[cfg(feature = "geo-lookup")]
#[cfg_attr(docsrs, doc(cfg(feature = "geo-lookup")))]
#[derive(Debug, Clone)]
pub struct HttpGeoLocator {
    client: reqwest::Client,
    base_url: String,
    deadline: Duration,
}

#[cfg(feature = "geo-lookup")]
impl HttpGeoLocator {
    /// Create a locator for the service at `base_url`, with the default
    /// deadline of 800 milliseconds.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            deadline: GeoConfig::default().deadline(),
        }
    }

    /// Sets the deadline of a lookup.
    #[must_use]
    pub fn deadline(self, deadline: Duration) -> Self {
        Self { deadline, ..self }
    }

    /// Looks up the country of `ip`.
    pub async fn lookup(&self, ip: IpAddr) -> Option<String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);

        match tokio::time::timeout(self.deadline, self.fetch(&url)).await {
            Ok(Ok(country)) => country,
            Ok(Err(err)) => {
                tracing::warn!(url = %url, error = %err, "couldn't resolve country");
                None
            }
            Err(_) => {
                tracing::warn!(url = %url, deadline = ?self.deadline, "country lookup timed out");
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Option<String>, reqwest::Error> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(url = %url, status = %status, "geo lookup service is not working");
            return Ok(None);
        }

        let body = resp.text().await?;
        let body = body.trim();
        if body.is_empty() || body.len() >= 3 {
            tracing::warn!(url = %url, body = %body, "geo lookup service returned an unexpected answer");
            return Ok(None);
        }
        Ok(Some(body.to_ascii_uppercase()))
    }
}

#[cfg(feature = "geo-lookup")]
impl GeoLocator for HttpGeoLocator {
    async fn country(&self, req: &Request) -> Option<String> {
        use poem::{
            web::{cookie::Cookie, RealIp},
            FromRequest,
        };

        if let Some(cookie) = req.cookie().get(TERRITORY_COOKIE) {
            if let Some(country) = normalize_country(cookie.value_str()) {
                return Some(country);
            }
        }

        let Ok(RealIp(Some(ip))) = RealIp::from_request_without_body(req).await else {
            tracing::debug!("client ip is unknown, skip geo lookup");
            return None;
        };

        let country = self.lookup(ip).await?;
        let mut cookie = Cookie::new_with_str(TERRITORY_COOKIE, &country);
        cookie.set_path("/");
        cookie.set_max_age(crate::middleware::COOKIE_MAX_AGE);
        req.cookie().add(cookie);
        Some(country)
    }
}

/// The locator selected by an [`AppConfig`](crate::AppConfig).
#[derive(Debug, Clone)]
pub enum ConfiguredGeoLocator {
    /// No country detection.
    Disabled(NoGeoLocator),
    /// Country from a request header.
    Header(HeaderGeoLocator),
    /// Country from an HTTP lookup service.
    #[cfg(feature = "geo-lookup")]
    #[cfg_attr(docsrs, doc(cfg(feature = "geo-lookup")))]
    Http(HttpGeoLocator),
}

impl ConfiguredGeoLocator {
    /// Selects the locator described by `config`.
    ///
    /// A `lookup_url` takes precedence over the header; an empty header name
    /// disables detection.
    pub fn from_config(config: &GeoConfig) -> Self {
        #[cfg(feature = "geo-lookup")]
        {
            if let Some(url) = &config.lookup_url {
                return Self::Http(HttpGeoLocator::new(url.clone()).deadline(config.deadline()));
            }
        }

        if config.header.is_empty() {
            Self::Disabled(NoGeoLocator)
        } else {
            Self::Header(HeaderGeoLocator::new(config.header.clone()))
        }
    }
}

impl GeoLocator for ConfiguredGeoLocator {
    async fn country(&self, req: &Request) -> Option<String> {
        match self {
            Self::Disabled(locator) => locator.country(req).await,
            Self::Header(locator) => locator.country(req).await,
            #[cfg(feature = "geo-lookup")]
            Self::Http(locator) => locator.country(req).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn header_locator() {
        let locator = HeaderGeoLocator::default();
        let req = Request::builder()
            .header("X-AppEngine-Country", " de ")
            .finish();
        assert_eq!(locator.country(&req).await.as_deref(), Some("DE"));

        let req = Request::builder().header("X-AppEngine-Country", "").finish();
        assert_eq!(locator.country(&req).await, None);
        assert_eq!(locator.country(&Request::default()).await, None);

        let locator = HeaderGeoLocator::new("CF-IPCountry");
        let req = Request::builder().header("cf-ipcountry", "fr").finish();
        assert_eq!(locator.country(&req).await.as_deref(), Some("FR"));
    }

    #[tokio::test]
    async fn no_locator() {
        let req = Request::builder()
            .header("X-AppEngine-Country", "DE")
            .finish();
        assert_eq!(NoGeoLocator.country(&req).await, None);
    }

    #[test]
    fn from_config() {
        let locator = ConfiguredGeoLocator::from_config(&GeoConfig::default());
        assert!(matches!(locator, ConfiguredGeoLocator::Header(_)));

        let locator = ConfiguredGeoLocator::from_config(&GeoConfig {
            header: String::new(),
            ..GeoConfig::default()
        });
        assert!(matches!(locator, ConfiguredGeoLocator::Disabled(_)));
    }

    #[cfg(feature = "geo-lookup")]
    mod lookup {
        use std::{
            sync::{
                atomic::{AtomicUsize, Ordering},
                Arc,
            },
            time::Instant,
        };

        use poem::{handler, http::header, test::TestClient, EndpointExt, Route};
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        use super::*;
        use crate::{LocaleContext, LocaleResolver, SupportedLocales};

        #[handler]
        fn index(locale: &LocaleContext) -> String {
            locale.tag.to_string()
        }

        /// Answers every connection with `200 {body}` and counts them.
        async fn serve_counting(body: &'static str) -> (String, Arc<AtomicUsize>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let mut buf = [0; 1024];
                    let _ = stream.read(&mut buf).await;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(resp.as_bytes()).await;
                }
            });
            (format!("http://{addr}/cc"), hits)
        }

        fn territory_cookie(resp: &poem::test::TestResponse) -> Option<String> {
            resp.0
                .headers()
                .get_all(header::SET_COOKIE)
                .into_iter()
                .filter_map(|value| value.to_str().ok())
                .find(|value| value.starts_with("territory="))
                .map(ToString::to_string)
        }

        fn app(url: String) -> impl poem::Endpoint {
            Route::new().at("/", index).with(
                LocaleResolver::new(SupportedLocales::parse(["en", "de"]).unwrap())
                    .geo_locator(HttpGeoLocator::new(url)),
            )
        }

        #[tokio::test]
        async fn territory_cookie_skips_lookup() {
            let (url, hits) = serve_counting("EN").await;
            let cli = TestClient::new(app(url));

            let resp = cli
                .get("/")
                .header(header::COOKIE, "territory=DE")
                .header("x-real-ip", "203.0.113.7")
                .send()
                .await;
            resp.assert_status_is_ok();
            assert_eq!(territory_cookie(&resp), None);
            resp.assert_text("de").await;
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn lookup_result_is_kept_in_cookie() {
            let (url, hits) = serve_counting("de").await;
            let cli = TestClient::new(app(url));

            let resp = cli
                .get("/")
                .header("x-real-ip", "203.0.113.7")
                .send()
                .await;
            resp.assert_status_is_ok();
            let cookie = territory_cookie(&resp).unwrap();
            assert!(cookie.starts_with("territory=DE;"));
            assert!(cookie.contains("Max-Age=15724800"));
            assert!(cookie.contains("Path=/"));
            resp.assert_text("de").await;
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn unknown_client_ip_skips_lookup() {
            let (url, hits) = serve_counting("DE").await;
            let cli = TestClient::new(app(url));

            let resp = cli.get("/").send().await;
            resp.assert_status_is_ok();
            assert_eq!(territory_cookie(&resp), None);
            resp.assert_text("en").await;
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        }

        async fn serve_once(status: &'static str, body: &'static str) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0; 1024];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(resp.as_bytes()).await.unwrap();
            });
            format!("http://{addr}/cc")
        }

        #[tokio::test]
        async fn lookup_success() {
            let url = serve_once("200 OK", "us\n").await;
            let locator = HttpGeoLocator::new(url);
            assert_eq!(
                locator.lookup("8.8.8.8".parse().unwrap()).await.as_deref(),
                Some("US")
            );
        }

        #[tokio::test]
        async fn lookup_unexpected_answer() {
            let url = serve_once("200 OK", "<html>oops</html>").await;
            let locator = HttpGeoLocator::new(url);
            assert_eq!(locator.lookup("8.8.8.8".parse().unwrap()).await, None);

            let url = serve_once("503 Service Unavailable", "").await;
            let locator = HttpGeoLocator::new(url);
            assert_eq!(locator.lookup("8.8.8.8".parse().unwrap()).await, None);
        }

        #[tokio::test]
        async fn lookup_unavailable() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let locator = HttpGeoLocator::new(format!("http://{addr}"));
            assert_eq!(locator.lookup("8.8.8.8".parse().unwrap()).await, None);
        }

        #[tokio::test]
        async fn lookup_deadline() {
            // Accepts the connection but never answers.
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (_stream, _) = listener.accept().await.unwrap();
                tokio::time::sleep(Duration::from_secs(10)).await;
            });

            let locator =
                HttpGeoLocator::new(format!("http://{addr}")).deadline(Duration::from_millis(100));
            let start = Instant::now();
            assert_eq!(locator.lookup("8.8.8.8".parse().unwrap()).await, None);
            assert!(start.elapsed() < Duration::from_secs(5));
        }
    }
}
