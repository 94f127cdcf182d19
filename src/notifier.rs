use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use poem::{http::header, Endpoint, Middleware, Request, Result};
use serde::Serialize;

use crate::{config::AppConfig, error::MailError};

/// An outbound mail, handed to a [`MailQueue`] for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub body: String,
    /// Sender address.
    pub sender: String,
}

/// Delivers mails out of the request path.
pub trait MailQueue: Send + Sync {
    /// Queues `mail` for delivery.
    fn enqueue(&self, mail: OutboundMail) -> Result<(), MailError>;
}

impl<T: MailQueue + ?Sized> MailQueue for Arc<T> {
    fn enqueue(&self, mail: OutboundMail) -> Result<(), MailError> {
        self.as_ref().enqueue(mail)
    }
}

/// A queue keeping mails in memory, for development and tests.
#[derive(Debug, Default)]
pub struct MemoryMailQueue {
    mails: Mutex<Vec<OutboundMail>>,
    closed: AtomicBool,
}

impl MemoryMailQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the queued mails.
    pub fn mails(&self) -> Vec<OutboundMail> {
        self.mails.lock().clone()
    }

    /// Removes and returns the queued mails.
    pub fn take(&self) -> Vec<OutboundMail> {
        std::mem::take(&mut *self.mails.lock())
    }

    /// Rejects every later mail with [`MailError::QueueClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl MailQueue for MemoryMailQueue {
    fn enqueue(&self, mail: OutboundMail) -> Result<(), MailError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(MailError::QueueClosed);
        }
        self.mails.lock().push(mail);
        Ok(())
    }
}

/// What is known about a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Application name.
    pub app_name: String,
    /// The `Referer` header, if any.
    pub referer: Option<String>,
    /// The `User-Agent` header, if any.
    pub user_agent: Option<String>,
    /// HTTP status of the error.
    pub status: u16,
    /// The error message.
    pub description: String,
    /// The request URL.
    pub url: String,
}

impl ErrorReport {
    /// Returns the mail subject, e.g. `[PRODUCTION] ERROR Boilerplate`.
    pub fn subject(&self, environment: &str) -> String {
        format!(
            "[{}] ERROR {}",
            environment.to_uppercase(),
            self.app_name
        )
    }

    /// Renders the report as an HTML fragment.
    pub fn to_html(&self) -> String {
        let fields = [
            ("app_name", self.app_name.as_str()),
            ("Referer", self.referer.as_deref().unwrap_or("-")),
            ("User Agent", self.user_agent.as_deref().unwrap_or("-")),
            ("Status", &self.status.to_string()),
            ("Description", &self.description),
            ("URL", &self.url),
        ];

        fields
            .iter()
            .map(|(name, value)| format!("<strong>{name}:</strong> {}<br />", escape_html(value)))
            .collect()
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Middleware that reports failed requests to the developers.
///
/// When the inner endpoint returns an error, one mail per configured
/// developer is queued (unless `send_mail_developer` is `false`), the error
/// is logged, and the error is returned unchanged so Poem renders it with
/// its status code.
///
/// [`LocaleResolver`](crate::LocaleResolver) turns errors into responses, so
/// apply this middleware first when both are used.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use poem::{handler, http::StatusCode, test::TestClient, Error, EndpointExt, Route};
/// use poem_locale::{AppConfig, ErrorNotifier, MemoryMailQueue};
///
/// #[handler]
/// fn index() -> poem::Result<()> {
///     Err(Error::from_string("boom", StatusCode::BAD_GATEWAY))
/// }
///
/// let config = AppConfig::from_toml_str(
///     r#"
///     app_name = "Boilerplate"
///     environment = "production"
///     developers = [{ name = "Ada", email = "ada@example.com" }]
///     "#,
/// )
/// .unwrap();
/// let queue = Arc::new(MemoryMailQueue::new());
/// let app = Route::new()
///     .at("/", index)
///     .with(ErrorNotifier::new(config, queue.clone()));
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let resp = TestClient::new(app).get("/").send().await;
/// resp.assert_status(StatusCode::BAD_GATEWAY);
/// assert_eq!(queue.mails()[0].subject, "[PRODUCTION] ERROR Boilerplate");
/// # });
/// ```
pub struct ErrorNotifier<Q> {
    config: Arc<AppConfig>,
    queue: Arc<Q>,
}

impl<Q> Clone for ErrorNotifier<Q> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<Q: MailQueue> ErrorNotifier<Q> {
    /// Create a notifier sending reports through `queue`.
    pub fn new(config: impl Into<Arc<AppConfig>>, queue: Q) -> Self {
        Self {
            config: config.into(),
            queue: Arc::new(queue),
        }
    }

    /// Queues `report` for every developer.
    ///
    /// Failures are logged and do not stop the remaining mails.
    pub fn notify(&self, report: &ErrorReport) {
        let subject = report.subject(&self.config.environment);
        let body = report.to_html();

        for developer in &self.config.developers {
            let mail = OutboundMail {
                to: developer.email.clone(),
                subject: subject.clone(),
                body: body.clone(),
                sender: self.config.contact_sender.clone(),
            };

            let res = if mail.to.is_empty() {
                Err(MailError::MissingRecipient)
            } else {
                self.queue.enqueue(mail)
            };
            if let Err(err) = res {
                tracing::warn!(developer = %developer.name, error = %err, "failed to queue error report");
            }
        }
    }
}

impl<E: Endpoint, Q: MailQueue + 'static> Middleware<E> for ErrorNotifier<Q> {
    type Output = ErrorNotifierEndpoint<E, Q>;

    fn transform(&self, ep: E) -> Self::Output {
        ErrorNotifierEndpoint {
            inner: ep,
            notifier: self.clone(),
        }
    }
}

/// Endpoint for the [`ErrorNotifier`] middleware.
pub struct ErrorNotifierEndpoint<E, Q> {
    inner: E,
    notifier: ErrorNotifier<Q>,
}

impl<E: Endpoint, Q: MailQueue + 'static> Endpoint for ErrorNotifierEndpoint<E, Q> {
    type Output = E::Output;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        let url = req.uri().to_string();
        let referer = req.header(header::REFERER).map(ToString::to_string);
        let user_agent = req.header(header::USER_AGENT).map(ToString::to_string);

        match self.inner.call(req).await {
            Ok(resp) => Ok(resp),
            Err(err) => {
                let status = err.status();
                if self.notifier.config.send_mail_developer {
                    self.notifier.notify(&ErrorReport {
                        app_name: self.notifier.config.app_name.clone(),
                        referer,
                        user_agent,
                        status: status.as_u16(),
                        description: err.to_string(),
                        url,
                    });
                }
                tracing::error!("Error {}: {}", status.as_u16(), err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use poem::{handler, http::StatusCode, test::TestClient, EndpointExt, Error, Route};

    use super::*;
    use crate::config::Developer;

    #[handler]
    fn fail() -> Result<()> {
        Err(Error::from_string("database <down>", StatusCode::SERVICE_UNAVAILABLE))
    }

    #[handler]
    fn ok() -> &'static str {
        "ok"
    }

    fn config() -> AppConfig {
        AppConfig {
            app_name: "Boilerplate".to_string(),
            environment: "testing".to_string(),
            contact_sender: "noreply@example.com".to_string(),
            developers: vec![
                Developer {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                },
                Developer {
                    name: "Grace".to_string(),
                    email: "grace@example.com".to_string(),
                },
            ],
            ..AppConfig::default()
        }
    }

    fn app(config: AppConfig, queue: Arc<MemoryMailQueue>) -> impl Endpoint {
        Route::new()
            .at("/fail", fail)
            .at("/ok", ok)
            .with(ErrorNotifier::new(config, queue))
    }

    #[tokio::test]
    async fn mail_per_developer() {
        let queue = Arc::new(MemoryMailQueue::new());
        let cli = TestClient::new(app(config(), queue.clone()));

        let resp = cli
            .get("/fail?x=1")
            .header(header::REFERER, "http://example.com/home")
            .header(header::USER_AGENT, "Mozilla/5.0")
            .send()
            .await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let mails = queue.take();
        assert_eq!(mails.len(), 2);
        assert_eq!(mails[0].to, "ada@example.com");
        assert_eq!(mails[1].to, "grace@example.com");
        for mail in &mails {
            assert_eq!(mail.subject, "[TESTING] ERROR Boilerplate");
            assert_eq!(mail.sender, "noreply@example.com");
            assert!(mail.body.contains("<strong>Status:</strong> 503<br />"));
            assert!(mail.body.contains("database &lt;down&gt;"));
            assert!(mail.body.contains("<strong>Referer:</strong> http://example.com/home"));
            assert!(mail.body.contains("<strong>User Agent:</strong> Mozilla/5.0"));
            assert!(mail.body.contains("/fail?x=1"));
        }
    }

    #[tokio::test]
    async fn success_is_not_reported() {
        let queue = Arc::new(MemoryMailQueue::new());
        let cli = TestClient::new(app(config(), queue.clone()));

        let resp = cli.get("/ok").send().await;
        resp.assert_status_is_ok();
        resp.assert_text("ok").await;
        assert!(queue.mails().is_empty());
    }

    #[tokio::test]
    async fn not_found_is_reported() {
        let queue = Arc::new(MemoryMailQueue::new());
        let cli = TestClient::new(app(config(), queue.clone()));

        cli.get("/missing")
            .send()
            .await
            .assert_status(StatusCode::NOT_FOUND);
        let mails = queue.take();
        assert_eq!(mails.len(), 2);
        assert!(mails[0].body.contains("<strong>Status:</strong> 404<br />"));
        assert!(mails[0].body.contains("<strong>Referer:</strong> -<br />"));
    }

    #[tokio::test]
    async fn disabled() {
        let queue = Arc::new(MemoryMailQueue::new());
        let config = AppConfig {
            send_mail_developer: false,
            ..config()
        };
        let cli = TestClient::new(app(config, queue.clone()));

        cli.get("/fail")
            .send()
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(queue.mails().is_empty());
    }

    #[tokio::test]
    async fn queue_failure_keeps_the_error() {
        let queue = Arc::new(MemoryMailQueue::new());
        queue.close();
        let cli = TestClient::new(app(config(), queue.clone()));

        cli.get("/fail")
            .send()
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(queue.mails().is_empty());
    }

    #[tokio::test]
    async fn inside_locale_resolver() {
        let queue = Arc::new(MemoryMailQueue::new());
        let supported = crate::SupportedLocales::parse(["en", "es_ES"]).unwrap();
        let cli = TestClient::new(
            Route::new()
                .at("/fail", fail)
                .with(ErrorNotifier::new(config(), queue.clone()))
                .with(crate::LocaleResolver::new(supported)),
        );

        let resp = cli.get("/fail?hl=es_ES").send().await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(resp
            .0
            .headers()
            .get_all(header::SET_COOKIE)
            .into_iter()
            .any(|value| value.to_str().unwrap().starts_with("hl=es_ES;")));
        assert_eq!(queue.take().len(), 2);
    }

    #[test]
    fn missing_recipient_is_skipped() {
        let queue = Arc::new(MemoryMailQueue::new());
        let mut config = config();
        config.developers[0].email.clear();
        let notifier = ErrorNotifier::new(config, queue.clone());

        notifier.notify(&ErrorReport {
            app_name: "Boilerplate".to_string(),
            referer: None,
            user_agent: None,
            status: 500,
            description: "boom".to_string(),
            url: "/".to_string(),
        });
        let mails = queue.mails();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, "grace@example.com");
    }
}
