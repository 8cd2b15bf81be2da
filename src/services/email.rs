//! Outgoing email
//!
//! `Mailer` sends through Resend's HTTP API or a plain SMTP relay. On top of
//! it sit the contact form and the admin review digest.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::news::ReviewNotifier;
use super::rate_limiter::SlidingWindowLimiter;
use crate::config::{EmailConfig, EmailProvider};
use crate::models::NewsItem;

const CONTACT_MAX_PER_WINDOW: usize = 5;
const CONTACT_WINDOW_MINUTES: i64 = 10;
const MAX_NAME_CHARS: usize = 100;
const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email is not configured")]
    NotConfigured,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resend API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Escape text for HTML bodies and Telegram HTML messages
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Resend HTTP API
pub struct ResendTransport {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ResendTransport {
    pub fn new(api_base: &str, api_key: &str) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl EmailTransport for ResendTransport {
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let mut body = json!({
            "from": from,
            "to": message.to,
            "subject": message.subject,
            "html": message.html,
        });
        if let Some(reply_to) = &message.reply_to {
            body["reply_to"] = json!(reply_to);
        }

        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        Ok(())
    }
}

/// SMTP relay through lettre
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        // 465 is implicit TLS, everything else upgrades with STARTTLS
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| EmailError::Smtp(e.to_string()))?
        .port(config.smtp_port);

        let builder = if config.smtp_username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
        };
        Ok(Self {
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let mut builder = Message::builder()
            .from(from.parse().map_err(|_| EmailError::InvalidAddress(from.to_string()))?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML);
        for to in &message.to {
            builder = builder.to(to.parse().map_err(|_| EmailError::InvalidAddress(to.clone()))?);
        }
        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(
                reply_to
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(reply_to.clone()))?,
            );
        }

        let email = builder
            .body(message.html.clone())
            .map_err(|e| EmailError::Smtp(e.to_string()))?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| EmailError::Smtp(e.to_string()))?;
        Ok(())
    }
}

pub struct Mailer {
    transport: Arc<dyn EmailTransport>,
    from: String,
    admin_email: String,
}

impl Mailer {
    pub fn new(transport: Arc<dyn EmailTransport>, from: impl Into<String>, admin_email: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
            admin_email: admin_email.into(),
        }
    }

    /// `None` when the configuration is incomplete
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>, EmailError> {
        if !config.is_configured() {
            return Ok(None);
        }
        let transport: Arc<dyn EmailTransport> = match config.provider {
            EmailProvider::Resend => Arc::new(ResendTransport::new(&config.resend_api_base, &config.resend_api_key)?),
            EmailProvider::Smtp => Arc::new(SmtpTransport::new(config)?),
        };
        Ok(Some(Self::new(transport, &config.from, &config.admin_email)))
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.transport.send(&self.from, message).await?;
        info!(to = ?message.to, subject = %message.subject, "Email sent");
        Ok(())
    }

    pub async fn send_to_admin(
        &self,
        subject: impl Into<String>,
        html: impl Into<String>,
        reply_to: Option<String>,
    ) -> Result<(), EmailError> {
        self.send(&EmailMessage {
            to: vec![self.admin_email.clone()],
            subject: subject.into(),
            html: html.into(),
            reply_to,
        })
        .await
    }

    /// Tell the admin about news waiting for review
    pub async fn send_digest(&self, items: &[NewsItem], site_url: &str) -> Result<(), EmailError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut html = format!(
            "<h2>{} news item(s) passed pre-moderation</h2>\n<ul>\n",
            items.len()
        );
        for item in items {
            html.push_str(&format!(
                "<li><a href=\"{}\">{}</a>",
                escape_html(&item.url),
                escape_html(&item.title)
            ));
            if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
                html.push_str(&format!("<br><small>{}</small>", escape_html(summary)));
            }
            html.push_str("</li>\n");
        }
        html.push_str(&format!(
            "</ul>\n<p>Review them in the <a href=\"{}/admin\">admin panel</a> or with /pending in Telegram.</p>",
            escape_html(site_url.trim_end_matches('/'))
        ));

        self.send_to_admin(format!("[Newsdesk] {} item(s) awaiting review", items.len()), html, None)
            .await
    }
}

/// Review digest by email
pub struct EmailDigestNotifier {
    mailer: Arc<Mailer>,
    site_url: String,
}

impl EmailDigestNotifier {
    pub fn new(mailer: Arc<Mailer>, site_url: impl Into<String>) -> Self {
        Self {
            mailer,
            site_url: site_url.into(),
        }
    }
}

#[async_trait]
impl ReviewNotifier for EmailDigestNotifier {
    async fn notify(&self, items: &[NewsItem]) -> anyhow::Result<()> {
        self.mailer.send_digest(items, &self.site_url).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contact form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Too many messages, try again later")]
    RateLimited,

    #[error("Email is not configured")]
    NotConfigured,

    #[error("Failed to send message: {0}")]
    Send(#[from] EmailError),
}

/// `local@domain.tld` with something on each side of the last dot
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rfind('.') {
        Some(dot) => dot > 0 && dot + 1 < domain.len(),
        None => false,
    }
}

pub fn validate_contact(form: &ContactForm) -> Result<(), ContactError> {
    let name_len = form.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_CHARS {
        return Err(ContactError::Validation(format!(
            "Name must be between 1 and {} characters",
            MAX_NAME_CHARS
        )));
    }
    if !is_valid_email(form.email.trim()) {
        return Err(ContactError::Validation("Invalid email address".into()));
    }
    let message_len = form.message.trim().chars().count();
    if message_len == 0 || message_len > MAX_MESSAGE_CHARS {
        return Err(ContactError::Validation(format!(
            "Message must be between 1 and {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}

pub struct ContactService {
    mailer: Option<Arc<Mailer>>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl ContactService {
    pub fn new(mailer: Option<Arc<Mailer>>) -> Self {
        Self {
            mailer,
            limiter: Arc::new(SlidingWindowLimiter::new(
                CONTACT_MAX_PER_WINDOW,
                chrono::Duration::minutes(CONTACT_WINDOW_MINUTES),
            )),
        }
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Validate, rate limit per client IP and forward to the admin
    pub async fn submit(&self, form: &ContactForm, ip: &str) -> Result<(), ContactError> {
        validate_contact(form)?;
        let mailer = self.mailer.as_ref().ok_or(ContactError::NotConfigured)?;

        if !self.limiter.check_and_record(ip).await {
            warn!(ip, "Contact form rate limited");
            return Err(ContactError::RateLimited);
        }

        let name = escape_html(form.name.trim());
        let email = form.email.trim();
        let subject = form
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(150).collect::<String>())
            .unwrap_or_else(|| format!("Message from {}", form.name.trim()));
        let html = format!(
            "<p><strong>From:</strong> {} &lt;{}&gt;</p>\n<p>{}</p>",
            name,
            escape_html(email),
            escape_html(form.message.trim()).replace('\n', "<br>")
        );

        mailer
            .send_to_admin(format!("[Contact] {}", subject), html, Some(email.to_string()))
            .await?;
        info!(ip, "Contact message forwarded");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures messages instead of sending them
    #[derive(Default)]
    pub struct MemoryTransport {
        pub sent: Mutex<Vec<(String, EmailMessage)>>,
    }

    #[async_trait]
    impl EmailTransport for MemoryTransport {
        async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError> {
            self.sent.lock().unwrap().push((from.to_string(), message.clone()));
            Ok(())
        }
    }

    pub fn mailer() -> (Arc<Mailer>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::default());
        let mailer = Mailer::new(transport.clone(), "Site <noreply@me.example>", "admin@me.example");
        (Arc::new(mailer), transport)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};

    fn form(name: &str, email: &str, message: &str) -> ContactForm {
        ContactForm {
            name: name.into(),
            email: email.into(),
            message: message.into(),
            subject: None,
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x&y")</script>'"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;&#39;"
        );
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("nodomain@"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_validate_contact() {
        assert!(validate_contact(&form("Ann", "ann@x.io", "Hi")).is_ok());
        assert!(validate_contact(&form("  ", "ann@x.io", "Hi")).is_err());
        assert!(validate_contact(&form(&"n".repeat(101), "ann@x.io", "Hi")).is_err());
        assert!(validate_contact(&form("Ann", "ann", "Hi")).is_err());
        assert!(validate_contact(&form("Ann", "ann@x.io", "")).is_err());
        assert!(validate_contact(&form("Ann", "ann@x.io", &"m".repeat(5001))).is_err());
        assert!(validate_contact(&form("Ann", "ann@x.io", &"m".repeat(5000))).is_ok());
    }

    #[tokio::test]
    async fn test_submit_escapes_and_sets_reply_to() {
        let (mailer, transport) = mailer();
        let service = ContactService::new(Some(mailer));

        service
            .submit(&form("<b>Eve</b>", "eve@x.io", "Hello\n<img src=x>"), "1.2.3.4")
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        let (from, message) = &sent[0];
        assert_eq!(from, "Site <noreply@me.example>");
        assert_eq!(message.to, vec!["admin@me.example".to_string()]);
        assert_eq!(message.reply_to.as_deref(), Some("eve@x.io"));
        assert!(message.html.contains("&lt;b&gt;Eve&lt;/b&gt;"));
        assert!(message.html.contains("Hello<br>&lt;img src=x&gt;"));
        assert!(!message.html.contains("<img"));
    }

    #[tokio::test]
    async fn test_submit_rate_limited_per_ip() {
        let (mailer, transport) = mailer();
        let service = ContactService::new(Some(mailer));
        let valid = form("Ann", "ann@x.io", "Hi");

        for _ in 0..5 {
            service.submit(&valid, "10.0.0.1").await.unwrap();
        }
        assert!(matches!(
            service.submit(&valid, "10.0.0.1").await,
            Err(ContactError::RateLimited)
        ));
        service.submit(&valid, "10.0.0.2").await.unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_submit_without_mailer() {
        let service = ContactService::new(None);
        assert!(matches!(
            service.submit(&form("Ann", "ann@x.io", "Hi"), "ip").await,
            Err(ContactError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_digest_lists_items() {
        let (mailer, transport) = mailer();
        let notifier = EmailDigestNotifier::new(mailer, "https://me.example/");
        let now = chrono::Utc::now();
        let item = NewsItem {
            id: 1,
            source_id: None,
            title: "Tom & Jerry".into(),
            content: "c".into(),
            summary: Some("Sum".into()),
            url: "https://n.example/1".into(),
            image_url: None,
            category: None,
            tags: vec![],
            social_text: None,
            content_hash: "h".into(),
            moderation_status: Default::default(),
            pre_moderation_status: Default::default(),
            pre_moderation_reason: None,
            pre_moderation_confidence: None,
            rejection_reason: None,
            source_published_at: None,
            analyzed_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        };

        notifier.notify(&[]).await.unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());

        notifier.notify(&[item]).await.unwrap();
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].1.subject.contains("1 item(s)"));
        assert!(sent[0].1.html.contains("Tom &amp; Jerry"));
        assert!(sent[0].1.html.contains("https://me.example/admin"));
    }

    #[tokio::test]
    async fn test_resend_transport_request() {
        let app = Router::new().route(
            "/emails",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers.get("authorization").unwrap(), "Bearer re_key");
                assert_eq!(body["to"], json!(["admin@me.example"]));
                assert_eq!(body["reply_to"], "ann@x.io");
                Json(json!({"id": "email_1"}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let transport = ResendTransport::new(&base, "re_key").unwrap();
        transport
            .send(
                "a@me.example",
                &EmailMessage {
                    to: vec!["admin@me.example".into()],
                    subject: "s".into(),
                    html: "<p>h</p>".into(),
                    reply_to: Some("ann@x.io".into()),
                },
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_from_config_requires_credentials() {
        assert!(Mailer::from_config(&EmailConfig::default()).unwrap().is_none());

        let config = EmailConfig {
            resend_api_key: "re_key".into(),
            from: "a@me.example".into(),
            admin_email: "admin@me.example".into(),
            ..Default::default()
        };
        assert!(Mailer::from_config(&config).unwrap().is_some());
    }
}
