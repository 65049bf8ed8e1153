use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::utils::error::AppError;

/// Delivers a price-drop alert. Best-effort: a failure here is logged by
/// the caller and never blocks the item's price-state update.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, price: f64, url: &str) -> Result<(), AppError>;
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let username = config
            .username
            .clone()
            .ok_or_else(|| AppError::Email("Missing SMTP username".to_string()))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| AppError::Email("Missing SMTP password".to_string()))?;
        let from_address = config
            .from_address
            .clone()
            .ok_or_else(|| AppError::Email("Missing SMTP from_address".to_string()))?;

        let from: Mailbox = format!("{} <{}>", config.from_name, from_address)
            .parse()
            .map_err(|e| AppError::Email(format!("Invalid from address: {}", e)))?;

        let mut recipients = Vec::with_capacity(config.to.len());
        for to in &config.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| AppError::Email(format!("Invalid recipient {}: {}", to, e)))?;
            recipients.push(mailbox);
        }
        if recipients.is_empty() {
            return Err(AppError::Email("No alert recipients configured".to_string()));
        }

        let credentials = Credentials::new(username, password);

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Email(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port)
        .credentials(credentials)
        .build();

        Ok(Self {
            transport,
            from,
            recipients,
        })
    }

    fn format_subject(price: f64) -> String {
        format!("Price Drop: Now at {:.2}", price)
    }

    fn format_text_body(price: f64, url: &str) -> String {
        format!("The price dropped to {:.2}! Check it now: {}", price, url)
    }

    fn format_html_body(price: f64, url: &str) -> String {
        format!(
            r#"<p>The price dropped to <strong>{:.2}</strong>!</p><p><a href="{}">View Product</a></p>"#,
            price, url
        )
    }

    fn build_message(&self, price: f64, url: &str) -> Result<Message, AppError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::format_subject(price));

        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(Self::format_text_body(price, url)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(Self::format_html_body(price, url)),
                    ),
            )
            .map_err(|e| AppError::Email(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, price: f64, url: &str) -> Result<(), AppError> {
        let message = self.build_message(price, url)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Email(e.to_string()))?;

        tracing::info!("Price drop alert sent for {}", url);
        Ok(())
    }
}
