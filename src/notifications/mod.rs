use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::MailConfig;
use crate::services::fulfillment::{EntitlementGrant, EntitlementKind};

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Mail API rejected the message with status {0}")]
    Rejected(u16),
}

/// Outbound mail transport. The pipeline only ever hands over
/// `(recipient, subject, html_body)`; delivery is the provider's
/// problem.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str)
        -> Result<(), NotificationError>;
}

/// HTTP mail API transport.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_address: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, from_address: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client for mail transport");
                reqwest::Client::new()
            });

        Self {
            client,
            endpoint,
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, html_body), fields(to = %to, subject = %subject))]
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from_address,
                "to": to,
                "subject": subject,
                "html": html_body,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }

        debug!("Mail handed to transport");
        Ok(())
    }
}

/// No-op transport used when mail is not configured, and in tests.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        _html_body: &str,
    ) -> Result<(), NotificationError> {
        debug!(to = %to, subject = %subject, "Mail transport disabled, dropping message");
        Ok(())
    }
}

/// Builds a mailer from configuration: HTTP transport when an endpoint
/// is set, otherwise the null transport.
pub fn mailer_from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.endpoint {
        Some(endpoint) => Arc::new(HttpMailer::new(
            endpoint.clone(),
            config.api_key.clone(),
            config.from_address.clone(),
        )),
        None => Arc::new(NullMailer),
    }
}

/// Composes the "your file is ready" message for one book grant.
pub fn book_ready_email(student_name: Option<&str>, grant: &EntitlementGrant) -> (String, String) {
    let subject = format!("Your {} is ready to download", grant.product_name);

    let greeting = match student_name {
        Some(name) if !name.trim().is_empty() => format!("Hi {},", name.trim()),
        _ => "Hi,".to_string(),
    };

    let (link, password, expiry) = match &grant.book {
        Some(book) => (
            book.download_link.clone(),
            book.password.clone(),
            book.valid_until.format("%Y-%m-%d").to_string(),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    let body = format!(
        r#"<html>
  <body>
    <p>{greeting}</p>
    <p>Your purchase is ready. You can download <strong>{name}</strong> here:</p>
    <p><a href="{link}">{link}</a></p>
    <p>The file is protected with the password <strong>{password}</strong>
       and stays available until {expiry}.</p>
    <p>Happy studying!</p>
  </body>
</html>"#,
        greeting = greeting,
        name = grant.product_name,
        link = link,
        password = password,
        expiry = expiry,
    );

    (subject, body)
}

/// Dispatches the "file ready" notification for every book grant of a
/// fulfillment pass. Sends are spawned after the entitlements are
/// durable and never affect the response: a failed send is logged and
/// repaired by support re-triggering fulfillment.
pub fn dispatch_book_notifications(
    mailer: Arc<dyn Mailer>,
    recipient: String,
    student_name: Option<String>,
    grants: &[EntitlementGrant],
) {
    for grant in grants {
        if grant.kind != EntitlementKind::Book || grant.book.is_none() {
            continue;
        }

        let (subject, body) = book_ready_email(student_name.as_deref(), grant);
        let mailer = mailer.clone();
        let recipient = recipient.clone();
        let product_id = grant.product_id;

        tokio::spawn(async move {
            if let Err(e) = mailer.send(&recipient, &subject, &body).await {
                warn!(
                    product_id = %product_id,
                    error = %e,
                    "Book notification failed; entitlement unaffected"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::product::ProductType;
    use crate::services::books::BookArtifact;
    use chrono::Utc;
    use uuid::Uuid;

    fn book_grant() -> EntitlementGrant {
        let valid_until = Utc::now() + chrono::Duration::days(365);
        EntitlementGrant {
            subscription_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Exam Workbook".to_string(),
            product_type: ProductType::Workbook,
            kind: EntitlementKind::Book,
            valid_until,
            book: Some(BookArtifact {
                product_id: Uuid::new_v4(),
                filename: "workbook_abc.pdf".to_string(),
                download_link: "https://academy.example/downloads/academy-books/workbook_abc.pdf"
                    .to_string(),
                password: "jane.doe".to_string(),
                valid_until,
            }),
        }
    }

    #[test]
    fn email_contains_link_password_and_expiry() {
        let grant = book_grant();
        let (subject, body) = book_ready_email(Some("Jane"), &grant);

        assert!(subject.contains("Exam Workbook"));
        assert!(body.contains("Hi Jane,"));
        assert!(body.contains("workbook_abc.pdf"));
        assert!(body.contains("jane.doe"));
        assert!(body.contains(&grant.valid_until.format("%Y-%m-%d").to_string()));
    }

    #[test]
    fn email_greeting_degrades_without_name() {
        let grant = book_grant();
        let (_, body) = book_ready_email(None, &grant);
        assert!(body.contains("Hi,"));
    }

    #[tokio::test]
    async fn null_mailer_accepts_everything() {
        let mailer = NullMailer;
        assert!(mailer.send("a@b.c", "subject", "<p>body</p>").await.is_ok());
    }
}
