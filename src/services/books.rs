use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        book_purchase::{self, Entity as BookPurchase, Model as BookPurchaseModel},
        payment_transaction::{Model as TransactionModel, TransactionStatus},
        product::{Model as ProductModel, ProductType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::transactions::TransactionService,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Book entitlements outlive the subscription they came with: fixed
/// validity regardless of the plan's duration.
pub const BOOK_ACCESS_DAYS: i64 = 365;

/// Resolved artifact coordinates for one book grant, embedded in the
/// entitlement so the success page and the notification email need no
/// second lookup.
#[derive(Debug, Clone, Serialize)]
pub struct BookArtifact {
    pub product_id: Uuid,
    pub filename: String,
    pub download_link: String,
    pub password: String,
    pub valid_until: DateTime<Utc>,
}

/// Deterministic artifact filename for a user/product-type pair. Stable
/// across retries and process restarts so repeated fulfillment attempts
/// converge on one storage object instead of orphaning copies.
pub fn book_filename(user_id: Uuid, product_type: ProductType) -> String {
    format!("{}_{}.pdf", product_type.slug(), user_id.simple())
}

/// Delivery password: the buyer's VAT id when supplied, otherwise the
/// local part of the delivery email address, lowercased.
pub fn delivery_password(vat_id: Option<&str>, email: &str) -> String {
    match vat_id {
        Some(vat) if !vat.trim().is_empty() => vat.trim().to_string(),
        _ => email
            .split('@')
            .next()
            .unwrap_or(email)
            .to_ascii_lowercase(),
    }
}

/// Registers book purchases and triggers artifact generation.
#[derive(Clone)]
pub struct BookArtifactService {
    db: Arc<DbPool>,
    transactions: Arc<TransactionService>,
    event_sender: Option<Arc<EventSender>>,
    http: reqwest::Client,
    app_base_url: String,
    bucket: String,
    generator_url: Option<String>,
}

impl BookArtifactService {
    pub fn new(
        db: Arc<DbPool>,
        transactions: Arc<TransactionService>,
        event_sender: Option<Arc<EventSender>>,
        config: &AppConfig,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client for generation triggers");
                reqwest::Client::new()
            });

        Self {
            db,
            transactions,
            event_sender,
            http,
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
            bucket: config.book_bucket.clone(),
            generator_url: config.generator_url.clone(),
        }
    }

    fn download_link(&self, filename: &str) -> String {
        format!("{}/downloads/{}/{}", self.app_base_url, self.bucket, filename)
    }

    fn artifact_from_row(&self, row: &BookPurchaseModel) -> BookArtifact {
        BookArtifact {
            product_id: row.product_id,
            filename: row.filename.clone(),
            download_link: self.download_link(&row.filename),
            password: row.vat_id.clone(),
            valid_until: row.valid_until,
        }
    }

    /// Ensures the book purchase record and generation trigger exist for
    /// one (transaction, product) pair, idempotently.
    ///
    /// When the transaction's status already marks the book as
    /// registered, the existing row is returned without re-inserting or
    /// re-triggering generation; that is the guard against duplicate
    /// webhook/retry delivery. The insert itself is additionally fenced
    /// by the unique `(payment_transaction_id, product_id)` index, so
    /// two racing first calls converge on a single row.
    #[instrument(skip(self, transaction, product), fields(transaction_id = %transaction.id, product_id = %product.id))]
    pub async fn ensure_artifact(
        &self,
        transaction: &TransactionModel,
        product: &ProductModel,
        email: &str,
        vat_id: Option<&str>,
    ) -> Result<BookArtifact, ServiceError> {
        let filename = book_filename(transaction.user_id, product.product_type);
        let password = delivery_password(vat_id, email);

        let existing = BookPurchase::find()
            .filter(book_purchase::Column::PaymentTransactionId.eq(transaction.id))
            .filter(book_purchase::Column::ProductId.eq(product.id))
            .one(&*self.db)
            .await?;

        if transaction.status.book_registered() {
            if let Some(row) = existing {
                debug!("Book already registered, short-circuiting");
                return Ok(self.artifact_from_row(&row));
            }
            // Ledger says registered but the row is gone; repair by
            // falling through to the insert.
            warn!("Transaction marked book-registered without a purchase row, repairing");
        } else if let Some(row) = existing {
            debug!("Book purchase row already present, skipping re-insert");
            return Ok(self.artifact_from_row(&row));
        }

        let now = Utc::now();
        let valid_until = now + Duration::days(BOOK_ACCESS_DAYS);

        let row = book_purchase::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_transaction_id: Set(transaction.id),
            user_id: Set(transaction.user_id),
            product_id: Set(product.id),
            filename: Set(filename.clone()),
            bucket: Set(self.bucket.clone()),
            generated: Set(false),
            vat_id: Set(password.clone()),
            valid_until: Set(valid_until),
            created_at: Set(now),
        };

        let inserted = BookPurchase::insert(row)
            .on_conflict(
                OnConflict::columns([
                    book_purchase::Column::PaymentTransactionId,
                    book_purchase::Column::ProductId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        if inserted == 0 {
            // Lost the race; the winner's row is authoritative.
            let row = BookPurchase::find()
                .filter(book_purchase::Column::PaymentTransactionId.eq(transaction.id))
                .filter(book_purchase::Column::ProductId.eq(product.id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "Book purchase for transaction {} vanished after conflict",
                        transaction.id
                    ))
                })?;
            return Ok(self.artifact_from_row(&row));
        }

        if transaction.status == TransactionStatus::Paid {
            match self
                .transactions
                .transition(transaction.id, TransactionStatus::BookCreated, "book_orchestrator")
                .await
            {
                Ok(_) => {}
                Err(ServiceError::InvalidTransition { from, .. }) if from.book_registered() => {
                    // Another grant in the same pass (or a racing retry)
                    // advanced the ledger first; the row we just wrote
                    // still stands.
                    debug!(observed = %from, "Ledger already marked book registration");
                }
                Err(e) => return Err(e),
            }
        }

        self.trigger_generation(transaction.id, product.id, &filename);

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::BookArtifactRequested {
                    transaction_id: transaction.id,
                    product_id: product.id,
                    filename: filename.clone(),
                })
                .await
            {
                warn!(error = %e, "Failed to send book artifact event");
            }
        }

        Ok(BookArtifact {
            product_id: product.id,
            filename: filename.clone(),
            download_link: self.download_link(&filename),
            password,
            valid_until,
        })
    }

    /// Fire-and-forget call to the external generation worker. Failure
    /// is logged and repaired by the next fulfillment retry; it never
    /// blocks the response path.
    fn trigger_generation(&self, transaction_id: Uuid, product_id: Uuid, filename: &str) {
        let Some(generator_url) = self.generator_url.clone() else {
            debug!("Generator URL not configured, skipping generation trigger");
            return;
        };

        let url = format!(
            "{}?transaction_id={}&product_id={}&filename={}",
            generator_url, transaction_id, product_id, filename
        );
        let client = self.http.clone();

        tokio::spawn(async move {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(transaction_id = %transaction_id, "Generation trigger accepted");
                }
                Ok(response) => {
                    warn!(
                        transaction_id = %transaction_id,
                        status = response.status().as_u16(),
                        "Generation trigger rejected"
                    );
                }
                Err(e) => {
                    warn!(transaction_id = %transaction_id, error = %e, "Generation trigger failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_deterministic() {
        let user_id = Uuid::new_v4();
        let first = book_filename(user_id, ProductType::Workbook);
        let second = book_filename(user_id, ProductType::Workbook);
        assert_eq!(first, second);
        assert!(first.starts_with("workbook_"));
        assert!(first.ends_with(".pdf"));
    }

    #[test]
    fn filenames_differ_per_product_type() {
        let user_id = Uuid::new_v4();
        assert_ne!(
            book_filename(user_id, ProductType::Workbook),
            book_filename(user_id, ProductType::ExamCollection)
        );
    }

    #[test]
    fn password_prefers_vat_id() {
        assert_eq!(
            delivery_password(Some("ATU12345678"), "jane.doe@example.com"),
            "ATU12345678"
        );
        assert_eq!(
            delivery_password(Some("  ATU12345678  "), "jane.doe@example.com"),
            "ATU12345678"
        );
    }

    #[test]
    fn password_falls_back_to_email_local_part() {
        assert_eq!(
            delivery_password(None, "Jane.Doe@example.com"),
            "jane.doe"
        );
        assert_eq!(delivery_password(Some("   "), "jane@example.com"), "jane");
    }
}
