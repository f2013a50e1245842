use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `book_purchases` table: generation/delivery record for a book
/// entitlement. One row per `(payment_transaction_id, product_id)`,
/// append-only; the `generated` flag is flipped by the external
/// generation worker, never by this pipeline.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "book_purchases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub payment_transaction_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    /// Deterministic artifact filename, stable across retries.
    pub filename: String,
    pub bucket: String,
    pub generated: bool,
    /// Delivery password. A real VAT id when the buyer supplied one,
    /// otherwise the local part of the delivery email address.
    pub vat_id: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment_transaction::Entity",
        from = "Column::PaymentTransactionId",
        to = "super::payment_transaction::Column::Id"
    )]
    PaymentTransaction,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransaction.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
