use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enum representing the lifecycle states of a payment transaction.
///
/// Transitions are monotonic along the lattice checked by
/// [`TransactionStatus::can_transition`]; `BookCreated` and `Icount` are
/// intermediate markers ("book artifact registered" / "receipt issued")
/// that are not ordered relative to each other.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "book_created")]
    BookCreated,
    #[sea_orm(string_value = "icount")]
    Icount,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl TransactionStatus {
    /// Whether a transition from `self` to `to` is allowed.
    ///
    /// Terminal states accept nothing, and a same-status "transition" is
    /// rejected too: duplicate deliveries must surface at the ledger
    /// instead of silently succeeding.
    pub fn can_transition(self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match self {
            Created => matches!(to, Paid | Failed | Cancelled),
            Paid => matches!(to, BookCreated | Icount | Fulfilled | Failed | Cancelled),
            BookCreated => matches!(to, Icount | Fulfilled | Failed | Cancelled),
            Icount => matches!(to, BookCreated | Fulfilled | Failed | Cancelled),
            Fulfilled | Failed | Cancelled => false,
        }
    }

    /// No further transitions are accepted from these states.
    pub fn is_terminal(self) -> bool {
        use TransactionStatus::*;
        match self {
            Fulfilled | Failed | Cancelled => true,
            Created | Paid | BookCreated | Icount => false,
        }
    }

    /// Funds have been captured (or the zero-cost fast path applied);
    /// entitlement fulfillment may run.
    pub fn is_paid_or_later(self) -> bool {
        use TransactionStatus::*;
        match self {
            Paid | BookCreated | Icount | Fulfilled => true,
            Created | Failed | Cancelled => false,
        }
    }

    /// The book artifact for this transaction has already been registered;
    /// the orchestrator short-circuits instead of inserting again.
    pub fn book_registered(self) -> bool {
        use TransactionStatus::*;
        match self {
            BookCreated | Icount | Fulfilled => true,
            Created | Paid | Failed | Cancelled => false,
        }
    }
}

/// The `payment_transactions` table: one row per checkout attempt, never
/// deleted, mutated only through status transitions.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub status: TransactionStatus,
    /// Final charge in minor currency units.
    pub total_price: i64,
    pub book_included: bool,
    pub student_name: Option<String>,
    pub email: Option<String>,
    pub system_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::plan::Entity",
        from = "Column::PlanId",
        to = "super::plan::Column::Id"
    )]
    Plan,
    #[sea_orm(
        belongs_to = "super::coupon::Entity",
        from = "Column::CouponId",
        to = "super::coupon::Column::Id"
    )]
    Coupon,
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,
    #[sea_orm(has_many = "super::book_purchase::Entity")]
    BookPurchases,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl Related<super::book_purchase::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BookPurchases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
