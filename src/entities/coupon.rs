use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a coupon's `value` is interpreted.
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
pub enum CouponType {
    /// `value` is a percentage in 0..=100.
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `value` is an absolute amount in minor units.
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// The `coupons` table. Codes are not unique by construction; a code is
/// matched together with its `system_step` and validity window.
///
/// Invariant: once committed, `uses <= max_uses`. The counter only moves
/// through the conditional increment in the coupon service.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub code: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub max_uses: i32,
    pub uses: i32,
    /// When set, the coupon only applies to this plan.
    pub plan_id: Option<Uuid>,
    /// Optional organization-year scoping for bulk-issued codes.
    pub organization_year_id: Option<Uuid>,
    pub system_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment_transaction::Entity")]
    PaymentTransactions,
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
