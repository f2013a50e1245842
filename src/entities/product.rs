use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::PackageType;

/// Concrete deliverable kinds. Book-shaped products map to a generated
/// PDF artifact; `SystemAccess` maps to a time-bounded subscription.
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
pub enum ProductType {
    #[sea_orm(string_value = "system_access")]
    SystemAccess,
    #[sea_orm(string_value = "workbook")]
    Workbook,
    #[sea_orm(string_value = "exam_collection")]
    ExamCollection,
}

impl ProductType {
    /// Stable slug used in storage keys and filenames.
    pub fn slug(self) -> &'static str {
        match self {
            Self::SystemAccess => "system_access",
            Self::Workbook => "workbook",
            Self::ExamCollection => "exam_collection",
        }
    }

    pub fn is_book(self) -> bool {
        match self {
            Self::Workbook | Self::ExamCollection => true,
            Self::SystemAccess => false,
        }
    }
}

/// The `products` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub package_type: PackageType,
    pub product_type: ProductType,
    pub system_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::plan_product::Entity")]
    PlanProducts,
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,
}

impl Related<super::plan_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanProducts.def()
    }
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
