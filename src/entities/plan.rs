use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// What kind of deliverables a plan (or product) bundles.
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
pub enum PackageType {
    #[sea_orm(string_value = "system")]
    System,
    #[sea_orm(string_value = "book")]
    Book,
}

/// Book add-on descriptor carried inside a plan's display data: the
/// product granted when `book_included` is checked, and its surcharge in
/// minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAddon {
    pub product_id: Uuid,
    pub surcharge: i64,
}

/// Presentation and add-on configuration stored in the `display_data`
/// JSON column. Unknown or malformed blobs fall back to the default so a
/// bad admin edit never breaks checkout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanDisplayData {
    pub icon: Option<String>,
    pub color: Option<String>,
    pub features: Vec<String>,
    pub book_addon: Option<BookAddon>,
}

/// The `plans` table: purchasable offerings. Read-only to the pipeline.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub package_type: PackageType,
    /// Base price in minor currency units.
    pub price: i64,
    /// Entitlement duration in calendar days for system plans.
    pub days: i32,
    /// Cohort/version tag scoping this plan to a program iteration.
    pub system_step: String,
    pub is_active: bool,
    pub display_data: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Typed view of the `display_data` blob, defaulting when absent or
    /// malformed.
    pub fn display(&self) -> PlanDisplayData {
        match &self.display_data {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!(plan_id = %self.id, error = %e, "Malformed display_data on plan, using defaults");
                PlanDisplayData::default()
            }),
            None => PlanDisplayData::default(),
        }
    }

    /// The plan's book add-on, when configured.
    pub fn book_addon(&self) -> Option<BookAddon> {
        self.display().book_addon
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::plan_product::Entity")]
    PlanProducts,
    #[sea_orm(has_many = "super::payment_transaction::Entity")]
    PaymentTransactions,
}

impl Related<super::plan_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanProducts.def()
    }
}

impl Related<super::payment_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan_with_display(display_data: Option<Json>) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Full System".to_string(),
            package_type: PackageType::System,
            price: 24900,
            days: 180,
            system_step: "2026".to_string(),
            is_active: true,
            display_data,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn display_defaults_when_absent() {
        let plan = plan_with_display(None);
        assert_eq!(plan.display(), PlanDisplayData::default());
        assert!(plan.book_addon().is_none());
    }

    #[test]
    fn display_defaults_when_malformed() {
        let plan = plan_with_display(Some(json!({"book_addon": "not-an-object"})));
        assert_eq!(plan.display(), PlanDisplayData::default());
    }

    #[test]
    fn display_parses_addon() {
        let product_id = Uuid::new_v4();
        let plan = plan_with_display(Some(json!({
            "icon": "rocket",
            "features": ["quizzes", "mock exams"],
            "book_addon": {"product_id": product_id, "surcharge": 4900}
        })));

        let display = plan.display();
        assert_eq!(display.icon.as_deref(), Some("rocket"));
        assert_eq!(display.features.len(), 2);
        let addon = plan.book_addon().expect("addon configured");
        assert_eq!(addon.product_id, product_id);
        assert_eq!(addon.surcharge, 4900);
    }
}
