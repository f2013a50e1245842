use crate::{
    db::DbPool,
    entities::{
        plan::{Entity as Plan, Model as PlanModel},
        plan_product::{self, Entity as PlanProduct},
        product::{self, Entity as Product, Model as ProductModel},
    },
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Catalog reads: plans and the products they bundle. Read-only to the
/// pipeline; the admin surface owns writes.
#[derive(Clone)]
pub struct PlanService {
    db: Arc<DbPool>,
}

impl PlanService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Fetches a plan regardless of its active flag. Fulfillment of an
    /// already-paid transaction must keep working after a plan is
    /// retired from sale.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<PlanModel, ServiceError> {
        Plan::find_by_id(plan_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))
    }

    /// Fetches a plan for sale: missing and inactive plans are both
    /// reported as not found so retired plans disappear from checkout.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_active_plan(&self, plan_id: Uuid) -> Result<PlanModel, ServiceError> {
        let plan = self.get_plan(plan_id).await?;
        if !plan.is_active {
            return Err(ServiceError::NotFound(format!(
                "Plan {} is not available",
                plan_id
            )));
        }
        Ok(plan)
    }

    /// The plan's products in their admin-defined order.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn products_for(&self, plan_id: Uuid) -> Result<Vec<ProductModel>, ServiceError> {
        let links = PlanProduct::find()
            .filter(plan_product::Column::PlanId.eq(plan_id))
            .order_by_asc(plan_product::Column::Position)
            .all(&*self.db)
            .await?;

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = links.iter().map(|link| link.product_id).collect();
        let products = Product::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(&*self.db)
            .await?;

        let mut by_id: HashMap<Uuid, ProductModel> =
            products.into_iter().map(|p| (p.id, p)).collect();

        // Preserve join-table ordering; silently dropping a dangling link
        // would hide catalog corruption, so surface it instead.
        let mut ordered = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            let product = by_id.remove(&product_id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Plan {} references missing product {}",
                    plan_id, product_id
                ))
            })?;
            ordered.push(product);
        }

        Ok(ordered)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }
}
