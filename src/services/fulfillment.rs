use crate::{
    db::DbPool,
    entities::{
        payment_transaction::{Model as TransactionModel, TransactionStatus},
        plan::PackageType,
        product::{Model as ProductModel, ProductType},
        subscription::{self, Entity as Subscription, Model as SubscriptionModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        books::{BookArtifact, BookArtifactService, BOOK_ACCESS_DAYS},
        coupons::CouponService,
        plans::PlanService,
        transactions::TransactionService,
        users::UserService,
    },
};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What a single grant entitles the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementKind {
    SystemAccess,
    Book,
}

/// One durable entitlement produced by a fulfillment pass, with the book
/// artifact coordinates inlined for book grants.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementGrant {
    pub subscription_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: ProductType,
    pub kind: EntitlementKind,
    pub valid_until: DateTime<Utc>,
    pub book: Option<BookArtifact>,
}

/// Outcome of a fulfillment pass: the transaction as it ended up, and
/// the complete set of grants that now exist for it.
#[derive(Debug, Clone)]
pub struct FulfillmentOutcome {
    pub transaction: TransactionModel,
    pub grants: Vec<EntitlementGrant>,
}

/// Derives and grants the entitlements owed by a paid transaction,
/// exactly once. Re-invocation for the same transaction returns the same
/// grant set: inserts are fenced by the `(payment_transaction_id,
/// product_id)` unique index and the coupon counter only moves on the
/// pass that created the transaction's first grant.
#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DbPool>,
    plans: Arc<PlanService>,
    users: Arc<UserService>,
    coupons: Arc<CouponService>,
    books: Arc<BookArtifactService>,
    transactions: Arc<TransactionService>,
    event_sender: Option<Arc<EventSender>>,
}

impl FulfillmentService {
    pub fn new(
        db: Arc<DbPool>,
        plans: Arc<PlanService>,
        users: Arc<UserService>,
        coupons: Arc<CouponService>,
        books: Arc<BookArtifactService>,
        transactions: Arc<TransactionService>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            plans,
            users,
            coupons,
            books,
            transactions,
            event_sender,
        }
    }

    /// Runs one idempotent fulfillment pass for a paid transaction.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn fulfill(&self, transaction_id: Uuid) -> Result<FulfillmentOutcome, ServiceError> {
        let transaction = self.transactions.get_required(transaction_id).await?;

        if !transaction.status.is_paid_or_later() {
            return Err(ServiceError::InvalidOperation(format!(
                "Transaction {} is not paid yet (status: {})",
                transaction_id, transaction.status
            )));
        }

        let plan = self.plans.get_plan(transaction.plan_id).await?;
        let products = self.plans.products_for(plan.id).await?;
        let user = self.users.get_user(transaction.user_id).await?;
        let email = transaction
            .email
            .clone()
            .unwrap_or_else(|| user.email.clone());

        let now = Utc::now();
        let planned = self.plan_grants(&transaction, &plan, products, now).await?;

        if planned.is_empty() {
            warn!(plan_id = %plan.id, "Plan resolves to no products; nothing to grant");
        }

        let existing = Subscription::find()
            .filter(subscription::Column::PaymentTransactionId.eq(transaction.id))
            .all(&*self.db)
            .await?;
        let first_pass = existing.is_empty();
        let existing_products: HashSet<Uuid> = existing.iter().map(|s| s.product_id).collect();

        // Grants and the coupon increment commit together: a lost
        // quota race rolls the whole pass back instead of leaving
        // entitlements behind an unredeemed coupon.
        let txn = self.db.begin().await?;

        let mut inserted_products: HashSet<Uuid> = HashSet::new();
        for grant in &planned {
            if existing_products.contains(&grant.product.id) {
                continue;
            }

            let row = subscription::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(transaction.user_id),
                product_id: Set(grant.product.id),
                coupon_id: Set(transaction.coupon_id),
                payment_transaction_id: Set(transaction.id),
                system_until: Set(grant.valid_until),
                system_step: Set(transaction.system_step.clone()),
                created_at: Set(now),
            };

            let inserted = Subscription::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        subscription::Column::PaymentTransactionId,
                        subscription::Column::ProductId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;

            if inserted > 0 {
                inserted_products.insert(grant.product.id);
                counter!("academy_fulfillment.subscriptions_created", 1);
            }
        }

        // Exactly-once coupon redemption, keyed by the transaction id: a
        // use is consumed only by the pass that created the transaction's
        // first grant, so duplicate webhooks cannot double-increment.
        let mut redeemed_coupon = None;
        if first_pass && !inserted_products.is_empty() {
            if let Some(coupon_id) = transaction.coupon_id {
                self.coupons.redeem(&txn, coupon_id).await?;
                redeemed_coupon = Some(coupon_id);
            }
        }

        txn.commit().await?;

        if let (Some(coupon_id), Some(event_sender)) = (redeemed_coupon, &self.event_sender) {
            if let Err(e) = event_sender
                .send(Event::CouponRedeemed {
                    coupon_id,
                    transaction_id: transaction.id,
                })
                .await
            {
                warn!(error = %e, "Failed to send coupon redeemed event");
            }
        }

        let rows = Subscription::find()
            .filter(subscription::Column::PaymentTransactionId.eq(transaction.id))
            .all(&*self.db)
            .await?;
        let by_product: HashMap<Uuid, SubscriptionModel> =
            rows.into_iter().map(|s| (s.product_id, s)).collect();

        let mut current = transaction;
        let mut grants = Vec::with_capacity(planned.len());
        for planned_grant in planned {
            let subscription = by_product.get(&planned_grant.product.id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Subscription for transaction {} product {} missing after grant pass",
                    current.id, planned_grant.product.id
                ))
            })?;

            if inserted_products.contains(&planned_grant.product.id) {
                if let Some(event_sender) = &self.event_sender {
                    if let Err(e) = event_sender
                        .send(Event::SubscriptionCreated {
                            subscription_id: subscription.id,
                            transaction_id: current.id,
                            product_id: planned_grant.product.id,
                        })
                        .await
                    {
                        warn!(error = %e, "Failed to send subscription created event");
                    }
                }
            }

            let book = match planned_grant.kind {
                EntitlementKind::Book => {
                    let artifact = self
                        .books
                        .ensure_artifact(
                            &current,
                            &planned_grant.product,
                            &email,
                            user.vat_id.as_deref(),
                        )
                        .await?;
                    // The orchestrator may have advanced the ledger.
                    current = self.transactions.get_required(current.id).await?;
                    Some(artifact)
                }
                EntitlementKind::SystemAccess => None,
            };

            grants.push(EntitlementGrant {
                subscription_id: subscription.id,
                product_id: planned_grant.product.id,
                product_name: planned_grant.product.name.clone(),
                product_type: planned_grant.product.product_type,
                kind: planned_grant.kind,
                valid_until: subscription.system_until,
                book,
            });
        }

        let final_transaction = self.finalize(current).await?;

        info!(
            transaction_id = %final_transaction.id,
            grants = grants.len(),
            newly_granted = inserted_products.len(),
            "Fulfillment pass completed"
        );

        Ok(FulfillmentOutcome {
            transaction: final_transaction,
            grants,
        })
    }

    /// Derives the full entitlement set a transaction owes. Pure with
    /// respect to the ledger: reading the catalog is the only I/O.
    async fn plan_grants(
        &self,
        transaction: &TransactionModel,
        plan: &crate::entities::plan::Model,
        products: Vec<ProductModel>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlannedGrant>, ServiceError> {
        let mut planned = Vec::with_capacity(products.len() + 1);

        match plan.package_type {
            PackageType::Book => {
                for product in products {
                    planned.push(PlannedGrant {
                        product,
                        kind: EntitlementKind::Book,
                        valid_until: now + Duration::days(BOOK_ACCESS_DAYS),
                    });
                }
            }
            PackageType::System => {
                // Whole-day arithmetic: calendar days, immune to DST
                // edge effects.
                let system_until = now + Duration::days(i64::from(plan.days));
                for product in products {
                    planned.push(PlannedGrant {
                        product,
                        kind: EntitlementKind::SystemAccess,
                        valid_until: system_until,
                    });
                }

                if transaction.book_included {
                    match plan.book_addon() {
                        Some(addon) => {
                            let product = self.plans.get_product(addon.product_id).await?;
                            planned.push(PlannedGrant {
                                product,
                                kind: EntitlementKind::Book,
                                valid_until: now + Duration::days(BOOK_ACCESS_DAYS),
                            });
                        }
                        None => {
                            warn!(
                                plan_id = %plan.id,
                                "Transaction has book_included but plan carries no addon"
                            );
                        }
                    }
                }
            }
        }

        Ok(planned)
    }

    /// Advances the ledger to `fulfilled` once every grant is durable.
    /// Tolerates a concurrent pass winning the final transition; any
    /// other rejection is surfaced.
    async fn finalize(&self, current: TransactionModel) -> Result<TransactionModel, ServiceError> {
        if current.status == TransactionStatus::Fulfilled {
            return Ok(current);
        }

        match self
            .transactions
            .transition(current.id, TransactionStatus::Fulfilled, "fulfiller")
            .await
        {
            Ok(updated) => {
                if let Some(event_sender) = &self.event_sender {
                    if let Err(e) = event_sender
                        .send(Event::PurchaseCompleted {
                            transaction_id: updated.id,
                        })
                        .await
                    {
                        warn!(error = %e, "Failed to send purchase completed event");
                    }
                }
                Ok(updated)
            }
            Err(ServiceError::InvalidTransition {
                from: TransactionStatus::Fulfilled,
                ..
            }) => self.transactions.get_required(current.id).await,
            Err(e) => Err(e),
        }
    }
}

struct PlannedGrant {
    product: ProductModel,
    kind: EntitlementKind,
    valid_until: DateTime<Utc>,
}
