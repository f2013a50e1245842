use crate::{
    db::DbPool,
    entities::payment_transaction::{
        self, ActiveModel as TransactionActiveModel, Entity as PaymentTransaction,
        Model as TransactionModel, TransactionStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Input for creating a payment transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionInput {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub total_price: i64,
    pub book_included: bool,
    pub student_name: Option<String>,
    pub email: Option<String>,
    pub system_step: String,
}

/// The transaction ledger: the single source of truth for whether a
/// purchase has been fulfilled. Rows are created once per checkout
/// attempt and only ever mutated through status transitions.
#[derive(Clone)]
pub struct TransactionService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl TransactionService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Inserts a new transaction in `created` state. Retried checkout
    /// attempts get new rows; deduplication lives at the entitlement
    /// layer, never here.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, plan_id = %input.plan_id))]
    pub async fn create(
        &self,
        input: CreateTransactionInput,
    ) -> Result<TransactionModel, ServiceError> {
        let now = Utc::now();
        let transaction_id = Uuid::new_v4();

        let active = TransactionActiveModel {
            id: Set(transaction_id),
            user_id: Set(input.user_id),
            plan_id: Set(input.plan_id),
            coupon_id: Set(input.coupon_id),
            status: Set(TransactionStatus::Created),
            total_price: Set(input.total_price),
            book_included: Set(input.book_included),
            student_name: Set(input.student_name),
            email: Set(input.email),
            system_step: Set(input.system_step),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let model = active.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to create payment transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(transaction_id = %transaction_id, total_price = model.total_price, "Payment transaction created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PurchaseInitiated {
                    transaction_id,
                    plan_id: model.plan_id,
                    coupon_id: model.coupon_id,
                    total_price: model.total_price,
                })
                .await
            {
                warn!(error = %e, transaction_id = %transaction_id, "Failed to send purchase initiated event");
            }
        }

        Ok(model)
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn get(&self, transaction_id: Uuid) -> Result<Option<TransactionModel>, ServiceError> {
        PaymentTransaction::find_by_id(transaction_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_required(&self, transaction_id: Uuid) -> Result<TransactionModel, ServiceError> {
        self.get(transaction_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
        })
    }

    /// Moves a transaction along the status lattice with a
    /// compare-and-set on the expected current status. `actor` names the
    /// pipeline step requesting the move and goes into the audit log.
    ///
    /// A rejected transition is a concurrency or programming defect: it
    /// is logged at error severity and surfaced, never retried here.
    #[instrument(skip(self), fields(transaction_id = %transaction_id, new_status = %new_status, actor = %actor))]
    pub async fn transition(
        &self,
        transaction_id: Uuid,
        new_status: TransactionStatus,
        actor: &str,
    ) -> Result<TransactionModel, ServiceError> {
        let current = self.get_required(transaction_id).await?;
        let from = current.status;

        if !from.can_transition(new_status) {
            error!(
                transaction_id = %transaction_id,
                from = %from,
                to = %new_status,
                actor = %actor,
                "Rejected invalid status transition"
            );
            return Err(ServiceError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        let now = Utc::now();
        let result = PaymentTransaction::update_many()
            .col_expr(payment_transaction::Column::Status, Expr::value(new_status))
            .col_expr(
                payment_transaction::Column::UpdatedAt,
                Expr::value(Some(now)),
            )
            .filter(payment_transaction::Column::Id.eq(transaction_id))
            .filter(payment_transaction::Column::Status.eq(from))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // A concurrent caller moved the row between our read and the
            // update; report against what is actually there now.
            let observed = self.get_required(transaction_id).await?;
            error!(
                transaction_id = %transaction_id,
                observed = %observed.status,
                to = %new_status,
                actor = %actor,
                "Lost status transition race"
            );
            return Err(ServiceError::InvalidTransition {
                from: observed.status,
                to: new_status,
            });
        }

        let updated = self.get_required(transaction_id).await?;

        info!(
            transaction_id = %transaction_id,
            old_status = %from,
            new_status = %new_status,
            actor = %actor,
            "Transaction status updated"
        );

        if new_status == TransactionStatus::Paid {
            if let Some(event_sender) = &self.event_sender {
                if let Err(e) = event_sender
                    .send(Event::PaymentSucceeded { transaction_id })
                    .await
                {
                    warn!(error = %e, transaction_id = %transaction_id, "Failed to send payment success event");
                }
            }
        }

        Ok(updated)
    }

    /// Audit/reconciliation view: every checkout attempt for a user,
    /// newest first, abandoned ones included.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransactionModel>, ServiceError> {
        PaymentTransaction::find()
            .filter(payment_transaction::Column::UserId.eq(user_id))
            .order_by_desc(payment_transaction::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_reaches_only_paid_failed_cancelled() {
        use TransactionStatus::*;
        assert!(Created.can_transition(Paid));
        assert!(Created.can_transition(Failed));
        assert!(Created.can_transition(Cancelled));
        assert!(!Created.can_transition(BookCreated));
        assert!(!Created.can_transition(Icount));
        assert!(!Created.can_transition(Fulfilled));
        assert!(!Created.can_transition(Created));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        use TransactionStatus::*;
        for terminal in [Fulfilled, Failed, Cancelled] {
            for target in [
                Created,
                Paid,
                BookCreated,
                Icount,
                Fulfilled,
                Failed,
                Cancelled,
            ] {
                assert!(
                    !terminal.can_transition(target),
                    "{terminal} -> {target} must be rejected"
                );
            }
        }
    }

    #[test]
    fn intermediate_markers_are_unordered() {
        use TransactionStatus::*;
        assert!(BookCreated.can_transition(Icount));
        assert!(Icount.can_transition(BookCreated));
        assert!(BookCreated.can_transition(Fulfilled));
        assert!(Icount.can_transition(Fulfilled));
    }

    #[test]
    fn paid_status_predicates() {
        use TransactionStatus::*;
        assert!(Paid.is_paid_or_later());
        assert!(Fulfilled.is_paid_or_later());
        assert!(!Created.is_paid_or_later());
        assert!(!Cancelled.is_paid_or_later());

        assert!(BookCreated.book_registered());
        assert!(!Paid.book_registered());
    }
}
