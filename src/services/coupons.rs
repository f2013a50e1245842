use crate::{
    db::DbPool,
    entities::coupon::{self, CouponType, Entity as Coupon, Model as CouponModel},
    errors::{CouponRejection, ServiceError},
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// The discount a validated coupon yields, detached from the mutable
/// coupon row so pricing stays pure.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountDescriptor {
    pub id: Uuid,
    pub coupon_type: CouponType,
    pub value: i64,
    pub plan_id: Option<Uuid>,
}

impl From<&CouponModel> for DiscountDescriptor {
    fn from(coupon: &CouponModel) -> Self {
        Self {
            id: coupon.id,
            coupon_type: coupon.coupon_type,
            value: coupon.value,
            plan_id: coupon.plan_id,
        }
    }
}

/// Service for coupon validation and redemption
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
}

impl CouponService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Validates a coupon code for a system step and optional plan.
    ///
    /// Read-only: quota consumption happens at fulfillment time through
    /// [`CouponService::redeem`], not here, so a user can re-validate
    /// while deciding without burning a use.
    #[instrument(skip(self), fields(code = %code, system_step = %system_step))]
    pub async fn validate(
        &self,
        code: &str,
        system_step: &str,
        plan_id: Option<Uuid>,
    ) -> Result<DiscountDescriptor, ServiceError> {
        let now = Utc::now();

        let candidates = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .order_by_desc(coupon::Column::ValidFrom)
            .all(&*self.db)
            .await?;

        if candidates.is_empty() {
            debug!("Coupon code not found");
            return Err(ServiceError::CouponRejected(CouponRejection::NotFound));
        }

        let step_matches: Vec<CouponModel> = candidates
            .into_iter()
            .filter(|c| c.system_step == system_step)
            .collect();

        if step_matches.is_empty() {
            debug!("Coupon code exists only for other system steps");
            return Err(ServiceError::CouponRejected(
                CouponRejection::WrongSystemStep,
            ));
        }

        // Codes repeat across issuance batches: prefer a candidate that
        // is usable right now, otherwise report on the newest one.
        let chosen = step_matches
            .iter()
            .position(|c| Self::evaluate(c, now, plan_id).is_ok())
            .unwrap_or(0);
        let coupon = &step_matches[chosen];

        Self::evaluate(coupon, now, plan_id).map_err(|rejection| {
            debug!(coupon_id = %coupon.id, rejection = %rejection, "Coupon rejected");
            ServiceError::CouponRejected(rejection)
        })?;

        Ok(DiscountDescriptor::from(coupon))
    }

    /// Evaluates all checks against a single coupon row in the fixed
    /// priority order: active flag, time window, quota, plan match.
    /// Existence and system-step matching happen during lookup.
    pub(crate) fn evaluate(
        coupon: &CouponModel,
        now: DateTime<Utc>,
        plan_id: Option<Uuid>,
    ) -> Result<(), CouponRejection> {
        if !coupon.is_active {
            return Err(CouponRejection::Inactive);
        }
        if now < coupon.valid_from {
            return Err(CouponRejection::NotYetValid);
        }
        if now > coupon.valid_until {
            return Err(CouponRejection::Expired);
        }
        if coupon.uses >= coupon.max_uses {
            return Err(CouponRejection::QuotaExhausted);
        }
        if let (Some(required), Some(requested)) = (coupon.plan_id, plan_id) {
            if required != requested {
                return Err(CouponRejection::PlanMismatch);
            }
        }
        Ok(())
    }

    /// Consumes one use of a coupon with a conditional atomic increment,
    /// on the caller's connection so the fulfiller can tie it to the
    /// same database transaction as the grants it guards.
    ///
    /// The WHERE clause re-checks quota, window and active flag so two
    /// transactions racing on the last use cannot over-redeem, and a
    /// coupon validated at T0 cannot be consumed after its window closed.
    #[instrument(skip(self, conn), fields(coupon_id = %coupon_id))]
    pub async fn redeem<C>(&self, conn: &C, coupon_id: Uuid) -> Result<(), ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        let result = Coupon::update_many()
            .col_expr(coupon::Column::Uses, Expr::col(coupon::Column::Uses).add(1))
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ValidFrom.lte(now))
            .filter(coupon::Column::ValidUntil.gte(now))
            .filter(Expr::col(coupon::Column::Uses).lt(Expr::col(coupon::Column::MaxUses)))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let coupon = Coupon::find_by_id(coupon_id)
                .one(conn)
                .await?
                .ok_or(ServiceError::CouponRejected(CouponRejection::NotFound))?;

            let rejection = Self::evaluate(&coupon, now, None)
                .err()
                .unwrap_or(CouponRejection::QuotaExhausted);

            warn!(
                coupon_id = %coupon_id,
                rejection = %rejection,
                "Coupon redemption refused after validation"
            );
            return Err(ServiceError::CouponRejected(rejection));
        }

        debug!("Coupon use consumed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(now: DateTime<Utc>) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "WELCOME".to_string(),
            coupon_type: CouponType::Percentage,
            value: 100,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
            max_uses: 10,
            uses: 0,
            plan_id: None,
            organization_year_id: None,
            system_step: "2026".to_string(),
            created_at: now - Duration::days(30),
            updated_at: None,
        }
    }

    #[test]
    fn valid_coupon_passes() {
        let now = Utc::now();
        assert_eq!(CouponService::evaluate(&coupon(now), now, None), Ok(()));
    }

    #[test]
    fn inactive_wins_over_everything() {
        let now = Utc::now();
        let mut c = coupon(now);
        c.is_active = false;
        c.valid_until = now - Duration::days(1);
        c.uses = c.max_uses;
        assert_eq!(
            CouponService::evaluate(&c, now, None),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn expired_wins_over_quota() {
        let now = Utc::now();
        let mut c = coupon(now);
        c.valid_until = now - Duration::hours(1);
        c.uses = c.max_uses;
        assert_eq!(
            CouponService::evaluate(&c, now, None),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn not_yet_valid_before_window() {
        let now = Utc::now();
        let mut c = coupon(now);
        c.valid_from = now + Duration::hours(1);
        assert_eq!(
            CouponService::evaluate(&c, now, None),
            Err(CouponRejection::NotYetValid)
        );
    }

    #[test]
    fn quota_exhaustion_rejects() {
        let now = Utc::now();
        let mut c = coupon(now);
        c.uses = c.max_uses;
        assert_eq!(
            CouponService::evaluate(&c, now, None),
            Err(CouponRejection::QuotaExhausted)
        );
    }

    #[test]
    fn plan_restriction_checked_last() {
        let now = Utc::now();
        let restricted_to = Uuid::new_v4();
        let mut c = coupon(now);
        c.plan_id = Some(restricted_to);

        // Matching plan passes
        assert_eq!(
            CouponService::evaluate(&c, now, Some(restricted_to)),
            Ok(())
        );
        // Different plan rejected
        assert_eq!(
            CouponService::evaluate(&c, now, Some(Uuid::new_v4())),
            Err(CouponRejection::PlanMismatch)
        );
        // No plan context: restriction not evaluated
        assert_eq!(CouponService::evaluate(&c, now, None), Ok(()));
        // Quota failure takes precedence over plan mismatch
        c.uses = c.max_uses;
        assert_eq!(
            CouponService::evaluate(&c, now, Some(Uuid::new_v4())),
            Err(CouponRejection::QuotaExhausted)
        );
    }
}
