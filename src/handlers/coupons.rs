use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError, services::coupons::DiscountDescriptor, ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "system_step is required"))]
    pub system_step: String,
    pub plan_id: Option<Uuid>,
}

/// POST /api/v1/coupons/validate
///
/// Read-only coupon check for the checkout UI. Consumes nothing: quota
/// is only decremented when a transaction is fulfilled.
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<DiscountDescriptor>>, ServiceError> {
    payload.validate()?;

    let descriptor = state
        .services
        .coupons
        .validate(payload.code.trim(), &payload.system_step, payload.plan_id)
        .await?;

    Ok(Json(ApiResponse::success(descriptor)))
}
