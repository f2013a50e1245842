use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        payment_transaction::{Model as TransactionModel, TransactionStatus},
        plan::Model as PlanModel,
    },
    errors::ServiceError,
    events::Event,
    notifications,
    services::{coupons::DiscountDescriptor, fulfillment::FulfillmentOutcome, pricing},
    ApiResponse, AppState,
};

use super::success_page::render_success_page;

#[derive(Debug, Deserialize, Validate)]
pub struct PreviewRequest {
    pub plan_id: Uuid,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub book_included: bool,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    /// Effective base including the book add-on surcharge when opted in.
    pub base_price: i64,
    pub final_price: i64,
    pub discount: Option<DiscountDescriptor>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "auth_id is required"))]
    pub auth_id: String,
    pub plan_id: Uuid,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub book_included: bool,
    pub student_name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub transaction_id: Uuid,
    pub total_price: i64,
    pub status: TransactionStatus,
}

/// Pricing shared by preview and checkout: the two must agree exactly,
/// so both run through the same pure calculation on the same inputs.
struct PricedCheckout {
    plan: PlanModel,
    discount: Option<DiscountDescriptor>,
    base_price: i64,
    final_price: i64,
}

async fn price_checkout(
    state: &AppState,
    plan_id: Uuid,
    coupon_code: Option<&str>,
    book_included: bool,
) -> Result<PricedCheckout, ServiceError> {
    let plan = state.services.plans.get_active_plan(plan_id).await?;

    let discount = match coupon_code.map(str::trim) {
        Some(code) if !code.is_empty() => Some(
            state
                .services
                .coupons
                .validate(code, &plan.system_step, Some(plan.id))
                .await?,
        ),
        _ => None,
    };

    let addon = plan.book_addon();
    let base_price = pricing::calculate_price(plan.price, None, book_included, addon.as_ref());
    let final_price = pricing::calculate_price(
        plan.price,
        discount.as_ref(),
        book_included,
        addon.as_ref(),
    );

    Ok(PricedCheckout {
        plan,
        discount,
        base_price,
        final_price,
    })
}

/// POST /api/v1/checkout/preview
///
/// Read-only price preview for the checkout page; also the analytics
/// signal that the page was rendered.
pub async fn preview_checkout(
    State(state): State<AppState>,
    Json(payload): Json<PreviewRequest>,
) -> Result<Json<ApiResponse<PreviewResponse>>, ServiceError> {
    payload.validate()?;

    if let Err(e) = state
        .event_sender
        .send(Event::CheckoutPageViewed {
            plan_id: payload.plan_id,
            coupon_code: payload.coupon_code.clone(),
        })
        .await
    {
        warn!(error = %e, "Failed to send checkout page viewed event");
    }

    let priced = price_checkout(
        &state,
        payload.plan_id,
        payload.coupon_code.as_deref(),
        payload.book_included,
    )
    .await?;

    Ok(Json(ApiResponse::success(PreviewResponse {
        base_price: priced.base_price,
        final_price: priced.final_price,
        discount: priced.discount,
    })))
}

/// POST /api/v1/checkout
///
/// Validates user, plan and coupon, prices the purchase and records the
/// transaction in `created` state. Funds are captured by the external
/// payment provider; fulfillment happens on its completion callback.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    payload.validate()?;

    let user = state
        .services
        .users
        .get_user_by_auth_id(&payload.auth_id)
        .await?;

    let priced = price_checkout(
        &state,
        payload.plan_id,
        payload.coupon_code.as_deref(),
        payload.book_included,
    )
    .await?;

    let transaction = state
        .services
        .transactions
        .create(crate::services::transactions::CreateTransactionInput {
            user_id: user.id,
            plan_id: priced.plan.id,
            coupon_id: priced.discount.as_ref().map(|d| d.id),
            total_price: priced.final_price,
            book_included: payload.book_included,
            student_name: payload.student_name,
            email: payload.email,
            system_step: priced.plan.system_step.clone(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CheckoutResponse {
            transaction_id: transaction.id,
            total_price: transaction.total_price,
            status: transaction.status,
        })),
    ))
}

/// POST /api/v1/checkout/free
///
/// Zero-cost fast path: requires a coupon that prices the purchase at
/// exactly zero, then runs the whole pipeline synchronously and returns
/// the confirmation document.
pub async fn free_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Html<String>, ServiceError> {
    payload.validate()?;

    let coupon_code = payload
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            ServiceError::ValidationError("coupon_code is required for free checkout".to_string())
        })?;

    let user = state
        .services
        .users
        .get_user_by_auth_id(&payload.auth_id)
        .await?;

    let priced = price_checkout(
        &state,
        payload.plan_id,
        Some(coupon_code),
        payload.book_included,
    )
    .await?;

    if priced.final_price != 0 {
        return Err(ServiceError::PricingInvariant(format!(
            "Free checkout requires a fully discounted price; computed {} for plan {}",
            priced.final_price, priced.plan.id
        )));
    }

    let transaction = state
        .services
        .transactions
        .create(crate::services::transactions::CreateTransactionInput {
            user_id: user.id,
            plan_id: priced.plan.id,
            coupon_id: priced.discount.as_ref().map(|d| d.id),
            total_price: 0,
            book_included: payload.book_included,
            student_name: payload.student_name,
            email: payload.email,
            system_step: priced.plan.system_step.clone(),
        })
        .await?;

    state
        .services
        .transactions
        .transition(transaction.id, TransactionStatus::Paid, "free_checkout")
        .await?;

    let outcome = state.services.fulfillment.fulfill(transaction.id).await?;
    dispatch_notifications(&state, &outcome).await;

    Ok(Html(render_success_page(&outcome)))
}

/// POST /api/v1/checkout/:id/complete
///
/// Post-capture callback (provider webhook or success redirect). Safe to
/// deliver more than once: the first delivery wins the `created → paid`
/// transition, later ones re-enter the idempotent fulfiller.
pub async fn complete_checkout(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Html<String>, ServiceError> {
    let transaction = state
        .services
        .transactions
        .get_required(transaction_id)
        .await?;

    match transaction.status {
        TransactionStatus::Created => {
            state
                .services
                .transactions
                .transition(transaction_id, TransactionStatus::Paid, "payment_callback")
                .await?;
        }
        status if status.is_paid_or_later() => {
            debug!(
                transaction_id = %transaction_id,
                status = %status,
                "Duplicate completion delivery, continuing idempotently"
            );
        }
        status => {
            return Err(ServiceError::InvalidOperation(format!(
                "Transaction {} cannot be completed from status {}",
                transaction_id, status
            )));
        }
    }

    let outcome = state.services.fulfillment.fulfill(transaction_id).await?;
    dispatch_notifications(&state, &outcome).await;

    Ok(Html(render_success_page(&outcome)))
}

/// GET /api/v1/checkout/:id/success
///
/// Re-renders the confirmation for a paid transaction. Because the
/// fulfiller is idempotent this doubles as the repair path for transient
/// downstream failures: reloading the page retries them.
pub async fn checkout_success(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Html<String>, ServiceError> {
    let transaction = state
        .services
        .transactions
        .get_required(transaction_id)
        .await?;

    if !transaction.status.is_paid_or_later() {
        return Err(ServiceError::InvalidOperation(format!(
            "Transaction {} has not been paid (status: {})",
            transaction_id, transaction.status
        )));
    }

    let outcome = state.services.fulfillment.fulfill(transaction_id).await?;
    dispatch_notifications(&state, &outcome).await;

    Ok(Html(render_success_page(&outcome)))
}

/// Resolves the delivery recipient and hands book notifications to the
/// mail transport. Runs after entitlements are durable; failures here
/// never surface to the caller.
async fn dispatch_notifications(state: &AppState, outcome: &FulfillmentOutcome) {
    let transaction: &TransactionModel = &outcome.transaction;

    let recipient = match &transaction.email {
        Some(email) => email.clone(),
        None => match state.services.users.get_user(transaction.user_id).await {
            Ok(user) => user.email,
            Err(e) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "No recipient resolvable for book notifications"
                );
                return;
            }
        },
    };

    notifications::dispatch_book_notifications(
        state.services.mailer.clone(),
        recipient,
        transaction.student_name.clone(),
        &outcome.grants,
    );
}
