//! Integration tests for the checkout pipeline endpoints.
//!
//! Tests cover:
//! - Zero-cost redemption end to end (coupon -> paid -> fulfilled -> HTML)
//! - Pricing invariant enforcement on the free endpoint
//! - Preview/checkout pricing agreement
//! - Coupon validation precedence and rejection codes

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, response_text, TestApp};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use academy_api::entities::{
    coupon::{self, CouponType},
    payment_transaction::TransactionStatus,
    plan::PackageType,
    product::ProductType,
    subscription,
};

#[tokio::test]
async fn zero_cost_redemption_runs_the_whole_pipeline() {
    let app = TestApp::new().await;

    let user = app
        .seed_user("auth-zero", "zero@example.com", None)
        .await;
    let product = app
        .seed_product(
            "Full System Access",
            PackageType::System,
            ProductType::SystemAccess,
            "2026",
        )
        .await;
    let plan = app
        .seed_plan("System Plan", PackageType::System, 100, 180, "2026", None)
        .await;
    app.link_plan_product(plan.id, product.id, 0).await;
    let coupon = app
        .seed_coupon("FREE100", CouponType::Percentage, 100, "2026", 5, None, None)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/free",
            Some(json!({
                "auth_id": "auth-zero",
                "plan_id": plan.id,
                "coupon_code": "FREE100",
                "book_included": false
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = response_text(response).await;

    // One entitlement block per product in the plan, plus the parent
    // frame notification.
    assert_eq!(html.matches("class=\"entitlement ").count(), 1);
    assert!(html.contains("Full System Access"));
    assert!(html.contains(r#"window.parent.postMessage({"status": "success"}, "*")"#));

    // Durable state: fulfilled transaction, one subscription, one
    // consumed coupon use.
    let transactions = app
        .state
        .services
        .transactions
        .list_for_user(user.id)
        .await
        .expect("list transactions");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, TransactionStatus::Fulfilled);
    assert_eq!(transactions[0].total_price, 0);

    let subscriptions = subscription::Entity::find()
        .filter(subscription::Column::PaymentTransactionId.eq(transactions[0].id))
        .all(&*app.state.db)
        .await
        .expect("list subscriptions");
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].product_id, product.id);

    let coupon_row = coupon::Entity::find_by_id(coupon.id)
        .one(&*app.state.db)
        .await
        .expect("query coupon")
        .expect("coupon exists");
    assert_eq!(coupon_row.uses, 1);
}

#[tokio::test]
async fn free_endpoint_rejects_non_zero_price() {
    let app = TestApp::new().await;

    app.seed_user("auth-partial", "partial@example.com", None)
        .await;
    let product = app
        .seed_product(
            "Full System Access",
            PackageType::System,
            ProductType::SystemAccess,
            "2026",
        )
        .await;
    let plan = app
        .seed_plan("System Plan", PackageType::System, 200, 180, "2026", None)
        .await;
    app.link_plan_product(plan.id, product.id, 0).await;
    app.seed_coupon("SAVE50", CouponType::Fixed, 50, "2026", 5, None, None)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/free",
            Some(json!({
                "auth_id": "auth-partial",
                "plan_id": plan.id,
                "coupon_code": "SAVE50",
                "book_included": false
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "pricing_invariant");

    // Rejected synchronously: no transaction recorded.
    let user = app
        .state
        .services
        .users
        .get_user_by_auth_id("auth-partial")
        .await
        .expect("user");
    let transactions = app
        .state
        .services
        .transactions
        .list_for_user(user.id)
        .await
        .expect("list transactions");
    assert!(transactions.is_empty());
}

#[tokio::test]
async fn preview_and_checkout_price_identically() {
    let app = TestApp::new().await;

    app.seed_user("auth-preview", "preview@example.com", None)
        .await;
    let product = app
        .seed_product(
            "Full System Access",
            PackageType::System,
            ProductType::SystemAccess,
            "2026",
        )
        .await;
    let plan = app
        .seed_plan("System Plan", PackageType::System, 200, 180, "2026", None)
        .await;
    app.link_plan_product(plan.id, product.id, 0).await;
    app.seed_coupon("SAVE50", CouponType::Fixed, 50, "2026", 5, None, None)
        .await;

    let preview = app
        .request(
            Method::POST,
            "/api/v1/checkout/preview",
            Some(json!({
                "plan_id": plan.id,
                "coupon_code": "SAVE50",
                "book_included": false
            })),
        )
        .await;
    assert_eq!(preview.status(), StatusCode::OK);
    let preview_body = response_json(preview).await;
    assert_eq!(preview_body["data"]["base_price"], 200);
    assert_eq!(preview_body["data"]["final_price"], 150);

    let checkout = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "auth_id": "auth-preview",
                "plan_id": plan.id,
                "coupon_code": "SAVE50",
                "book_included": false
            })),
        )
        .await;
    assert_eq!(checkout.status(), StatusCode::CREATED);
    let checkout_body = response_json(checkout).await;
    assert_eq!(checkout_body["data"]["total_price"], 150);
    assert_eq!(checkout_body["data"]["status"], "created");
}

#[tokio::test]
async fn coupon_validation_reports_first_failing_check() {
    let app = TestApp::new().await;

    let now = chrono::Utc::now();

    // Expired AND over-quota: the window check wins, consistently.
    app.seed_coupon(
        "OLDCODE",
        CouponType::Percentage,
        10,
        "2026",
        0,
        None,
        Some((now - chrono::Duration::days(30), now - chrono::Duration::days(1))),
    )
    .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({"code": "OLDCODE", "system_step": "2026"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "coupon_rejected:expired");

    // Same code exists only for another cohort.
    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({"code": "OLDCODE", "system_step": "2027"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "coupon_rejected:wrong_system_step");

    // Unknown code.
    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({"code": "NOPE", "system_step": "2026"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "coupon_rejected:not_found");
}

#[tokio::test]
async fn validation_consumes_no_quota() {
    let app = TestApp::new().await;

    let coupon = app
        .seed_coupon("KEEP", CouponType::Percentage, 10, "2026", 3, None, None)
        .await;

    for _ in 0..4 {
        let response = app
            .request(
                Method::POST,
                "/api/v1/coupons/validate",
                Some(json!({"code": "KEEP", "system_step": "2026"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let coupon_row = coupon::Entity::find_by_id(coupon.id)
        .one(&*app.state.db)
        .await
        .expect("query coupon")
        .expect("coupon exists");
    assert_eq!(coupon_row.uses, 0);
}

#[tokio::test]
async fn unknown_user_is_unauthorized() {
    let app = TestApp::new().await;

    let product = app
        .seed_product(
            "Full System Access",
            PackageType::System,
            ProductType::SystemAccess,
            "2026",
        )
        .await;
    let plan = app
        .seed_plan("System Plan", PackageType::System, 100, 180, "2026", None)
        .await;
    app.link_plan_product(plan.id, product.id, 0).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "auth_id": "who-is-this",
                "plan_id": plan.id,
                "book_included": false
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_plan_is_not_found() {
    let app = TestApp::new().await;
    app.seed_user("auth-np", "np@example.com", None).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "auth_id": "auth-np",
                "plan_id": uuid::Uuid::new_v4(),
                "book_included": false
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
