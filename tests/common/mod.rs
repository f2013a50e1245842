use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use academy_api::{
    config::AppConfig,
    db,
    entities::{
        coupon::{self, CouponType},
        plan::{self, PackageType},
        plan_product,
        product::{self, ProductType},
        user,
    },
    events::{self, EventSender},
    handlers::AppServices,
    notifications::NullMailer,
    AppState,
};

/// Helper harness for spinning up an application state backed by a
/// throwaway SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_file = format!("academy_test_{}.db", Uuid::new_v4().simple());
        let _ = std::fs::remove_file(&db_file);

        let mut cfg = AppConfig::new(
            format!("sqlite://{db_file}?mode=rwc"),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            &cfg,
            Arc::new(NullMailer),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", academy_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Issue a request against the in-process router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request body"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn seed_user(&self, auth_id: &str, email: &str, vat_id: Option<&str>) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            auth_id: Set(auth_id.to_string()),
            email: Set(email.to_string()),
            full_name: Set("Test Student".to_string()),
            vat_id: Set(vat_id.map(|v| v.to_string())),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_product(
        &self,
        name: &str,
        package_type: PackageType,
        product_type: ProductType,
        system_step: &str,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            package_type: Set(package_type),
            product_type: Set(product_type),
            system_step: Set(system_step.to_string()),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_plan(
        &self,
        name: &str,
        package_type: PackageType,
        price: i64,
        days: i32,
        system_step: &str,
        display_data: Option<Value>,
    ) -> plan::Model {
        let now = Utc::now();
        plan::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            package_type: Set(package_type),
            price: Set(price),
            days: Set(days),
            system_step: Set(system_step.to_string()),
            is_active: Set(true),
            display_data: Set(display_data),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed plan")
    }

    pub async fn link_plan_product(&self, plan_id: Uuid, product_id: Uuid, position: i32) {
        plan_product::ActiveModel {
            id: Set(Uuid::new_v4()),
            plan_id: Set(plan_id),
            product_id: Set(product_id),
            position: Set(position),
        }
        .insert(&*self.state.db)
        .await
        .expect("link plan product");
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seed_coupon(
        &self,
        code: &str,
        coupon_type: CouponType,
        value: i64,
        system_step: &str,
        max_uses: i32,
        plan_id: Option<Uuid>,
        window: Option<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)>,
    ) -> coupon::Model {
        let now = Utc::now();
        let (valid_from, valid_until) =
            window.unwrap_or((now - Duration::days(7), now + Duration::days(7)));

        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            coupon_type: Set(coupon_type),
            value: Set(value),
            valid_from: Set(valid_from),
            valid_until: Set(valid_until),
            is_active: Set(true),
            max_uses: Set(max_uses),
            uses: Set(0),
            plan_id: Set(plan_id),
            organization_year_id: Set(None),
            system_step: Set(system_step.to_string()),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 response")
}
