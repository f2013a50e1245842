pub mod checkout;
pub mod coupons;
pub mod success_page;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    notifications::Mailer,
    services::{
        books::BookArtifactService, coupons::CouponService, fulfillment::FulfillmentService,
        plans::PlanService, transactions::TransactionService, users::UserService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub plans: Arc<PlanService>,
    pub coupons: Arc<CouponService>,
    pub transactions: Arc<TransactionService>,
    pub books: Arc<BookArtifactService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppServices {
    /// Wires the service graph once at startup; handlers only clone Arcs.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let users = Arc::new(UserService::new(db_pool.clone()));
        let plans = Arc::new(PlanService::new(db_pool.clone()));
        let coupons = Arc::new(CouponService::new(db_pool.clone()));
        let transactions = Arc::new(TransactionService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let books = Arc::new(BookArtifactService::new(
            db_pool.clone(),
            transactions.clone(),
            Some(event_sender.clone()),
            config,
        ));
        let fulfillment = Arc::new(FulfillmentService::new(
            db_pool,
            plans.clone(),
            users.clone(),
            coupons.clone(),
            books.clone(),
            transactions.clone(),
            Some(event_sender),
        ));

        Self {
            users,
            plans,
            coupons,
            transactions,
            books,
            fulfillment,
            mailer,
        }
    }
}
