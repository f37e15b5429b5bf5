pub mod checkout;
pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;

use std::sync::Arc;

use crate::{
    db::DbPool,
    services::{checkout::TaxPolicy, coupons::CouponService, orders::OrderService},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, tax_policy: TaxPolicy) -> Self {
        Self {
            coupons: Arc::new(CouponService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(db_pool, tax_policy)),
        }
    }

    /// Swaps in a preconfigured order service (used to pin order numbers in tests).
    pub fn with_order_service(mut self, orders: OrderService) -> Self {
        self.orders = Arc::new(orders);
        self
    }
}
