//! Human-readable order numbers of the form `AG-123456`.

use rand::Rng;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::warn;

use crate::{
    entities::order::{self, Entity as Order},
    errors::ServiceError,
};

pub const ORDER_NUMBER_PREFIX: &str = "AG-";

/// Draws made before giving up on finding an unused number.
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 10;

/// Source of candidate order numbers. Candidates need not be unique; the caller
/// checks them against existing orders.
pub trait OrderNumberGenerator: Send + Sync {
    fn next_candidate(&self) -> String;
}

/// Formats a number in `0..=999_999` as an order number.
pub fn format_order_number(n: u32) -> String {
    format!("{}{:06}", ORDER_NUMBER_PREFIX, n % 1_000_000)
}

pub fn is_valid_order_number(candidate: &str) -> bool {
    candidate
        .strip_prefix(ORDER_NUMBER_PREFIX)
        .map(|digits| digits.len() == 6 && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomOrderNumbers;

impl OrderNumberGenerator for RandomOrderNumbers {
    fn next_candidate(&self) -> String {
        format_order_number(rand::thread_rng().gen_range(0..1_000_000))
    }
}

/// Returns the first candidate not already used by an order on `conn`.
pub async fn allocate_order_number<C: ConnectionTrait>(
    conn: &C,
    generator: &dyn OrderNumberGenerator,
) -> Result<String, ServiceError> {
    for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
        let candidate = generator.next_candidate();
        let taken = Order::find()
            .filter(order::Column::OrderNumber.eq(candidate.as_str()))
            .count(conn)
            .await?
            > 0;
        if !taken {
            return Ok(candidate);
        }
        warn!(attempt, order_number = %candidate, "Order number already in use");
    }

    Err(ServiceError::Conflict(
        "Could not allocate a unique order number".to_string(),
    ))
}
