// Checkout pricing and submission shape
pub mod checkout;

// Coupon rules, validation and admin management
pub mod coupons;

// Order placement and fulfilment
pub mod order_numbers;
pub mod orders;
