//! Checkout state aggregation.
//!
//! [`CheckoutState`] accumulates the shopper's selections for a single checkout
//! session and keeps the derived totals current after every mutation. It performs
//! no I/O: the storefront client holds one per session and the server builds one
//! to quote a cart and to re-derive the figures of a submitted order.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;

/// Largest price, cart total or coupon amount accepted from a client. Matches the
/// `decimal(12, 2)` money columns.
pub const MAX_MONEY_AMOUNT: Decimal = dec!(9999999999.99);

/// Largest quantity of a single cart line.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

/// Rejects amounts outside `[0, MAX_MONEY_AMOUNT]`.
pub fn check_money_amount(field: &str, amount: Decimal) -> Result<(), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            field
        )));
    }
    if amount > MAX_MONEY_AMOUNT {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot exceed {}",
            field, MAX_MONEY_AMOUNT
        )));
    }
    Ok(())
}

/// Rounds a monetary amount to cents, midpoint away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// How tax is derived from the discounted subtotal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TaxPolicy {
    #[default]
    None,
    /// Fraction of the taxable amount, e.g. `0.08` for 8%
    Rate(Decimal),
}

impl TaxPolicy {
    pub fn tax_on(&self, subtotal: Decimal, discount: Decimal) -> Decimal {
        match self {
            TaxPolicy::None => Decimal::ZERO,
            TaxPolicy::Rate(rate) => {
                let taxable = subtotal.saturating_sub(discount).max(Decimal::ZERO);
                round2(taxable.saturating_mul(*rate))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    #[schema(example = "express")]
    pub id: String,
    #[schema(example = "Express Shipping")]
    pub name: String,
    #[schema(value_type = String, example = "9.99")]
    pub price: Decimal,
    #[schema(example = "2-3 business days")]
    pub estimated_days: String,
}

impl ShippingMethod {
    fn new(id: &str, name: &str, price: Decimal, estimated_days: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            price,
            estimated_days: estimated_days.to_string(),
        }
    }

    pub fn standard() -> Self {
        Self::new("standard", "Standard Shipping", Decimal::ZERO, "5-7 business days")
    }
}

impl Default for ShippingMethod {
    fn default() -> Self {
        Self::standard()
    }
}

/// The fixed shipping catalog offered at checkout.
pub fn shipping_methods() -> Vec<ShippingMethod> {
    vec![
        ShippingMethod::standard(),
        ShippingMethod::new(
            "express",
            "Express Shipping",
            Decimal::new(999, 2),
            "2-3 business days",
        ),
        ShippingMethod::new(
            "overnight",
            "Overnight Shipping",
            Decimal::new(2499, 2),
            "1 business day",
        ),
    ]
}

/// Looks a method up by id, falling back to its display name.
pub fn find_shipping_method(key: &str) -> Option<ShippingMethod> {
    let key = key.trim();
    shipping_methods()
        .into_iter()
        .find(|m| m.id.eq_ignore_ascii_case(key) || m.name.eq_ignore_ascii_case(key))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 200, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, max = 255, message = "Address line 1 is required"))]
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, max = 20, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100, message = "Country is required"))]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Payment choice made at checkout. Card numbers never reach the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethodSelection {
    CreditCard {
        #[schema(example = "4242")]
        last4: String,
        #[schema(example = "12/27")]
        expiry: String,
    },
    Paypal,
    Klarna,
}

impl PaymentMethodSelection {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentMethodSelection::CreditCard { .. } => "credit_card",
            PaymentMethodSelection::Paypal => "paypal",
            PaymentMethodSelection::Klarna => "klarna",
        }
    }

    /// Rebuilds a selection from its persisted columns.
    pub fn from_parts(kind: &str, last4: Option<&str>, expiry: Option<&str>) -> Option<Self> {
        match kind {
            "credit_card" => Some(PaymentMethodSelection::CreditCard {
                last4: last4?.to_string(),
                expiry: expiry?.to_string(),
            }),
            "paypal" => Some(PaymentMethodSelection::Paypal),
            "klarna" => Some(PaymentMethodSelection::Klarna),
            _ => None,
        }
    }

    pub fn card_details(&self) -> (Option<String>, Option<String>) {
        match self {
            PaymentMethodSelection::CreditCard { last4, expiry } => {
                (Some(last4.clone()), Some(expiry.clone()))
            }
            _ => (None, None),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if let PaymentMethodSelection::CreditCard { last4, expiry } = self {
            if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
                return Err(ServiceError::ValidationError(
                    "Card last4 must be exactly 4 digits".to_string(),
                ));
            }
            if !is_valid_expiry(expiry) {
                return Err(ServiceError::ValidationError(
                    "Card expiry must be in MM/YY format".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn is_valid_expiry(expiry: &str) -> bool {
    let Some((month, year)) = expiry.split_once('/') else {
        return false;
    };
    let digits = |s: &str| s.len() == 2 && s.chars().all(|c| c.is_ascii_digit());
    if !digits(month) || !digits(year) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: String,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub options: Option<serde_json::Value>,
}

impl CartLineItem {
    pub fn line_total(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// Checks the line items a checkout can be priced from.
pub fn validate_items(items: &[CartLineItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }
    for item in items {
        if item.product_id.trim().is_empty() || item.product_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Each item needs a product id and name".to_string(),
            ));
        }
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be between 1 and {}",
                item.product_id, MAX_LINE_QUANTITY
            )));
        }
        check_money_amount(&format!("Price for {}", item.product_id), item.price)?;
    }
    check_money_amount("Subtotal", items_subtotal(items))
}

fn items_subtotal(items: &[CartLineItem]) -> Decimal {
    items
        .iter()
        .map(CartLineItem::line_total)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// A coupon that passed validation for the current cart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_amount: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    #[schema(value_type = String, example = "120.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub shipping_cost: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "10.00")]
    pub discount_amount: Decimal,
    #[schema(value_type = String, example = "110.00")]
    pub total: Decimal,
}

/// The finalized checkout as submitted to `POST /api/orders`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmission {
    pub shipping_address: ShippingAddress,
    /// Shipping method id (or display name)
    #[schema(example = "standard")]
    pub shipping_method: String,
    pub payment_method: PaymentMethodSelection,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub shipping_cost: Decimal,
    #[schema(value_type = String)]
    pub tax: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub items: Vec<CartLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub discount_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_used: Option<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutState {
    tax_policy: TaxPolicy,
    shipping_address: Option<ShippingAddress>,
    shipping_method: ShippingMethod,
    payment_method: Option<PaymentMethodSelection>,
    items: Vec<CartLineItem>,
    coupon: Option<AppliedCoupon>,
    totals: Totals,
}

impl Default for CheckoutState {
    fn default() -> Self {
        Self::new(TaxPolicy::None)
    }
}

impl CheckoutState {
    pub fn new(tax_policy: TaxPolicy) -> Self {
        Self {
            tax_policy,
            shipping_address: None,
            shipping_method: ShippingMethod::default(),
            payment_method: None,
            items: Vec::new(),
            coupon: None,
            totals: Totals::default(),
        }
    }

    pub fn set_shipping_address(&mut self, address: ShippingAddress) {
        self.shipping_address = Some(address);
    }

    pub fn set_shipping_method(&mut self, method: ShippingMethod) {
        self.shipping_method = method;
        self.recompute();
    }

    pub fn set_payment_method(&mut self, selection: PaymentMethodSelection) {
        self.payment_method = Some(selection);
    }

    pub fn set_items(&mut self, items: Vec<CartLineItem>) {
        self.items = items;
        self.recompute();
    }

    pub fn apply_coupon(&mut self, coupon: AppliedCoupon) {
        self.coupon = Some(coupon);
        self.recompute();
    }

    pub fn clear_coupon(&mut self) {
        self.coupon = None;
        self.recompute();
    }

    /// Returns to a fresh session, keeping the tax policy.
    pub fn reset(&mut self) {
        *self = Self::new(self.tax_policy.clone());
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn shipping_method(&self) -> &ShippingMethod {
        &self.shipping_method
    }

    pub fn payment_method(&self) -> Option<&PaymentMethodSelection> {
        self.payment_method.as_ref()
    }

    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    pub fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.missing_part().is_none()
    }

    fn missing_part(&self) -> Option<&'static str> {
        if self.shipping_address.is_none() {
            Some("shipping address")
        } else if self.payment_method.is_none() {
            Some("payment method")
        } else if self.items.is_empty() {
            Some("items")
        } else {
            None
        }
    }

    pub fn to_submission(&self) -> Result<OrderSubmission, ServiceError> {
        if let Some(part) = self.missing_part() {
            return Err(ServiceError::ValidationError(format!(
                "Checkout is missing {}",
                part
            )));
        }
        let (Some(address), Some(payment)) = (&self.shipping_address, &self.payment_method)
        else {
            return Err(ServiceError::InternalError(
                "checkout readiness check out of sync".to_string(),
            ));
        };

        Ok(OrderSubmission {
            shipping_address: address.clone(),
            shipping_method: self.shipping_method.id.clone(),
            payment_method: payment.clone(),
            subtotal: self.totals.subtotal,
            shipping_cost: self.totals.shipping_cost,
            tax: self.totals.tax,
            total: self.totals.total,
            items: self.items.clone(),
            coupon_code: self.coupon.as_ref().map(|c| c.code.clone()),
            discount_amount: self.coupon.as_ref().map(|_| self.totals.discount_amount),
            points_used: None,
        })
    }

    fn recompute(&mut self) {
        let subtotal = round2(items_subtotal(&self.items));
        let discount = self
            .coupon
            .as_ref()
            .map(|c| c.discount_amount.min(subtotal).max(Decimal::ZERO))
            .unwrap_or(Decimal::ZERO);
        let shipping_cost = self.shipping_method.price;
        let tax = self.tax_policy.tax_on(subtotal, discount);

        self.totals = Totals {
            subtotal,
            shipping_cost,
            tax,
            discount_amount: discount,
            total: subtotal
                .saturating_add(shipping_cost)
                .saturating_add(tax)
                .saturating_sub(discount),
        };
    }
}
