//! Property-based tests for checkout pricing, coupon discounts and order numbers.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::{
    entities::coupon::{self, DiscountType},
    services::{
        checkout::{round2, AppliedCoupon, CartLineItem, CheckoutState, TaxPolicy},
        coupons::evaluate,
        order_numbers::{is_valid_order_number, OrderNumberGenerator, RandomOrderNumbers},
    },
};
use uuid::Uuid;

fn cents_strategy(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (0i64..=max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

fn item_strategy() -> impl Strategy<Value = CartLineItem> {
    ("[a-z]{3,8}", cents_strategy(100_000), 1i32..20).prop_map(|(id, price, quantity)| {
        CartLineItem {
            product_id: format!("sku-{}", id),
            product_name: id,
            product_image: None,
            quantity,
            price,
            options: None,
        }
    })
}

fn coupon_strategy() -> impl Strategy<Value = coupon::Model> {
    prop_oneof![
        (1i64..=100).prop_map(|pct| (DiscountType::Percentage, Decimal::from(pct))),
        (1i64..=50_000).prop_map(|cents| (DiscountType::Fixed, Decimal::new(cents, 2))),
    ]
    .prop_map(|(discount_type, discount_value)| {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "PROP".into(),
            discount_type,
            discount_value,
            min_purchase_amount: Decimal::ZERO,
            usage_limit: None,
            used_count: 0,
            expiration_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn discount_stays_within_cart_total(
        coupon in coupon_strategy(),
        cart_total in cents_strategy(1_000_000),
    ) {
        let discount = evaluate(&coupon, cart_total, Utc::now()).unwrap();
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= cart_total, "{} > {}", discount, cart_total);
        prop_assert_eq!(discount, round2(discount));
    }

    #[test]
    fn subtotal_is_order_independent(
        items in prop::collection::vec(item_strategy(), 1..12),
    ) {
        let expected: Decimal = items
            .iter()
            .map(|i| i.price * Decimal::from(i.quantity))
            .sum();

        let mut forward = CheckoutState::new(TaxPolicy::None);
        forward.set_items(items.clone());

        let mut reversed_items = items;
        reversed_items.reverse();
        let mut reversed = CheckoutState::new(TaxPolicy::None);
        reversed.set_items(reversed_items);

        prop_assert_eq!(forward.totals().subtotal, expected);
        prop_assert_eq!(reversed.totals().subtotal, expected);
    }

    #[test]
    fn total_never_goes_negative(
        items in prop::collection::vec(item_strategy(), 1..6),
        discount in cents_strategy(10_000_000),
    ) {
        let mut state = CheckoutState::new(TaxPolicy::Rate(Decimal::new(8, 2)));
        state.set_items(items);
        state.apply_coupon(AppliedCoupon { code: "BIG".into(), discount_amount: discount });

        let totals = state.totals();
        prop_assert!(totals.discount_amount <= totals.subtotal);
        prop_assert!(totals.total >= Decimal::ZERO);
        prop_assert_eq!(
            totals.total,
            totals.subtotal + totals.shipping_cost + totals.tax - totals.discount_amount
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn generated_order_numbers_are_well_formed(_seed in any::<u8>()) {
        let candidate = RandomOrderNumbers.next_candidate();
        prop_assert!(is_valid_order_number(&candidate), "bad order number {}", candidate);
    }

    #[test]
    fn order_number_check_requires_prefix_and_six_digits(s in "[A-Z]{2}-[0-9]{1,9}") {
        let expected = s.starts_with("AG-") && s.len() == 9;
        prop_assert_eq!(is_valid_order_number(&s), expected);
    }
}
