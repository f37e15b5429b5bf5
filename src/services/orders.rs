use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedContext,
    db::DbPool,
    entities::{
        coupon,
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
    services::{
        checkout::{
            find_shipping_method, validate_items, AppliedCoupon, CartLineItem, CheckoutState,
            OrderSubmission, PaymentMethodSelection, ShippingAddress, ShippingMethod, TaxPolicy,
            Totals,
        },
        coupons::CouponService,
        order_numbers::{allocate_order_number, OrderNumberGenerator, RandomOrderNumbers},
    },
    PaginatedResponse,
};

/// Payment is taken before the order reaches us; there is no gateway callback.
const PAYMENT_STATUS_PAID: &str = "paid";
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: String,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub options: Option<serde_json::Value>,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            product_name: model.product_name,
            product_image: model.product_image,
            quantity: model.quantity,
            price: model.price,
            options: model.options,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    #[schema(example = "AG-048213")]
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: String,
    pub items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddress,
    #[schema(example = "Standard Shipping")]
    pub shipping_method: String,
    pub payment_method: PaymentMethodSelection,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub shipping_cost: Decimal,
    #[schema(value_type = String)]
    pub tax: Decimal,
    #[schema(value_type = String)]
    pub discount_amount: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub points_used: i32,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    fn from_parts(
        model: order::Model,
        items: Vec<order_item::Model>,
    ) -> Result<Self, ServiceError> {
        let shipping_address: ShippingAddress = serde_json::from_value(model.shipping_address)
            .map_err(|e| {
                ServiceError::InternalError(format!(
                    "Stored shipping address for order {} is unreadable: {}",
                    model.id, e
                ))
            })?;
        let payment_method = PaymentMethodSelection::from_parts(
            &model.payment_method,
            model.card_last4.as_deref(),
            model.card_expiry.as_deref(),
        )
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Stored payment method for order {} is unreadable",
                model.id
            ))
        })?;

        Ok(Self {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            status: model.status,
            payment_status: model.payment_status,
            items: items.into_iter().map(Into::into).collect(),
            shipping_address,
            shipping_method: model.shipping_method,
            payment_method,
            subtotal: model.subtotal,
            shipping_cost: model.shipping_cost,
            tax: model.tax,
            discount_amount: model.discount_amount,
            total: model.total,
            coupon_code: model.coupon_code,
            points_used: model.points_used,
            tracking_number: model.tracking_number,
            shipping_carrier: model.shipping_carrier,
            shipped_at: model.shipped_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Admin edit of fulfilment fields. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: Option<OrderStatus>,
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub shipping_carrier: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
}

/// A checkout priced by the server.
pub struct PricedCheckout {
    pub state: CheckoutState,
    pub coupon: Option<coupon::Model>,
}

/// Prices `items` with `method`, the tax policy and, when given, a freshly
/// validated coupon.
pub async fn price_checkout<C: ConnectionTrait>(
    conn: &C,
    tax_policy: &TaxPolicy,
    items: Vec<CartLineItem>,
    method: ShippingMethod,
    coupon_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<PricedCheckout, ServiceError> {
    let mut state = CheckoutState::new(tax_policy.clone());
    state.set_items(items);
    state.set_shipping_method(method);

    let coupon = match coupon_code.map(str::trim).filter(|code| !code.is_empty()) {
        Some(code) => {
            let subtotal = state.totals().subtotal;
            let (coupon, discount_amount) =
                CouponService::check_code(conn, code, subtotal, now).await?;
            state.apply_coupon(AppliedCoupon {
                code: coupon.code.clone(),
                discount_amount,
            });
            Some(coupon)
        }
        None => None,
    };

    Ok(PricedCheckout { state, coupon })
}

/// Rejects a submission whose figures differ from the server's.
pub fn verify_submitted_totals(
    submission: &OrderSubmission,
    derived: &Totals,
) -> Result<(), ServiceError> {
    let submitted_discount = submission.discount_amount.unwrap_or(Decimal::ZERO);
    let checks = [
        ("subtotal", submission.subtotal, derived.subtotal),
        ("shippingCost", submission.shipping_cost, derived.shipping_cost),
        ("tax", submission.tax, derived.tax),
        ("discountAmount", submitted_discount, derived.discount_amount),
        ("total", submission.total, derived.total),
    ];

    for (field, submitted, expected) in checks {
        if submitted != expected {
            return Err(ServiceError::BadRequest(format!(
                "Submitted {} {} does not match calculated {}",
                field, submitted, expected
            )));
        }
    }
    Ok(())
}

pub fn resolve_shipping_method(key: &str) -> Result<ShippingMethod, ServiceError> {
    find_shipping_method(key)
        .ok_or_else(|| ServiceError::ValidationError(format!("Unknown shipping method: {}", key)))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, Vec<order_item::Model>>, ServiceError> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.is_in(order_ids))
        .all(conn)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
    for item in items {
        grouped.entry(item.order_id).or_default().push(item);
    }
    Ok(grouped)
}

fn map_order_insert_error(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict("Order number collision, please retry".to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

/// Service for placing and managing orders
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    tax_policy: TaxPolicy,
    order_numbers: Arc<dyn OrderNumberGenerator>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, tax_policy: TaxPolicy) -> Self {
        Self {
            db_pool,
            tax_policy,
            order_numbers: Arc::new(RandomOrderNumbers),
        }
    }

    pub fn with_order_numbers(mut self, generator: Arc<dyn OrderNumberGenerator>) -> Self {
        self.order_numbers = generator;
        self
    }

    /// Prices a cart without placing an order.
    pub async fn quote(
        &self,
        items: Vec<CartLineItem>,
        shipping_method: &str,
        coupon_code: Option<&str>,
    ) -> Result<Totals, ServiceError> {
        validate_items(&items)?;
        let method = resolve_shipping_method(shipping_method)?;
        let priced = price_checkout(
            &*self.db_pool,
            &self.tax_policy,
            items,
            method,
            coupon_code,
            Utc::now(),
        )
        .await?;
        Ok(priced.state.totals().clone())
    }

    /// Persists a finalized checkout as an order owned by the caller.
    #[instrument(
        skip(self, ctx, submission),
        fields(user_id = %ctx.user_id, token_id = %ctx.token_id)
    )]
    pub async fn create_order(
        &self,
        ctx: &AuthenticatedContext,
        submission: OrderSubmission,
    ) -> Result<OrderResponse, ServiceError> {
        submission.shipping_address.validate()?;
        submission.payment_method.validate()?;
        validate_items(&submission.items)?;
        let points_used = submission.points_used.unwrap_or(0);
        if points_used < 0 {
            return Err(ServiceError::ValidationError(
                "Points used cannot be negative".to_string(),
            ));
        }
        let method = resolve_shipping_method(&submission.shipping_method)?;

        let now = Utc::now();
        let txn = self.db_pool.begin().await?;

        let priced = price_checkout(
            &txn,
            &self.tax_policy,
            submission.items.clone(),
            method,
            submission.coupon_code.as_deref(),
            now,
        )
        .await?;
        let totals = priced.state.totals().clone();
        verify_submitted_totals(&submission, &totals)?;

        let order_number = allocate_order_number(&txn, self.order_numbers.as_ref()).await?;
        let order_id = Uuid::new_v4();
        let shipping_address = serde_json::to_value(&submission.shipping_address)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let (card_last4, card_expiry) = submission.payment_method.card_details();

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(ctx.user_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PAYMENT_STATUS_PAID.to_string()),
            shipping_address: Set(shipping_address),
            shipping_method: Set(priced.state.shipping_method().name.clone()),
            payment_method: Set(submission.payment_method.kind().to_string()),
            card_last4: Set(card_last4),
            card_expiry: Set(card_expiry),
            subtotal: Set(totals.subtotal),
            shipping_cost: Set(totals.shipping_cost),
            tax: Set(totals.tax),
            discount_amount: Set(totals.discount_amount),
            total: Set(totals.total),
            coupon_code: Set(priced.coupon.as_ref().map(|c| c.code.clone())),
            points_used: Set(points_used),
            tracking_number: Set(None),
            shipping_carrier: Set(None),
            shipped_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(map_order_insert_error)?;

        let item_models: Vec<order_item::ActiveModel> = submission
            .items
            .iter()
            .map(|item| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id.clone()),
                product_name: Set(item.product_name.clone()),
                product_image: Set(item.product_image.clone()),
                quantity: Set(item.quantity),
                price: Set(item.price),
                options: Set(item.options.clone()),
            })
            .collect();
        OrderItem::insert_many(item_models).exec(&txn).await?;

        if let Some(coupon) = &priced.coupon {
            CouponService::redeem(&txn, coupon.id).await?;
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        txn.commit().await?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            total = %totals.total,
            coupon = ?order.coupon_code,
            "Order placed"
        );
        OrderResponse::from_parts(order, items)
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list_orders(
        &self,
        ctx: &AuthenticatedContext,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;
        let orders = Order::find()
            .filter(order::Column::UserId.eq(ctx.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await?;
        self.attach_items(orders).await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_order(
        &self,
        ctx: &AuthenticatedContext,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let model = self.find_model(order_id).await?;
        if !ctx.can_access(model.user_id) {
            warn!(order_id = %order_id, "Order requested by non-owner");
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }
        let mut with_items = self.attach_items(vec![model]).await?;
        with_items
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(
        skip(self, ctx, patch),
        fields(user_id = %ctx.user_id, token_id = %ctx.token_id)
    )]
    pub async fn update_order_status(
        &self,
        ctx: &AuthenticatedContext,
        order_id: Uuid,
        patch: UpdateOrderStatusRequest,
    ) -> Result<OrderResponse, ServiceError> {
        ctx.require_admin()?;
        patch.validate()?;

        let existing = self.find_model(order_id).await?;
        let previous_status = existing.status;
        let stored_shipped_at = existing.shipped_at;
        let now = Utc::now();

        let mut active: order::ActiveModel = existing.into();
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(tracking_number) = patch.tracking_number {
            active.tracking_number = Set(Some(tracking_number));
        }
        if let Some(carrier) = patch.shipping_carrier {
            active.shipping_carrier = Set(Some(carrier));
        }
        match (patch.shipped_at, patch.status, stored_shipped_at) {
            (Some(at), _, _) => active.shipped_at = Set(Some(at)),
            (None, Some(OrderStatus::Shipped), None) => active.shipped_at = Set(Some(now)),
            _ => {}
        }
        active.updated_at = Set(now);

        let updated = active.update(&*self.db_pool).await?;
        info!(
            order_id = %order_id,
            from = %previous_status,
            to = %updated.status,
            "Order status updated"
        );

        let mut with_items = self.attach_items(vec![updated]).await?;
        with_items
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Every order in the store, newest first (admin only).
    pub async fn list_all_orders(
        &self,
        ctx: &AuthenticatedContext,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<OrderResponse>, ServiceError> {
        ctx.require_admin()?;
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(PaginatedResponse {
            items: self.attach_items(orders).await?,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    async fn find_model(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn attach_items(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let ids = orders.iter().map(|o| o.id).collect();
        let mut items = load_items(&*self.db_pool, ids).await?;
        orders
            .into_iter()
            .map(|o| {
                let order_items = items.remove(&o.id).unwrap_or_default();
                OrderResponse::from_parts(o, order_items)
            })
            .collect()
    }
}
