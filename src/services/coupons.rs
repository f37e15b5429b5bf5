use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::coupon::{self, DiscountType, Entity as Coupon},
    errors::ServiceError,
    services::checkout::{check_money_amount, round2},
};

/// Reason a coupon cannot be applied to a cart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    #[error("Invalid coupon code")]
    InvalidCode,
    #[error("This coupon is no longer active")]
    Inactive,
    #[error("This coupon has expired")]
    Expired,
    #[error("This coupon has reached its usage limit")]
    LimitReached,
    #[error("Minimum purchase amount of {minimum:.2} required")]
    BelowMinimum { minimum: Decimal },
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::InvalidCode => "INVALID_CODE",
            CouponRejection::Inactive => "INACTIVE",
            CouponRejection::Expired => "EXPIRED",
            CouponRejection::LimitReached => "LIMIT_REACHED",
            CouponRejection::BelowMinimum { .. } => "BELOW_MINIMUM",
        }
    }
}

/// Discount a coupon grants before clamping.
pub fn raw_discount(discount_type: DiscountType, value: Decimal, cart_total: Decimal) -> Decimal {
    match discount_type {
        DiscountType::Percentage => {
            round2(cart_total.saturating_mul(value) / Decimal::ONE_HUNDRED)
        }
        DiscountType::Fixed => value,
    }
}

/// Decides whether `coupon` applies to `cart_total` at `now` and returns the
/// discount, which always lies within `[0, cart_total]`.
pub fn evaluate(
    coupon: &coupon::Model,
    cart_total: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.is_expired_at(now) {
        return Err(CouponRejection::Expired);
    }
    if coupon.is_exhausted() {
        return Err(CouponRejection::LimitReached);
    }
    if cart_total < coupon.min_purchase_amount {
        return Err(CouponRejection::BelowMinimum {
            minimum: coupon.min_purchase_amount,
        });
    }

    let discount = raw_discount(coupon.discount_type, coupon.discount_value, cart_total);
    Ok(discount.min(cart_total).max(Decimal::ZERO))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    #[schema(example = "SAVE10")]
    pub code: String,
    #[schema(value_type = String, example = "120.00")]
    pub cart_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    pub code: String,
    pub discount_type: DiscountType,
    #[schema(value_type = String)]
    pub discount_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub coupon: CouponSummary,
    #[schema(value_type = String, example = "10.00")]
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    #[schema(value_type = String)]
    pub discount_value: Decimal,
    #[schema(value_type = String)]
    pub min_purchase_amount: Decimal,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub expiration_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<coupon::Model> for CouponResponse {
    fn from(model: coupon::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            min_purchase_amount: model.min_purchase_amount,
            usage_limit: model.usage_limit,
            used_count: model.used_count,
            expiration_date: model.expiration_date,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64, message = "Coupon code must be 1-64 characters"))]
    #[schema(example = "SAVE10")]
    pub code: String,
    pub discount_type: DiscountType,
    #[schema(value_type = String, example = "10")]
    pub discount_value: Decimal,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub min_purchase_amount: Option<Decimal>,
    #[serde(default)]
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Partial coupon edit. `usageLimit` and `expirationDate` accept `null` to clear.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCouponRequest {
    #[validate(length(min = 1, max = 64, message = "Coupon code must be 1-64 characters"))]
    pub code: Option<String>,
    pub discount_type: Option<DiscountType>,
    #[schema(value_type = Option<String>)]
    pub discount_value: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub min_purchase_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>, nullable)]
    pub usage_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>, nullable)]
    pub expiration_date: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn check_coupon_terms(
    discount_type: DiscountType,
    discount_value: Decimal,
    min_purchase_amount: Decimal,
    usage_limit: Option<i32>,
) -> Result<(), ServiceError> {
    if discount_value <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Discount value must be greater than 0".to_string(),
        ));
    }
    if discount_type == DiscountType::Percentage && discount_value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discount cannot exceed 100".to_string(),
        ));
    }
    check_money_amount("Discount value", discount_value)?;
    check_money_amount("Minimum purchase amount", min_purchase_amount)?;
    if usage_limit.is_some_and(|limit| limit < 0) {
        return Err(ServiceError::ValidationError(
            "Usage limit cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn map_unique_violation(err: DbErr, code: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(format!("Coupon code {} already exists", code))
        }
        _ => ServiceError::DatabaseError(err),
    }
}

/// Coupon lookup, validation, admin management and redemption.
#[derive(Clone)]
pub struct CouponService {
    db_pool: Arc<DbPool>,
}

impl CouponService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Checks a code against a cart total without redeeming it.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        cart_total: Decimal,
    ) -> Result<ValidateCouponResponse, ServiceError> {
        let (coupon, discount_amount) =
            Self::check_code(&*self.db_pool, code, cart_total, Utc::now()).await?;

        Ok(ValidateCouponResponse {
            valid: true,
            coupon: CouponSummary {
                code: coupon.code,
                discount_type: coupon.discount_type,
                discount_value: coupon.discount_value,
            },
            discount_amount,
        })
    }

    /// Looks a code up on `conn` and evaluates it. Shared by validation and order
    /// placement so both apply exactly the same rules.
    pub async fn check_code<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        cart_total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(coupon::Model, Decimal), ServiceError> {
        check_money_amount("Cart total", cart_total)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }

        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or(CouponRejection::InvalidCode)?;

        match evaluate(&coupon, cart_total, now) {
            Ok(discount) => Ok((coupon, discount)),
            Err(rejection) => {
                warn!(code = %code, reason = rejection.code(), "Coupon rejected");
                Err(rejection.into())
            }
        }
    }

    /// Consumes one use of the coupon. Fails with `LIMIT_REACHED` when the limit
    /// was hit, including by a concurrent redemption.
    pub async fn redeem<C: ConnectionTrait>(conn: &C, coupon_id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(coupon_id = %coupon_id, "Coupon redemption lost to usage limit");
            return Err(CouponRejection::LimitReached.into());
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CreateCouponRequest) -> Result<CouponResponse, ServiceError> {
        input.validate()?;
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }
        let min_purchase_amount = input.min_purchase_amount.unwrap_or(Decimal::ZERO);
        check_coupon_terms(
            input.discount_type,
            input.discount_value,
            min_purchase_amount,
            input.usage_limit,
        )?;
        self.ensure_code_available(&code, None).await?;

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            min_purchase_amount: Set(min_purchase_amount),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            expiration_date: Set(input.expiration_date),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| map_unique_violation(e, &code))?;

        info!(coupon_id = %model.id, "Coupon created");
        Ok(model.into())
    }

    pub async fn list(&self) -> Result<Vec<CouponResponse>, ServiceError> {
        let coupons = Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(coupons.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<CouponResponse, ServiceError> {
        self.find_model(id).await.map(Into::into)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateCouponRequest,
    ) -> Result<CouponResponse, ServiceError> {
        patch.validate()?;
        let existing = self.find_model(id).await?;

        let code = match patch.code.as_deref().map(str::trim) {
            Some("") => {
                return Err(ServiceError::ValidationError(
                    "Coupon code is required".to_string(),
                ))
            }
            Some(code) if code != existing.code => {
                self.ensure_code_available(code, Some(id)).await?;
                Some(code.to_string())
            }
            _ => None,
        };

        let discount_type = patch.discount_type.unwrap_or(existing.discount_type);
        let discount_value = patch.discount_value.unwrap_or(existing.discount_value);
        let min_purchase_amount = patch
            .min_purchase_amount
            .unwrap_or(existing.min_purchase_amount);
        let usage_limit = patch.usage_limit.unwrap_or(existing.usage_limit);
        check_coupon_terms(discount_type, discount_value, min_purchase_amount, usage_limit)?;

        let mut active: coupon::ActiveModel = existing.into();
        if let Some(code) = &code {
            active.code = Set(code.clone());
        }
        active.discount_type = Set(discount_type);
        active.discount_value = Set(discount_value);
        active.min_purchase_amount = Set(min_purchase_amount);
        active.usage_limit = Set(usage_limit);
        if let Some(expiration_date) = patch.expiration_date {
            active.expiration_date = Set(expiration_date);
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(|e| map_unique_violation(e, code.as_deref().unwrap_or_default()))?;

        info!(coupon_id = %id, "Coupon updated");
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::delete_by_id(id).exec(&*self.db_pool).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Coupon {} not found", id)));
        }
        info!(coupon_id = %id, "Coupon deleted");
        Ok(())
    }

    async fn find_model(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        Coupon::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }

    async fn ensure_code_available(
        &self,
        code: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Coupon::find().filter(coupon::Column::Code.eq(code));
        if let Some(id) = except {
            query = query.filter(coupon::Column::Id.ne(id));
        }
        if query.one(&*self.db_pool).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Coupon code {} already exists",
                code
            )));
        }
        Ok(())
    }
}
