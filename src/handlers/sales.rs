// src/handlers/sales.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::AppError,
    config::AppState,
    models::sales::{LineItem, NewOrder, Order, OrderStatus, PaymentMethod},
};

// ---
// Validação Customizada
// ---
fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if *val <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor deve ser maior que zero.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// Payload: CreateOrder
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemPayload {
    #[validate(length(min = 1, message = "O SKU é obrigatório."))]
    #[schema(example = "7791234567890")]
    pub sku: String,

    #[validate(range(min = 1, max = 10000, message = "A quantidade deve estar entre 1 e 10000."))]
    #[schema(example = 2)]
    pub quantity: i32,

    #[validate(custom(function = "validate_not_negative"))]
    #[schema(example = "10.00")]
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "25.00")]
    pub amount: Decimal,

    #[serde(default)]
    pub description: String,

    pub patient_id: Option<i64>,

    // Venda geral: o paciente informado é descartado
    #[serde(default)]
    pub buy_without_account: bool,

    #[serde(default)]
    #[validate(nested)]
    pub cart_items: Vec<CartItemPayload>,

    #[validate(range(min = 1, message = "O campo 'pharmacyId' é obrigatório."))]
    #[schema(example = 1)]
    pub pharmacy_id: i64,

    pub payment_method: PaymentMethod,

    pub cash_session_id: Option<i64>,

    pub cashier_id: Option<Uuid>,

    pub card_reference: Option<String>,
}

impl CreateOrderPayload {
    fn into_new_order(self) -> NewOrder {
        NewOrder {
            amount: self.amount,
            description: self.description.trim().to_string(),
            method: self.payment_method,
            items: self
                .cart_items
                .into_iter()
                .map(|i| LineItem {
                    sku: i.sku.trim().to_string(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            patient_id: if self.buy_without_account {
                None
            } else {
                self.patient_id
            },
            pharmacy_id: self.pharmacy_id,
            cashier_id: self.cashier_id,
            cash_session_id: self.cash_session_id,
            card_reference: self.card_reference.filter(|r| !r.trim().is_empty()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    #[schema(example = 1024)]
    pub order_id: i64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_id: Option<String>,
}

// ---
// Handler: create_order
// ---
#[utoipa::path(
    post,
    path = "/create_order",
    tag = "Sales",
    request_body = CreateOrderPayload,
    responses(
        (status = 200, description = "Venda registrada", body = CreateOrderResponse),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Estoque insuficiente; venda em stock_error"),
        (status = 502, description = "Mercado Pago recusou a preferência"),
        (status = 504, description = "Mercado Pago não respondeu a tempo")
    )
)]
pub async fn create_order(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let submission = app_state
        .sales_service
        .submit_order(payload.into_new_order())
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: submission.order.id,
        status: submission.order.status,
        redirect_url: submission.redirect_url,
        preference_id: submission.order.preference_id,
    }))
}

// ---
// Handler: get_order
// ---
#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "Sales",
    responses(
        (status = 200, description = "Venda com status e notas internas", body = Order),
        (status = 404, description = "Venda não encontrada")
    ),
    params(
        ("id" = i64, Path, description = "ID da venda")
    )
)]
pub async fn get_order(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let order = app_state.sales_service.find_order(id).await?;
    Ok(Json(order))
}
