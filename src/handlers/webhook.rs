// src/handlers/webhook.rs

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    common::error::AppError,
    config::AppState,
    services::{
        notification::{Notification, verify_signature},
        sales_service::Reconciliation,
    },
};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ---
// Handler: mercado_pago_webhook
// ---
/// Recebe notificações do Mercado Pago. Responde 200 para tudo que foi entendido
/// (inclusive o que foi ignorado), para o gateway não reenviar à toa.
#[utoipa::path(
    post,
    path = "/mercado_pago_webhook",
    tag = "Webhooks",
    request_body(content = String, description = "Notificação crua do Mercado Pago", content_type = "application/json"),
    responses(
        (status = 200, description = "Notificação processada ou ignorada"),
        (status = 401, description = "Assinatura x-signature inválida"),
        (status = 500, description = "Erro inesperado; o gateway deve reenviar")
    )
)]
pub async fn mercado_pago_webhook(
    State(app_state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let notification = Notification::resolve(&query, &body);

    if let Some(secret) = app_state.webhook_secret.as_deref() {
        verify_signature(
            secret,
            header(&headers, "x-signature"),
            header(&headers, "x-request-id"),
            notification.payment_id.as_deref(),
        )
        .map_err(|e| AppError::InvalidSignature(e.to_string()))?;
    }

    tracing::debug!(
        topic = ?notification.topic,
        payment_id = ?notification.payment_id,
        live_mode = ?notification.live_mode,
        "Notificação do Mercado Pago recebida"
    );

    let result = app_state
        .sales_service
        .handle_notification(notification)
        .await?;

    let body = match result {
        Reconciliation::Paid(order) => json!({ "result": "paid", "orderId": order.id }),
        Reconciliation::Rejected(order) => json!({ "result": "rejected", "orderId": order.id }),
        Reconciliation::StockShortage { order_id, .. } => {
            json!({ "result": "stock_error", "orderId": order_id })
        }
        Reconciliation::Ignored(reason) => {
            json!({ "result": "ignored", "reason": format!("{reason:?}") })
        }
    };

    Ok(Json(body))
}
