use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::{models::inventory::StockFailure, services::gateway::GatewayError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Venda inválida: {0}")]
    InvalidOrder(String),

    #[error("Venda {0} não encontrada")]
    OrderNotFound(i64),

    #[error("Estoque insuficiente para a venda {order_id}")]
    StockUnavailable {
        order_id: i64,
        failures: Vec<StockFailure>,
    },

    #[error("Falha no gateway de pagamento para a venda {order_id}: {source}")]
    Gateway {
        order_id: i64,
        #[source]
        source: GatewayError,
    },

    #[error("Assinatura do webhook inválida: {0}")]
    InvalidSignature(String),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ValidationError(errors) => {
                let mut details = BTreeMap::new();
                collect_details("", &errors, &mut details);
                (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "error": "Um ou mais campos são inválidos.",
                        "details": details,
                    }),
                )
            }
            AppError::InvalidOrder(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::OrderNotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Venda {id} não encontrada.") }),
            ),
            AppError::StockUnavailable { order_id, failures } => {
                let messages: Vec<String> = failures.iter().map(StockFailure::message).collect();
                (
                    StatusCode::CONFLICT,
                    json!({
                        "error": "Estoque insuficiente para concluir a venda.",
                        "orderId": order_id,
                        "stockErrors": failures,
                        "messages": messages,
                    }),
                )
            }
            AppError::Gateway { order_id, source } => {
                tracing::warn!(order_id, error = %source, "Falha no gateway repassada ao caixa");
                (
                    source.response_status(),
                    json!({
                        "error": source.to_string(),
                        "orderId": order_id,
                        "gatewayStatus": source.upstream_status(),
                    }),
                )
            }
            AppError::InvalidSignature(reason) => {
                tracing::warn!(%reason, "Webhook recusado");
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "error": "Assinatura inválida." }),
                )
            }
            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Ocorreu um erro inesperado." }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Achata os erros do validator, inclusive os de structs e listas aninhadas,
/// em `caminho -> mensagens` (ex.: `cart_items[1].quantity`).
fn collect_details(prefix: &str, errors: &ValidationErrors, out: &mut BTreeMap<String, Vec<String>>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = field_errors.iter().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                });
                out.entry(path).or_default().extend(messages);
            }
            ValidationErrorsKind::Struct(inner) => collect_details(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_details(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}
