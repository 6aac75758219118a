// src/models/inventory.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Linha travada (`FOR UPDATE`) durante a baixa.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StockLevel {
    pub sku: String,
    pub quantity: i32,
}

/// Quanto tirar de um SKU já agregado (o mesmo SKU duas vezes no carrinho vira uma linha).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDecrement {
    pub sku: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockFailureReason {
    NotFound,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockFailure {
    #[schema(example = "7791234567890")]
    pub sku: String,
    pub reason: StockFailureReason,
    #[schema(example = 3)]
    pub needed: i32,
    #[schema(example = 1)]
    pub available: i32,
}

impl StockFailure {
    pub fn not_found(sku: &str, needed: i32) -> Self {
        Self {
            sku: sku.to_string(),
            reason: StockFailureReason::NotFound,
            needed,
            available: 0,
        }
    }

    pub fn insufficient(sku: &str, needed: i32, available: i32) -> Self {
        Self {
            sku: sku.to_string(),
            reason: StockFailureReason::Insufficient,
            needed,
            available,
        }
    }

    /// Mensagem pronta para o operador do caixa.
    pub fn message(&self) -> String {
        match self.reason {
            StockFailureReason::NotFound => {
                format!("{}: produto não cadastrado nesta farmácia", self.sku)
            }
            StockFailureReason::Insufficient => format!(
                "{}: estoque insuficiente (necessário {}, disponível {})",
                self.sku, self.needed, self.available
            ),
        }
    }
}

/// Junta as mensagens de várias falhas numa linha só (usada nas notas internas).
pub fn describe_failures(failures: &[StockFailure]) -> String {
    failures
        .iter()
        .map(StockFailure::message)
        .collect::<Vec<_>>()
        .join("; ")
}
