// src/models/sales.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(alias = "efectivo")]
    Cash,
    #[serde(alias = "tarjeta")]
    Card,
    Qr,
}

/// Ciclo de vida de uma venda.
///
/// Toda mudança de status passa pela tabela [`TRANSITIONS`] e é aplicada no banco
/// como compare-and-swap (`WHERE status = ANY(...)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "venta_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    ProcessingCash,
    ProcessingCard,
    Paid,
    Rejected,
    StockError,
    GatewayError,
}

use OrderStatus::*;

/// Arestas permitidas (origem, destino). Estados terminais não aparecem como origem.
pub const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (Pending, Paid),
    (Pending, Rejected),
    (Pending, StockError),
    (Pending, GatewayError),
    (ProcessingCash, Paid),
    (ProcessingCash, StockError),
    (ProcessingCard, Paid),
    (ProcessingCard, StockError),
    (GatewayError, Paid),
    (GatewayError, Rejected),
    (GatewayError, StockError),
];

impl OrderStatus {
    pub fn initial_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Qr => Pending,
            PaymentMethod::Cash => ProcessingCash,
            PaymentMethod::Card => ProcessingCard,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Paid | Rejected | StockError)
    }

    /// Status em que um webhook do gateway ainda pode decidir a venda.
    pub fn awaits_gateway(self) -> bool {
        matches!(self, Pending | GatewayError)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        TRANSITIONS.iter().any(|&(from, to)| from == self && to == next)
    }

    /// Todos os status dos quais `target` é alcançável.
    pub fn sources(target: OrderStatus) -> Vec<OrderStatus> {
        TRANSITIONS
            .iter()
            .filter(|&&(_, to)| to == target)
            .map(|&(from, _)| from)
            .collect()
    }

    /// Conjunto de guarda do CAS: o que o chamador espera, restrito ao que a tabela permite.
    pub fn guard(expected: &[OrderStatus], target: OrderStatus) -> Vec<OrderStatus> {
        let allowed = Self::sources(target);
        expected
            .iter()
            .copied()
            .filter(|s| allowed.contains(s))
            .collect()
    }
}

// --- Itens e auditoria ---

/// Maior quantidade aceita numa linha do carrinho.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[schema(example = "7791234567890")]
    pub sku: String,
    #[schema(example = 2)]
    pub quantity: i32,
    #[schema(example = "10.00")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoteCode {
    StockError,
    GatewayError,
    PreferenceNotRecorded,
    SettlementFailed,
    AmountMismatch,
    PaymentRejected,
}

/// Entrada do log interno da venda. Só é anexada, nunca sobrescrita.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NoteEntry {
    pub at: DateTime<Utc>,
    pub code: NoteCode,
    pub message: String,
}

impl NoteEntry {
    pub fn now(code: NoteCode, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            code,
            message: message.into(),
        }
    }
}

// --- Venda ---

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[schema(example = 1024)]
    pub id: i64,
    #[schema(example = "25.00")]
    pub amount: Decimal,
    pub description: String,
    pub requested_method: PaymentMethod,
    pub confirmed_method: Option<PaymentMethod>,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub patient_id: Option<i64>,
    pub pharmacy_id: i64,
    pub cashier_id: Option<Uuid>,
    pub cash_session_id: Option<i64>,
    pub card_reference: Option<String>,
    pub preference_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub internal_notes: Vec<NoteEntry>,
}

/// Dados para inserir uma venda nova (status inicial vem do método).
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub amount: Decimal,
    pub description: String,
    pub method: PaymentMethod,
    pub items: Vec<LineItem>,
    pub patient_id: Option<i64>,
    pub pharmacy_id: i64,
    pub cashier_id: Option<Uuid>,
    pub cash_session_id: Option<i64>,
    pub card_reference: Option<String>,
}

/// Campos gravados junto com uma transição de status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub confirmed_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub gateway_payment_id: Option<String>,
}

impl StatusUpdate {
    /// Qualquer status que não seja `paid` limpa método confirmado e data de pagamento.
    pub fn failed(status: OrderStatus) -> Self {
        Self {
            status,
            confirmed_method: None,
            paid_at: None,
            gateway_payment_id: None,
        }
    }

    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.gateway_payment_id = Some(payment_id.into());
        self
    }
}

/// Pedido de liquidação: baixa de estoque + `paid` numa única transação.
#[derive(Debug, Clone)]
pub struct SettleRequest {
    pub expected: Vec<OrderStatus>,
    pub method: PaymentMethod,
    pub sold_at: DateTime<Utc>,
    pub gateway_payment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    const ALL: [OrderStatus; 7] = [
        Pending,
        ProcessingCash,
        ProcessingCard,
        Paid,
        Rejected,
        StockError,
        GatewayError,
    ];

    #[test]
    fn initial_status_follows_method() {
        assert_eq!(OrderStatus::initial_for(PaymentMethod::Qr), Pending);
        assert_eq!(OrderStatus::initial_for(PaymentMethod::Cash), ProcessingCash);
        assert_eq!(OrderStatus::initial_for(PaymentMethod::Card), ProcessingCard);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn cash_and_card_cannot_be_rejected_by_gateway() {
        assert!(!ProcessingCash.can_transition_to(Rejected));
        assert!(!ProcessingCard.can_transition_to(GatewayError));
        assert!(ProcessingCard.can_transition_to(Paid));
    }

    #[test]
    fn guard_drops_statuses_that_cannot_reach_target() {
        let guard = OrderStatus::guard(&[Pending, GatewayError, Paid], Rejected);
        assert_eq!(guard, vec![Pending, GatewayError]);

        let guard = OrderStatus::guard(&ALL, Paid);
        assert_eq!(guard, vec![Pending, ProcessingCash, ProcessingCard, GatewayError]);
        assert_eq!(OrderStatus::sources(Paid).len(), 4);
    }

    #[test]
    fn payment_method_accepts_spanish_aliases() {
        let m: PaymentMethod = serde_json::from_str("\"efectivo\"").unwrap();
        assert_eq!(m, PaymentMethod::Cash);
        let m: PaymentMethod = serde_json::from_str("\"tarjeta\"").unwrap();
        assert_eq!(m, PaymentMethod::Card);
        assert_eq!(serde_json::to_string(&PaymentMethod::Qr).unwrap(), "\"qr\"");
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProcessingCash).unwrap(),
            "\"processing_cash\""
        );
    }
}
