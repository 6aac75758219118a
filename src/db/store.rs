// src/db/store.rs

use async_trait::async_trait;

use crate::{
    common::error::AppError,
    models::{
        inventory::StockFailure,
        sales::{NewOrder, NoteEntry, Order, OrderStatus, SettleRequest, StatusUpdate},
    },
};

/// Resultado de uma tentativa de liquidação.
#[derive(Debug)]
pub enum SettleOutcome {
    /// Estoque baixado e venda marcada como `paid`, tudo na mesma transação.
    Settled(Order),
    /// Algum SKU não tinha saldo; nada foi alterado.
    StockShortage(Vec<StockFailure>),
    /// A venda não existe ou já saiu do status esperado (outro caminho chegou antes).
    Skipped(Option<OrderStatus>),
}

/// Persistência de vendas e estoque usada pela reconciliação.
///
/// `transition` e `settle` são compare-and-swap: só alteram a linha se o status
/// atual estiver no conjunto informado.
#[async_trait]
pub trait SalesStore: Send + Sync {
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, AppError>;

    async fn find_order(&self, id: i64) -> Result<Option<Order>, AppError>;

    async fn transition(
        &self,
        id: i64,
        from: &[OrderStatus],
        update: StatusUpdate,
    ) -> Result<Option<Order>, AppError>;

    async fn record_preference(&self, id: i64, preference_id: &str) -> Result<(), AppError>;

    async fn append_note(&self, id: i64, note: NoteEntry) -> Result<(), AppError>;

    async fn settle(&self, id: i64, req: SettleRequest) -> Result<SettleOutcome, AppError>;
}
