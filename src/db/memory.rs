// src/db/memory.rs
//
// Store em memória para os testes do serviço. Segue as mesmas regras do
// PgSalesStore: CAS de status, planejamento com `stock::plan_deduction` e
// tudo-ou-nada na baixa.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    common::error::AppError,
    db::store::{SalesStore, SettleOutcome},
    models::{
        inventory::StockLevel,
        sales::{NewOrder, NoteEntry, Order, OrderStatus, SettleRequest, StatusUpdate},
    },
    services::stock,
};

#[derive(Debug, Clone, Default)]
struct Shelf {
    quantity: i32,
    last_movement_at: Option<DateTime<Utc>>,
    movement_writes: usize,
}

#[derive(Default)]
struct State {
    next_id: i64,
    orders: HashMap<i64, Order>,
    stock: HashMap<(i64, String), Shelf>,
    settlements: usize,
}

#[derive(Default)]
pub struct MemorySalesStore {
    state: Mutex<State>,
    fail_settle: AtomicBool,
    lose_settle: AtomicBool,
}

impl MemorySalesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_stock(&self, pharmacy_id: i64, sku: &str, quantity: i32) {
        let mut state = self.state.lock().await;
        state
            .stock
            .entry((pharmacy_id, sku.to_string()))
            .or_default()
            .quantity = quantity;
    }

    pub async fn stock(&self, pharmacy_id: i64, sku: &str) -> Option<i32> {
        let state = self.state.lock().await;
        state
            .stock
            .get(&(pharmacy_id, sku.to_string()))
            .map(|s| s.quantity)
    }

    pub async fn last_movement(&self, pharmacy_id: i64, sku: &str) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        state
            .stock
            .get(&(pharmacy_id, sku.to_string()))
            .and_then(|s| s.last_movement_at)
    }

    pub async fn movement_writes(&self, pharmacy_id: i64, sku: &str) -> usize {
        let state = self.state.lock().await;
        state
            .stock
            .get(&(pharmacy_id, sku.to_string()))
            .map(|s| s.movement_writes)
            .unwrap_or(0)
    }

    /// Quantas liquidações (baixa + `paid`) foram efetivadas.
    pub async fn settlements(&self) -> usize {
        self.state.lock().await.settlements
    }

    /// A próxima chamada a `settle` falha como se o banco tivesse caído.
    pub fn fail_next_settle(&self) {
        self.fail_settle.store(true, Ordering::SeqCst);
    }

    /// A próxima chamada a `settle` encontra a venda já finalizada por outra entrega.
    pub fn lose_next_settle(&self) {
        self.lose_settle.store(true, Ordering::SeqCst);
    }

    fn apply(order: &mut Order, update: StatusUpdate) {
        order.status = update.status;
        order.confirmed_method = update.confirmed_method;
        order.paid_at = update.paid_at;
        if update.gateway_payment_id.is_some() {
            order.gateway_payment_id = update.gateway_payment_id;
        }
    }
}

#[async_trait]
impl SalesStore for MemorySalesStore {
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, AppError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let order = Order {
            id: state.next_id,
            amount: new.amount,
            description: new.description.clone(),
            requested_method: new.method,
            confirmed_method: None,
            status: OrderStatus::initial_for(new.method),
            items: new.items.clone(),
            patient_id: new.patient_id,
            pharmacy_id: new.pharmacy_id,
            cashier_id: new.cashier_id,
            cash_session_id: new.cash_session_id,
            card_reference: new.card_reference.clone(),
            preference_id: None,
            gateway_payment_id: None,
            created_at: Utc::now(),
            paid_at: None,
            internal_notes: Vec::new(),
        };
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>, AppError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: i64,
        from: &[OrderStatus],
        update: StatusUpdate,
    ) -> Result<Option<Order>, AppError> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(&id) {
            Some(order) if from.contains(&order.status) => {
                Self::apply(order, update);
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_preference(&self, id: i64, preference_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(&id).ok_or(AppError::OrderNotFound(id))?;
        order.preference_id = Some(preference_id.to_string());
        Ok(())
    }

    async fn append_note(&self, id: i64, note: NoteEntry) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(&id).ok_or(AppError::OrderNotFound(id))?;
        order.internal_notes.push(note);
        Ok(())
    }

    async fn settle(&self, id: i64, req: SettleRequest) -> Result<SettleOutcome, AppError> {
        if self.fail_settle.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("conexão com o banco perdida").into());
        }

        if self.lose_settle.swap(false, Ordering::SeqCst) {
            return Ok(SettleOutcome::Skipped(Some(OrderStatus::Paid)));
        }

        let mut state = self.state.lock().await;

        let order = match state.orders.get(&id) {
            Some(order) if req.expected.contains(&order.status) => order.clone(),
            Some(order) => return Ok(SettleOutcome::Skipped(Some(order.status))),
            None => return Ok(SettleOutcome::Skipped(None)),
        };

        let levels: Vec<StockLevel> = stock::distinct_skus(&order.items)
            .into_iter()
            .filter_map(|sku| {
                state
                    .stock
                    .get(&(order.pharmacy_id, sku.clone()))
                    .map(|shelf| StockLevel {
                        sku,
                        quantity: shelf.quantity,
                    })
            })
            .collect();

        let plan = match stock::plan_deduction(&order.items, &levels) {
            Ok(plan) => plan,
            Err(failures) => return Ok(SettleOutcome::StockShortage(failures)),
        };

        for decrement in &plan {
            if let Some(shelf) = state
                .stock
                .get_mut(&(order.pharmacy_id, decrement.sku.clone()))
            {
                shelf.quantity -= decrement.quantity;
                shelf.last_movement_at = Some(req.sold_at);
                shelf.movement_writes += 1;
            }
        }

        let update = StatusUpdate {
            status: OrderStatus::Paid,
            confirmed_method: Some(req.method),
            paid_at: Some(req.sold_at),
            gateway_payment_id: req.gateway_payment_id,
        };
        state.settlements += 1;
        let paid = state
            .orders
            .get_mut(&id)
            .map(|order| {
                Self::apply(order, update);
                order.clone()
            })
            .ok_or(AppError::OrderNotFound(id))?;

        Ok(SettleOutcome::Settled(paid))
    }
}
