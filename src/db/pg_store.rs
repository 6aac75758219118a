// src/db/pg_store.rs

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    db::{
        InventoryRepository, OrderRepository,
        store::{SalesStore, SettleOutcome},
    },
    models::sales::{NewOrder, NoteEntry, Order, OrderStatus, SettleRequest, StatusUpdate},
    services::stock,
};

#[derive(Clone)]
pub struct PgSalesStore {
    pool: PgPool,
    orders: OrderRepository,
    inventory: InventoryRepository,
}

impl PgSalesStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(),
            inventory: InventoryRepository::new(),
        }
    }
}

#[async_trait]
impl SalesStore for PgSalesStore {
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, AppError> {
        let status = OrderStatus::initial_for(new.method);
        self.orders.insert(&self.pool, new, status).await
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>, AppError> {
        self.orders.find(&self.pool, id).await
    }

    async fn transition(
        &self,
        id: i64,
        from: &[OrderStatus],
        update: StatusUpdate,
    ) -> Result<Option<Order>, AppError> {
        if from.is_empty() {
            return Ok(None);
        }
        self.orders.transition(&self.pool, id, from, &update).await
    }

    async fn record_preference(&self, id: i64, preference_id: &str) -> Result<(), AppError> {
        if !self.orders.set_preference(&self.pool, id, preference_id).await? {
            return Err(AppError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn append_note(&self, id: i64, note: NoteEntry) -> Result<(), AppError> {
        if !self.orders.append_note(&self.pool, id, &note).await? {
            return Err(AppError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn settle(&self, id: i64, req: SettleRequest) -> Result<SettleOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Trava a venda e confere o status (guarda de idempotência)
        let order = match self.orders.lock(&mut *tx, id).await? {
            Some(order) => order,
            None => {
                tx.rollback().await?;
                return Ok(SettleOutcome::Skipped(None));
            }
        };
        if !req.expected.contains(&order.status) {
            tx.rollback().await?;
            return Ok(SettleOutcome::Skipped(Some(order.status)));
        }

        // 2. Trava os saldos dos SKUs da venda
        let skus = stock::distinct_skus(&order.items);
        let levels = self
            .inventory
            .lock_levels(&mut *tx, order.pharmacy_id, &skus)
            .await?;

        // 3. Confere tudo antes de mexer em qualquer saldo
        let plan = match stock::plan_deduction(&order.items, &levels) {
            Ok(plan) => plan,
            Err(failures) => {
                tx.rollback().await?;
                return Ok(SettleOutcome::StockShortage(failures));
            }
        };

        // 4. Baixa
        for decrement in &plan {
            let applied = self
                .inventory
                .decrement(&mut *tx, order.pharmacy_id, &decrement.sku, decrement.quantity)
                .await?;
            if !applied {
                // Sem commit, o drop da transação desfaz as baixas anteriores
                return Err(anyhow!(
                    "baixa de {} recusada pelo banco com a linha travada (venda {id})",
                    decrement.sku
                )
                .into());
            }
        }

        // 5. Último movimento, uma vez por SKU, com o horário da venda
        let touched: Vec<String> = plan.iter().map(|d| d.sku.clone()).collect();
        if !touched.is_empty() {
            self.inventory
                .touch_last_movement(&mut *tx, order.pharmacy_id, &touched, req.sold_at)
                .await?;
        }

        // 6. Venda paga
        let update = StatusUpdate {
            status: OrderStatus::Paid,
            confirmed_method: Some(req.method),
            paid_at: Some(req.sold_at),
            gateway_payment_id: req.gateway_payment_id,
        };
        let paid = self
            .orders
            .transition(&mut *tx, id, &req.expected, &update)
            .await?
            .ok_or_else(|| anyhow!("venda {id} mudou de status com a linha travada"))?;

        tx.commit().await?;

        tracing::info!(
            order_id = id,
            pharmacy_id = paid.pharmacy_id,
            skus = touched.len(),
            "Estoque baixado e venda paga"
        );
        Ok(SettleOutcome::Settled(paid))
    }
}
