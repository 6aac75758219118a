// src/db/inventory_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::{common::error::AppError, models::inventory::StockLevel};

/// Acesso à tabela 'medicamentos' (saldo por farmácia).
#[derive(Clone, Copy, Default)]
pub struct InventoryRepository;

impl InventoryRepository {
    pub fn new() -> Self {
        Self
    }

    /// Trava (`FOR UPDATE`) os saldos dos SKUs na farmácia.
    ///
    /// A ordenação por SKU garante que dois caixas vendendo os mesmos produtos em
    /// ordens diferentes travem as linhas na mesma sequência.
    pub async fn lock_levels<'e, E>(
        &self,
        executor: E,
        pharmacy_id: i64,
        skus: &[String],
    ) -> Result<Vec<StockLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT sku, quantity
            FROM medicamentos
            WHERE pharmacy_id = $1 AND sku = ANY($2)
            ORDER BY sku
            FOR UPDATE
            "#,
        )
        .bind(pharmacy_id)
        .bind(skus)
        .fetch_all(executor)
        .await?;

        Ok(levels)
    }

    /// Baixa `quantity` de um SKU. Devolve `false` se o saldo não cobria
    /// (não deveria acontecer com a linha travada, mas o banco confere de novo).
    pub async fn decrement<'e, E>(
        &self,
        executor: E,
        pharmacy_id: i64,
        sku: &str,
        quantity: i32,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE medicamentos
            SET quantity = quantity - $3
            WHERE pharmacy_id = $1 AND sku = $2 AND quantity >= $3
            "#,
        )
        .bind(pharmacy_id)
        .bind(sku)
        .bind(quantity)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Uma única atualização de "último movimento" para todos os SKUs da venda,
    /// com o horário da venda.
    pub async fn touch_last_movement<'e, E>(
        &self,
        executor: E,
        pharmacy_id: i64,
        skus: &[String],
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE medicamentos
            SET last_movement_at = $3
            WHERE pharmacy_id = $1 AND sku = ANY($2)
            "#,
        )
        .bind(pharmacy_id)
        .bind(skus)
        .bind(at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}
