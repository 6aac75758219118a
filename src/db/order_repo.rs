// src/db/order_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, Postgres, types::Json};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::sales::{LineItem, NewOrder, NoteEntry, Order, OrderStatus, PaymentMethod, StatusUpdate},
};

const ORDER_COLUMNS: &str = r#"
    id, amount, description, requested_method, confirmed_method, status, items,
    patient_id, pharmacy_id, cashier_id, cash_session_id, card_reference,
    preference_id, gateway_payment_id, created_at, paid_at, internal_notes
"#;

// Linha crua da tabela 'ventas' (itens e notas vêm em JSONB)
#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    amount: Decimal,
    description: String,
    requested_method: PaymentMethod,
    confirmed_method: Option<PaymentMethod>,
    status: OrderStatus,
    items: Json<Vec<LineItem>>,
    patient_id: Option<i64>,
    pharmacy_id: i64,
    cashier_id: Option<Uuid>,
    cash_session_id: Option<i64>,
    card_reference: Option<String>,
    preference_id: Option<String>,
    gateway_payment_id: Option<String>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    internal_notes: Json<Vec<NoteEntry>>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            amount: row.amount,
            description: row.description,
            requested_method: row.requested_method,
            confirmed_method: row.confirmed_method,
            status: row.status,
            items: row.items.0,
            patient_id: row.patient_id,
            pharmacy_id: row.pharmacy_id,
            cashier_id: row.cashier_id,
            cash_session_id: row.cash_session_id,
            card_reference: row.card_reference,
            preference_id: row.preference_id,
            gateway_payment_id: row.gateway_payment_id,
            created_at: row.created_at,
            paid_at: row.paid_at,
            internal_notes: row.internal_notes.0,
        }
    }
}

/// Acesso à tabela 'ventas'. Todos os métodos aceitam qualquer executor, então
/// rodam tanto na pool quanto dentro de uma transação.
#[derive(Clone, Copy, Default)]
pub struct OrderRepository;

impl OrderRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert<'e, E>(
        &self,
        executor: E,
        new: &NewOrder,
        status: OrderStatus,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO ventas (
                amount, description, requested_method, status, items, patient_id,
                pharmacy_id, cashier_id, cash_session_id, card_reference
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(new.amount)
            .bind(&new.description)
            .bind(new.method)
            .bind(status)
            .bind(Json(&new.items))
            .bind(new.patient_id)
            .bind(new.pharmacy_id)
            .bind(new.cashier_id)
            .bind(new.cash_session_id)
            .bind(new.card_reference.as_deref())
            .fetch_one(executor)
            .await?;

        Ok(row.into())
    }

    pub async fn find<'e, E>(&self, executor: E, id: i64) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM ventas WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Order::from))
    }

    /// Igual a `find`, mas trava a linha até o fim da transação.
    pub async fn lock<'e, E>(&self, executor: E, id: i64) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM ventas WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Order::from))
    }

    /// Compare-and-swap de status. Devolve `None` se o status atual não está em `from`.
    pub async fn transition<'e, E>(
        &self,
        executor: E,
        id: i64,
        from: &[OrderStatus],
        update: &StatusUpdate,
    ) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            UPDATE ventas
            SET status = $2,
                confirmed_method = $3,
                paid_at = $4,
                gateway_payment_id = COALESCE($5, gateway_payment_id)
            WHERE id = $1 AND status = ANY($6)
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(update.status)
            .bind(update.confirmed_method)
            .bind(update.paid_at)
            .bind(update.gateway_payment_id.as_deref())
            .bind(from)
            .fetch_optional(executor)
            .await?;

        Ok(row.map(Order::from))
    }

    pub async fn set_preference<'e, E>(
        &self,
        executor: E,
        id: i64,
        preference_id: &str,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("UPDATE ventas SET preference_id = $2 WHERE id = $1")
            .bind(id)
            .bind(preference_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Anexa ao log interno; o conteúdo anterior nunca é reescrito.
    pub async fn append_note<'e, E>(
        &self,
        executor: E,
        id: i64,
        note: &NoteEntry,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE ventas SET internal_notes = internal_notes || $2::jsonb WHERE id = $1",
        )
        .bind(id)
        .bind(Json(std::slice::from_ref(note)))
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
