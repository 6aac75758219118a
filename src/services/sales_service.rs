// src/services/sales_service.rs

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    db::store::{SalesStore, SettleOutcome},
    models::{
        inventory::{StockFailure, describe_failures},
        sales::{
            MAX_LINE_QUANTITY, NewOrder, NoteCode, NoteEntry, Order, OrderStatus, PaymentMethod,
            SettleRequest, StatusUpdate,
        },
    },
    services::{
        gateway::{GatewayPaymentStatus, PaymentDetails, PaymentGateway, PaymentOutcome, PreferenceRequest},
        notification::Notification,
    },
};

/// Resultado de `submit_order` para o caixa.
#[derive(Debug)]
pub struct Submission {
    pub order: Order,
    pub redirect_url: Option<String>,
}

/// O que um webhook fez com a venda.
#[derive(Debug)]
pub enum Reconciliation {
    Paid(Order),
    Rejected(Order),
    StockShortage {
        order_id: i64,
        failures: Vec<StockFailure>,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotPayment,
    MissingPaymentId,
    LookupFailed,
    MissingReference,
    OrderNotFound(i64),
    AlreadyFinal(OrderStatus),
    Undecided(GatewayPaymentStatus),
    /// Outro caminho finalizou a venda entre a leitura e o CAS.
    LostRace,
}

/// Status a partir dos quais um webhook pode decidir a venda.
const AWAITING_GATEWAY: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::GatewayError];

#[derive(Clone)]
pub struct SalesService {
    store: Arc<dyn SalesStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SalesService {
    pub fn new(store: Arc<dyn SalesStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    // --- CONSULTA ---

    pub async fn find_order(&self, id: i64) -> Result<Order, AppError> {
        self.store
            .find_order(id)
            .await?
            .ok_or(AppError::OrderNotFound(id))
    }

    // --- CRIAÇÃO DA VENDA ---

    pub async fn submit_order(&self, new: NewOrder) -> Result<Submission, AppError> {
        let new = check_order(new)?;

        // 1. Grava a venda no status inicial do método
        let order = self.store.insert_order(&new).await?;
        tracing::info!(
            order_id = order.id,
            pharmacy_id = order.pharmacy_id,
            method = ?order.requested_method,
            amount = %order.amount,
            "Venda criada"
        );

        // 2. Ramo do método de pagamento
        match order.requested_method {
            PaymentMethod::Cash | PaymentMethod::Card => self.settle_at_counter(order).await,
            PaymentMethod::Qr => self.start_qr_payment(order).await,
        }
    }

    /// Dinheiro e cartão: baixa imediata.
    async fn settle_at_counter(&self, order: Order) -> Result<Submission, AppError> {
        let req = SettleRequest {
            expected: OrderStatus::guard(&[order.status], OrderStatus::Paid),
            method: order.requested_method,
            sold_at: Utc::now(),
            gateway_payment_id: None,
        };

        match self.store.settle(order.id, req).await {
            Ok(SettleOutcome::Settled(paid)) => Ok(Submission {
                order: paid,
                redirect_url: None,
            }),
            Ok(SettleOutcome::StockShortage(failures)) => {
                tracing::warn!(
                    order_id = order.id,
                    failures = %describe_failures(&failures),
                    "Venda recusada por falta de estoque"
                );
                self.mark_stock_error(order.id, &[order.status], None, &failures)
                    .await;
                Err(AppError::StockUnavailable {
                    order_id: order.id,
                    failures,
                })
            }
            Ok(SettleOutcome::Skipped(current)) => {
                tracing::warn!(order_id = order.id, ?current, "Venda já finalizada por outro caminho");
                let current = self.find_order(order.id).await?;
                Ok(Submission {
                    order: current,
                    redirect_url: None,
                })
            }
            Err(err) => {
                // A transação foi desfeita; a venda não pode ficar em processing_*
                tracing::error!(order_id = order.id, error = %err, "Falha ao liquidar a venda");
                self.finalize_with_note(
                    order.id,
                    &[order.status],
                    StatusUpdate::failed(OrderStatus::StockError),
                    NoteEntry::now(NoteCode::SettlementFailed, err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// QR: cria a preferência no gateway e devolve o link de pagamento.
    async fn start_qr_payment(&self, mut order: Order) -> Result<Submission, AppError> {
        let req = PreferenceRequest {
            order_id: order.id,
            amount: order.amount,
            description: order.description.clone(),
        };

        match self.gateway.create_preference(&req).await {
            Ok(preference) => {
                if let Err(err) = self.store.record_preference(order.id, &preference.id).await {
                    tracing::error!(
                        order_id = order.id,
                        preference_id = %preference.id,
                        error = %err,
                        "Preferência criada mas não registrada na venda"
                    );
                    self.note(
                        order.id,
                        NoteEntry::now(
                            NoteCode::PreferenceNotRecorded,
                            format!("preferência {}: {err}", preference.id),
                        ),
                    )
                    .await;
                }
                order.preference_id = Some(preference.id);
                Ok(Submission {
                    order,
                    redirect_url: Some(preference.redirect_url),
                })
            }
            Err(source) => {
                tracing::warn!(order_id = order.id, error = %source, "Gateway recusou a preferência");
                self.finalize_with_note(
                    order.id,
                    &[order.status],
                    StatusUpdate::failed(OrderStatus::GatewayError),
                    NoteEntry::now(NoteCode::GatewayError, source.to_string()),
                )
                .await;
                Err(AppError::Gateway {
                    order_id: order.id,
                    source,
                })
            }
        }
    }

    // --- WEBHOOK ---

    pub async fn handle_notification(
        &self,
        notification: Notification,
    ) -> Result<Reconciliation, AppError> {
        if !notification.is_payment() {
            tracing::debug!(topic = ?notification.topic, "Notificação ignorada");
            return Ok(Reconciliation::Ignored(IgnoreReason::NotPayment));
        }
        let Some(payment_id) = notification.payment_id else {
            tracing::warn!("Notificação de pagamento sem id");
            return Ok(Reconciliation::Ignored(IgnoreReason::MissingPaymentId));
        };

        // Só o que vem da API do gateway é considerado
        let payment = match self.gateway.get_payment(&payment_id).await {
            Ok(payment) => payment,
            Err(err) => {
                tracing::warn!(%payment_id, error = %err, "Falha ao consultar pagamento; notificação ignorada");
                return Ok(Reconciliation::Ignored(IgnoreReason::LookupFailed));
            }
        };

        self.reconcile_payment(payment).await
    }

    pub async fn reconcile_payment(
        &self,
        payment: PaymentDetails,
    ) -> Result<Reconciliation, AppError> {
        let Some(order_id) = payment.order_id() else {
            tracing::warn!(
                payment_id = %payment.id,
                reference = ?payment.external_reference,
                "Pagamento sem referência externa válida"
            );
            return Ok(Reconciliation::Ignored(IgnoreReason::MissingReference));
        };

        let Some(order) = self.store.find_order(order_id).await? else {
            tracing::warn!(order_id, payment_id = %payment.id, "Pagamento para venda inexistente");
            return Ok(Reconciliation::Ignored(IgnoreReason::OrderNotFound(order_id)));
        };

        if !order.status.awaits_gateway() {
            tracing::info!(
                order_id,
                status = ?order.status,
                terminal = order.status.is_terminal(),
                payment_id = %payment.id,
                "Webhook tardio ignorado"
            );
            return Ok(Reconciliation::Ignored(IgnoreReason::AlreadyFinal(order.status)));
        }

        match payment.status.outcome() {
            PaymentOutcome::Approved => self.settle_approved(order, payment).await,
            PaymentOutcome::Failed => self.reject(order, payment).await,
            PaymentOutcome::Undecided => {
                tracing::debug!(order_id, status = ?payment.status, "Pagamento ainda sem decisão");
                Ok(Reconciliation::Ignored(IgnoreReason::Undecided(payment.status)))
            }
        }
    }

    async fn settle_approved(
        &self,
        order: Order,
        payment: PaymentDetails,
    ) -> Result<Reconciliation, AppError> {
        let req = SettleRequest {
            expected: OrderStatus::guard(&AWAITING_GATEWAY, OrderStatus::Paid),
            method: PaymentMethod::Qr,
            sold_at: payment.approved_at.unwrap_or_else(Utc::now),
            gateway_payment_id: Some(payment.id.clone()),
        };

        match self.store.settle(order.id, req).await? {
            SettleOutcome::Settled(mut paid) => {
                // Só quem liquidou registra a divergência de valor
                if let Some(paid_amount) = payment.amount.filter(|a| *a != order.amount) {
                    let note = NoteEntry::now(
                        NoteCode::AmountMismatch,
                        amount_mismatch(order.amount, paid_amount, &payment.id),
                    );
                    if self.note(paid.id, note.clone()).await {
                        paid.internal_notes.push(note);
                    }
                }
                tracing::info!(
                    order_id = paid.id,
                    payment_id = %payment.id,
                    method = ?payment.method,
                    "Pagamento QR aprovado"
                );
                Ok(Reconciliation::Paid(paid))
            }
            SettleOutcome::StockShortage(failures) => {
                // Dinheiro recebido sem estoque: precisa de ação do operador
                tracing::error!(
                    order_id = order.id,
                    payment_id = %payment.id,
                    failures = %describe_failures(&failures),
                    "Pagamento aprovado mas estoque insuficiente"
                );
                self.mark_stock_error(order.id, &AWAITING_GATEWAY, Some(&payment.id), &failures)
                    .await;
                Ok(Reconciliation::StockShortage {
                    order_id: order.id,
                    failures,
                })
            }
            SettleOutcome::Skipped(current) => {
                tracing::info!(order_id = order.id, ?current, "Webhook duplicado ignorado");
                Ok(Reconciliation::Ignored(IgnoreReason::LostRace))
            }
        }
    }

    async fn reject(&self, order: Order, payment: PaymentDetails) -> Result<Reconciliation, AppError> {
        let update = StatusUpdate::failed(OrderStatus::Rejected).with_payment_id(&payment.id);
        let guard = OrderStatus::guard(&AWAITING_GATEWAY, OrderStatus::Rejected);

        match self.store.transition(order.id, &guard, update).await? {
            Some(rejected) => {
                tracing::info!(order_id = order.id, payment_id = %payment.id, status = ?payment.status, "Pagamento QR recusado");
                self.note(
                    order.id,
                    NoteEntry::now(
                        NoteCode::PaymentRejected,
                        format!(
                            "pagamento {} {:?} ({})",
                            payment.id,
                            payment.status,
                            payment.status_detail.as_deref().unwrap_or("sem detalhe")
                        ),
                    ),
                )
                .await;
                Ok(Reconciliation::Rejected(rejected))
            }
            None => Ok(Reconciliation::Ignored(IgnoreReason::LostRace)),
        }
    }

    // --- AUXILIARES ---

    async fn mark_stock_error(
        &self,
        order_id: i64,
        expected: &[OrderStatus],
        payment_id: Option<&str>,
        failures: &[StockFailure],
    ) {
        let mut update = StatusUpdate::failed(OrderStatus::StockError);
        if let Some(id) = payment_id {
            update = update.with_payment_id(id);
        }
        self.finalize_with_note(
            order_id,
            expected,
            update,
            NoteEntry::now(NoteCode::StockError, describe_failures(failures)),
        )
        .await;
    }

    /// Move a venda para um status de falha e registra o motivo. Erros aqui são
    /// apenas logados: a resposta ao caixa já está decidida.
    async fn finalize_with_note(
        &self,
        order_id: i64,
        expected: &[OrderStatus],
        update: StatusUpdate,
        note: NoteEntry,
    ) {
        let target = update.status;
        let guard = OrderStatus::guard(expected, target);
        match self.store.transition(order_id, &guard, update).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(order_id, ?target, "Venda não estava no status esperado")
            }
            Err(err) => {
                tracing::error!(order_id, ?target, error = %err, "Falha ao gravar status da venda")
            }
        }
        self.note(order_id, note).await;
    }

    async fn note(&self, order_id: i64, note: NoteEntry) -> bool {
        let code = note.code;
        match self.store.append_note(order_id, note).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(order_id, ?code, error = %err, "Falha ao anexar nota interna");
                false
            }
        }
    }
}

fn amount_mismatch(expected: Decimal, paid: Decimal, payment_id: &str) -> String {
    format!("pagamento {payment_id}: valor pago {paid} difere do total da venda {expected}")
}

/// Regras de negócio da venda (as de formato ficam no payload do handler).
fn check_order(mut new: NewOrder) -> Result<NewOrder, AppError> {
    if new.amount <= Decimal::ZERO {
        return Err(AppError::InvalidOrder("O valor da venda deve ser positivo.".into()));
    }
    if new.pharmacy_id <= 0 {
        return Err(AppError::InvalidOrder("Farmácia inválida.".into()));
    }
    if new.method != PaymentMethod::Qr && new.items.is_empty() {
        return Err(AppError::InvalidOrder(
            "Vendas em dinheiro ou cartão precisam de itens no carrinho.".into(),
        ));
    }
    if let Some(item) = new
        .items
        .iter()
        .find(|i| {
            i.sku.trim().is_empty()
                || !(1..=MAX_LINE_QUANTITY).contains(&i.quantity)
                || i.unit_price.is_sign_negative()
        })
    {
        return Err(AppError::InvalidOrder(format!(
            "Item inválido no carrinho: '{}' x{}",
            item.sku, item.quantity
        )));
    }
    Ok(new)
}
