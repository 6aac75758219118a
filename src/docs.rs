// src/docs.rs

use utoipa::OpenApi;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Vendas ---
        handlers::sales::create_order,
        handlers::sales::get_order,

        // --- Webhooks ---
        handlers::webhook::mercado_pago_webhook,
    ),
    components(
        schemas(
            // --- Vendas ---
            models::sales::PaymentMethod,
            models::sales::OrderStatus,
            models::sales::LineItem,
            models::sales::NoteCode,
            models::sales::NoteEntry,
            models::sales::Order,

            // --- Estoque ---
            models::inventory::StockFailureReason,
            models::inventory::StockFailure,

            // --- Payloads ---
            handlers::sales::CartItemPayload,
            handlers::sales::CreateOrderPayload,
            handlers::sales::CreateOrderResponse,
        )
    ),
    tags(
        (name = "Sales", description = "Vendas no caixa (dinheiro, cartão e QR)"),
        (name = "Webhooks", description = "Notificações de pagamento do Mercado Pago")
    )
)]
pub struct ApiDoc;
