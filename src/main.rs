//src/main.rs

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod services;

use crate::config::{AppState, Settings};
use crate::docs::ApiDoc;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Farmacia pagos em funcionamento" }))
        .route("/api/health", get(|| async { "OK" }))
        .route("/create_order", post(handlers::sales::create_order))
        .route("/orders/{id}", get(handlers::sales::get_order))
        .route(
            "/mercado_pago_webhook",
            post(handlers::webhook::mercado_pago_webhook),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,farmacia_pagos=debug")),
        )
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env()?;
    if settings.mercado_pago.webhook_secret.is_none() {
        tracing::warn!("MP_WEBHOOK_SECRET não definido: webhooks serão aceitos sem assinatura");
    }

    let app_state = AppState::new(&settings).await?;
    let app = router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
