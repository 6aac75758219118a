// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::PgSalesStore,
    services::{
        gateway::{GatewayMode, MercadoPagoClient},
        sales_service::SalesService,
    },
};

/// Configuração do Mercado Pago (cliente HTTP e webhook).
#[derive(Debug, Clone)]
pub struct MercadoPagoSettings {
    pub api_url: String,
    pub access_token: String,
    pub mode: GatewayMode,
    pub timeout: Duration,
    pub webhook_secret: Option<String>,
    pub currency: String,
    /// URL pública completa do endpoint de webhook.
    pub notification_url: String,
    pub frontend_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: String,
    pub mercado_pago: MercadoPagoSettings,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Monta as configurações a partir de uma função de leitura (o ambiente, em produção).
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let access_token = get("MP_ACCESS_TOKEN").context("MP_ACCESS_TOKEN deve ser definido")?;

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS inválido: {v}"))?,
            None => 5,
        };

        let timeout_secs: u64 = match get("MP_TIMEOUT_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("MP_TIMEOUT_SECS inválido: {v}"))?,
            None => 5,
        };
        if timeout_secs == 0 {
            bail!("MP_TIMEOUT_SECS deve ser maior que zero");
        }

        let public_url = get("PUBLIC_URL").context("PUBLIC_URL deve ser definida")?;
        let notification_url = format!(
            "{}/mercado_pago_webhook",
            public_url.trim_end_matches('/')
        );

        let mode = GatewayMode::resolve(get("MP_MODE").as_deref(), &access_token);

        Ok(Self {
            database_url,
            max_connections,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            mercado_pago: MercadoPagoSettings {
                api_url: get("MP_API_URL")
                    .unwrap_or_else(|| "https://api.mercadopago.com".into()),
                access_token,
                mode,
                timeout: Duration::from_secs(timeout_secs),
                webhook_secret: get("MP_WEBHOOK_SECRET"),
                currency: get("MP_CURRENCY").unwrap_or_else(|| "ARS".into()),
                notification_url,
                frontend_url: get("FRONTEND_URL"),
            },
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sales_service: SalesService,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        sqlx::migrate!()
            .run(&db_pool)
            .await
            .context("Falha ao rodar as migrações do banco de dados")?;

        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

        // --- Monta o gráfico de dependências ---
        let store = Arc::new(PgSalesStore::new(db_pool));
        let gateway = Arc::new(
            MercadoPagoClient::new(&settings.mercado_pago)
                .context("Falha ao montar o cliente do Mercado Pago")?,
        );

        tracing::info!(mode = ?settings.mercado_pago.mode, "Cliente Mercado Pago configurado");

        Ok(Self::from_parts(
            SalesService::new(store, gateway),
            settings.mercado_pago.webhook_secret.clone(),
        ))
    }

    pub fn from_parts(sales_service: SalesService, webhook_secret: Option<String>) -> Self {
        Self {
            sales_service,
            webhook_secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_applied() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/farmacia"),
            ("MP_ACCESS_TOKEN", "TEST-123"),
            ("PUBLIC_URL", "http://localhost:3000"),
        ]))
        .unwrap();

        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
        let mp = settings.mercado_pago;
        assert_eq!(mp.mode, GatewayMode::Sandbox);
        assert_eq!(mp.timeout, Duration::from_secs(5));
        assert_eq!(mp.currency, "ARS");
        assert_eq!(mp.api_url, "https://api.mercadopago.com");
        assert_eq!(mp.notification_url, "http://localhost:3000/mercado_pago_webhook");
        assert!(mp.webhook_secret.is_none());
    }

    #[test]
    fn explicit_values_win() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/farmacia"),
            ("MP_ACCESS_TOKEN", "TEST-123"),
            ("MP_MODE", "production"),
            ("MP_TIMEOUT_SECS", "12"),
            ("MP_WEBHOOK_SECRET", "s3cr3t"),
            ("PUBLIC_URL", "https://caja.example.com/"),
        ]))
        .unwrap();

        let mp = settings.mercado_pago;
        assert_eq!(mp.mode, GatewayMode::Production);
        assert_eq!(mp.timeout, Duration::from_secs(12));
        assert_eq!(mp.webhook_secret.as_deref(), Some("s3cr3t"));
        assert_eq!(mp.notification_url, "https://caja.example.com/mercado_pago_webhook");
    }

    #[test]
    fn missing_required_values_are_errors() {
        let err = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap_err();
        assert!(err.to_string().contains("MP_ACCESS_TOKEN"));

        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("MP_ACCESS_TOKEN", "APP_USR-1"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PUBLIC_URL"));
    }

    #[test]
    fn blank_secret_counts_as_absent() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("MP_ACCESS_TOKEN", "APP_USR-1"),
            ("MP_WEBHOOK_SECRET", "  "),
            ("PUBLIC_URL", "https://caja.example.com"),
        ]))
        .unwrap();
        assert!(settings.mercado_pago.webhook_secret.is_none());
        assert_eq!(settings.mercado_pago.mode, GatewayMode::Production);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("MP_ACCESS_TOKEN", "APP_USR-1"),
            ("MP_TIMEOUT_SECS", "0"),
            ("PUBLIC_URL", "https://caja.example.com"),
        ]));
        assert!(result.is_err());
    }
}
