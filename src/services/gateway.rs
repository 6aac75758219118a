// src/services/gateway.rs

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::MercadoPagoSettings;

// ---
// Erros do gateway
// ---

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Mercado Pago respondeu {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Tempo esgotado aguardando o Mercado Pago")]
    Timeout,

    #[error("Falha de comunicação com o Mercado Pago: {0}")]
    Transport(String),

    #[error("Resposta inesperada do Mercado Pago: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Status HTTP devolvido pelo próprio Mercado Pago, quando houve resposta.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Status que repassamos ao caixa.
    pub fn response_status(&self) -> StatusCode {
        match self {
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

// ---
// Tipos trocados com o gateway
// ---

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceRequest {
    pub order_id: i64,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preference {
    pub id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Approved,
    Pending,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    #[serde(other)]
    Unknown,
}

/// O que um status do gateway significa para a venda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved,
    Failed,
    Undecided,
}

impl GatewayPaymentStatus {
    pub fn outcome(self) -> PaymentOutcome {
        use GatewayPaymentStatus::*;
        match self {
            Approved => PaymentOutcome::Approved,
            Rejected | Cancelled | Refunded | ChargedBack => PaymentOutcome::Failed,
            Pending | Authorized | InProcess | InMediation | Unknown => PaymentOutcome::Undecided,
        }
    }
}

/// Pagamento como consultado na API do gateway (nunca o corpo do webhook).
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetails {
    pub id: String,
    pub status: GatewayPaymentStatus,
    pub status_detail: Option<String>,
    pub amount: Option<Decimal>,
    pub method: Option<String>,
    pub external_reference: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl PaymentDetails {
    /// A referência externa é o id da venda em texto.
    pub fn order_id(&self) -> Option<i64> {
        self.external_reference
            .as_deref()
            .and_then(|r| r.trim().parse::<i64>().ok())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(&self, req: &PreferenceRequest) -> Result<Preference, GatewayError>;

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError>;
}

// ---
// Cliente Mercado Pago
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Sandbox,
    Production,
}

impl GatewayMode {
    /// `MP_MODE` explícito vence; sem ele, credenciais `TEST-` indicam sandbox.
    pub fn resolve(explicit: Option<&str>, access_token: &str) -> Self {
        match explicit.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) if m == "sandbox" || m == "test" => GatewayMode::Sandbox,
            Some(m) if m == "production" || m == "prod" => GatewayMode::Production,
            _ if access_token.starts_with("TEST-") => GatewayMode::Sandbox,
            _ => GatewayMode::Production,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: Value,
    status: GatewayPaymentStatus,
    status_detail: Option<String>,
    transaction_amount: Option<Decimal>,
    payment_method_id: Option<String>,
    external_reference: Option<String>,
    date_approved: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    api_url: String,
    access_token: String,
    mode: GatewayMode,
    notification_url: String,
    frontend_url: Option<String>,
    currency: String,
}

impl MercadoPagoClient {
    pub fn new(settings: &MercadoPagoSettings) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
            mode: settings.mode,
            notification_url: settings.notification_url.clone(),
            frontend_url: settings.frontend_url.clone(),
            currency: settings.currency.clone(),
        })
    }

    fn preference_body(&self, req: &PreferenceRequest) -> Value {
        let title = if req.description.trim().is_empty() {
            format!("Venda #{}", req.order_id)
        } else {
            req.description.clone()
        };

        let mut body = json!({
            "items": [{
                "id": req.order_id.to_string(),
                "title": title,
                "quantity": 1,
                "currency_id": self.currency,
                "unit_price": req.amount,
            }],
            "external_reference": req.order_id.to_string(),
            "notification_url": self.notification_url,
        });

        if let Some(front) = &self.frontend_url {
            let front = front.trim_end_matches('/');
            body["back_urls"] = json!({
                "success": format!("{front}/pago/exito"),
                "failure": format!("{front}/pago/error"),
                "pending": format!("{front}/pago/pendiente"),
            });
            body["auto_return"] = json!("approved");
        }
        body
    }

    /// Transforma respostas não-2xx em `GatewayError::Api` com a mensagem do gateway.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or(text);
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_preference(&self, req: &PreferenceRequest) -> Result<Preference, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&self.preference_body(req))
            .send()
            .await?;

        let pref: PreferenceResponse = Self::check(resp).await?.json().await?;

        let redirect_url = match self.mode {
            GatewayMode::Sandbox => pref.sandbox_init_point.or(pref.init_point),
            GatewayMode::Production => pref.init_point,
        }
        .ok_or_else(|| GatewayError::InvalidResponse("preferência sem init_point".into()))?;

        tracing::debug!(order_id = req.order_id, preference_id = %pref.id, "Preferência criada");

        Ok(Preference {
            id: pref.id,
            redirect_url,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/v1/payments/{}", self.api_url, payment_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let raw: PaymentResponse = Self::check(resp).await?.json().await?;

        let id = match raw.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(GatewayError::InvalidResponse(format!(
                    "id de pagamento inválido: {other}"
                )));
            }
        };

        Ok(PaymentDetails {
            id,
            status: raw.status,
            status_detail: raw.status_detail,
            amount: raw.transaction_amount,
            method: raw.payment_method_id,
            external_reference: raw.external_reference,
            approved_at: raw.date_approved,
        })
    }
}

#[cfg(test)]
pub mod testing {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    /// Gateway em memória com respostas programáveis.
    pub struct FakeGateway {
        preference: Mutex<Result<Preference, GatewayError>>,
        payments: Mutex<HashMap<String, Result<PaymentDetails, GatewayError>>>,
        pub preference_requests: Mutex<Vec<PreferenceRequest>>,
        pub payment_lookups: AtomicUsize,
    }

    impl FakeGateway {
        pub fn new() -> Self {
            Self {
                preference: Mutex::new(Ok(Preference {
                    id: "pref-1".into(),
                    redirect_url: "https://sandbox.mercadopago.test/checkout/pref-1".into(),
                })),
                payments: Mutex::new(HashMap::new()),
                preference_requests: Mutex::new(Vec::new()),
                payment_lookups: AtomicUsize::new(0),
            }
        }

        pub fn fail_preferences(&self, err: GatewayError) {
            *self.preference.lock().unwrap() = Err(err);
        }

        pub fn set_payment(&self, id: &str, result: Result<PaymentDetails, GatewayError>) {
            self.payments.lock().unwrap().insert(id.to_string(), result);
        }

        pub fn lookups(&self) -> usize {
            self.payment_lookups.load(Ordering::SeqCst)
        }
    }

    pub fn payment(id: &str, order_id: i64, status: GatewayPaymentStatus) -> PaymentDetails {
        PaymentDetails {
            id: id.to_string(),
            status,
            status_detail: None,
            amount: None,
            method: Some("account_money".into()),
            external_reference: Some(order_id.to_string()),
            approved_at: None,
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_preference(
            &self,
            req: &PreferenceRequest,
        ) -> Result<Preference, GatewayError> {
            self.preference_requests.lock().unwrap().push(req.clone());
            self.preference.lock().unwrap().clone()
        }

        async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
            self.payment_lookups.fetch_add(1, Ordering::SeqCst);
            self.payments
                .lock()
                .unwrap()
                .get(payment_id)
                .cloned()
                .unwrap_or_else(|| {
                    Err(GatewayError::Api {
                        status: 404,
                        message: "Payment not found".into(),
                    })
                })
        }
    }
}
