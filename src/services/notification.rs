// src/services/notification.rs
//
// Notificações (webhooks) do Mercado Pago: leitura tolerante do corpo/query e
// verificação da assinatura `x-signature`.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

/// O que conseguimos extrair de uma notificação. Nada aqui decide a venda:
/// o pagamento é sempre consultado de novo na API pelo `payment_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Notification {
    pub topic: Option<String>,
    pub payment_id: Option<String>,
    pub live_mode: Option<bool>,
}

impl Notification {
    /// Aceita o formato atual (`{"type":"payment","data":{"id":..}}`), o da query
    /// (`?type=payment&data.id=..`) e o legado (`?topic=payment&id=..`).
    pub fn resolve(query: &HashMap<String, String>, body: &[u8]) -> Self {
        let json: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

        let topic = json
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| json.get("topic").and_then(Value::as_str))
            .map(String::from)
            .or_else(|| query.get("type").cloned())
            .or_else(|| query.get("topic").cloned());

        let payment_id = query
            .get("data.id")
            .cloned()
            .or_else(|| json.get("data").and_then(|d| d.get("id")).and_then(id_to_string))
            .or_else(|| query.get("id").cloned())
            .filter(|id| is_payment_id(id));

        let live_mode = json.get("live_mode").and_then(Value::as_bool);

        Self {
            topic,
            payment_id,
            live_mode,
        }
    }

    pub fn is_payment(&self) -> bool {
        self.topic.as_deref() == Some("payment")
    }
}

/// Ids de pagamento do Mercado Pago são numéricos; qualquer outra coisa é descartada
/// antes de virar segmento de URL na consulta.
fn is_payment_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 32 && id.bytes().all(|b| b.is_ascii_digit())
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---
// Assinatura
// ---

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("cabeçalho x-signature ausente")]
    Missing,
    #[error("cabeçalho x-signature malformado")]
    Malformed,
    #[error("assinatura não confere")]
    Mismatch,
}

/// Monta o texto assinado: `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`.
/// Partes ausentes são omitidas.
pub fn manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut out = String::new();
    if let Some(id) = data_id {
        out.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(req) = request_id {
        out.push_str(&format!("request-id:{req};"));
    }
    out.push_str(&format!("ts:{ts};"));
    out
}

/// Verifica `x-signature: ts=<unix>,v1=<hex hmac-sha256>` contra o segredo do webhook.
pub fn verify_signature(
    secret: &str,
    signature_header: Option<&str>,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> Result<(), SignatureError> {
    let header = signature_header.ok_or(SignatureError::Missing)?;

    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("ts=") {
            ts = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            v1 = v;
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let expected = hex::decode(v1).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(manifest(data_id, request_id, ts).as_bytes());
    // Comparação em tempo constante
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, data_id: &str, request_id: &str, ts: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(manifest(Some(data_id), Some(request_id), ts).as_bytes());
    format!("ts={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}
