//! Wire and domain types for the account-activity API.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope of an inviteUserList page.
#[derive(Debug, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub data: Option<PageData>,
}

/// Page body: the record list plus the provider's running total.
#[derive(Debug, Deserialize)]
pub struct PageData {
    #[serde(default)]
    pub list: Vec<serde_json::Value>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Envelope of the server-time endpoint.
#[derive(Debug, Deserialize)]
pub struct ServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

/// One externally sourced account record.
///
/// `attributes` keeps the full provider payload so nothing is lost on
/// ingestion; the typed fields are the ones reconciliation reads.
#[derive(Debug, Clone)]
pub struct ExternalAccount {
    pub account_id: String,
    pub balance: f64,
    pub registered_at: Option<DateTime<Utc>>,
    /// Derived human-readable registration stamp, set during ingestion.
    pub register_time_text: Option<String>,
    pub attributes: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl ExternalAccount {
    /// Parse a raw provider record. Identity is `uid`, falling back to
    /// `id`; records without either are unusable and yield `None`.
    pub fn from_record(record: &serde_json::Value) -> Option<Self> {
        let account_id = record
            .get("uid")
            .or_else(|| record.get("id"))
            .and_then(value_to_id)?;

        let balance = record
            .get("balanceVolume")
            .and_then(value_to_f64)
            .unwrap_or(0.0);

        let registered_at = record
            .get("registerTime")
            .and_then(value_to_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        Some(Self {
            account_id,
            balance,
            registered_at,
            register_time_text: None,
            attributes: record.clone(),
            updated_at: Utc::now(),
        })
    }
}

/// Provider ids arrive as strings or numbers; normalize to a string.
fn value_to_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric fields arrive as numbers or numeric strings.
fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
