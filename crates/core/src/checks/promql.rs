//! PromQL item evaluation and the minimal Prometheus HTTP client.
//!
//! An instant query is issued against `{base}/api/v1/query`; the first
//! sample's value is compared against the configured threshold, where the
//! comparison operator names the failure condition.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::item::PromqlConfig;
use crate::status::CheckStatus;

use super::{CheckContext, CheckOutcome};

/// One sample from an instant-query result vector.
#[derive(Debug, Clone)]
pub struct PromSample {
    pub labels: serde_json::Map<String, Value>,
    pub value: f64,
}

impl PromSample {
    /// Best-effort node identity from the sample labels.
    pub fn instance(&self) -> &str {
        self.labels
            .get("instance")
            .or_else(|| self.labels.get("node"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

/// Why a Prometheus query produced no samples.
#[derive(Debug, thiserror::Error)]
pub enum PromError {
    #[error("Prometheus request error: {0}")]
    Transport(String),
    #[error("Prometheus returned HTTP {0}: {1}")]
    BadStatus(u16, String),
    #[error("Prometheus query failed: {0}")]
    Api(String),
    #[error("Prometheus response is not valid JSON")]
    Decode,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<RawSample>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(default)]
    metric: serde_json::Map<String, Value>,
    #[serde(default)]
    value: Value,
}

/// Minimal Prometheus instant-query client.
pub struct PromClient {
    base_url: String,
    http: reqwest::Client,
}

impl PromClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PromError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PromError::Transport(e.to_string()))?;
        Ok(PromClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Run an instant query, returning the (possibly empty) result vector.
    pub async fn query(&self, expression: &str) -> Result<Vec<PromSample>, PromError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("query", expression)])
            .send()
            .await
            .map_err(|e| PromError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let snippet: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(PromError::BadStatus(status.as_u16(), snippet));
        }

        let envelope: QueryEnvelope =
            response.json().await.map_err(|_| PromError::Decode)?;
        if envelope.status != "success" {
            let message = format!(
                "{} {}",
                envelope.error_type.unwrap_or_default(),
                envelope.error.unwrap_or_default()
            );
            return Err(PromError::Api(message.trim().to_string()));
        }

        let samples = envelope
            .data
            .map(|d| d.result)
            .unwrap_or_default()
            .into_iter()
            .map(|raw| PromSample {
                value: extract_value(&raw.value),
                labels: raw.metric,
            })
            .collect();
        Ok(samples)
    }
}

/// Extract the numeric value from a sample's `value` field.
///
/// Instant queries return `[timestamp, "value-string"]`; the string may be
/// `"NaN"`, `"+Inf"`, or `"-Inf"`, all of which parse as IEEE-754 doubles.
/// Unparseable values map to NaN so the comparison rules apply uniformly.
pub fn extract_value(value: &Value) -> f64 {
    let scalar = match value {
        Value::Array(parts) if parts.len() >= 2 => &parts[1],
        other => other,
    };
    match scalar {
        Value::String(text) => text.trim().parse().unwrap_or(f64::NAN),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Evaluate a `promql` item configuration against the context's endpoint.
pub async fn evaluate_promql(cfg: &PromqlConfig, ctx: &CheckContext) -> CheckOutcome {
    let Some(base_url) = ctx.prometheus_url.as_deref().filter(|u| !u.is_empty()) else {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(cfg.empty_message.clone().unwrap_or_else(|| {
                "Prometheus endpoint is not configured for this cluster.".to_string()
            })),
            cfg.suggestion_if_empty.clone(),
        );
    };

    let client = match PromClient::new(base_url, ctx.prom_timeout()) {
        Ok(client) => client,
        Err(e) => return CheckOutcome::failed(e.to_string()),
    };

    let samples = match client.query(&cfg.expression).await {
        Ok(samples) => samples,
        Err(e) => return CheckOutcome::failed(e.to_string()),
    };

    let Some(first) = samples.first() else {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(
                cfg.empty_message
                    .clone()
                    .unwrap_or_else(|| "query returned no samples".to_string()),
            ),
            cfg.suggestion_if_empty.clone(),
        );
    };

    evaluate_sample(cfg, first.value)
}

/// Pure threshold evaluation of one sample value.
///
/// Split out from the transport so the comparison semantics are testable
/// without a live Prometheus.
pub fn evaluate_sample(cfg: &PromqlConfig, value: f64) -> CheckOutcome {
    let detail = render_detail(cfg, value);
    if cfg.comparison.failure_satisfied(value, cfg.fail_threshold) {
        CheckOutcome::new(CheckStatus::Failed, Some(detail), cfg.suggestion_on_fail.clone())
    } else {
        CheckOutcome::new(CheckStatus::Passed, Some(detail), None)
    }
}

fn render_detail(cfg: &PromqlConfig, value: f64) -> String {
    let template = cfg
        .detail_template
        .as_deref()
        .unwrap_or("{expression} = {value}");
    template
        .replace("{expression}", &cfg.expression)
        .replace("{value}", &format_value(value))
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == value.trunc() && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
