//! Debtor status lookup.
//!
//! Each request is a JSON POST of `{"Documento": <document>}`. Unlike the
//! validity service, the status code is checked first: anything outside
//! 2xx is an error. A successful body with a non-zero `Total` and a
//! non-empty `Data` list marks the document as a debtor; otherwise it is not.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::error::KnowMeError;
use crate::services::{read_json_body, Classifier, LookupFailure};
use crate::types::{BatchJob, DeudoresConfig, Identifier, OutcomeKind, ResultRow};

/// Debtor status of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DebtorStatus {
    #[serde(rename = "Moroso")]
    Moroso,
    #[serde(rename = "No moroso")]
    NoMoroso,
    #[serde(rename = "Error")]
    Error,
}

impl fmt::Display for DebtorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebtorStatus::Moroso => f.write_str("Moroso"),
            DebtorStatus::NoMoroso => f.write_str("No moroso"),
            DebtorStatus::Error => f.write_str("Error"),
        }
    }
}

/// Result row: `{Documento, Sancionado, Estado}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebtorRecord {
    #[serde(rename = "Documento")]
    pub documento: Identifier,
    /// Service-defined sanction value of the first matching record
    #[serde(rename = "Sancionado")]
    pub sancionado: Option<Value>,
    #[serde(rename = "Estado")]
    pub estado: DebtorStatus,
}

impl DebtorRecord {
    /// Sanction value as display text; empty when absent.
    pub fn sancionado_text(&self) -> String {
        match &self.sancionado {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl ResultRow for DebtorRecord {
    fn columns() -> &'static [&'static str] {
        &["Documento", "Sancionado", "Estado"]
    }

    fn failed(identifier: Identifier) -> Self {
        Self {
            documento: identifier,
            sancionado: None,
            estado: DebtorStatus::Error,
        }
    }

    fn identifier(&self) -> &str {
        &self.documento
    }

    fn kind(&self) -> OutcomeKind {
        match self.estado {
            // Both answers are definitive; the service has no "unknown" state.
            DebtorStatus::Moroso | DebtorStatus::NoMoroso => OutcomeKind::Success,
            DebtorStatus::Error => OutcomeKind::Error,
        }
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.documento.clone(),
            self.sancionado_text(),
            self.estado.to_string(),
        ]
    }
}

#[derive(Serialize)]
struct DebtorRequest<'a> {
    #[serde(rename = "Documento")]
    documento: &'a str,
}

/// Client for the debtor status service.
#[derive(Debug, Clone)]
pub struct DeudoresService {
    config: DeudoresConfig,
}

impl DeudoresService {
    /// Create a service client, validating the configuration.
    pub fn new(config: DeudoresConfig) -> Result<Self, KnowMeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DeudoresConfig {
        &self.config
    }

    async fn lookup(
        &self,
        session: &reqwest::Client,
        documento: &str,
    ) -> Result<Value, LookupFailure> {
        let response = session
            .post(&self.config.endpoint_url)
            .json(&DebtorRequest { documento })
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(LookupFailure::Transport)?;

        let status = response.status();
        debug!(
            service = "deudores",
            identifier = documento,
            status = status.as_u16(),
            "response received"
        );

        if !status.is_success() {
            return Err(LookupFailure::Status(status));
        }

        read_json_body(response).await
    }
}

impl Classifier for DeudoresService {
    type Row = DebtorRecord;

    fn name(&self) -> &'static str {
        "deudores"
    }

    fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    fn rotation_interval(&self) -> Option<NonZeroUsize> {
        None
    }

    fn open_session(&self) -> Result<reqwest::Client, KnowMeError> {
        // Per-host pool never exceeds the in-flight limit.
        reqwest::Client::builder()
            .pool_max_idle_per_host(self.config.max_concurrent)
            .build()
            .map_err(|e| {
                KnowMeError::session_with_source("Failed to open deudores session", e.to_string())
            })
    }

    async fn classify(&self, session: &reqwest::Client, job: BatchJob) -> DebtorRecord {
        let documento = job.identifier;

        match self.lookup(session, &documento).await {
            Ok(body) => {
                let (sancionado, estado) = debtor_from_body(&body);
                DebtorRecord {
                    documento,
                    sancionado,
                    estado,
                }
            }
            Err(failure) => {
                debug!(
                    service = "deudores",
                    identifier = %documento,
                    error = %failure,
                    "lookup failed"
                );
                DebtorRecord::failed(documento)
            }
        }
    }
}

/// Classify a decoded 2xx response body into `(Sancionado, Estado)`.
///
/// A falsy `Total` or `Data` (missing, null, zero, empty) means no match,
/// whatever the other field holds. Only when both are truthy must `Data`
/// be a list whose first element is an object.
pub fn debtor_from_body(body: &Value) -> (Option<Value>, DebtorStatus) {
    let Some(object) = body.as_object() else {
        return (None, DebtorStatus::Error);
    };

    let total = object.get("Total").map(is_truthy).unwrap_or(false);
    let data = object.get("Data").filter(|v| is_truthy(v));
    let Some(data) = data.filter(|_| total) else {
        return (None, DebtorStatus::NoMoroso);
    };

    match data
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_object)
    {
        Some(first) => {
            let sancionado = first.get("Sancionado").filter(|v| !v.is_null()).cloned();
            (sancionado, DebtorStatus::Moroso)
        }
        None => (None, DebtorStatus::Error),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debtor_match() {
        let body = json!({"Total": 1, "Data": [{"Sancionado": "SI", "Nombre": "x"}]});
        assert_eq!(
            debtor_from_body(&body),
            (Some(json!("SI")), DebtorStatus::Moroso)
        );
    }

    #[test]
    fn test_debtor_no_match() {
        assert_eq!(
            debtor_from_body(&json!({"Total": 0, "Data": []})),
            (None, DebtorStatus::NoMoroso)
        );
        assert_eq!(debtor_from_body(&json!({})), (None, DebtorStatus::NoMoroso));
        // A count without rows is not a match.
        assert_eq!(
            debtor_from_body(&json!({"Total": 3, "Data": []})),
            (None, DebtorStatus::NoMoroso)
        );
    }

    #[test]
    fn test_debtor_match_without_sanction_field() {
        let body = json!({"Total": 2, "Data": [{"Nombre": "x"}, {"Sancionado": "NO"}]});
        assert_eq!(debtor_from_body(&body), (None, DebtorStatus::Moroso));
    }

    #[test]
    fn test_malformed_bodies_are_errors() {
        assert_eq!(debtor_from_body(&json!([1, 2])), (None, DebtorStatus::Error));
        assert_eq!(
            debtor_from_body(&json!({"Total": 1, "Data": "oops"})),
            (None, DebtorStatus::Error)
        );
        assert_eq!(
            debtor_from_body(&json!({"Total": 1, "Data": {"Sancionado": "SI"}})),
            (None, DebtorStatus::Error)
        );
        assert_eq!(
            debtor_from_body(&json!({"Total": 1, "Data": [42]})),
            (None, DebtorStatus::Error)
        );
    }

    #[test]
    fn test_falsy_total_or_data_short_circuits() {
        // Shape of the other field does not matter once one side is falsy.
        for body in [
            json!({"Total": 0, "Data": "x"}),
            json!({"Total": 0, "Data": {}}),
            json!({"Total": 1, "Data": ""}),
            json!({"Total": 1, "Data": {}}),
            json!({"Total": null, "Data": [42]}),
            json!({"Total": "", "Data": [{"Sancionado": "SI"}]}),
        ] {
            assert_eq!(
                debtor_from_body(&body),
                (None, DebtorStatus::NoMoroso),
                "body: {}",
                body
            );
        }
    }

    #[test]
    fn test_record_values_and_serialization() {
        let record = DebtorRecord {
            documento: "77".to_string(),
            sancionado: Some(json!(true)),
            estado: DebtorStatus::Moroso,
        };
        assert_eq!(record.values(), vec!["77", "true", "Moroso"]);
        assert_eq!(record.kind(), OutcomeKind::Success);

        let not_debtor = DebtorRecord {
            estado: DebtorStatus::NoMoroso,
            sancionado: None,
            ..record
        };
        assert_eq!(not_debtor.kind(), OutcomeKind::Success);

        let failed = DebtorRecord::failed("78".to_string());
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"Documento": "78", "Sancionado": null, "Estado": "Error"})
        );
    }

    #[test]
    fn test_no_rotation() {
        let service = DeudoresService::new(DeudoresConfig::new("http://localhost/api")).unwrap();
        assert!(service.rotation_interval().is_none());
    }
}
