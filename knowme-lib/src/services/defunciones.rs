//! Document validity lookup.
//!
//! Each request is a JSON POST of `{"nuip": <document>, "ip": <address>}`.
//! The response status is not inspected: the body decides. A JSON object
//! with a `vigencia` field is reported as-is, a JSON object without it is
//! "No disponible", and anything that is not a JSON object is "Error". A
//! body not declared as JSON is "Error" even when it would parse.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::error::KnowMeError;
use crate::services::{read_json_body, Classifier, LookupFailure};
use crate::types::{
    BatchJob, DefuncionesConfig, Identifier, OutcomeKind, ResultRow, SyntheticAddress,
};

/// Validity reported for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vigencia {
    /// Value returned by the service (e.g. "Si")
    Reported(String),
    /// The service answered without a `vigencia` value
    NoDisponible,
    /// The lookup failed
    Error,
}

impl fmt::Display for Vigencia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vigencia::Reported(value) => f.write_str(value),
            Vigencia::NoDisponible => f.write_str("No disponible"),
            Vigencia::Error => f.write_str("Error"),
        }
    }
}

impl Serialize for Vigencia {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result row: `{Documento, Vigencia}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidityRecord {
    #[serde(rename = "Documento")]
    pub documento: Identifier,
    #[serde(rename = "Vigencia")]
    pub vigencia: Vigencia,
}

impl ResultRow for ValidityRecord {
    fn columns() -> &'static [&'static str] {
        &["Documento", "Vigencia"]
    }

    fn failed(identifier: Identifier) -> Self {
        Self {
            documento: identifier,
            vigencia: Vigencia::Error,
        }
    }

    fn identifier(&self) -> &str {
        &self.documento
    }

    fn kind(&self) -> OutcomeKind {
        match self.vigencia {
            Vigencia::Reported(_) => OutcomeKind::Success,
            Vigencia::NoDisponible => OutcomeKind::Unavailable,
            Vigencia::Error => OutcomeKind::Error,
        }
    }

    fn values(&self) -> Vec<String> {
        vec![self.documento.clone(), self.vigencia.to_string()]
    }
}

#[derive(Serialize)]
struct ValidityRequest<'a> {
    nuip: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
}

/// Client for the document validity service.
#[derive(Debug, Clone)]
pub struct DefuncionesService {
    config: DefuncionesConfig,
}

impl DefuncionesService {
    /// Create a service client, validating the configuration.
    pub fn new(config: DefuncionesConfig) -> Result<Self, KnowMeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DefuncionesConfig {
        &self.config
    }

    async fn lookup(
        &self,
        session: &reqwest::Client,
        nuip: &str,
        address: Option<SyntheticAddress>,
    ) -> Result<Value, LookupFailure> {
        let payload = ValidityRequest {
            nuip,
            ip: address.map(|a| a.to_string()),
        };
        let response = session
            .post(&self.config.endpoint_url)
            .json(&payload)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(LookupFailure::Transport)?;

        debug!(
            service = "defunciones",
            identifier = nuip,
            status = response.status().as_u16(),
            "response received"
        );

        read_json_body(response).await
    }
}

impl Classifier for DefuncionesService {
    type Row = ValidityRecord;

    fn name(&self) -> &'static str {
        "defunciones"
    }

    fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    fn rotation_interval(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.config.ip_interval)
    }

    fn open_session(&self) -> Result<reqwest::Client, KnowMeError> {
        reqwest::Client::builder().build().map_err(|e| {
            KnowMeError::session_with_source("Failed to open defunciones session", e.to_string())
        })
    }

    async fn classify(&self, session: &reqwest::Client, job: BatchJob) -> ValidityRecord {
        let BatchJob {
            identifier,
            address,
        } = job;

        let vigencia = match self.lookup(session, &identifier, address).await {
            Ok(body) => vigencia_from_body(&body),
            Err(failure) => {
                debug!(
                    service = "defunciones",
                    identifier = %identifier,
                    timeout = failure.is_timeout(),
                    error = %failure,
                    "lookup failed"
                );
                Vigencia::Error
            }
        };

        ValidityRecord {
            documento: identifier,
            vigencia,
        }
    }
}

/// Classify a decoded response body.
pub fn vigencia_from_body(body: &Value) -> Vigencia {
    let Some(object) = body.as_object() else {
        return Vigencia::Error;
    };

    match object.get("vigencia") {
        None | Some(Value::Null) => Vigencia::NoDisponible,
        Some(Value::String(value)) => Vigencia::Reported(value.clone()),
        Some(other) => Vigencia::Reported(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vigencia_reported() {
        assert_eq!(
            vigencia_from_body(&json!({"vigencia": "Si"})),
            Vigencia::Reported("Si".to_string())
        );
        assert_eq!(
            vigencia_from_body(&json!({"vigencia": true})),
            Vigencia::Reported("true".to_string())
        );
    }

    #[test]
    fn test_vigencia_missing_is_unavailable() {
        assert_eq!(
            vigencia_from_body(&json!({"detail": "not found"})),
            Vigencia::NoDisponible
        );
        assert_eq!(
            vigencia_from_body(&json!({"vigencia": null})),
            Vigencia::NoDisponible
        );
    }

    #[test]
    fn test_non_object_body_is_error() {
        assert_eq!(vigencia_from_body(&json!(["Si"])), Vigencia::Error);
        assert_eq!(vigencia_from_body(&json!("Si")), Vigencia::Error);
    }

    #[test]
    fn test_record_row_values() {
        let record = ValidityRecord {
            documento: "1020".to_string(),
            vigencia: Vigencia::NoDisponible,
        };
        assert_eq!(record.kind(), OutcomeKind::Unavailable);
        assert_eq!(record.values(), vec!["1020", "No disponible"]);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"Documento": "1020", "Vigencia": "No disponible"})
        );
    }

    #[test]
    fn test_rotation_interval_from_config() {
        let service = DefuncionesService::new(
            DefuncionesConfig::new("http://localhost/api").with_ip_interval(25),
        )
        .unwrap();
        assert_eq!(service.rotation_interval().map(|n| n.get()), Some(25));
    }
}
