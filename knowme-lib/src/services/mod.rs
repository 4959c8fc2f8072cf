//! Remote lookup services.
//!
//! Each service knows how to open the shared HTTP session for a run and how
//! to turn one [`BatchJob`] into a classified row. The runner only talks to
//! services through the [`Classifier`] trait.

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;

use crate::error::KnowMeError;
use crate::types::{BatchJob, ResultRow};

pub mod defunciones;
pub mod deudores;

pub use defunciones::{DefuncionesService, ValidityRecord, Vigencia};
pub use deudores::{DebtorRecord, DebtorStatus, DeudoresService};

/// One remote service variant.
///
/// `classify` performs exactly one network call and must never fail: every
/// transport error, timeout, unexpected status or malformed body is mapped
/// to a row whose kind is [`crate::OutcomeKind::Error`].
pub trait Classifier: Send + Sync + 'static {
    type Row: ResultRow;

    /// Short service name used in logs and export file names.
    fn name(&self) -> &'static str;

    /// Maximum number of lookups allowed in flight.
    fn max_concurrent(&self) -> usize;

    /// How many consecutive identifiers share one synthetic address, or
    /// `None` when the service does not use address rotation.
    fn rotation_interval(&self) -> Option<NonZeroUsize>;

    /// Open the HTTP session shared by every lookup of one run.
    ///
    /// This is the only failure that aborts a run.
    fn open_session(&self) -> Result<reqwest::Client, KnowMeError>;

    fn classify(
        &self,
        session: &reqwest::Client,
        job: BatchJob,
    ) -> impl Future<Output = Self::Row> + Send;
}

/// Why a lookup ended as an `Error` row.
#[derive(Debug)]
pub(crate) enum LookupFailure {
    Transport(reqwest::Error),
    Status(reqwest::StatusCode),
    ContentType(Option<String>),
}

impl LookupFailure {
    pub(crate) fn is_timeout(&self) -> bool {
        matches!(self, LookupFailure::Transport(e) if e.is_timeout())
    }
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupFailure::Transport(e) => write!(f, "{}", e),
            LookupFailure::Status(code) => write!(f, "service returned {}", code),
            LookupFailure::ContentType(Some(value)) => {
                write!(f, "unexpected content type '{}'", value)
            }
            LookupFailure::ContentType(None) => f.write_str("response has no content type"),
        }
    }
}

/// `application/json` or an `application/*+json` media type, parameters ignored.
pub(crate) fn is_json_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.split_once('/') {
        Some(("application", subtype)) => subtype == "json" || subtype.ends_with("+json"),
        _ => false,
    }
}

/// Decode a response body as JSON after checking its declared content type.
pub(crate) async fn read_json_body(response: reqwest::Response) -> Result<Value, LookupFailure> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    match content_type {
        Some(ref value) if is_json_content_type(value) => {}
        other => return Err(LookupFailure::ContentType(other)),
    }

    response
        .json::<Value>()
        .await
        .map_err(LookupFailure::Transport)
}
