//! Core data types for batch lookups.
//!
//! This module defines the values that flow through a run: identifiers,
//! synthetic source addresses, jobs, classified rows, progress updates and
//! the result table, plus the per-service configuration structs.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::KnowMeError;

/// A caller-supplied token being looked up (e.g. a document number).
///
/// No uniqueness is enforced: duplicates are looked up independently and
/// produce one row each.
pub type Identifier = String;

/// A randomly generated, never validated IPv4-looking address attached to
/// outgoing requests to vary their apparent origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntheticAddress([u8; 4]);

impl SyntheticAddress {
    pub fn new(octets: [u8; 4]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for SyntheticAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl Serialize for SyntheticAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The unit of work: one identifier and the address (if any) to present
/// for it. Consumed by exactly one classifier invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub identifier: Identifier,
    pub address: Option<SyntheticAddress>,
}

impl BatchJob {
    pub fn new(identifier: impl Into<Identifier>, address: Option<SyntheticAddress>) -> Self {
        Self {
            identifier: identifier.into(),
            address,
        }
    }
}

/// Classification of one lookup.
///
/// `Unavailable` and `Error` are both terminal; the difference is that
/// `Unavailable` means the service answered but had no data for the
/// identifier, while `Error` means the lookup itself failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutcomeKind {
    Success,
    Unavailable,
    Error,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "Success"),
            OutcomeKind::Unavailable => write!(f, "Unavailable"),
            OutcomeKind::Error => write!(f, "Error"),
        }
    }
}

/// A classified result row produced by one service.
///
/// Every service defines its own row schema; this trait exposes what the
/// runner and the exporters need from it.
pub trait ResultRow: fmt::Debug + Clone + Send + Serialize + 'static {
    /// Column headers, in output order.
    fn columns() -> &'static [&'static str];

    /// Row for an identifier whose lookup failed before a response was
    /// classified.
    fn failed(identifier: Identifier) -> Self;

    /// The identifier this row was produced for.
    fn identifier(&self) -> &str;

    fn kind(&self) -> OutcomeKind;

    /// Cell values, aligned with [`ResultRow::columns`].
    fn values(&self) -> Vec<String>;
}

/// Progress of a run: `completed` of `total` lookups have finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
}

impl ProgressState {
    /// Completed fraction in `[0.0, 1.0]`. An empty run counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} de {} ({:.1}%)",
            self.completed,
            self.total,
            self.fraction() * 100.0
        )
    }
}

/// Receives a [`ProgressState`] after every completed lookup.
///
/// Called synchronously from the run's single consuming path, so
/// implementations never see concurrent calls.
pub trait ProgressSink {
    fn on_progress(&mut self, state: ProgressState);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressState),
{
    fn on_progress(&mut self, state: ProgressState) {
        self(state)
    }
}

/// Sink that discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _state: ProgressState) {}
}

/// Rows of a finished run, in completion order (not input order).
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ResultTable<R> {
    rows: Vec<R>,
}

impl<R: ResultRow> ResultTable<R> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, row: R) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }

    /// Number of rows with the given classification.
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.rows.iter().filter(|r| r.kind() == kind).count()
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

impl<R: ResultRow> Default for ResultTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> IntoIterator for ResultTable<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a ResultTable<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Remote services known to the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Document validity lookup (rotates its source address)
    Defunciones,
    /// Debtor status lookup (limits per-host connections)
    Deudores,
}

impl ServiceKind {
    pub fn all() -> &'static [ServiceKind] {
        &[ServiceKind::Defunciones, ServiceKind::Deudores]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Defunciones => "defunciones",
            ServiceKind::Deudores => "deudores",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ServiceKind::Defunciones => "Document validity (vigencia) lookup",
            ServiceKind::Deudores => "Debtor status (morosidad) lookup",
        }
    }

    /// Whether requests to this service carry a rotating synthetic address.
    pub fn rotates_address(&self) -> bool {
        matches!(self, ServiceKind::Defunciones)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceKind {
    type Err = KnowMeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ServiceKind::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| KnowMeError::unknown_service(s.trim()))
    }
}

/// Configuration for the document validity service.
///
/// All values are supplied by the caller; use [`DefuncionesConfig::new`]
/// together with the `with_*` builders.
#[derive(Debug, Clone, PartialEq)]
pub struct DefuncionesConfig {
    pub endpoint_url: String,
    /// Maximum number of requests in flight
    pub max_concurrent: usize,
    /// Number of consecutive identifiers sharing one synthetic address
    pub ip_interval: usize,
    pub request_timeout: Duration,
}

impl DefuncionesConfig {
    pub const DEFAULT_MAX_CONCURRENT: usize = 50;
    pub const DEFAULT_IP_INTERVAL: usize = 100;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
            ip_interval: Self::DEFAULT_IP_INTERVAL,
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_ip_interval(mut self, ip_interval: usize) -> Self {
        self.ip_interval = ip_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), KnowMeError> {
        validate_endpoint(&self.endpoint_url)?;
        validate_limits(self.max_concurrent, self.request_timeout)?;
        if self.ip_interval == 0 {
            return Err(KnowMeError::config("ip_interval must be a positive integer"));
        }
        Ok(())
    }
}

/// Configuration for the debtor status service.
#[derive(Debug, Clone, PartialEq)]
pub struct DeudoresConfig {
    pub endpoint_url: String,
    /// Maximum number of requests in flight, also used as the per-host
    /// connection pool limit
    pub max_concurrent: usize,
    pub request_timeout: Duration,
}

impl DeudoresConfig {
    pub const DEFAULT_MAX_CONCURRENT: usize = 20;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), KnowMeError> {
        validate_endpoint(&self.endpoint_url)?;
        validate_limits(self.max_concurrent, self.request_timeout)
    }
}

fn validate_endpoint(url: &str) -> Result<(), KnowMeError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(KnowMeError::config("endpoint url cannot be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(KnowMeError::config(format!(
            "endpoint url '{}' must start with http:// or https://",
            url
        )));
    }
    Ok(())
}

fn validate_limits(max_concurrent: usize, timeout: Duration) -> Result<(), KnowMeError> {
    if max_concurrent == 0 {
        return Err(KnowMeError::config("max_concurrent must be a positive integer"));
    }
    if timeout.is_zero() {
        return Err(KnowMeError::config("request timeout must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_address_display() {
        let addr = SyntheticAddress::new([10, 0, 255, 7]);
        assert_eq!(addr.to_string(), "10.0.255.7");
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"10.0.255.7\"");
    }

    #[test]
    fn test_progress_state_display() {
        let state = ProgressState {
            completed: 1,
            total: 3,
        };
        assert_eq!(state.to_string(), "1 de 3 (33.3%)");
        assert!(!state.is_complete());

        let empty = ProgressState {
            completed: 0,
            total: 0,
        };
        assert_eq!(empty.fraction(), 1.0);
        assert!(empty.is_complete());
    }

    #[test]
    fn test_service_kind_parsing() {
        assert_eq!(
            "Defunciones".parse::<ServiceKind>().unwrap(),
            ServiceKind::Defunciones
        );
        assert_eq!(
            " deudores ".parse::<ServiceKind>().unwrap(),
            ServiceKind::Deudores
        );
        let err = "registro".parse::<ServiceKind>().unwrap_err();
        assert!(matches!(err, KnowMeError::UnknownService { name } if name == "registro"));
    }

    #[test]
    fn test_config_validation() {
        assert!(DefuncionesConfig::new("https://example.test/api")
            .validate()
            .is_ok());
        assert!(DefuncionesConfig::new("https://example.test/api")
            .with_ip_interval(0)
            .validate()
            .is_err());
        assert!(DeudoresConfig::new("ftp://example.test")
            .validate()
            .is_err());
        assert!(DeudoresConfig::new("http://example.test")
            .with_max_concurrent(0)
            .validate()
            .is_err());
        assert!(DeudoresConfig::new("http://example.test")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
