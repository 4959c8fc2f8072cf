//! Configuration file parsing and management.
//!
//! Service settings come from three layers, lowest precedence first:
//! TOML configuration files, `KM_*` environment variables, and explicit
//! overrides (usually CLI flags). Each layer is a [`ServiceSection`] per
//! service; [`resolve_defunciones`] and [`resolve_deudores`] merge them into
//! the typed configuration consumed by the services.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::KnowMeError;
use crate::types::{DefuncionesConfig, DeudoresConfig, ServiceKind};

/// Upper bound accepted for `max_concurrent` in any layer.
pub const MAX_CONCURRENCY_LIMIT: usize = 1000;

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defunciones]
/// url = "https://validity.example/consulta"
/// max_concurrent = 50
/// ip_interval = 100
/// timeout = "10s"
///
/// [deudores]
/// url = "https://debtors.example/consulta"
/// max_concurrent = 20
/// timeout = "30s"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defunciones: Option<ServiceSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deudores: Option<ServiceSection>,
}

impl FileConfig {
    pub fn section(&self, kind: ServiceKind) -> Option<&ServiceSection> {
        match kind {
            ServiceKind::Defunciones => self.defunciones.as_ref(),
            ServiceKind::Deudores => self.deudores.as_ref(),
        }
    }
}

/// Settings for one service. Every field is optional so sections from
/// different layers can be merged field by field.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    /// Endpoint the lookups are POSTed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Maximum lookups in flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,

    /// Identifiers per synthetic address (defunciones only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_interval: Option<usize>,

    /// Per-request timeout, e.g. "10s", "2m" or "30"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl ServiceSection {
    /// Overlay `higher` on top of `self`; set fields in `higher` win.
    pub fn merged_with(mut self, higher: &ServiceSection) -> ServiceSection {
        if higher.url.is_some() {
            self.url = higher.url.clone();
        }
        if higher.max_concurrent.is_some() {
            self.max_concurrent = higher.max_concurrent;
        }
        if higher.ip_interval.is_some() {
            self.ip_interval = higher.ip_interval;
        }
        if higher.timeout.is_some() {
            self.timeout = higher.timeout.clone();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.max_concurrent.is_none()
            && self.ip_interval.is_none()
            && self.timeout.is_none()
    }

    fn validate(&self, kind: ServiceKind) -> Result<(), KnowMeError> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(KnowMeError::config(format!(
                    "[{}] url cannot be empty",
                    kind
                )));
            }
        }

        if let Some(concurrency) = self.max_concurrent {
            if concurrency == 0 || concurrency > MAX_CONCURRENCY_LIMIT {
                return Err(KnowMeError::config(format!(
                    "[{}] max_concurrent must be between 1 and {}",
                    kind, MAX_CONCURRENCY_LIMIT
                )));
            }
        }

        if let Some(interval) = self.ip_interval {
            if !kind.rotates_address() {
                return Err(KnowMeError::config(format!(
                    "[{}] ip_interval is only supported by services that rotate addresses",
                    kind
                )));
            }
            if interval == 0 {
                return Err(KnowMeError::config(format!(
                    "[{}] ip_interval must be a positive integer",
                    kind
                )));
            }
        }

        if let Some(timeout_str) = &self.timeout {
            if parse_timeout_string(timeout_str).is_none() {
                return Err(KnowMeError::config(format!(
                    "[{}] invalid timeout format '{}'. Use format like '10s', '30s', '2m'",
                    kind, timeout_str
                )));
            }
        }

        Ok(())
    }
}

/// Configuration discovery and loading functionality.
#[derive(Debug, Default)]
pub struct ConfigManager;

impl ConfigManager {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, KnowMeError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(KnowMeError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            KnowMeError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;
        self.validate_config(&config)?;

        debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config < global (`~/.knowme.toml`) < local (`./knowme.toml`).
    /// Files that fail to load are skipped with a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, KnowMeError> {
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping config file"),
            }
        }

        if loaded_files.len() > 1 {
            info!(
                files = ?loaded_files,
                "multiple config files merged, later files take precedence"
            );
        }

        Ok(merged_config)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./knowme.toml", "./.knowme.toml"]
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Path::to_path_buf)
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".knowme.toml", "knowme.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|p| p.exists())
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("knowme").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Values from `higher` take precedence over values from `lower`.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        fn merge(lower: Option<ServiceSection>, higher: Option<ServiceSection>) -> Option<ServiceSection> {
            match (lower, higher) {
                (Some(lower), Some(higher)) => Some(lower.merged_with(&higher)),
                (lower, higher) => higher.or(lower),
            }
        }

        FileConfig {
            defunciones: merge(lower.defunciones, higher.defunciones),
            deudores: merge(lower.deudores, higher.deudores),
        }
    }

    fn validate_config(&self, config: &FileConfig) -> Result<(), KnowMeError> {
        for kind in ServiceKind::all() {
            if let Some(section) = config.section(*kind) {
                section.validate(*kind)?;
            }
        }
        Ok(())
    }
}

/// Environment variable configuration (`KM_*`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    /// `KM_CONFIG`: explicit configuration file
    pub config: Option<String>,
    pub defunciones: ServiceSection,
    pub deudores: ServiceSection,
}

impl EnvConfig {
    pub fn section(&self, kind: ServiceKind) -> &ServiceSection {
        match kind {
            ServiceKind::Defunciones => &self.defunciones,
            ServiceKind::Deudores => &self.deudores,
        }
    }
}

/// Load configuration from `KM_*` environment variables.
///
/// Recognised per service (`DEFUNCIONES`, `DEUDORES`): `KM_<SERVICE>_URL`,
/// `KM_<SERVICE>_CONCURRENCY`, `KM_<SERVICE>_TIMEOUT` and, for
/// defunciones, `KM_DEFUNCIONES_IP_INTERVAL`. Invalid values are logged and
/// ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Same as [`load_env_config`] with a custom variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig {
        config: lookup("KM_CONFIG").filter(|v| !v.trim().is_empty()),
        ..Default::default()
    };

    for kind in ServiceKind::all() {
        let prefix = format!("KM_{}", kind.name().to_uppercase());
        let mut section = ServiceSection::default();

        if let Some(url) = lookup(&format!("{}_URL", prefix)) {
            if url.trim().is_empty() {
                warn!(var = %format!("{}_URL", prefix), "ignoring empty value");
            } else {
                section.url = Some(url.trim().to_string());
            }
        }

        let concurrency_key = format!("{}_CONCURRENCY", prefix);
        if let Some(val) = lookup(&concurrency_key) {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 && n <= MAX_CONCURRENCY_LIMIT => section.max_concurrent = Some(n),
                _ => warn!(
                    var = %concurrency_key,
                    value = %val,
                    "invalid value, must be 1-{}",
                    MAX_CONCURRENCY_LIMIT
                ),
            }
        }

        let timeout_key = format!("{}_TIMEOUT", prefix);
        if let Some(val) = lookup(&timeout_key) {
            if parse_timeout_string(&val).is_some() {
                section.timeout = Some(val);
            } else {
                warn!(var = %timeout_key, value = %val, "invalid timeout, use format like '10s', '2m'");
            }
        }

        if kind.rotates_address() {
            let interval_key = format!("{}_IP_INTERVAL", prefix);
            if let Some(val) = lookup(&interval_key) {
                match val.trim().parse::<usize>() {
                    Ok(n) if n > 0 => section.ip_interval = Some(n),
                    _ => warn!(var = %interval_key, value = %val, "invalid value, must be positive"),
                }
            }
        }

        if !section.is_empty() {
            debug!(service = %kind, ?section, "environment overrides");
        }

        match kind {
            ServiceKind::Defunciones => env_config.defunciones = section,
            ServiceKind::Deudores => env_config.deudores = section,
        }
    }

    env_config
}

/// Merge the layers for the validity service.
///
/// Precedence: `overrides` > `env` > `file` > built-in limits. The
/// endpoint has no built-in value and must come from one of the layers.
pub fn resolve_defunciones(
    file: &FileConfig,
    env: &EnvConfig,
    overrides: &ServiceSection,
) -> Result<DefuncionesConfig, KnowMeError> {
    let kind = ServiceKind::Defunciones;
    let section = layered(file, env, overrides, kind)?;

    let mut config = DefuncionesConfig::new(require_url(&section, kind)?);
    if let Some(n) = section.max_concurrent {
        config = config.with_max_concurrent(n);
    }
    if let Some(n) = section.ip_interval {
        config = config.with_ip_interval(n);
    }
    if let Some(timeout) = section_timeout(&section) {
        config = config.with_timeout(timeout);
    }
    config.validate()?;
    Ok(config)
}

/// Merge the layers for the debtor service. See [`resolve_defunciones`].
pub fn resolve_deudores(
    file: &FileConfig,
    env: &EnvConfig,
    overrides: &ServiceSection,
) -> Result<DeudoresConfig, KnowMeError> {
    let kind = ServiceKind::Deudores;
    let section = layered(file, env, overrides, kind)?;

    let mut config = DeudoresConfig::new(require_url(&section, kind)?);
    if let Some(n) = section.max_concurrent {
        config = config.with_max_concurrent(n);
    }
    if let Some(timeout) = section_timeout(&section) {
        config = config.with_timeout(timeout);
    }
    config.validate()?;
    Ok(config)
}

fn layered(
    file: &FileConfig,
    env: &EnvConfig,
    overrides: &ServiceSection,
    kind: ServiceKind,
) -> Result<ServiceSection, KnowMeError> {
    overrides.validate(kind)?;
    let section = file
        .section(kind)
        .cloned()
        .unwrap_or_default()
        .merged_with(env.section(kind))
        .merged_with(overrides);
    Ok(section)
}

fn require_url(section: &ServiceSection, kind: ServiceKind) -> Result<String, KnowMeError> {
    section.url.clone().ok_or_else(|| {
        KnowMeError::config(format!(
            "no endpoint configured for '{}'. Set [{}] url in knowme.toml, KM_{}_URL, or --url",
            kind,
            kind,
            kind.name().to_uppercase()
        ))
    })
}

fn section_timeout(section: &ServiceSection) -> Option<Duration> {
    section
        .timeout
        .as_deref()
        .and_then(parse_timeout_string)
        .map(Duration::from_secs)
}

/// Parse a timeout string like "5s", "30s", "2m" into seconds.
///
/// Bare numbers are seconds. Zero is rejected.
pub fn parse_timeout_string(timeout_str: &str) -> Option<u64> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let secs = if let Some(s) = timeout_str.strip_suffix('s') {
        s.trim().parse::<u64>().ok()
    } else if let Some(m) = timeout_str.strip_suffix('m') {
        m.trim().parse::<u64>().ok().and_then(|m| m.checked_mul(60))
    } else {
        timeout_str.parse::<u64>().ok()
    }?;

    (secs > 0).then_some(secs)
}
