//! Configuration loading and representation.
//!
//! Environment variables:
//! - `HRDESK_ROLE_SCHEME`: `four_role` (default) or `binary`
//! - `HRDESK_EMPLOYEE_STORAGE`: `dedicated` (default) or `shared`
//! - `HRDESK_SHARED_AREA`: shared area name when storage is `shared` (default `employee_files`)
//! - `HRDESK_DOCUMENT_AREA`: area documents are uploaded to (default `user_documents`)
//! - `HRDESK_SAGA_STEP_TIMEOUT_MS`: optional per-step timeout in milliseconds

use std::env;
use std::time::Duration;

use thiserror::Error;

use hrdesk_auth::{RoleScheme, RoleSchemeError};
use hrdesk_core::EmployeeStorageLayout;
use hrdesk_saga::SagaCoordinator;

pub const ROLE_SCHEME_VAR: &str = "HRDESK_ROLE_SCHEME";
pub const EMPLOYEE_STORAGE_VAR: &str = "HRDESK_EMPLOYEE_STORAGE";
pub const SHARED_AREA_VAR: &str = "HRDESK_SHARED_AREA";
pub const DOCUMENT_AREA_VAR: &str = "HRDESK_DOCUMENT_AREA";
pub const STEP_TIMEOUT_VAR: &str = "HRDESK_SAGA_STEP_TIMEOUT_MS";

pub const DEFAULT_SHARED_AREA: &str = "employee_files";
pub const DEFAULT_DOCUMENT_AREA: &str = "user_documents";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    RoleScheme {
        var: &'static str,
        #[source]
        source: RoleSchemeError,
    },

    #[error("{var}: invalid value '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrConfig {
    pub role_scheme: RoleScheme,
    pub employee_storage: EmployeeStorageLayout,
    pub document_area: String,
    pub step_timeout: Option<Duration>,
}

impl Default for HrConfig {
    fn default() -> Self {
        Self {
            role_scheme: RoleScheme::four_role(),
            employee_storage: EmployeeStorageLayout::Dedicated,
            document_area: DEFAULT_DOCUMENT_AREA.to_string(),
            step_timeout: None,
        }
    }
}

impl HrConfig {
    /// Load from the process environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(name) = get(ROLE_SCHEME_VAR) {
            config.role_scheme = RoleScheme::by_name(&name).map_err(|source| ConfigError::RoleScheme {
                var: ROLE_SCHEME_VAR,
                source,
            })?;
        }

        let shared_area = get(SHARED_AREA_VAR).unwrap_or_else(|| DEFAULT_SHARED_AREA.to_string());
        if let Some(layout) = get(EMPLOYEE_STORAGE_VAR) {
            config.employee_storage = match layout.to_ascii_lowercase().as_str() {
                "dedicated" => EmployeeStorageLayout::Dedicated,
                "shared" => EmployeeStorageLayout::Shared { area: shared_area },
                _ => {
                    return Err(ConfigError::Invalid {
                        var: EMPLOYEE_STORAGE_VAR,
                        value: layout,
                        reason: "expected dedicated or shared",
                    });
                }
            };
        }

        if let Some(area) = get(DOCUMENT_AREA_VAR) {
            config.document_area = area;
        }

        if let Some(raw) = get(STEP_TIMEOUT_VAR) {
            let millis = raw.parse::<u64>().ok().filter(|ms| *ms > 0).ok_or(ConfigError::Invalid {
                var: STEP_TIMEOUT_VAR,
                value: raw.clone(),
                reason: "expected a positive number of milliseconds",
            })?;
            config.step_timeout = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }

    pub fn with_role_scheme(mut self, scheme: RoleScheme) -> Self {
        self.role_scheme = scheme;
        self
    }

    pub fn with_employee_storage(mut self, layout: EmployeeStorageLayout) -> Self {
        self.employee_storage = layout;
        self
    }

    pub fn with_document_area(mut self, area: impl Into<String>) -> Self {
        self.document_area = area.into();
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Areas that must exist before any saga runs.
    pub fn shared_areas(&self) -> Vec<&str> {
        let mut areas = vec![self.document_area.as_str()];
        if let EmployeeStorageLayout::Shared { area } = &self.employee_storage {
            if area != &self.document_area {
                areas.push(area);
            }
        }
        areas
    }

    pub fn coordinator(&self) -> SagaCoordinator {
        match self.step_timeout {
            Some(timeout) => SagaCoordinator::new().with_step_timeout(timeout),
            None => SagaCoordinator::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = HrConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HrConfig::default());
        assert_eq!(config.shared_areas(), vec!["user_documents"]);
        assert_eq!(config.coordinator().step_timeout(), None);
    }

    #[test]
    fn reads_every_variable() {
        let config = HrConfig::from_lookup(lookup(&[
            (ROLE_SCHEME_VAR, "binary"),
            (EMPLOYEE_STORAGE_VAR, "shared"),
            (SHARED_AREA_VAR, "staff"),
            (DOCUMENT_AREA_VAR, "kyc"),
            (STEP_TIMEOUT_VAR, "2500"),
        ]))
        .unwrap();

        assert_eq!(config.role_scheme, RoleScheme::binary());
        assert_eq!(
            config.employee_storage,
            EmployeeStorageLayout::Shared {
                area: "staff".to_string()
            }
        );
        assert_eq!(config.document_area, "kyc");
        assert_eq!(config.step_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.shared_areas(), vec!["kyc", "staff"]);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            HrConfig::from_lookup(lookup(&[(ROLE_SCHEME_VAR, "three_role")])),
            Err(ConfigError::RoleScheme { .. })
        ));
        assert!(matches!(
            HrConfig::from_lookup(lookup(&[(EMPLOYEE_STORAGE_VAR, "nfs")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            HrConfig::from_lookup(lookup(&[(STEP_TIMEOUT_VAR, "0")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = HrConfig::from_lookup(lookup(&[(DOCUMENT_AREA_VAR, "  ")])).unwrap();
        assert_eq!(config.document_area, DEFAULT_DOCUMENT_AREA);
    }
}
