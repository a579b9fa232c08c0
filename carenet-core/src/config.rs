//! Service configuration.
//!
//! Loaded once at startup from a TOML file, optionally overridden from the
//! command line, validated, and then passed explicitly to the service wiring.

use crate::error::{CarenetError, Result};
use crate::resilience::BreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Dependency names the service wiring looks up in `[dependencies]`.
pub const DEPARTMENT_SERVICE: &str = "department-service";
pub const PATIENT_SERVICE: &str = "patient-service";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Hospital,
    Department,
    Patient,
}

impl ServiceRole {
    /// Dependencies this role calls out to.
    pub fn required_dependencies(&self) -> &'static [&'static str] {
        match self {
            ServiceRole::Hospital => &[DEPARTMENT_SERVICE, PATIENT_SERVICE],
            ServiceRole::Department => &[PATIENT_SERVICE],
            ServiceRole::Patient => &[],
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceRole::Hospital => "hospital",
            ServiceRole::Department => "department",
            ServiceRole::Patient => "patient",
        };
        f.write_str(name)
    }
}

impl FromStr for ServiceRole {
    type Err = CarenetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hospital" => Ok(ServiceRole::Hospital),
            "department" => Ok(ServiceRole::Department),
            "patient" => Ok(ServiceRole::Patient),
            other => Err(CarenetError::InvalidConfig(format!("unknown service role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_role")]
    pub role: ServiceRole,

    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            bind: default_bind(),
        }
    }
}

fn default_role() -> ServiceRole {
    ServiceRole::Hospital
}

fn default_bind() -> String {
    "127.0.0.1:8081".to_string()
}

/// No path means an in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub base_url: String,

    /// Upper bound on one guarded call, retries included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts after the first failure. Zero disables retries.
    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub breaker: BreakerSettings,
}

impl DependencyConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
            retries: 0,
            breaker: BreakerSettings::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl From<&BreakerSettings> for BreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        BreakerConfig {
            failure_threshold: settings.failure_threshold,
            failure_window: Duration::from_secs(settings.failure_window_secs),
            cooldown: Duration::from_secs(settings.cooldown_secs),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_window() -> u64 {
    30
}

fn default_cooldown() -> u64 {
    15
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CarenetError::InvalidConfig(e.to_string()))
    }

    pub fn dependency(&self, name: &str) -> Result<&DependencyConfig> {
        self.dependencies.get(name).ok_or_else(|| {
            CarenetError::InvalidConfig(format!("missing [dependencies.{}] section", name))
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.service
            .bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                CarenetError::InvalidConfig(format!("bind address '{}': {}", self.service.bind, e))
            })?;

        for name in self.service.role.required_dependencies() {
            self.dependency(name)?;
        }

        for (name, dep) in &self.dependencies {
            reqwest::Url::parse(&dep.base_url).map_err(|e| {
                CarenetError::InvalidConfig(format!("{}: base_url '{}': {}", name, dep.base_url, e))
            })?;
            if dep.timeout_ms == 0 {
                return Err(CarenetError::InvalidConfig(format!("{}: timeout_ms must be > 0", name)));
            }
            if dep.breaker.failure_threshold == 0 {
                return Err(CarenetError::InvalidConfig(format!(
                    "{}: breaker.failure_threshold must be > 0",
                    name
                )));
            }
            if dep.breaker.failure_window_secs == 0 {
                return Err(CarenetError::InvalidConfig(format!(
                    "{}: breaker.failure_window_secs must be > 0",
                    name
                )));
            }
            if dep.breaker.cooldown_secs == 0 {
                return Err(CarenetError::InvalidConfig(format!(
                    "{}: breaker.cooldown_secs must be > 0",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSPITAL_TOML: &str = r#"
[service]
role = "hospital"
bind = "0.0.0.0:8081"

[storage]
path = "data/hospital.db"

[dependencies.department-service]
base_url = "http://localhost:8082"
timeout_ms = 500

[dependencies.patient-service]
base_url = "http://localhost:8083"
retries = 1

[dependencies.patient-service.breaker]
failure_threshold = 3
cooldown_secs = 5
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::parse(HOSPITAL_TOML).unwrap();
        assert_eq!(config.service.role, ServiceRole::Hospital);
        assert_eq!(config.storage.path, Some(PathBuf::from("data/hospital.db")));

        let departments = config.dependency(DEPARTMENT_SERVICE).unwrap();
        assert_eq!(departments.timeout(), Duration::from_millis(500));
        assert_eq!(departments.breaker.failure_threshold, 5);

        let patients = config.dependency(PATIENT_SERVICE).unwrap();
        assert_eq!(patients.timeout_ms, 2000);
        assert_eq!(patients.retries, 1);
        assert_eq!(patients.breaker.failure_threshold, 3);
        assert_eq!(patients.breaker.failure_window_secs, 30);

        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service.bind, "127.0.0.1:8081");
        assert!(config.storage.path.is_none());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_validate_requires_role_dependencies() {
        let config = Config::parse("[service]\nrole = \"department\"\n").unwrap();
        assert!(matches!(config.validate(), Err(CarenetError::InvalidConfig(_))));

        let config = Config::parse("[service]\nrole = \"patient\"\n").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::parse(HOSPITAL_TOML).unwrap();
        config
            .dependencies
            .get_mut(PATIENT_SERVICE)
            .unwrap()
            .timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::parse(HOSPITAL_TOML).unwrap();
        config.dependencies.get_mut(DEPARTMENT_SERVICE).unwrap().base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::parse(HOSPITAL_TOML).unwrap();
        config.dependencies.get_mut(PATIENT_SERVICE).unwrap().breaker.failure_window_secs = 0;
        assert!(matches!(config.validate(), Err(CarenetError::InvalidConfig(_))));

        let mut config = Config::parse(HOSPITAL_TOML).unwrap();
        config.dependencies.get_mut(DEPARTMENT_SERVICE).unwrap().breaker.cooldown_secs = 0;
        assert!(matches!(config.validate(), Err(CarenetError::InvalidConfig(_))));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Department".parse::<ServiceRole>().unwrap(), ServiceRole::Department);
        assert!("pharmacy".parse::<ServiceRole>().is_err());
    }
}
