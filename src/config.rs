use std::str::FromStr;
use std::time::Duration;

use kube::api::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_IMAGE: &str =
    "quay.io/operator-framework/configmap-operator-registry:latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::InvalidConfig(format!("Invalid LOG_FORMAT: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentKind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl Default for ParentKind {
    fn default() -> Self {
        Self {
            group: "operators.coreos.com".to_string(),
            version: "v1alpha1".to_string(),
            kind: "Subscription".to_string(),
            plural: "subscriptions".to_string(),
        }
    }
}

impl ParentKind {
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub registry_image: String,
    pub workers: usize,
    pub resync: Duration,
    pub error_requeue: Duration,
    pub conflict_requeue: Duration,
    pub field_manager: String,
    pub adoption_parent: ParentKind,
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            registry_image: DEFAULT_REGISTRY_IMAGE.to_string(),
            workers: 4,
            resync: Duration::from_secs(300),
            error_requeue: Duration::from_secs(60),
            conflict_requeue: Duration::from_secs(5),
            field_manager: "catalog-operator".to_string(),
            adoption_parent: ParentKind::default(),
            log_format: LogFormat::Text,
        }
    }
}

fn seconds(var: &str, val: &str) -> Result<Duration> {
    val.parse()
        .map(Duration::from_secs)
        .map_err(|_| Error::InvalidConfig(format!("Invalid {var}")))
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REGISTRY_IMAGE") {
            config.registry_image = val;
        }

        if let Ok(val) = std::env::var("WORKERS") {
            config.workers = val
                .parse()
                .map_err(|_| Error::InvalidConfig("Invalid WORKERS".to_string()))?;
        }

        if let Ok(val) = std::env::var("RESYNC_SECONDS") {
            config.resync = seconds("RESYNC_SECONDS", &val)?;
        }

        if let Ok(val) = std::env::var("ERROR_REQUEUE_SECONDS") {
            config.error_requeue = seconds("ERROR_REQUEUE_SECONDS", &val)?;
        }

        if let Ok(val) = std::env::var("CONFLICT_REQUEUE_SECONDS") {
            config.conflict_requeue = seconds("CONFLICT_REQUEUE_SECONDS", &val)?;
        }

        if let Ok(val) = std::env::var("FIELD_MANAGER") {
            config.field_manager = val;
        }

        if let Ok(val) = std::env::var("ADOPTION_PARENT_GROUP") {
            config.adoption_parent.group = val;
        }

        if let Ok(val) = std::env::var("ADOPTION_PARENT_VERSION") {
            config.adoption_parent.version = val;
        }

        if let Ok(val) = std::env::var("ADOPTION_PARENT_KIND") {
            config.adoption_parent.kind = val;
        }

        if let Ok(val) = std::env::var("ADOPTION_PARENT_PLURAL") {
            config.adoption_parent.plural = val;
        }

        if let Ok(val) = std::env::var("LOG_FORMAT") {
            config.log_format = val.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("WORKERS must be at least 1".to_string()));
        }
        if self.registry_image.is_empty() {
            return Err(Error::InvalidConfig("REGISTRY_IMAGE must be set".to_string()));
        }
        if self.adoption_parent.kind.is_empty() || self.adoption_parent.plural.is_empty() {
            return Err(Error::InvalidConfig(
                "adoption parent kind and plural must be set".to_string(),
            ));
        }
        Ok(())
    }
}
