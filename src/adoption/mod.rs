mod kinds;

use std::fmt;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info, instrument, warn};

pub use kinds::{cluster_service_version_resource, ComponentKind, ObjectKey};

use crate::cache::ComponentCache;
use crate::client::ComponentClient;
use crate::error::{AdoptionFailure, Error, Result};
use crate::ownership::{ownerships, Ownership};

pub const COMPONENT_LABEL_KEY_PREFIX: &str = "operators.coreos.com/";
pub const COMPONENT_LABEL_VALUE: &str = "";

const MAX_NAME_SEGMENT: usize = 63;
const MAX_OWNER_DEPTH: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParentKey {
    pub namespace: String,
    pub name: String,
}

impl ParentKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// `operators.coreos.com/<name>.<namespace>`. Namespaces cannot contain dots,
/// so distinct parents never share a key.
pub fn component_label_key(parent: &ParentKey) -> Result<String> {
    let segment = format!("{}.{}", parent.name, parent.namespace);
    let key = format!("{COMPONENT_LABEL_KEY_PREFIX}{segment}");

    if parent.name.is_empty() || parent.namespace.is_empty() {
        return Err(Error::InvalidLabelKey {
            key,
            reason: "parent name and namespace must be set".to_string(),
        });
    }
    if segment.len() > MAX_NAME_SEGMENT {
        return Err(Error::InvalidLabelKey {
            key,
            reason: format!("name segment exceeds {MAX_NAME_SEGMENT} characters"),
        });
    }

    Ok(key)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adoption {
    Labeled,
    AlreadyLabeled,
    NotOwned,
    Missing,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdoptionReport {
    pub labeled: Vec<ObjectKey>,
    pub unchanged: usize,
}

pub struct AdoptionEngine {
    cache: Arc<dyn ComponentCache>,
    client: Arc<dyn ComponentClient>,
    parent_kind: String,
}

impl AdoptionEngine {
    pub fn new(
        cache: Arc<dyn ComponentCache>,
        client: Arc<dyn ComponentClient>,
        parent_kind: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            client,
            parent_kind: parent_kind.into(),
        }
    }

    #[instrument(skip_all, fields(object = %key))]
    pub async fn adopt_object(&self, key: &ObjectKey) -> Result<Adoption> {
        let Some(meta) = self.cache.component(key) else {
            debug!("object not in cache");
            return Ok(Adoption::Missing);
        };
        let Some(parent) = self.resolve_parent(key.kind, &meta, 0) else {
            return Ok(Adoption::NotOwned);
        };

        let label = component_label_key(&parent)?;
        self.label(key, &meta, &label).await
    }

    // Failures are collected until every candidate has been tried.
    #[instrument(skip_all, fields(parent = %parent))]
    pub async fn adopt_components(&self, parent: &ParentKey) -> Result<AdoptionReport> {
        let label = component_label_key(parent)?;
        if self.cache.parent(&parent.namespace, &parent.name).is_none() {
            debug!("parent not in cache");
            return Ok(AdoptionReport::default());
        }

        let mut report = AdoptionReport::default();
        let mut failures = Vec::new();

        for kind in ComponentKind::ALL {
            for meta in self.cache.components(kind) {
                if self.resolve_parent(kind, &meta, 0).as_ref() != Some(parent) {
                    continue;
                }

                let key = ObjectKey::new(
                    kind,
                    meta.namespace.clone(),
                    meta.name.clone().unwrap_or_default(),
                );
                match self.label(&key, &meta, &label).await {
                    Ok(Adoption::Labeled) => report.labeled.push(key),
                    Ok(_) => report.unchanged += 1,
                    Err(error) => {
                        warn!(object = %key, error = %error, "failed to adopt component");
                        failures.push(AdoptionFailure { object: key, error });
                    }
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::Adoption {
                parent: parent.to_string(),
                failures,
            });
        }

        debug!(
            labeled = report.labeled.len(),
            unchanged = report.unchanged,
            "adopted components"
        );
        Ok(report)
    }

    async fn label(&self, key: &ObjectKey, meta: &ObjectMeta, label: &str) -> Result<Adoption> {
        let labeled = meta
            .labels
            .as_ref()
            .is_some_and(|labels| labels.contains_key(label));
        if labeled {
            return Ok(Adoption::AlreadyLabeled);
        }

        self.client
            .add_component_label(key, meta.resource_version.clone(), label)
            .await?;
        info!(object = %key, label, "adopted component");
        Ok(Adoption::Labeled)
    }

    fn resolve_parent(
        &self,
        kind: ComponentKind,
        meta: &ObjectMeta,
        depth: usize,
    ) -> Option<ParentKey> {
        if depth > MAX_OWNER_DEPTH {
            return None;
        }
        if kind == ComponentKind::ClusterServiceVersion {
            if let Some(parent) = self.installing_parent(meta) {
                return Some(parent);
            }
        }
        ownerships(meta)
            .iter()
            .find_map(|ownership| self.resolve_ownership(ownership, depth))
    }

    fn installing_parent(&self, csv: &ObjectMeta) -> Option<ParentKey> {
        let namespace = csv.namespace.as_deref()?;
        let name = csv.name.as_deref()?;
        let parent = self.cache.installing_parent(namespace, name)?;
        Some(ParentKey::new(namespace, parent.name?))
    }

    fn resolve_ownership(&self, ownership: &Ownership, depth: usize) -> Option<ParentKey> {
        // a native reference only counts when it names the live object
        let expected_uid = match ownership {
            Ownership::NativeRef { uid, .. } => Some(uid.as_str()),
            Ownership::LabeledRef { .. } => None,
        };
        let matches_uid = |owner: &ObjectMeta| match expected_uid {
            Some(uid) => owner.uid.as_deref() == Some(uid),
            None => true,
        };

        if ownership.kind() == self.parent_kind {
            let namespace = ownership.namespace()?;
            let parent = self.cache.parent(namespace, ownership.name())?;
            return matches_uid(&parent).then(|| ParentKey::new(namespace, ownership.name()));
        }

        let kind = ComponentKind::from_kind(ownership.kind())?;
        let key = ObjectKey::new(
            kind,
            ownership.namespace().map(str::to_string),
            ownership.name(),
        );
        let owner = self.cache.component(&key)?;
        if !matches_uid(&owner) {
            return None;
        }
        self.resolve_parent(kind, &owner, depth + 1)
    }
}
