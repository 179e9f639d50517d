use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

pub const OWNER_KEY: &str = "olm.owner";
pub const OWNER_NAMESPACE_KEY: &str = "olm.owner.namespace";
pub const OWNER_KIND_KEY: &str = "olm.owner.kind";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub uid: String,
}

impl Owner {
    pub fn of<R>(resource: &R) -> Self
    where
        R: Resource<DynamicType = ()>,
    {
        Self {
            api_version: R::api_version(&()).to_string(),
            kind: R::kind(&()).to_string(),
            namespace: resource.namespace(),
            name: resource.name_any(),
            uid: resource.uid().unwrap_or_default(),
        }
    }

    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(false),
            block_owner_deletion: Some(false),
        }
    }

    pub fn can_reference_from(&self, namespace: Option<&str>) -> bool {
        match (&self.namespace, namespace) {
            (None, _) => true,
            (Some(owner_ns), Some(ns)) => owner_ns == ns,
            (Some(_), None) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    NativeRef {
        namespace: Option<String>,
        kind: String,
        name: String,
        uid: String,
    },
    LabeledRef {
        kind: String,
        namespace: Option<String>,
        name: String,
    },
}

impl Ownership {
    pub fn kind(&self) -> &str {
        match self {
            Ownership::NativeRef { kind, .. } | Ownership::LabeledRef { kind, .. } => kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Ownership::NativeRef { name, .. } | Ownership::LabeledRef { name, .. } => name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Ownership::NativeRef { namespace, .. } | Ownership::LabeledRef { namespace, .. } => {
                namespace.as_deref()
            }
        }
    }
}

/// Record `owner` on `meta`, natively when the scopes allow it and with the
/// owner-triple labels otherwise. Attaching the same owner twice is a no-op.
pub fn attach_owner(meta: &mut ObjectMeta, owner: &Owner) {
    if owner.can_reference_from(meta.namespace.as_deref()) {
        let refs = meta.owner_references.get_or_insert_with(Vec::new);
        if !refs.iter().any(|r| r.uid == owner.uid && r.kind == owner.kind) {
            refs.push(owner.owner_reference());
        }
        return;
    }

    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(OWNER_KEY.to_string(), owner.name.clone());
    labels.insert(OWNER_KIND_KEY.to_string(), owner.kind.clone());
    if let Some(namespace) = &owner.namespace {
        labels.insert(OWNER_NAMESPACE_KEY.to_string(), namespace.clone());
    }
}

pub fn ownerships(meta: &ObjectMeta) -> Vec<Ownership> {
    let mut found: Vec<Ownership> = meta
        .owner_references
        .iter()
        .flatten()
        .map(|r| Ownership::NativeRef {
            namespace: meta.namespace.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
            uid: r.uid.clone(),
        })
        .collect();

    if let Some(labels) = &meta.labels {
        if let (Some(name), Some(kind)) = (labels.get(OWNER_KEY), labels.get(OWNER_KIND_KEY)) {
            found.push(Ownership::LabeledRef {
                kind: kind.clone(),
                namespace: labels.get(OWNER_NAMESPACE_KEY).cloned(),
                name: name.clone(),
            });
        }
    }

    found
}
