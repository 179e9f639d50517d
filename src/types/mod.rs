pub mod container;
pub mod core;
pub mod metadata;
pub mod rbac;

pub use container::*;
pub use core::*;
pub use metadata::*;
pub use rbac::*;

use kube::Resource;

use crate::ownership::{attach_owner, Owner};

/// A builder that renders into a namespaced Kubernetes object.
pub trait ChildResource: Send + Sync {
    type K8sType: Resource<DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>;

    fn name(&self) -> &str;
    fn into_k8s(self, namespace: &str) -> Self::K8sType;

    /// Render into `namespace` with provenance pointing at `owner`.
    fn owned_by(self, namespace: &str, owner: &Owner) -> Self::K8sType
    where
        Self: Sized,
    {
        let mut object = self.into_k8s(namespace);
        attach_owner(object.meta_mut(), owner);
        object
    }
}

pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
