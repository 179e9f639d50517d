use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::APIService;
use kube::api::{ApiResource, GroupVersionKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Deployment,
    Service,
    ServiceAccount,
    Secret,
    ConfigMap,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    CustomResourceDefinition,
    ApiService,
    ClusterServiceVersion,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 12] = [
        ComponentKind::Deployment,
        ComponentKind::Service,
        ComponentKind::ServiceAccount,
        ComponentKind::Secret,
        ComponentKind::ConfigMap,
        ComponentKind::Role,
        ComponentKind::RoleBinding,
        ComponentKind::ClusterRole,
        ComponentKind::ClusterRoleBinding,
        ComponentKind::CustomResourceDefinition,
        ComponentKind::ApiService,
        ComponentKind::ClusterServiceVersion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Deployment => "Deployment",
            ComponentKind::Service => "Service",
            ComponentKind::ServiceAccount => "ServiceAccount",
            ComponentKind::Secret => "Secret",
            ComponentKind::ConfigMap => "ConfigMap",
            ComponentKind::Role => "Role",
            ComponentKind::RoleBinding => "RoleBinding",
            ComponentKind::ClusterRole => "ClusterRole",
            ComponentKind::ClusterRoleBinding => "ClusterRoleBinding",
            ComponentKind::CustomResourceDefinition => "CustomResourceDefinition",
            ComponentKind::ApiService => "APIService",
            ComponentKind::ClusterServiceVersion => "ClusterServiceVersion",
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        match self {
            ComponentKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ComponentKind::Service => ApiResource::erase::<Service>(&()),
            ComponentKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
            ComponentKind::Secret => ApiResource::erase::<Secret>(&()),
            ComponentKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            ComponentKind::Role => ApiResource::erase::<Role>(&()),
            ComponentKind::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
            ComponentKind::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
            ComponentKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
            ComponentKind::CustomResourceDefinition => {
                ApiResource::erase::<CustomResourceDefinition>(&())
            }
            ComponentKind::ApiService => ApiResource::erase::<APIService>(&()),
            ComponentKind::ClusterServiceVersion => cluster_service_version_resource(),
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            ComponentKind::ClusterRole
                | ComponentKind::ClusterRoleBinding
                | ComponentKind::CustomResourceDefinition
                | ComponentKind::ApiService
        )
    }
}

pub fn cluster_service_version_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("operators.coreos.com", "v1alpha1", "ClusterServiceVersion");
    ApiResource::from_gvk_with_plural(&gvk, "clusterserviceversions")
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: ComponentKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ComponentKind, namespace: Option<String>, name: impl Into<String>) -> Self {
        // cluster-scoped objects never carry a namespace
        let namespace = if kind.is_namespaced() { namespace } else { None };
        Self {
            kind,
            namespace,
            name: name.into(),
        }
    }

    pub fn namespaced(kind: ComponentKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, Some(namespace.into()), name)
    }

    pub fn cluster(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self::new(kind, None, name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}/{}", self.kind, namespace, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}
