use k8s_openapi::api::core::v1 as core;
use k8s_openapi::api::rbac::v1 as rbac;
use kube::ResourceExt;

use crate::crd::CatalogSource;
use crate::error::{Error, Result};
use crate::ownership::Owner;
use crate::types::{
    ChildResource, Container, Labels, PolicyRule, Pod, Probe, Role, RoleBinding, Selector,
    Service, ServiceAccount,
};

pub const CATALOG_SOURCE_LABEL: &str = "olm.catalogSource";
pub const CONFIG_MAP_VERSION_LABEL: &str = "olm.configMapResourceVersion";

pub const REGISTRY_CONTAINER: &str = "configmap-registry-server";
pub const REGISTRY_PORT_NAME: &str = "grpc";
pub const REGISTRY_PORT: i32 = 50051;
pub const REGISTRY_PROTOCOL: &str = "grpc";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrySource {
    pub name: String,
    pub namespace: String,
    pub config_map: String,
    pub owner: Owner,
}

impl RegistrySource {
    pub fn from_catalog_source(source: &CatalogSource) -> Result<Self> {
        let namespace = source
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        if source.spec.config_map.is_empty() {
            return Err(Error::MissingField("spec.configMap"));
        }

        Ok(Self {
            name: source.name_any(),
            namespace,
            config_map: source.spec.config_map.clone(),
            owner: Owner::of(source),
        })
    }
}

pub fn service_account_name(source: &RegistrySource) -> String {
    format!("{}-configmap-server", source.name)
}

pub fn role_name(source: &RegistrySource) -> String {
    format!("{}-configmap-reader", source.name)
}

pub fn role_binding_name(source: &RegistrySource) -> String {
    format!("{}-server-configmap-reader", source.name)
}

pub fn service_name(source: &RegistrySource) -> String {
    source.name.clone()
}

pub fn pod_name_prefix(source: &RegistrySource) -> String {
    format!("{}-", source.name)
}

/// Matches every registry pod of the source, whatever content it serves.
pub fn stable_selector(source: &RegistrySource) -> Selector {
    Selector::new().match_labels(CATALOG_SOURCE_LABEL, &source.name)
}

fn stable_labels(source: &RegistrySource) -> Labels {
    Labels::new().insert(CATALOG_SOURCE_LABEL, &source.name)
}

pub fn versioned_labels(source: &RegistrySource, content_version: &str) -> Labels {
    stable_labels(source).insert(CONFIG_MAP_VERSION_LABEL, content_version)
}

pub fn service_account(source: &RegistrySource) -> core::ServiceAccount {
    ServiceAccount::new(service_account_name(source))
        .labels(stable_labels(source))
        .owned_by(&source.namespace, &source.owner)
}

/// Grants `get` on exactly the catalog's ConfigMap.
pub fn role(source: &RegistrySource) -> rbac::Role {
    Role::new(role_name(source))
        .labels(stable_labels(source))
        .rule(
            PolicyRule::new()
                .core_api()
                .resources(vec!["configmaps"])
                .verbs(vec!["get"])
                .resource_names(vec![source.config_map.clone()]),
        )
        .owned_by(&source.namespace, &source.owner)
}

pub fn role_binding(source: &RegistrySource) -> rbac::RoleBinding {
    RoleBinding::new(role_binding_name(source), role_name(source))
        .labels(stable_labels(source))
        .service_account(service_account_name(source), &source.namespace)
        .owned_by(&source.namespace, &source.owner)
}

pub fn pod(source: &RegistrySource, image: &str, content_version: &str) -> core::Pod {
    let health_check = vec![
        "grpc_health_probe".to_string(),
        format!("-addr=localhost:{REGISTRY_PORT}"),
    ];

    Pod::generated(pod_name_prefix(source))
        .labels(versioned_labels(source, content_version))
        .service_account(service_account_name(source))
        .container(
            Container::new(REGISTRY_CONTAINER, image)
                .args(vec![
                    "-c",
                    source.config_map.as_str(),
                    "-n",
                    source.namespace.as_str(),
                ])
                .named_port(REGISTRY_PORT_NAME, REGISTRY_PORT)
                .readiness_probe(Probe::exec(health_check.clone()).initial_delay(5))
                .liveness_probe(Probe::exec(health_check).initial_delay(10)),
        )
        .owned_by(&source.namespace, &source.owner)
}

pub fn service(source: &RegistrySource) -> core::Service {
    Service::new(service_name(source))
        .labels(stable_labels(source))
        .selector(stable_selector(source))
        .named_port(REGISTRY_PORT_NAME, REGISTRY_PORT, REGISTRY_PORT)
        .owned_by(&source.namespace, &source.owner)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegistryChildren {
    pub service_account: core::ServiceAccount,
    pub role: rbac::Role,
    pub role_binding: rbac::RoleBinding,
    pub pod: core::Pod,
    pub service: core::Service,
}

pub fn registry_children(
    source: &RegistrySource,
    image: &str,
    content_version: &str,
) -> RegistryChildren {
    RegistryChildren {
        service_account: service_account(source),
        role: role(source),
        role_binding: role_binding(source),
        pod: pod(source, image, content_version),
        service: service(source),
    }
}
