use super::{non_empty, Container, Labels, Selector};
use crate::types::ChildResource;
use k8s_openapi::api::core::v1 as k8s;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

#[derive(Clone, Debug)]
pub struct Pod {
    pub name: String,
    pub generate_name: bool,
    pub labels: Labels,
    pub containers: Vec<Container>,
    pub service_account: Option<String>,
}

impl Pod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generate_name: false,
            labels: Labels::new(),
            containers: Vec::new(),
            service_account: None,
        }
    }

    /// Pod whose name is generated by the API server from `prefix`.
    pub fn generated(prefix: impl Into<String>) -> Self {
        Self {
            generate_name: true,
            ..Self::new(prefix)
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account = Some(name.into());
        self
    }
}

impl ChildResource for Pod {
    type K8sType = k8s::Pod;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str) -> Self::K8sType {
        let (name, generate_name) = if self.generate_name {
            (None, Some(self.name))
        } else {
            (Some(self.name), None)
        };

        k8s::Pod {
            metadata: ObjectMeta {
                name,
                generate_name,
                namespace: Some(namespace.to_string()),
                labels: if self.labels.0.is_empty() {
                    None
                } else {
                    Some(self.labels.into_inner())
                },
                ..Default::default()
            },
            spec: Some(k8s::PodSpec {
                containers: self.containers.into_iter().map(|c| c.into_k8s()).collect(),
                service_account_name: self.service_account,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Service {
    pub name: String,
    pub labels: Labels,
    pub selector: Selector,
    pub ports: Vec<ServicePort>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: name.clone(),
            labels: Labels::new().insert("app", &name),
            selector: Selector::new().match_labels("app", &name),
            ports: Vec::new(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn named_port(mut self, name: impl Into<String>, port: i32, target_port: i32) -> Self {
        self.ports.push(ServicePort {
            port,
            target_port: Some(target_port),
            name: Some(name.into()),
        });
        self
    }
}

impl ChildResource for Service {
    type K8sType = k8s::Service;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str) -> Self::K8sType {
        k8s::Service {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(namespace.to_string()),
                labels: Some(self.labels.into_inner()),
                ..Default::default()
            },
            spec: Some(k8s::ServiceSpec {
                selector: Some(self.selector.into_inner()),
                ports: non_empty(self.ports.into_iter().map(|p| p.into_k8s()).collect()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServicePort {
    pub port: i32,
    pub target_port: Option<i32>,
    pub name: Option<String>,
}

impl ServicePort {
    pub fn into_k8s(self) -> k8s::ServicePort {
        k8s::ServicePort {
            port: self.port,
            target_port: self.target_port.map(IntOrString::Int),
            name: self.name,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceAccount {
    pub name: String,
    pub labels: Labels,
}

impl ServiceAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }
}

impl ChildResource for ServiceAccount {
    type K8sType = k8s::ServiceAccount;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str) -> Self::K8sType {
        k8s::ServiceAccount {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(namespace.to_string()),
                labels: if self.labels.0.is_empty() {
                    None
                } else {
                    Some(self.labels.into_inner())
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
