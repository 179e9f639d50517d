use super::{non_empty, Labels};
use crate::types::ChildResource;
use k8s_openapi::api::rbac::v1 as k8s;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

#[derive(Clone, Debug)]
pub struct Role {
    pub name: String,
    pub labels: Labels,
    pub rules: Vec<PolicyRule>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            rules: Vec::new(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl ChildResource for Role {
    type K8sType = k8s::Role;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str) -> Self::K8sType {
        k8s::Role {
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
            rules: non_empty(self.rules.into_iter().map(PolicyRule::into_k8s).collect()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoleBinding {
    pub name: String,
    pub labels: Labels,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

impl RoleBinding {
    pub fn new(name: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            role_ref: RoleRef {
                kind: "Role".to_string(),
                name: role_name.into(),
                api_group: RBAC_API_GROUP.to_string(),
            },
            subjects: Vec::new(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn service_account(
        mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.subjects.push(Subject {
            kind: "ServiceAccount".to_string(),
            name: name.into(),
            namespace: Some(namespace.into()),
            api_group: None,
        });
        self
    }
}

impl ChildResource for RoleBinding {
    type K8sType = k8s::RoleBinding;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str) -> Self::K8sType {
        k8s::RoleBinding {
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
            role_ref: self.role_ref.into_k8s(),
            subjects: non_empty(self.subjects.into_iter().map(Subject::into_k8s).collect()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
    pub resource_names: Vec<String>,
}

impl PolicyRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn core_api(mut self) -> Self {
        self.api_groups.push(String::new());
        self
    }

    pub fn resources(mut self, resources: Vec<impl Into<String>>) -> Self {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn verbs(mut self, verbs: Vec<impl Into<String>>) -> Self {
        self.verbs = verbs.into_iter().map(Into::into).collect();
        self
    }

    pub fn resource_names(mut self, names: Vec<impl Into<String>>) -> Self {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn into_k8s(self) -> k8s::PolicyRule {
        k8s::PolicyRule {
            api_groups: non_empty(self.api_groups),
            resources: non_empty(self.resources),
            verbs: self.verbs,
            resource_names: non_empty(self.resource_names),
            non_resource_urls: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoleRef {
    pub kind: String,
    pub name: String,
    pub api_group: String,
}

impl RoleRef {
    pub fn into_k8s(self) -> k8s::RoleRef {
        k8s::RoleRef {
            kind: self.kind,
            name: self.name,
            api_group: self.api_group,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Subject {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub api_group: Option<String>,
}

impl Subject {
    pub fn into_k8s(self) -> k8s::Subject {
        k8s::Subject {
            kind: self.kind,
            name: self.name,
            namespace: self.namespace,
            api_group: self.api_group,
        }
    }
}
