use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::crd::RegistryServiceStatus;
use crate::error::{Error, Result};
use crate::registry::desired::REGISTRY_PROTOCOL;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Registry endpoint status for `service`, stamped at `now`.
pub fn project_status(service: &core::Service, now: DateTime<Utc>) -> Result<RegistryServiceStatus> {
    let service_name = service
        .metadata
        .name
        .clone()
        .ok_or(Error::MissingField("service metadata.name"))?;
    let service_namespace = service
        .metadata
        .namespace
        .clone()
        .ok_or(Error::MissingField("service metadata.namespace"))?;
    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|port| port.port)
        .ok_or(Error::MissingField("service spec.ports"))?;

    Ok(RegistryServiceStatus {
        protocol: REGISTRY_PROTOCOL.to_string(),
        service_name,
        service_namespace,
        port: port.to_string(),
        created_at: Time(now),
    })
}
