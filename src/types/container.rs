use super::non_empty;
use k8s_openapi::api::core::v1 as k8s;

#[derive(Clone, Debug)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
    pub ports: Vec<ContainerPort>,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            args: Vec::new(),
            ports: Vec::new(),
            liveness_probe: None,
            readiness_probe: None,
        }
    }

    pub fn args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn named_port(mut self, name: impl Into<String>, port: i32) -> Self {
        self.ports.push(ContainerPort {
            container_port: port,
            name: Some(name.into()),
        });
        self
    }

    pub fn liveness_probe(mut self, probe: Probe) -> Self {
        self.liveness_probe = Some(probe);
        self
    }

    pub fn readiness_probe(mut self, probe: Probe) -> Self {
        self.readiness_probe = Some(probe);
        self
    }

    pub fn into_k8s(self) -> k8s::Container {
        k8s::Container {
            name: self.name,
            image: Some(self.image),
            args: non_empty(self.args),
            ports: non_empty(self.ports.into_iter().map(ContainerPort::into_k8s).collect()),
            liveness_probe: self.liveness_probe.map(Probe::into_k8s),
            readiness_probe: self.readiness_probe.map(Probe::into_k8s),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContainerPort {
    pub container_port: i32,
    pub name: Option<String>,
}

impl ContainerPort {
    pub fn into_k8s(self) -> k8s::ContainerPort {
        k8s::ContainerPort {
            container_port: self.container_port,
            name: self.name,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Probe {
    pub command: Vec<String>,
    pub initial_delay_seconds: Option<i32>,
}

impl Probe {
    pub fn exec(command: Vec<impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            initial_delay_seconds: None,
        }
    }

    pub fn initial_delay(mut self, seconds: i32) -> Self {
        self.initial_delay_seconds = Some(seconds);
        self
    }

    pub fn into_k8s(self) -> k8s::Probe {
        k8s::Probe {
            exec: Some(k8s::ExecAction {
                command: Some(self.command),
            }),
            initial_delay_seconds: self.initial_delay_seconds,
            ..Default::default()
        }
    }
}
