//! Outputs published back to the caller

use crate::orchestrator;
use perconaflow_cloud::Instance;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutput {
    pub public_ip: String,
    pub private_ip: String,
    pub is_replica: bool,
}

impl NodeOutput {
    pub fn new(instance: &Instance, is_replica: bool) -> Self {
        Self {
            public_ip: instance.public_ip.clone(),
            private_ip: instance.private_ip.clone(),
            is_replica,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorOutput {
    pub public_ip: String,
    pub private_ip: String,
    pub url: String,
}

impl OrchestratorOutput {
    pub fn new(instance: &Instance) -> Self {
        Self {
            public_ip: instance.public_ip.clone(),
            private_ip: instance.private_ip.clone(),
            url: orchestrator::public_url(instance),
        }
    }
}
