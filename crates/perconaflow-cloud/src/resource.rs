//! Resource identity and labels

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag/label key carrying the ResourceID on every cloud object
pub const RESOURCE_ID_LABEL: &str = "percona-cluster-stack-id";

/// Label key separating the database fleet from the orchestrator fleet
pub const INSTANCE_ROLE_LABEL: &str = "percona-instance-role";
pub const ROLE_MYSQL: &str = "mysql";
pub const ROLE_ORCHESTRATOR: &str = "orchestrator";

pub const RESOURCE_ID_LENGTH: usize = 20;

/// Key/value labels, ordered so requests are deterministic
pub type Labels = BTreeMap<String, String>;

/// Opaque identifier of one provisioned cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id of lowercase ASCII letters. Lowercase keeps it valid
    /// as a GCP label value and inside instance names.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..RESOURCE_ID_LENGTH)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Caller labels plus the implicit ResourceID label. The ResourceID always wins.
pub fn resource_labels(resource_id: &ResourceId, extra: &Labels) -> Labels {
    let mut labels = extra.clone();
    labels.insert(RESOURCE_ID_LABEL.to_string(), resource_id.to_string());
    labels
}

/// Single role label
pub fn role_labels(role: &str) -> Labels {
    Labels::from([(INSTANCE_ROLE_LABEL.to_string(), role.to_string())])
}
