//! PerconaFlow Cloud Infrastructure
//!
//! Cloud provider abstraction shared by the AWS and GCP adapters, plus the
//! provider-independent pieces they are built from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               perconaflow-cluster                │
//! │          (facade, replication topology)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │ dyn CloudProvider
//! ┌─────────────────▼───────────────────────────────┐
//! │               perconaflow-cloud                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider { ... }              │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │  network   │ │  teardown  │ │ poll_until │   │
//! │  │ NetworkApi │ │  TagIndex  │ │ lifecycle  │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │      aws      │ │      gcp      │
//! │   provider    │ │   provider    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod lifecycle;
pub mod network;
pub mod poll;
pub mod provider;
pub mod resource;
pub mod store;
pub mod teardown;

// Re-exports
pub use error::{CloudError, Result};
pub use lifecycle::{
    ReachabilityCheck, SSH_USER, remote_executor, wait_for_instance, wait_until_reachable,
};
pub use network::{
    NetworkApi, NetworkIds, NetworkNames, VpcLookup, network_layout, reconcile_key_pair,
    reconcile_network,
};
pub use poll::{PollConfig, poll_until};
pub use provider::{CloudProvider, Credentials, Instance};
pub use resource::{
    INSTANCE_ROLE_LABEL, Labels, RESOURCE_ID_LABEL, ROLE_MYSQL, ROLE_ORCHESTRATOR, ResourceId,
    resource_labels, role_labels,
};
pub use store::ConfigStore;
pub use teardown::{
    DeletionPlan, FailedDeletion, ResourceDeleter, ResourceKind, TagIndex, TaggedResource,
    Teardown, TeardownReport, ignore_not_found,
};
