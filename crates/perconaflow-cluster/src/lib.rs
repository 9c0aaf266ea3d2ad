//! PerconaFlow Cluster
//!
//! Drives freshly launched instances from bare Ubuntu to a running Percona
//! cluster over the [`CloudProvider`](perconaflow_cloud::CloudProvider)
//! remote channel, and exposes the product facade the CLI calls.
//!
//! # Flow
//!
//! ```text
//! ClusterFacade::create
//!   ├─ configure + create_infrastructure   (cloud adapter)
//!   ├─ launch instances                    (mysql / orchestrator roles)
//!   ├─ per-node install, concurrent        (ps / pxc)
//!   ├─ ordered bootstrap                   (topology)
//!   ├─ orchestrator discovery, PMM agents
//!   └─ telemetry beacon                    (detached)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use perconaflow_cluster::ClusterFacade;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     cloud: Arc<dyn perconaflow_cloud::CloudProvider>,
//! #     config: perconaflow_config::ClusterConfig,
//! # ) -> perconaflow_cluster::Result<()> {
//! let facade = ClusterFacade::new(cloud, CancellationToken::new());
//! let created = facade.create(&config).await?;
//! println!("{}", created.resource_id);
//! facade.destroy(&config, &created.resource_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod deploy;
pub mod error;
pub mod facade;
pub mod ini;
pub mod monitoring;
pub mod node;
pub mod orchestrator;
pub mod outputs;
pub mod pmm;
pub mod pmm_api;
pub mod ps;
pub mod pxc;
pub mod rds_user;
pub mod scripts;
pub mod sql;
pub mod telemetry;
pub mod topology;
pub mod version;

pub use deploy::Deployment;
pub use error::{ClusterError, Result};
pub use facade::{ClusterFacade, CreateOutput, ProductOutputs};
pub use node::Node;
pub use outputs::{NodeOutput, OrchestratorOutput};
pub use version::select_version;
