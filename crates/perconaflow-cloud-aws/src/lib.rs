//! AWS cloud provider for PerconaFlow
//!
//! Implements `CloudProvider` on EC2: key pair import, VPC networking,
//! batch instance launch and tag-driven teardown.
//!
//! # Requirements
//!
//! - Credentials resolvable by the AWS default chain (env, profile, SSO, IMDS)
//! - The region must have an entry in the built-in AMI table
//!
//! # Example
//!
//! ```ignore
//! use perconaflow_cloud::{CloudProvider, ResourceId};
//! use perconaflow_cloud_aws::{AwsProvider, AwsSettings};
//!
//! let provider = AwsProvider::new(AwsSettings::from_provider(&settings)?, cancel);
//! let id = ResourceId::generate();
//! provider.configure(&id, &params).await?;
//! provider.create_infrastructure(&id).await?;
//! ```

mod error;
pub mod images;
mod instances;
mod network;
pub mod provider;
mod tags;
mod teardown;

pub use provider::{AwsProvider, AwsSettings};
