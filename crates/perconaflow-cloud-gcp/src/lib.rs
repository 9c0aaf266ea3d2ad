//! Google Cloud provider for PerconaFlow
//!
//! Implements `CloudProvider` on Compute Engine through its v1 REST API,
//! authenticated with the active `gcloud` account.
//!
//! # Requirements
//!
//! - `gcloud` on PATH with an authenticated account
//! - `project` and `zone` set in the provider block

mod compute;
mod error;
mod gcloud;
mod instances;
mod network;
pub mod provider;
mod teardown;

pub use error::GcpError;
pub use provider::{GcpProvider, GcpSettings};
