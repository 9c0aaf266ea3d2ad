//! PerconaFlow remote execution
//!
//! Runs shell commands and reads or writes files on a single host over SSH,
//! authenticated with a private key. Knows nothing about clusters.

pub mod error;
pub mod executor;
pub mod keys;

pub use error::{RemoteError, Result};
pub use executor::{FileEditor, RemoteExecutor, SSH_PORT, shell_quote};
pub use keys::{ensure_key_pair, load_private_key, public_key_openssh, same_public_key};
