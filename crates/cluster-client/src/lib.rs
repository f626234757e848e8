//! Cluster State Accessor
//!
//! Thin read/write interface to the cluster object store used by the Team
//! controller. The reconciler only ever talks to [`ClusterClientTrait`]; the
//! production implementation is backed by `kube::Api`, and an in-memory
//! implementation is available for tests behind the `test-util` feature.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient, ObjectKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//!
//! let team = client.get_team(&ObjectKey::new("platform", "alpha")).await?;
//! println!("team group: {}", team.spec.group_name);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{ClusterCall, Fault, MockClusterClient, Operation};
