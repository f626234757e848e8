//! Team Controller CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Team controller.

pub mod references;
pub mod team;

pub use references::*;
pub use team::*;
