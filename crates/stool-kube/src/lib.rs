//! stool Kube - Kubernetes integration for stool
//!
//! This crate provides:
//! - **Cluster Engine**: pod and access-control operations behind one trait, with a kube-rs and a mock implementation
//! - **Pod Executor**: toolkit scripts run in short-lived pods, deleted on every exit path
//! - **Access Cleanup**: delayed background removal of transient service accounts, roles and bindings
//! - **Publishing**: diff, allow-list gate and redaction before values reach helm

pub mod archive;
pub mod cleanup;
pub mod client;
pub mod engine;
pub mod error;
pub mod helm;
pub mod mock;
pub mod pod;
pub mod publish;

pub use cleanup::{AccessObjects, DEFAULT_ACCESS_DELAY, grant_pod_access, schedule_access_cleanup};
pub use client::KubeEngine;
pub use engine::{ClusterEngine, PodRequest};
pub use error::{KubeError, Result};
pub use helm::{Helm, HelmRequest, PackagingTool};
pub use mock::{AccessCall, MockClusterEngine, MockPod, OperationCounts};
pub use pod::{PodExecutor, executor_for};
pub use publish::{PublishOptions, PublishOutcome, Publisher, Resolution};
