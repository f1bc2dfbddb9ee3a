//! stool Repo - registries and directions references
//!
//! This crate provides:
//! - `Registry`: read access to container image metadata
//! - `OciRegistry`: the OCI distribution implementation
//! - `DirectionsRef`: serializable pointers to directions documents
//! - `RegistryToolkit`: toolkits pulled from a registry into a local cache
//! - `MockRegistry`: an in-memory registry for tests

pub mod error;
pub mod mock;
pub mod oci;
pub mod reference;
pub mod registry;
pub mod toolkit;

pub use error::{RepoError, Result};
pub use mock::MockRegistry;
pub use oci::OciRegistry;
pub use reference::{DIRECTIONS_LABEL, DirectionsRef, RefKind};
pub use registry::{Registry, TagInfo, latest_tag, split_image};
pub use toolkit::RegistryToolkit;
