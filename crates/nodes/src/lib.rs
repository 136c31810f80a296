//! `nodes` crate: the node-type catalog and typed config schemas.
//!
//! Every node in a workflow names a type registered in [`NodeTypeRegistry`];
//! the node's [`NodeConfig`] is checked against that type's field specs.

pub mod error;
pub mod registry;
pub mod schema;

pub use error::{ConfigError, RegistryError};
pub use registry::{NodeCategory, NodeTypeDescriptor, NodeTypeRegistry};
pub use schema::{ConfigValue, FieldSpec, FieldType, NodeConfig};
