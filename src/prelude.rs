//! Common imports for building and provisioning the stack.
//!
//! ```rust
//! use connection_pooling::prelude::*;
//!
//! let config = StackConfig::default();
//! let code = CodeAsset::from_bytes("bootstrap.zip", b"code");
//! let stack = ConnectionPoolingStack::new(&config, code).build().unwrap();
//! assert!(validate_stack(&stack).is_ok());
//! ```

pub use crate::asset::CodeAsset;
pub use crate::config::{FunctionConfig, StackConfig};
pub use crate::graph::DependencyGraph;
pub use crate::provision::{
    Deployment, DestroyOptions, InMemoryProvisioner, ProvisionError, Provisioner,
    ProvisionerOptions, ResourceProvisioner,
};
pub use crate::stack::{ConnectionPoolingStack, Stack, StackError};
pub use crate::synth::{synthesize, SynthContext, Template};
pub use crate::topology::{Resource, ResourceId, ResourceKind};
pub use crate::validation::{validate_stack, ValidationReport};
