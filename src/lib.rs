//! Connection Pooling Stack Library
//!
//! Declares a VPC, a MySQL instance with a generated credential, a connection
//! proxy, a database-ping function and a REST gateway as an explicit resource
//! graph, and provisions it.
//!
//! - [`stack`] builds the topology from a [`config::StackConfig`]
//! - [`graph`] orders it; [`validation`] checks it
//! - [`synth`] renders it to CloudFormation; [`provision`] applies it
//! - [`runtime`] is the function the stack deploys
//!
//! Tests are included in the module files and under `tests/`.

pub mod asset;
pub mod config;
pub mod constants;
pub mod graph;
pub mod observability;
pub mod prelude;
pub mod provision;
pub mod runtime;
pub mod stack;
pub mod synth;
pub mod topology;
pub mod validation;
