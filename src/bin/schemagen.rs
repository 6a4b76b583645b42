//! # Config Schema Generator
//!
//! Prints the JSON schema of the stack configuration file.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin schemagen > config/stack.schema.json
//! ```

use anyhow::Result;
use connection_pooling::config::StackConfig;

fn main() -> Result<()> {
    println!("{}", StackConfig::schema_json()?);
    Ok(())
}
