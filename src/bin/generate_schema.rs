//! Generate JSON Schema for the document configuration
//!
//! This binary generates a JSON Schema from the DocumentConfig struct using
//! schemars, for editors that validate document.json files.
//!
//! Usage:
//!   cargo run --features dev-bins --bin generate_schema > document-config-schema.json

use fresh_document::config::DocumentConfig;
use schemars::schema_for;

fn main() {
    let schema = schema_for!(DocumentConfig);
    let output = serde_json::to_string_pretty(&schema).expect("Failed to serialize schema");
    println!("{}", output);
}
