//! Print the OpenAPI document to stdout (used by CI to diff the spec).

use anyhow::Result;
use praktiko::api;

fn main() -> Result<()> {
    println!("{}", api::openapi().to_pretty_json()?);
    Ok(())
}
