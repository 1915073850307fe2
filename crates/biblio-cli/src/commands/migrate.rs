//! Schema migration command

use anyhow::Result;
use biblio_core::Context;

use super::GlobalArgs;

pub fn execute(global: &GlobalArgs) -> Result<()> {
    // opening the client applies any pending migration
    let client = global.client()?;
    let applied = client.applied_migrations(&Context::new())?;

    println!("Database {} is up to date:", client.config().database);
    for id in applied {
        println!("  {}", id);
    }
    Ok(())
}
