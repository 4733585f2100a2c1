//! Map/reduce applications a worker can run.

use anyhow::{bail, Result};

use crate::{MapFn, ReduceFn};

pub mod crash;
pub mod indexer;
pub mod wc;

/// Look up an application by name.
pub fn named(name: &str) -> Result<(MapFn, ReduceFn)> {
    Ok(match name {
        "wc" => (wc::map, wc::reduce),
        "indexer" => (indexer::map, indexer::reduce),
        "crash" => (crash::map, crash::reduce),
        _ => bail!("unknown application {:?}", name),
    })
}
