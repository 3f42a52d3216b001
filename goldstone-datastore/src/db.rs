//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;
use std::sync::Arc;

use goldstone_utils::DatabaseError;
use goldstone_yang::{Context, DataTree};
use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};

use crate::error::{Error, Result};

const STARTUP_KEY: &str = "startup";

// Loads the startup database from a file, or initializes a new one if it
// doesn't exist.
pub fn init<P: AsRef<Path>>(
    path: P,
) -> std::result::Result<PickleDb, DatabaseError> {
    let dump_policy = PickleDbDumpPolicy::AutoDump;
    let serialization_method = SerializationMethod::Bin;
    match path.as_ref().exists() {
        true => PickleDb::load(path, dump_policy, serialization_method),
        false => Ok(PickleDb::new(path, dump_policy, serialization_method)),
    }
}

// Retrieves the stored startup configuration, if any.
pub(crate) fn startup_load(
    db: &PickleDb,
    ctx: &Arc<Context>,
) -> Result<Option<DataTree>> {
    let Some(data) = db.get::<String>(STARTUP_KEY) else {
        return Ok(None);
    };
    let value = serde_json::from_str(&data).map_err(|error| {
        Error::Internal(format!("corrupt startup configuration: {}", error))
    })?;
    DataTree::from_value(ctx.clone(), &value).map(Some).map_err(Error::from)
}

// Replaces the stored startup configuration.
pub(crate) fn startup_store(db: &mut PickleDb, tree: &DataTree) -> Result<()> {
    let data = tree.to_value().to_string();
    db.set(STARTUP_KEY, &data)?;
    Ok(())
}
