//! Named one-time processes (data migrations).
//!
//! A process runs at most once per store: its name is recorded in the
//! [`PROCESS_BUCKET`] in the same transaction as the writes it makes, so a
//! failed run leaves no marker and is retried on the next start.

use std::time::{SystemTime, UNIX_EPOCH};

use kinship_store::{ReadAccess, StorageBackend, WriteTransaction};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    engine::Store,
    error::{CodecSnafu, Result, StateError},
    schema::PROCESS_BUCKET,
};

/// Marker stored for every applied process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// When the process committed, in seconds since the Unix epoch.
    pub applied_at_secs: u64,
}

impl<B: StorageBackend> Store<B> {
    /// Runs `f` once under `name`, committing its writes with the marker.
    ///
    /// Returns `Ok(false)` without calling `f` if the process already ran.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`; nothing is committed in that case.
    pub fn apply_process<E, F>(&self, name: &str, f: F) -> std::result::Result<bool, E>
    where
        E: From<StateError>,
        F: FnOnce(&mut WriteTransaction<'_, B>) -> std::result::Result<(), E>,
    {
        self.with_write_tx(|tx| {
            if tx.contains(PROCESS_BUCKET, name.as_bytes()).map_err(StateError::from)? {
                debug!(process = name, "Process already applied");
                return Ok(false);
            }
            f(tx)?;
            let record = ProcessRecord { applied_at_secs: unix_now() };
            let raw = kinship_types::encode(&record).context(CodecSnafu { bucket: PROCESS_BUCKET })?;
            tx.insert(PROCESS_BUCKET, name.as_bytes(), &raw).map_err(StateError::from)?;
            tx.commit().map_err(StateError::from)?;
            info!(process = name, "Applied process");
            Ok(true)
        })
    }

    /// Every applied process with its marker, in name order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Codec`] if a marker is malformed.
    pub fn applied_processes(&self) -> Result<Vec<(String, ProcessRecord)>> {
        self.with_read_tx(|tx| {
            let mut applied = Vec::new();
            for (key, value) in tx.iter(PROCESS_BUCKET)? {
                let name = String::from_utf8_lossy(key).into_owned();
                let record = kinship_types::decode(value).context(CodecSnafu { bucket: PROCESS_BUCKET })?;
                applied.push((name, record));
            }
            Ok(applied)
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
