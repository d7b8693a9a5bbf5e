//! Local JSON documents versioned by modification time.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use skycast_core::error::io_err;
use skycast_core::{FetchError, NominalTime};

/// Read and parse `path` unless its mtime equals `last_served`, in which case
/// nothing new exists.
pub async fn read_if_changed(
    path: &Path,
    last_served: Option<NominalTime>,
) -> Result<(NominalTime, Value), FetchError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_err(path, e))?;
    let modified = meta.modified().map_err(|e| io_err(path, e))?;
    let nominal = NominalTime(DateTime::<Utc>::from(modified));

    if let Some(last) = last_served {
        if nominal <= last {
            return Err(FetchError::NoNewData { since: last });
        }
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
    let doc = serde_json::from_slice(&bytes)?;
    Ok((nominal, doc))
}
