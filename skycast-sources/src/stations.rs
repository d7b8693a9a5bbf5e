//! Station metadata lookup, loaded once at startup.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use skycast_core::error::io_err;
use skycast_core::FetchError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationLocation {
    pub lat: f64,
    pub lon: f64,
}

/// Station id → location. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct StationTable {
    stations: HashMap<String, StationLocation>,
}

impl StationTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load `{"<STID>": {"LAT": .., "LON": ..}, ..}`. A missing file yields an
    /// empty table; stations lacking a usable LAT/LON are skipped.
    pub fn load(path: &Path) -> Result<Self, FetchError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "station table not found; mesonet locations unavailable");
                return Ok(Self::empty());
            }
            Err(err) => return Err(io_err(path, err)),
        };
        let doc: Value = serde_json::from_slice(&bytes)?;
        let table = Self::from_value(&doc)?;
        info!(path = %path.display(), stations = table.len(), "station table loaded");
        Ok(table)
    }

    pub fn from_value(doc: &Value) -> Result<Self, FetchError> {
        let Value::Object(entries) = doc else {
            return Err(FetchError::Parse("station table must be a JSON object".into()));
        };
        let mut stations = HashMap::with_capacity(entries.len());
        for (stid, meta) in entries {
            match (coordinate(meta, "LAT"), coordinate(meta, "LON")) {
                (Some(lat), Some(lon)) => {
                    stations.insert(stid.clone(), StationLocation { lat, lon });
                }
                _ => warn!(station = %stid, "station entry without usable LAT/LON"),
            }
        }
        Ok(Self { stations })
    }

    pub fn get(&self, stid: &str) -> Option<StationLocation> {
        self.stations.get(stid).copied()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

// Coordinates appear both as numbers and as numeric strings.
fn coordinate(meta: &Value, key: &str) -> Option<f64> {
    match meta.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn numbers_and_strings_are_accepted() {
        let table = StationTable::from_value(&json!({
            "NRMN": {"LAT": "35.2556", "LON": "-97.4836", "NAME": "Norman"},
            "ACME": {"LAT": 34.8083, "LON": -98.0233},
            "BROK": {"NAME": "no location"}
        }))
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("NRMN"),
            Some(StationLocation {
                lat: 35.2556,
                lon: -97.4836
            })
        );
        assert!(table.get("BROK").is_none());
    }

    #[test]
    fn missing_file_is_an_empty_table() {
        let tmp = TempDir::new().unwrap();
        let table = StationTable::load(&tmp.path().join("okmesonet.json")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn non_object_is_a_parse_error() {
        assert!(matches!(
            StationTable::from_value(&json!([1, 2])),
            Err(FetchError::Parse(_))
        ));
    }
}
