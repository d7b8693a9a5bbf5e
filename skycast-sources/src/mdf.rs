//! Mesonet Data Format (MDF) text tables and their conversion to packed
//! observation records.
//!
//! ```text
//!   101 ! (c) 2024 Oklahoma Climatological Survey
//!    24 2024 05 01 18 00 00
//!  STID  STNM  TIME   RELH   TAIR ...
//!  ACME   110     0     45   28.1 ...
//! ```
//!
//! Line one is the format number with an optional `!` comment, line two the
//! column count and base time, line three the column names. `TIME` cells are
//! minutes past the base time. Values below -990 are missing.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use skycast_core::{types::NOMINAL_FORMAT, FetchError};

use crate::encode::ObsRecord;
use crate::{MdfDialect, StationTable};

/// m/s → knots.
const MS_TO_KT: f64 = 1.94;
const MISSING_BELOW: f64 = -990.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MdfTable {
    pub format: u32,
    pub comment: String,
    pub base_time: DateTime<Utc>,
    pub columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MdfTable {
    pub fn parse(text: &str) -> Result<Self, FetchError> {
        let mut lines = text.lines();

        let header = lines.next().ok_or_else(|| parse_err("empty document"))?;
        let (format, comment) = match header.split_once('!') {
            Some((f, c)) => (f, c.trim()),
            None => (header, ""),
        };
        let format = format
            .trim()
            .parse()
            .map_err(|_| parse_err(format!("bad format line '{header}'")))?;

        let time_line = lines.next().ok_or_else(|| parse_err("missing base-time line"))?;
        let base_time = parse_base_time(time_line)?;

        let columns: Vec<String> = lines
            .next()
            .ok_or_else(|| parse_err("missing column header"))?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(parse_err("empty column header"));
        }

        let rows = lines
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split_whitespace()
                    .map(|cell| cell.trim_matches('"').to_string())
                    .collect()
            })
            .collect();

        Ok(Self {
            format,
            comment: comment.to_string(),
            base_time,
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = MdfRow<'_>> {
        self.rows.iter().map(move |cells| MdfRow { table: self, cells })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MdfRow<'a> {
    table: &'a MdfTable,
    cells: &'a [String],
}

impl<'a> MdfRow<'a> {
    pub fn text(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column(column)?;
        self.cells.get(idx).map(String::as_str)
    }

    /// NaN when the column is absent, unparseable or flagged missing.
    pub fn number(&self, column: &str) -> f64 {
        match self.text(column).and_then(|s| s.parse::<f64>().ok()) {
            Some(v) if v >= MISSING_BELOW => v,
            _ => f64::NAN,
        }
    }

    fn observed_at(&self) -> Option<String> {
        let minutes = self.number("TIME");
        if minutes.is_nan() {
            return None;
        }
        let at = self.table.base_time + Duration::minutes(minutes as i64);
        Some(at.format(NOMINAL_FORMAT).to_string())
    }
}

fn parse_base_time(line: &str) -> Result<DateTime<Utc>, FetchError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // <ncols> YYYY MM DD HH MM SS
    if fields.len() != 7 {
        return Err(parse_err(format!("bad base-time line '{}'", line.trim())));
    }
    let stamp = fields[1..].join(" ");
    NaiveDateTime::parse_from_str(&stamp, "%Y %m %d %H %M %S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| parse_err(format!("bad base time '{stamp}': {e}")))
}

fn parse_err(msg: impl Into<String>) -> FetchError {
    FetchError::Parse(format!("MDF: {}", msg.into()))
}

/// Convert every usable row of `table` according to `dialect`.
pub fn records(dialect: MdfDialect, table: &MdfTable, stations: &StationTable) -> Vec<ObsRecord> {
    table
        .rows()
        .filter_map(|row| match dialect {
            MdfDialect::Metar => metar_record(&row),
            MdfDialect::Mesonet => mesonet_record(&row, stations),
        })
        .collect()
}

fn metar_record(row: &MdfRow<'_>) -> Option<ObsRecord> {
    Some(ObsRecord {
        stid: row.text("STID")?.to_string(),
        lat: row.number("LAT") as f32,
        lon: row.number("LON") as f32,
        time: row.observed_at()?,
        palt: row.number("PALT") as f32,
        tair: row.number("TAIR") as f32,
        tdew: row.number("TDEW") as f32,
        wdir: row.number("WDIR") as f32,
        wspd: (row.number("WSPD") * MS_TO_KT) as f32,
    })
}

fn mesonet_record(row: &MdfRow<'_>, stations: &StationTable) -> Option<ObsRecord> {
    let stid = row.text("STID")?;
    let Some(location) = stations.get(stid) else {
        debug!(station = stid, "no location for mesonet station; skipped");
        return None;
    };
    let tair = row.number("TAIR");
    Some(ObsRecord {
        stid: stid.to_string(),
        lat: location.lat as f32,
        lon: location.lon as f32,
        time: row.observed_at()?,
        // Station pressure stands in for altimeter setting.
        palt: row.number("PRES") as f32,
        tair: tair as f32,
        tdew: dew_point_c(tair, row.number("RELH")) as f32,
        wdir: row.number("WDIR") as f32,
        wspd: (row.number("WSPD") * MS_TO_KT) as f32,
    })
}

/// Dew point (°C) from air temperature (°C) and relative humidity (%), via
/// the Clausius–Clapeyron saturation vapour pressure.
pub fn dew_point_c(tair_c: f64, relh_pct: f64) -> f64 {
    const E0: f64 = 611.0;
    const T0: f64 = 273.15;
    const L_OVER_RV: f64 = 2.5e6 / 461.5;

    let tair_k = tair_c + T0;
    let sat_vapr = E0 * (L_OVER_RV * (1.0 / T0 - 1.0 / tair_k)).exp();
    let vapr = sat_vapr * relh_pct / 100.0;
    let tdew_k = 1.0 / (1.0 / T0 - (vapr / E0).ln() / L_OVER_RV);
    tdew_k - T0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MESONET: &str = "  101 ! (c) 2024 Oklahoma Climatological Survey
   6 2024 05 01 18 00 00
 STID  STNM  TIME   RELH   TAIR   WSPD   WDIR   PRES
 ACME   110     5    100   20.0   10.0    180  970.1
 NRMN   111     5     50   25.0   -996    270  972.4
 GONE   112     5     50   25.0    5.0     90  972.4
";

    const METAR: &str = "101
   9 2024 05 01 18 00 00
 STID   LAT    LON  TIME  PALT  TAIR  TDEW  WDIR  WSPD
 KOKC  35.4  -97.6    -7 1012.0  24.0  16.0   170   5.0
";

    fn stations() -> StationTable {
        StationTable::from_value(&json!({
            "ACME": {"LAT": 34.8, "LON": -98.0},
            "NRMN": {"LAT": 35.2, "LON": -97.4}
        }))
        .unwrap()
    }

    #[test]
    fn header_lines_are_parsed() {
        let table = MdfTable::parse(MESONET).unwrap();
        assert_eq!(table.format, 101);
        assert_eq!(table.comment, "(c) 2024 Oklahoma Climatological Survey");
        assert_eq!(table.base_time.to_rfc3339(), "2024-05-01T18:00:00+00:00");
        assert_eq!(table.columns[0], "STID");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn missing_values_become_nan() {
        let table = MdfTable::parse(MESONET).unwrap();
        let nrmn = table.rows().nth(1).unwrap();
        assert!(nrmn.number("WSPD").is_nan());
        assert!(nrmn.number("NOPE").is_nan());
        assert_eq!(nrmn.number("TAIR"), 25.0);
    }

    #[test]
    fn mesonet_rows_take_location_from_station_table() {
        let table = MdfTable::parse(MESONET).unwrap();
        let recs = records(MdfDialect::Mesonet, &table, &stations());
        assert_eq!(recs.len(), 2, "unknown station skipped");

        let acme = &recs[0];
        assert_eq!(acme.stid, "ACME");
        assert_eq!(acme.time, "20240501_1805");
        assert!((acme.lat - 34.8).abs() < 1e-4);
        assert!((acme.tdew - 20.0).abs() < 1e-3, "saturated air: dew point = air temp");
        assert!((acme.wspd - 19.4).abs() < 1e-4);
        assert!((acme.palt - 970.1).abs() < 1e-3);
        assert!(recs[1].wspd.is_nan());
    }

    #[test]
    fn metar_rows_use_their_own_columns() {
        let table = MdfTable::parse(METAR).unwrap();
        let recs = records(MdfDialect::Metar, &table, &StationTable::empty());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].time, "20240501_1753");
        assert_eq!(recs[0].tdew, 16.0);
        assert!((recs[0].lon + 97.6).abs() < 1e-4);
    }

    #[test]
    fn drier_air_has_lower_dew_point() {
        let half = dew_point_c(25.0, 50.0);
        assert!(half < 25.0 && half > 10.0, "{half}");
    }

    #[test]
    fn truncated_documents_are_parse_errors() {
        assert!(matches!(MdfTable::parse(""), Err(FetchError::Parse(_))));
        assert!(matches!(
            MdfTable::parse("101\n 3 2024 05 01\n"),
            Err(FetchError::Parse(_))
        ));
    }
}
