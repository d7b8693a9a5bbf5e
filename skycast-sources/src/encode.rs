//! Compact binary encodings shared by the remote variants.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use skycast_core::FetchError;

/// Column order of a packed observation record, as advertised in the
/// payload's `params` field.
pub const OBS_PARAMS: [&str; 9] = [
    "STID", "LAT", "LON", "TIME", "PALT", "TAIR", "TDEW", "WDIR", "WSPD",
];

/// Size of one packed record: `5s` + pad, 2×f32, `13s` + pad, 5×f32.
pub const OBS_RECORD_LEN: usize = 52;

/// One station observation, already unit-converted.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsRecord {
    pub stid: String,
    pub lat: f32,
    pub lon: f32,
    /// `YYYYmmdd_HHMM`
    pub time: String,
    pub palt: f32,
    pub tair: f32,
    pub tdew: f32,
    pub wdir: f32,
    pub wspd: f32,
}

impl ObsRecord {
    /// Little-endian, with every f32 aligned to a 4-byte boundary. Strings
    /// are truncated or NUL-padded to their fixed widths.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        put_fixed(buf, &self.stid, 5);
        buf.extend_from_slice(&[0; 3]);
        buf.extend_from_slice(&self.lat.to_le_bytes());
        buf.extend_from_slice(&self.lon.to_le_bytes());
        put_fixed(buf, &self.time, 13);
        buf.extend_from_slice(&[0; 3]);
        for value in [self.palt, self.tair, self.tdew, self.wdir, self.wspd] {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub fn pack_records(records: &[ObsRecord]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(records.len() * OBS_RECORD_LEN);
    for record in records {
        record.pack_into(&mut buf);
    }
    buf
}

fn put_fixed(buf: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (width - n), 0);
}

pub fn zlib(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// zlib then standard base64 without line breaks.
pub fn zlib_base64(bytes: &[u8]) -> Result<String, FetchError> {
    let compressed =
        zlib(bytes).map_err(|e| FetchError::Parse(format!("compression failed: {e}")))?;
    Ok(STANDARD.encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn record() -> ObsRecord {
        ObsRecord {
            stid: "NRMN".into(),
            lat: 35.25,
            lon: -97.5,
            time: "20240501_1800".into(),
            palt: 970.0,
            tair: 25.0,
            tdew: 18.5,
            wdir: 180.0,
            wspd: 19.4,
        }
    }

    #[test]
    fn record_layout_matches_aligned_struct() {
        let mut buf = Vec::new();
        record().pack_into(&mut buf);
        assert_eq!(buf.len(), OBS_RECORD_LEN);
        assert_eq!(&buf[0..5], b"NRMN\0");
        assert_eq!(&buf[8..12], &35.25f32.to_le_bytes());
        assert_eq!(&buf[12..16], &(-97.5f32).to_le_bytes());
        assert_eq!(&buf[16..29], b"20240501_1800");
        assert_eq!(&buf[32..36], &970.0f32.to_le_bytes());
        assert_eq!(&buf[48..52], &19.4f32.to_le_bytes());
    }

    #[test]
    fn long_station_ids_are_truncated() {
        let mut r = record();
        r.stid = "TOOLONG".into();
        let buf = pack_records(&[r.clone(), r]);
        assert_eq!(buf.len(), 2 * OBS_RECORD_LEN);
        assert_eq!(&buf[0..5], b"TOOLO");
    }

    #[test]
    fn base64_has_no_line_breaks_and_inflates_back() {
        let raw = vec![7u8; 10_000];
        let encoded = zlib_base64(&raw).unwrap();
        assert!(!encoded.contains('\n'));
        let compressed = STANDARD.decode(encoded).unwrap();
        let mut out = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, raw);
    }
}
