//! Deterministic cache keys.
//!
//! A fingerprint is the SHA-256 of (source identity, feed parameters, nominal
//! time), prefixed with the source name so entries stay recognisable on disk:
//! `obs-metar-1f3a…`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use skycast_core::NominalTime;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parameter order is significant; callers pass them in a fixed order.
    pub fn of(source: &str, params: &[(&str, &str)], nominal: Option<NominalTime>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        for (key, value) in params {
            hasher.update(b"\x1f");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hasher.update(b"\x1e");
        if let Some(nominal) = nominal {
            hasher.update(nominal.compact().as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Self(format!("{}-{}", sanitize(source), &digest[..32]))
    }

    /// Rebuild a fingerprint from a stored file stem.
    pub fn from_stem(stem: &str) -> Self {
        Self(stem.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn sanitize(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Option<NominalTime> {
        NominalTime::parse_compact(s)
    }

    #[test]
    fn same_inputs_same_key() {
        let a = Fingerprint::of("obs.metar", &[("network", "metar")], t("20240501_1800"));
        let b = Fingerprint::of("obs.metar", &[("network", "metar")], t("20240501_1800"));
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("obs-metar-"));
    }

    #[test]
    fn nominal_time_and_params_change_the_key() {
        let base = Fingerprint::of("radar", &[("site", "KTLX")], t("20240501_1800"));
        assert_ne!(
            base,
            Fingerprint::of("radar", &[("site", "KTLX")], t("20240501_1805"))
        );
        assert_ne!(
            base,
            Fingerprint::of("radar", &[("site", "KINX")], t("20240501_1800"))
        );
        assert_ne!(base, Fingerprint::of("radar", &[("site", "KTLX")], None));
    }

    #[test]
    fn param_boundaries_are_unambiguous() {
        let a = Fingerprint::of("s", &[("ab", "c")], None);
        let b = Fingerprint::of("s", &[("a", "bc")], None);
        assert_ne!(a, b);
    }
}
