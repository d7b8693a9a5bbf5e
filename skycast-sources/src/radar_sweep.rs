//! `radar-sweep`: one field at one elevation from a single radar site.
//!
//! The archive lists recent volumes in `<site>/dir.list`; each volume has a
//! directory of pre-extracted sweep documents. A volume still being
//! assembled has no document for the requested sweep yet, so the walk falls
//! back to the next older volume.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use skycast_cache::Fingerprint;
use skycast_core::{
    BuildError, DataSource, FeedId, FetchError, NominalTime, Params, Payload, PersistJob,
};

use crate::retry::seek_freshest;
use crate::{Download, SourceContext};

pub struct RadarSweep {
    id: FeedId,
    site: String,
    field: String,
    elev: f64,
    ctx: Arc<SourceContext>,
    last_served: Option<NominalTime>,
    /// Sweeps fetched live since the last `post_fetch`.
    recent_volumes: Vec<(Fingerprint, Payload)>,
}

impl RadarSweep {
    pub fn new(ctx: &Arc<SourceContext>, params: &Params) -> Result<Self, BuildError> {
        let site = params.require_name("site")?.to_ascii_uppercase();
        let field = params.require_name("field")?.to_ascii_uppercase();
        let elev = params.require_f64("elev")?;
        if !(0.0..=90.0).contains(&elev) {
            return Err(BuildError::Invalid {
                param: "elev".into(),
                reason: format!("{elev} is not an elevation angle"),
            });
        }

        Ok(Self {
            id: FeedId(format!("radar.{site}.{field}.{elev:.1}")),
            site,
            field,
            elev,
            ctx: Arc::clone(ctx),
            last_served: None,
            recent_volumes: Vec::new(),
        })
    }

    fn archive(&self) -> &str {
        self.ctx.config.radar_archive_url.trim_end_matches('/')
    }

    fn fingerprint(&self, volume: NominalTime) -> Fingerprint {
        let elev = format!("{:.1}", self.elev);
        Fingerprint::of(
            "radar",
            &[("site", &self.site), ("field", &self.field), ("elev", &elev)],
            Some(volume),
        )
    }

    fn sweep_url(&self, volume: NominalTime) -> String {
        format!(
            "{}/{site}/{site}_{}/{}_{:04.1}.json",
            self.archive(),
            volume.compact(),
            self.field,
            self.elev,
            site = self.site,
        )
    }

    async fn list_volumes(&self) -> Result<Vec<NominalTime>, FetchError> {
        let url = format!("{}/{}/dir.list", self.archive(), self.site);
        match self.ctx.upstream.get(&url).await? {
            Download::Found(body) => {
                // Capped at a year to stay inside chrono's range.
                let minutes = self.ctx.config.radar_recent_minutes.min(525_600) as i64;
                let recent = chrono::Duration::minutes(minutes);
                Ok(parse_listing(
                    &String::from_utf8_lossy(&body),
                    self.ctx.now(),
                    recent,
                ))
            }
            Download::Missing => {
                debug!(feed = %self.id, "site has no volume listing");
                Ok(Vec::new())
            }
        }
    }

    async fn attempt(
        &self,
        volume: NominalTime,
        first_time: bool,
    ) -> Result<Option<(Payload, bool)>, FetchError> {
        if first_time {
            if let Some(hit) = self.ctx.cached(&self.fingerprint(volume)).await {
                debug!(feed = %self.id, volume = %volume, "served from cache");
                return Ok(Some((hit, false)));
            }
        }

        let url = self.sweep_url(volume);
        let body = match self.ctx.upstream.get(&url).await? {
            Download::Found(body) => body,
            Download::Missing => return Ok(None),
        };
        let doc: Map<String, Value> = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Parse(format!("sweep document {url}: {e}")))?;
        Ok(Some((Payload::new(Some(volume), doc), true)))
    }
}

#[async_trait]
impl DataSource for RadarSweep {
    fn id(&self) -> &FeedId {
        &self.id
    }

    async fn fetch(&mut self, first_time: bool) -> Result<Payload, FetchError> {
        let candidates = self.list_volumes().await?;

        let this = &*self;
        let (volume, (payload, live)) =
            seek_freshest(&candidates, this.last_served, |v| this.attempt(v, first_time)).await?;

        if live {
            let key = self.fingerprint(volume);
            self.recent_volumes.push((key, payload.clone()));
        }
        self.last_served = Some(volume);
        Ok(payload)
    }

    fn post_fetch(&mut self) -> Option<PersistJob> {
        self.ctx.persist(std::mem::take(&mut self.recent_volumes))
    }

    fn next_check_interval(&self) -> Duration {
        self.ctx.config.radar_refresh()
    }
}

/// Volume times from a `dir.list` body, newest first, no older than
/// `now - recent`. Each line ends in a `YYYYmmdd_HHMM` stamp.
pub fn parse_listing(
    body: &str,
    now: DateTime<Utc>,
    recent: chrono::Duration,
) -> Vec<NominalTime> {
    let cutoff = now - recent;
    let mut volumes: Vec<NominalTime> = body
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let start = line.len().checked_sub(13)?;
            NominalTime::parse_compact(line.get(start..)?)
        })
        .filter(|t| t.0 >= cutoff)
        .collect();
    volumes.sort_unstable_by(|a, b| b.cmp(a));
    volumes.dedup();
    volumes
}
