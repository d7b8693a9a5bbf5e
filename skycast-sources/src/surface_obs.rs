//! `surface-obs`: hourly surface observations for one network.
//!
//! Networks publish the hour's file a few minutes after the hour. The
//! nominal hour is the current hour once the release minute has passed and
//! the previous hour before that; candidates step back hourly from there up
//! to the staleness bound.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use skycast_cache::Fingerprint;
use skycast_core::{
    BuildError, DataSource, FeedId, FetchError, NominalTime, Params, Payload, PersistJob,
};

use crate::encode::{pack_records, zlib_base64, OBS_PARAMS};
use crate::mdf::{records, MdfTable};
use crate::retry::seek_freshest;
use crate::{Download, ObsNetwork, SourceContext};

const HOUR_SECS: i64 = 3600;

pub struct SurfaceObs {
    id: FeedId,
    network: String,
    spec: ObsNetwork,
    ctx: Arc<SourceContext>,
    last_served: Option<NominalTime>,
    pending: Vec<(Fingerprint, Payload)>,
}

impl SurfaceObs {
    pub fn new(ctx: &Arc<SourceContext>, params: &Params) -> Result<Self, BuildError> {
        let network = params.require_name("source")?.to_string();
        let spec = ctx
            .config
            .obs_networks
            .get(&network)
            .cloned()
            .ok_or_else(|| BuildError::Invalid {
                param: "source".into(),
                reason: format!("unknown observation network '{network}'"),
            })?;
        if let Some(bad) = spec.urls.iter().find(|t| !valid_template(t)) {
            return Err(BuildError::Invalid {
                param: "source".into(),
                reason: format!("network '{network}' has a malformed URL template '{bad}'"),
            });
        }

        Ok(Self {
            id: FeedId(format!("obs.{network}")),
            network,
            spec,
            ctx: Arc::clone(ctx),
            last_served: None,
            pending: Vec::new(),
        })
    }

    fn fingerprint(&self, candidate: NominalTime) -> Fingerprint {
        Fingerprint::of("obs", &[("network", &self.network)], Some(candidate))
    }

    /// One candidate hour: cache (first cycle only), then every URL of the
    /// network. Any unpublished file makes the hour a miss.
    async fn attempt(
        &self,
        candidate: NominalTime,
        first_time: bool,
    ) -> Result<Option<(Payload, bool)>, FetchError> {
        if first_time {
            if let Some(hit) = self.ctx.cached(&self.fingerprint(candidate)).await {
                debug!(feed = %self.id, candidate = %candidate, "served from cache");
                return Ok(Some((hit, false)));
            }
        }

        let mut obs = Vec::new();
        for template in &self.spec.urls {
            let url = expand(template, candidate)?;
            let body = match self.ctx.upstream.get(&url).await? {
                Download::Found(body) => body,
                Download::Missing => return Ok(None),
            };
            let text = String::from_utf8(body)
                .map_err(|e| FetchError::Parse(format!("{url} is not UTF-8: {e}")))?;
            let table = MdfTable::parse(&text)?;
            obs.extend(records(self.spec.dialect, &table, &self.ctx.stations));
        }

        let mut body = Map::new();
        body.insert("source".into(), json!(self.network.to_uppercase()));
        body.insert("params".into(), json!(OBS_PARAMS));
        body.insert(
            "data".into(),
            Value::String(zlib_base64(&pack_records(&obs))?),
        );
        body.insert("nominal_time".into(), json!(candidate.compact()));
        debug!(feed = %self.id, candidate = %candidate, stations = obs.len(), "observations fetched");
        Ok(Some((Payload::new(Some(candidate), body), true)))
    }
}

#[async_trait]
impl DataSource for SurfaceObs {
    fn id(&self) -> &FeedId {
        &self.id
    }

    async fn fetch(&mut self, first_time: bool) -> Result<Payload, FetchError> {
        let candidates = obs_candidates(
            self.ctx.now(),
            self.ctx.config.obs_release_minute,
            self.ctx.config.obs_staleness_hours,
        );

        let this = &*self;
        let (nominal, (payload, live)) =
            seek_freshest(&candidates, this.last_served, |c| this.attempt(c, first_time)).await?;

        if live {
            let key = self.fingerprint(nominal);
            self.pending.push((key, payload.clone()));
        }
        self.last_served = Some(nominal);
        Ok(payload)
    }

    fn post_fetch(&mut self) -> Option<PersistJob> {
        self.ctx.persist(std::mem::take(&mut self.pending))
    }

    fn next_check_interval(&self) -> Duration {
        next_obs_interval(self.ctx.now(), self.ctx.config.obs_release_minute)
    }
}

fn valid_template(template: &str) -> bool {
    !StrftimeItems::new(template).any(|item| matches!(item, Item::Error))
}

fn expand(template: &str, candidate: NominalTime) -> Result<String, FetchError> {
    let mut url = String::new();
    write!(url, "{}", candidate.0.format(template))
        .map_err(|_| FetchError::Parse(format!("cannot expand URL template '{template}'")))?;
    Ok(url)
}

pub fn top_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(HOUR_SECS), 0).unwrap_or(t)
}

/// Hour whose observations should be available at `now`.
pub fn nominal_hour(now: DateTime<Utc>, release_minute: u32) -> DateTime<Utc> {
    let hour = top_of_hour(now);
    if now < hour + chrono::Duration::minutes(i64::from(release_minute)) {
        hour - chrono::Duration::hours(1)
    } else {
        hour
    }
}

/// Newest first, `staleness_hours` candidates.
pub fn obs_candidates(
    now: DateTime<Utc>,
    release_minute: u32,
    staleness_hours: u32,
) -> Vec<NominalTime> {
    let newest = nominal_hour(now, release_minute);
    (0..i64::from(staleness_hours))
        .map(|h| NominalTime(newest - chrono::Duration::hours(h)))
        .collect()
}

/// Time until the next release minute.
pub fn next_obs_interval(now: DateTime<Utc>, release_minute: u32) -> Duration {
    let mut next = top_of_hour(now) + chrono::Duration::minutes(i64::from(release_minute));
    if next <= now {
        next += chrono::Duration::hours(1);
    }
    (next - now).to_std().unwrap_or_default()
}
