//! Scripted Data Sources for driving the scheduler and connection handler
//! without any upstream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use skycast_core::{
    BuildError, DataSource, FeedId, FeedKind, FetchError, NominalTime, Params, Payload,
    PersistJob, SourceFactory,
};

/// Outcome of one scripted fetch.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Data(Option<NominalTime>),
    /// Undated payload carrying a string of this many bytes.
    Bulk(usize),
    Stale,
    NoNewData(NominalTime),
    Internal,
}

/// What a fake source observed about how it was driven.
#[derive(Debug, Default)]
pub(crate) struct Probe {
    pub fetches: AtomicUsize,
    pub overlaps: AtomicUsize,
    pub persisted: AtomicUsize,
    pub first_time_calls: AtomicUsize,
    in_flight: AtomicBool,
    started: Mutex<Vec<Instant>>,
}

impl Probe {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a Probe);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct FakeSource {
    id: FeedId,
    steps: VecDeque<Step>,
    last: Step,
    interval: Duration,
    fetch_delay: Duration,
    persist_ready: bool,
    probe: Arc<Probe>,
}

impl FakeSource {
    /// Plays `steps` in order, then repeats the final step forever.
    pub fn new(id: &str, steps: Vec<Step>, interval: Duration) -> Self {
        let last = steps.last().cloned().unwrap_or(Step::Data(None));
        Self {
            id: FeedId::from(id),
            steps: steps.into(),
            last,
            interval,
            fetch_delay: Duration::ZERO,
            persist_ready: false,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    fn id(&self) -> &FeedId {
        &self.id
    }

    async fn fetch(&mut self, first_time: bool) -> Result<Payload, FetchError> {
        if self.probe.in_flight.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let _in_flight = InFlight(&self.probe);
        let n = self.probe.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if first_time {
            self.probe.first_time_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.probe.started.lock().unwrap().push(Instant::now());

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        let step = self.steps.pop_front().unwrap_or_else(|| self.last.clone());
        match step {
            Step::Data(nominal) => {
                self.persist_ready = true;
                Ok(Payload::single(nominal, "seq", json!(n)))
            }
            Step::Bulk(len) => Ok(Payload::single(None, "blob", json!("x".repeat(len)))),
            Step::Stale => Err(FetchError::stale("scripted")),
            Step::NoNewData(since) => Err(FetchError::NoNewData { since }),
            Step::Internal => Err(FetchError::Parse("scripted failure".into())),
        }
    }

    fn post_fetch(&mut self) -> Option<PersistJob> {
        if !std::mem::take(&mut self.persist_ready) {
            return None;
        }
        let probe = Arc::clone(&self.probe);
        let job: PersistJob = Box::pin(async move {
            probe.persisted.fetch_add(1, Ordering::SeqCst);
            Ok::<(), FetchError>(())
        });
        Some(job)
    }

    fn next_check_interval(&self) -> Duration {
        self.interval
    }
}

/// Builds a [`FakeSource`] named by the `id` parameter, for any kind.
pub(crate) struct FakeFactory {
    steps: Vec<Step>,
    interval: Duration,
    probes: Mutex<HashMap<FeedId, Arc<Probe>>>,
}

impl FakeFactory {
    pub fn new(steps: Vec<Step>, interval: Duration) -> Self {
        Self {
            steps,
            interval,
            probes: Mutex::new(HashMap::new()),
        }
    }

    pub fn probe(&self, id: &str) -> Option<Arc<Probe>> {
        self.probes.lock().unwrap().get(&FeedId::from(id)).cloned()
    }
}

impl SourceFactory for FakeFactory {
    fn build(&self, _kind: FeedKind, params: &Params) -> Result<Box<dyn DataSource>, BuildError> {
        let id = params.require_str("id")?;
        let source = FakeSource::new(id, self.steps.clone(), self.interval);
        self.probes
            .lock()
            .unwrap()
            .insert(FeedId::from(id), source.probe());
        Ok(Box::new(source))
    }
}

pub(crate) fn nominal(compact: &str) -> NominalTime {
    NominalTime::parse_compact(compact).unwrap()
}

pub(crate) fn activate(id: &str) -> String {
    json!({"action": "activate", "type": "static", "id": id}).to_string()
}

pub(crate) fn deactivate(id: &str) -> String {
    json!({"action": "deactivate", "handler": id}).to_string()
}
