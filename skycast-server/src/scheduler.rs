//! The per-subscription refresh loop.
//!
//! ```text
//!   activate ──► FETCHING ──► ARMED ──► FETCHING ──► …
//!                   │           │
//!                   └─ cancel ──┴──► CLOSED
//! ```
//!
//! Each [`Subscription`] owns one task running fetch → deliver → persist
//! dispatch → re-arm, strictly in that order. The next timer is armed only
//! after the current cycle's delivery decision, so fetches never overlap.
//! Cancellation is observed at every suspension point and before re-arming.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

use skycast_core::{DataSource, Envelope, FeedId, FetchOutcomeKind, NominalTime};

use crate::outbox::Outbox;
use crate::stats::Shared;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// A fetch cycle is in progress; no timer is armed.
    Fetching,
    /// Waiting for the timer; no fetch in flight.
    Armed,
    Closed,
}

/// Handle to one running refresh loop. Dropping it cancels the loop.
pub struct Subscription {
    id: FeedId,
    token: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
    task: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl Subscription {
    /// Start the loop. The first cycle runs immediately with `first_time`.
    pub fn spawn(source: Box<dyn DataSource>, outbox: Outbox, shared: Shared) -> Self {
        let id = source.id().clone();
        let token = CancellationToken::new();
        let (state_tx, state) = watch::channel(SubscriptionState::Fetching);
        let refresh = RefreshLoop {
            id: id.clone(),
            source,
            outbox,
            shared,
            token: token.clone(),
            state: state_tx,
            marker: None,
        };
        let task = tokio::spawn(refresh.run());
        Self {
            id,
            _cancel_on_drop: token.clone().drop_guard(),
            token,
            state,
            task,
        }
    }

    pub fn id(&self) -> &FeedId {
        &self.id
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    /// Cancel and wait for the loop to finish. Once this returns the timer
    /// is disarmed and nothing more is queued for delivery.
    pub async fn cancel(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            if err.is_panic() {
                error!(feed = %self.id, "refresh loop panicked");
            }
        }
    }
}

struct RefreshLoop {
    id: FeedId,
    source: Box<dyn DataSource>,
    outbox: Outbox,
    shared: Shared,
    token: CancellationToken,
    state: watch::Sender<SubscriptionState>,
    /// Nominal time of the last delivered payload.
    marker: Option<NominalTime>,
}

impl RefreshLoop {
    async fn run(mut self) {
        let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);
        let mut timer = Timer::new(self.shared.timers.clone());
        let token = self.token.clone();
        let mut first_time = true;

        loop {
            self.state.send_replace(SubscriptionState::Fetching);
            if !self.cycle(first_time).await {
                break;
            }
            first_time = false;

            if token.is_cancelled() {
                break;
            }
            let delay = self.source.next_check_interval();
            let tick = tick_tx.clone();
            timer.start(delay, move || {
                let _ = tick.try_send(());
            });
            self.state.send_replace(SubscriptionState::Armed);
            debug!(feed = %self.id, delay_secs = delay.as_secs_f64(), "armed");

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                fired = tick_rx.recv() => {
                    if fired.is_none() {
                        break;
                    }
                }
            }
        }

        timer.stop();
        self.state.send_replace(SubscriptionState::Closed);
        debug!(feed = %self.id, "subscription closed");
    }

    /// One fetch cycle. Returns `false` when the loop must end.
    async fn cycle(&mut self, first_time: bool) -> bool {
        let token = self.token.clone();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            outcome = self.source.fetch(first_time) => outcome,
        };

        let (envelope, is_data) = match outcome {
            Ok(payload) => {
                if let (Some(nominal), Some(marker)) = (payload.nominal, self.marker) {
                    if nominal <= marker {
                        debug!(feed = %self.id, nominal = %nominal, "not newer than last delivery");
                        return true;
                    }
                }
                if payload.nominal.is_some() {
                    self.marker = payload.nominal;
                }
                (Envelope::data(self.id.clone(), payload), true)
            }
            Err(err) => {
                let Some(tag) = err.tag() else {
                    debug!(feed = %self.id, reason = %err, "no new data");
                    return true;
                };
                match err.classify() {
                    FetchOutcomeKind::Stale => warn!(feed = %self.id, error = %err, "stale data"),
                    _ => error!(feed = %self.id, error = %err, "fetch failed"),
                }
                (Envelope::error(self.id.clone(), tag), false)
            }
        };

        let delivered = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            sent = self.outbox.deliver(envelope) => sent,
        };
        if !delivered {
            debug!(feed = %self.id, "connection writer gone");
            return false;
        }

        if is_data {
            if let Some(job) = self.source.post_fetch() {
                self.shared.persist.spawn(self.id.clone(), job);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::mpsc::Receiver;
    use tokio::time::{sleep, Instant};

    use skycast_core::ErrorTag;

    use crate::outbox::Outgoing;
    use crate::testing::{nominal, FakeSource, Step};

    async fn next_envelope(rx: &mut Receiver<Outgoing>) -> Envelope {
        match rx.recv().await {
            Some(Outgoing::Deliver(env)) => env,
            other => panic!("expected a delivery, got {other:?}"),
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_delivers_immediately_then_arms() {
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new("gui", vec![Step::Data(None)], Duration::from_secs(60));
        let probe = source.probe();

        let sub = Subscription::spawn(Box::new(source), outbox, shared.clone());
        let env = next_envelope(&mut rx).await;
        assert_eq!(env.handler().as_str(), "gui");

        let mut state = sub.state_watch();
        state
            .wait_for(|s| *s == SubscriptionState::Armed)
            .await
            .unwrap();
        assert_eq!(shared.timers.armed(), 1);
        assert_eq!(probe.first_time_calls.load(Ordering::SeqCst), 1);

        sub.cancel().await;
        assert_eq!(shared.timers.armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn same_nominal_twice_is_delivered_once() {
        let t = nominal("20240501_1800");
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new(
            "obs.metar",
            vec![Step::Data(Some(t)), Step::Data(Some(t)), Step::NoNewData(t)],
            Duration::from_secs(30),
        );
        let probe = source.probe();
        let sub = Subscription::spawn(Box::new(source), outbox, shared);

        next_envelope(&mut rx).await;
        sleep(Duration::from_secs(95)).await;

        assert_eq!(probe.fetches(), 4);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(sub.state(), SubscriptionState::Armed);
        sub.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_every_cycle_delivers_tagged_errors_one_interval_apart() {
        let interval = Duration::from_secs(45);
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new("obs.mesonet", vec![Step::Stale], interval);
        let sub = Subscription::spawn(Box::new(source), outbox, shared);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let env = next_envelope(&mut rx).await;
            assert_eq!(
                env,
                Envelope::error(FeedId::from("obs.mesonet"), ErrorTag::StaleData)
            );
            seen.push(Instant::now());
        }
        assert_eq!(seen[1] - seen[0], interval);
        assert_eq!(seen[2] - seen[1], interval);

        let mut state = sub.state_watch();
        state
            .wait_for(|s| *s == SubscriptionState::Armed)
            .await
            .unwrap();
        sub.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn internal_errors_are_tagged_without_detail() {
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new("radar.KTLX.REF.0.5", vec![Step::Internal], Duration::from_secs(60));
        let sub = Subscription::spawn(Box::new(source), outbox, shared);

        let env = next_envelope(&mut rx).await;
        assert_eq!(
            env.to_value(),
            serde_json::json!({"handler": "radar.KTLX.REF.0.5", "error": "internal error"})
        );
        sub.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_never_overlap_even_when_slower_than_the_interval() {
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(64);
        let source = FakeSource::new("gui", vec![Step::Data(None)], Duration::from_secs(10))
            .with_fetch_delay(Duration::from_secs(25));
        let probe = source.probe();
        let sub = Subscription::spawn(Box::new(source), outbox, shared);

        for _ in 0..4 {
            next_envelope(&mut rx).await;
        }
        sub.cancel().await;

        assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
        let started = probe.started();
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(35));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_delivery_and_disarms() {
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new("gui", vec![Step::Data(None)], Duration::from_secs(5));
        let sub = Subscription::spawn(Box::new(source), outbox.clone(), shared.clone());

        next_envelope(&mut rx).await;
        let mut state = sub.state_watch();
        state
            .wait_for(|s| *s == SubscriptionState::Armed)
            .await
            .unwrap();
        let fired = shared.timers.fired();

        sub.cancel().await;
        assert_eq!(*state.borrow(), SubscriptionState::Closed);
        assert_eq!(shared.timers.armed(), 0);

        sleep(Duration::from_secs(60)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(shared.timers.fired(), fired);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_fetch_delivers_nothing() {
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new("gui", vec![Step::Data(None)], Duration::from_secs(5))
            .with_fetch_delay(Duration::from_secs(30));
        let probe = source.probe();
        let sub = Subscription::spawn(Box::new(source), outbox.clone(), shared.clone());

        settle().await;
        assert_eq!(probe.fetches(), 1);
        assert_eq!(sub.state(), SubscriptionState::Fetching);
        sub.cancel().await;

        sleep(Duration::from_secs(60)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(shared.timers.armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_follows_data_deliveries_only() {
        let shared = Shared::new();
        let (outbox, mut rx) = Outbox::channel(8);
        let source = FakeSource::new(
            "obs.metar",
            vec![
                Step::Data(Some(nominal("20240501_1700"))),
                Step::Stale,
                Step::Data(Some(nominal("20240501_1800"))),
                Step::Stale,
            ],
            Duration::from_secs(10),
        );
        let probe = source.probe();
        let sub = Subscription::spawn(Box::new(source), outbox, shared.clone());

        for _ in 0..4 {
            next_envelope(&mut rx).await;
        }
        sub.cancel().await;
        assert_eq!(shared.persist.drain(Duration::from_secs(1)).await, 0);
        assert_eq!(probe.persisted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ends_when_the_connection_writer_is_gone() {
        let shared = Shared::new();
        let (outbox, rx) = Outbox::channel(8);
        drop(rx);
        let source = FakeSource::new("gui", vec![Step::Data(None)], Duration::from_secs(5));
        let sub = Subscription::spawn(Box::new(source), outbox, shared.clone());

        let mut state = sub.state_watch();
        state
            .wait_for(|s| *s == SubscriptionState::Closed)
            .await
            .unwrap();
        assert_eq!(shared.timers.armed(), 0);
    }
}
