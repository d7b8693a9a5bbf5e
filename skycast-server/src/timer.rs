//! Cancellable delayed callback.
//!
//! A [`Timer`] holds at most one arm at a time: `start` on an armed timer
//! disarms the previous arm first. Every arm is counted in a shared
//! [`TimerGauge`] from the moment it is armed until it fires or is stopped,
//! whichever happens first; the two can race and the gauge is decremented
//! exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// Counters shared by every timer that reports into it.
#[derive(Debug, Clone, Default)]
pub struct TimerGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    armed: AtomicUsize,
    fired: AtomicU64,
}

impl TimerGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers currently armed.
    pub fn armed(&self) -> usize {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Callbacks run since the gauge was created.
    pub fn fired(&self) -> u64 {
        self.inner.fired.load(Ordering::SeqCst)
    }

    fn arm(&self) {
        self.inner.armed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_fire(&self) {
        self.inner.fired.fetch_add(1, Ordering::SeqCst);
    }
}

/// One arm of a timer.
#[derive(Debug)]
struct ArmState {
    live: AtomicBool,
    gauge: TimerGauge,
}

impl ArmState {
    fn new(gauge: TimerGauge) -> Arc<Self> {
        gauge.arm();
        Arc::new(Self {
            live: AtomicBool::new(true),
            gauge,
        })
    }

    /// Returns `true` for the single caller that takes the arm down.
    fn disarm(&self) -> bool {
        if self.live.swap(false, Ordering::SeqCst) {
            self.gauge.inner.armed.fetch_sub(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Arm {
    state: Arc<ArmState>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct Timer {
    gauge: TimerGauge,
    arm: Option<Arm>,
}

impl Timer {
    pub fn new(gauge: TimerGauge) -> Self {
        Self { gauge, arm: None }
    }

    /// Run `callback` once after `delay` unless stopped first.
    pub fn start<F>(&mut self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop();
        let deadline = Instant::now() + delay;
        let state = ArmState::new(self.gauge.clone());
        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            sleep_until(deadline).await;
            if task_state.disarm() {
                task_state.gauge.record_fire();
                callback();
            }
        });
        self.arm = Some(Arm { state, task });
    }

    /// Run `callback` every `period` until stopped. The first run happens
    /// one period after arming. Periods shorter than a millisecond are
    /// rounded up.
    pub fn start_repeating<F>(&mut self, period: Duration, mut callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();
        let period = period.max(Duration::from_millis(1));
        let first = Instant::now() + period;
        let state = ArmState::new(self.gauge.clone());
        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(first, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if !task_state.is_live() {
                    break;
                }
                task_state.gauge.record_fire();
                callback();
            }
        });
        self.arm = Some(Arm { state, task });
    }

    /// Cancel the pending arm. Safe on a fired, stopped or never-started
    /// timer.
    pub fn stop(&mut self) {
        if let Some(arm) = self.arm.take() {
            arm.state.disarm();
            arm.task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.arm.as_ref().is_some_and(|arm| arm.state.is_live())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_fires_once_and_disarms() {
        let gauge = TimerGauge::new();
        let mut timer = Timer::new(gauge.clone());
        let (count, callback) = counter();

        timer.start(Duration::from_secs(5), callback);
        assert!(timer.is_armed());
        assert_eq!(gauge.armed(), 1);

        advance(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(gauge.armed(), 0);
        assert_eq!(gauge.fired(), 1);
        assert!(!timer.is_armed());

        advance(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_prevents_the_fire() {
        let gauge = TimerGauge::new();
        let mut timer = Timer::new(gauge.clone());
        let (count, callback) = counter();

        timer.start(Duration::from_secs(1), callback);
        timer.stop();
        timer.stop();
        assert_eq!(gauge.armed(), 0);

        advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(gauge.fired(), 0);

        // Stopping after a fire must not drive the gauge negative.
        let (_count, callback) = counter();
        timer.start(Duration::from_millis(10), callback);
        advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        timer.stop();
        assert_eq!(gauge.armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_arm() {
        let gauge = TimerGauge::new();
        let mut timer = Timer::new(gauge.clone());
        let (first, cb1) = counter();
        let (second, cb2) = counter();

        timer.start(Duration::from_secs(10), cb1);
        timer.start(Duration::from_secs(20), cb2);
        assert_eq!(gauge.armed(), 1);

        advance(Duration::from_secs(25)).await;
        tokio::task::yield_now().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_timer_fires_each_period_until_dropped() {
        let gauge = TimerGauge::new();
        let mut timer = Timer::new(gauge.clone());
        let (count, callback) = counter();

        timer.start_repeating(Duration::from_secs(10), callback);
        for _ in 0..3 {
            advance(Duration::from_secs(10)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(gauge.armed(), 1);

        drop(timer);
        assert_eq!(gauge.armed(), 0);
        advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
