//! Periodic sync scheduling.
//!
//! The scheduler calls a sync function on an interval with jitter, backs off
//! exponentially while cycles fail, and accepts commands (sync now, refresh
//! with cooldown, pause, resume, stop) through a [`SchedulerHandle`].
//! [`SyncGate`] keeps at most one cycle in flight no matter how many
//! triggers race.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::{SyncEngine, SyncResult};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between syncs.
    pub sync_interval: Duration,
    /// Maximum jitter as a fraction of the interval (0.0-1.0).
    pub jitter_fraction: f64,
    /// Minimum spacing between manual refreshes.
    pub refresh_cooldown: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Consecutive failures after which each further failure is logged as an
    /// error. Syncing continues at the maximum backoff.
    pub escalate_after: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            jitter_fraction: 0.1,
            refresh_cooldown: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            escalate_after: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn new(sync_interval: Duration) -> Self {
        Self {
            sync_interval,
            ..Default::default()
        }
    }

    /// Builder: set jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: set refresh cooldown.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Next regular delay, jittered.
    pub fn next_sync_delay(&self) -> Duration {
        let base = self.sync_interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Delay after `consecutive_failures` failed cycles.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }
}

/// Jitter in `[-range, range]` from the sub-second clock.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let fraction = (nanos as f64) / 1_000_000_000.0;
    (fraction * 2.0 - 1.0) * range
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    SyncNow,
    /// Sync unless a refresh ran within the cooldown, or always if `force`.
    Refresh { force: bool },
    Pause,
    Resume,
    Stop,
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub paused: bool,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
    pub last_refresh: Option<Instant>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a cycle outcome into the state.
    ///
    /// `NoCalendarSelected` is neither a success nor a failure: there is
    /// nothing to back off from.
    pub fn record(&mut self, result: SyncResult) {
        let now = Utc::now();
        self.last_attempt = Some(now);
        match result {
            SyncResult::Success(_) => {
                self.consecutive_failures = 0;
                self.last_success = Some(now);
            }
            SyncResult::NoCalendarSelected => {
                self.consecutive_failures = 0;
            }
            SyncResult::NotAuthenticated | SyncResult::Error(_) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
        }
        self.last_result = Some(result);
    }

    pub fn record_refresh(&mut self) {
        self.last_refresh = Some(Instant::now());
    }

    pub fn in_cooldown(&self, cooldown: Duration) -> bool {
        self.last_refresh
            .is_some_and(|last_refresh| last_refresh.elapsed() < cooldown)
    }
}

pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Admits at most one sync cycle at a time.
///
/// A trigger that arrives while a cycle is running is dropped rather than
/// queued; the running cycle already reflects the latest remote state.
#[derive(Debug)]
pub struct SyncGate {
    engine: Arc<SyncEngine>,
    in_flight: Mutex<()>,
}

impl SyncGate {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            in_flight: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Runs a cycle unless one is already in flight.
    pub async fn try_sync(&self) -> Option<SyncResult> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("sync already in flight, skipping trigger");
            return None;
        };
        Some(self.engine.sync_events().await)
    }
}

/// Drives periodic sync cycles.
pub struct Scheduler {
    config: SchedulerConfig,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::new(RwLock::new(SchedulerState::new())),
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs until stopped, syncing through `gate`.
    pub async fn run_with_gate(self, gate: Arc<SyncGate>) {
        self.run(move || {
            let gate = gate.clone();
            async move { gate.try_sync().await }
        })
        .await;
    }

    /// Runs the loop. `sync_fn` returns `None` when the cycle was skipped.
    pub async fn run<F, Fut>(self, sync_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<SyncResult>> + Send,
    {
        let Self {
            config,
            state,
            command_rx: mut commands,
            command_tx,
        } = self;
        // Commands only come from handles; keeping our own sender alive would
        // stop `recv` from ever reporting a closed channel.
        drop(command_tx);
        let runner = Runner { config, state };

        info!(
            interval_secs = runner.config.sync_interval.as_secs(),
            "scheduler started"
        );

        runner.do_sync(&sync_fn).await;

        loop {
            let delay = runner.next_delay().await;
            debug!(delay_secs = delay.as_secs(), "scheduling next sync");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if runner.state.read().await.paused {
                        debug!("scheduler paused, skipping sync");
                        continue;
                    }
                    runner.do_sync(&sync_fn).await;
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(SchedulerCommand::SyncNow) => {
                            debug!("received sync now");
                            runner.do_sync(&sync_fn).await;
                        }
                        Some(SchedulerCommand::Refresh { force }) => {
                            let in_cooldown = runner
                                .state
                                .read()
                                .await
                                .in_cooldown(runner.config.refresh_cooldown);
                            if force || !in_cooldown {
                                runner.state.write().await.record_refresh();
                                runner.do_sync(&sync_fn).await;
                            } else {
                                debug!("refresh skipped, in cooldown");
                            }
                        }
                        Some(SchedulerCommand::Pause) => {
                            info!("scheduler paused");
                            runner.state.write().await.paused = true;
                        }
                        Some(SchedulerCommand::Resume) => {
                            info!("scheduler resumed");
                            runner.state.write().await.paused = false;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

struct Runner {
    config: SchedulerConfig,
    state: SharedSchedulerState,
}

impl Runner {
    async fn next_delay(&self) -> Duration {
        let state = self.state.read().await;

        if state.consecutive_failures > 0 {
            return self.config.backoff_delay(state.consecutive_failures);
        }

        if state.in_cooldown(self.config.refresh_cooldown)
            && let Some(last_refresh) = state.last_refresh
        {
            let remaining = self
                .config
                .refresh_cooldown
                .saturating_sub(last_refresh.elapsed());
            return remaining.max(self.config.next_sync_delay());
        }

        self.config.next_sync_delay()
    }

    async fn do_sync<F, Fut>(&self, sync_fn: &F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Option<SyncResult>>,
    {
        let Some(result) = sync_fn().await else {
            return;
        };

        let mut state = self.state.write().await;
        match result {
            SyncResult::Success(count) => debug!(count, "scheduled sync succeeded"),
            SyncResult::NoCalendarSelected => debug!("no calendar selected"),
            ref failure => {
                let failures = state.consecutive_failures + 1;
                if failures >= self.config.escalate_after {
                    error!(failures, result = %failure, "sync keeps failing");
                } else {
                    warn!(failures, result = %failure, "scheduled sync failed");
                }
            }
        }
        state.record(result);
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    async fn send(&self, cmd: SchedulerCommand) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(cmd).await
    }

    pub async fn sync_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.send(SchedulerCommand::SyncNow).await
    }

    pub async fn refresh(&self, force: bool) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.send(SchedulerCommand::Refresh { force }).await
    }

    pub async fn pause(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.send(SchedulerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.send(SchedulerCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.send(SchedulerCommand::Stop).await
    }

    /// A snapshot of the scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }

    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::test_support::{RecordingStore, ScriptedClient};
    use hearth_providers::{MemoryCredentialStore, ProviderError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn config_next_sync_delay_within_jitter() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.1);
        let delay = config.next_sync_delay().as_secs_f64();
        assert!((54.0..=66.0).contains(&delay), "{}", delay);
    }

    #[test]
    fn config_backoff_delay() {
        let config = SchedulerConfig::default().with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(300),
            2.0,
        );

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(config.backoff_delay(10), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn state_records_outcomes() {
        let mut state = SchedulerState::new();

        state.record(SyncResult::Error("Network error".into()));
        state.record(SyncResult::NotAuthenticated);
        assert_eq!(state.consecutive_failures, 2);
        assert!(state.last_success.is_none());

        state.record(SyncResult::Success(3));
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_success.is_some());
        assert_eq!(state.last_result, Some(SyncResult::Success(3)));

        state.record(SyncResult::Error("Network error".into()));
        state.record(SyncResult::NoCalendarSelected);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn state_cooldown() {
        let mut state = SchedulerState::new();
        let cooldown = Duration::from_millis(50);
        assert!(!state.in_cooldown(cooldown));

        state.record_refresh();
        assert!(state.in_cooldown(cooldown));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!state.in_cooldown(cooldown));
    }

    #[tokio::test]
    async fn scheduler_commands() {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)));
        let handle = scheduler.handle();

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let task = tokio::spawn(scheduler.run(move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Some(SyncResult::Success(0))
            }
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(count.load(Ordering::SeqCst) >= 1);

        handle.sync_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        handle.pause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_paused().await);

        handle.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_paused().await);

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn scheduler_backs_off_and_recovers() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_backoff(
            Duration::from_millis(10),
            Duration::from_millis(40),
            2.0,
        );
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let task = tokio::spawn(scheduler.run(move || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Some(SyncResult::Error("Network error".into()))
                } else {
                    Some(SyncResult::Success(1))
                }
            }
        }));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 4);

        let state = handle.state().await;
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_success.is_some());

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn syncs_on_the_interval() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.0);
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let task = tokio::spawn(scheduler.run(move || {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Some(SyncResult::Success(0))
            }
        }));

        // Immediately, then at 60s and 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.pause().await.unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_all_handles_stops_the_scheduler() {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)));
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run(|| async { None }));

        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn gate_admits_one_cycle_at_a_time() {
        let credentials = Arc::new(MemoryCredentialStore::new().with_calendar("family"));
        let remote = Arc::new(ScriptedClient::new());
        remote.push_err(ProviderError::network("Network error"));
        let engine = SyncEngine::new(
            credentials,
            remote.clone(),
            Arc::new(RecordingStore::new()),
            SyncConfig::default(),
        );
        let gate = SyncGate::new(Arc::new(engine));

        let (first, second) = tokio::join!(gate.try_sync(), gate.try_sync());

        assert_eq!(first, Some(SyncResult::Error("Network error".into())));
        assert_eq!(second, None);
        assert_eq!(remote.calls(), 1);

        // The gate reopens once the cycle is done.
        assert_eq!(gate.try_sync().await, Some(SyncResult::Success(0)));
    }
}
