use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use rand::Rng;

use spawnwatch_contracts::corrections::CorrectionRegistry;
use spawnwatch_contracts::subscriptions::SubscriptionStore;

use crate::config::LoopConfig;
use crate::gateway::{ChatGateway, Presence};
use crate::pipeline::lock;

/// A named worker thread that runs until stopped.
pub struct LoopHandle {
    name: &'static str,
    stop: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl LoopHandle {
    fn spawn(
        name: &'static str,
        body: impl FnOnce(mpsc::Receiver<()>) + Send + 'static,
    ) -> anyhow::Result<Self> {
        let (stop, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(rx))
            .with_context(|| format!("failed to spawn {name} thread"))?;
        Ok(Self { name, stop, handle })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the loop and waits for it to exit.
    pub fn stop(self) -> anyhow::Result<()> {
        let _ = self.stop.send(());
        self.handle
            .join()
            .map_err(|_| anyhow!("{} thread panicked", self.name))
    }
}

/// Waits up to `timeout` for a stop signal. True means keep going.
fn wait_or_stop(rx: &mpsc::Receiver<()>, timeout: Duration) -> bool {
    match rx.recv_timeout(timeout) {
        Err(mpsc::RecvTimeoutError::Timeout) => true,
        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistenceTick {
    pub flushed: bool,
    pub swept: usize,
}

/// One persistence pass: flush the store when the interval has elapsed and
/// drop correction entries past their TTL.
pub fn persistence_tick(
    store: &Mutex<SubscriptionStore>,
    corrections: &Mutex<CorrectionRegistry>,
    interval: Duration,
    now: Instant,
) -> PersistenceTick {
    let mut tick = PersistenceTick::default();
    match lock(store, "subscription store") {
        Ok(mut store) => match store.flush_if_due(now, interval) {
            Ok(flushed) => tick.flushed = flushed,
            Err(err) => tracing::error!(failure = "persistence", "periodic save failed: {err:#}"),
        },
        Err(err) => tracing::error!("{err}"),
    }
    match lock(corrections, "correction registry") {
        Ok(mut corrections) => tick.swept = corrections.sweep_expired(now),
        Err(err) => tracing::error!("{err}"),
    }
    if tick.flushed || tick.swept > 0 {
        tracing::debug!(flushed = tick.flushed, swept = tick.swept, "persistence tick");
    }
    tick
}

pub fn spawn_persistence_loop(
    store: Arc<Mutex<SubscriptionStore>>,
    corrections: Arc<Mutex<CorrectionRegistry>>,
    config: &LoopConfig,
) -> anyhow::Result<LoopHandle> {
    let tick = config.persistence_tick;
    let interval = config.persistence_interval;
    LoopHandle::spawn("spawnwatch-persistence", move |rx| {
        while wait_or_stop(&rx, tick) {
            persistence_tick(&store, &corrections, interval, Instant::now());
        }
        tracing::debug!("persistence loop stopped");
    })
}

/// The rotating status lines.
pub fn presence_cycle(server_count: usize) -> [Presence; 2] {
    [
        Presence::Watching("for shinies!".to_string()),
        Presence::Playing(format!("with {server_count} servers")),
    ]
}

/// `interval` shifted by a uniform offset in `[-jitter, +jitter]`.
pub fn jittered(interval: Duration, jitter: Duration, rng: &mut impl Rng) -> Duration {
    let jitter_ms = jitter.as_millis() as i64;
    if jitter_ms == 0 {
        return interval;
    }
    let offset = rng.gen_range(-jitter_ms..=jitter_ms);
    let total = interval.as_millis() as i64 + offset;
    Duration::from_millis(total.max(0) as u64)
}

pub fn spawn_presence_loop(
    gateway: Arc<dyn ChatGateway>,
    config: &LoopConfig,
) -> anyhow::Result<LoopHandle> {
    let interval = config.presence_interval;
    let jitter = config.presence_jitter;
    LoopHandle::spawn("spawnwatch-presence", move |rx| {
        let mut rng = rand::thread_rng();
        let mut index = 0usize;
        loop {
            let cycle = presence_cycle(gateway.server_count());
            let presence = &cycle[index % cycle.len()];
            if let Err(err) = gateway.set_presence(presence) {
                tracing::warn!(presence = %presence, "presence update failed: {err:#}");
            }
            index = index.wrapping_add(1);
            if !wait_or_stop(&rx, jittered(interval, jitter, &mut rng)) {
                break;
            }
        }
        tracing::debug!("presence loop stopped");
    })
}
