//! Client-side tracking controller for one order: a polling loop against the
//! location endpoint, plus an optional simulated-delivery mode that animates
//! the marker locally instead of polling. The two drive mechanisms are never
//! active at the same time; a single mode field and a single ticker make that
//! structural rather than a convention.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use crate::geo::lerp;
use crate::models::courier::GeoPoint;
use crate::tracking::service::TrackingSnapshot;

/// Fetch failures as the client sees them. `NotYetAvailable` keeps the loop
/// polling; `Denied` ends the session; anything transient is retried on the
/// next tick.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("no position reported yet")]
    NotYetAvailable,
    #[error("access denied")]
    Denied,
    #[error("transient fetch failure: {0}")]
    Transient(String),
}

pub trait LocationFeed: Send + Sync + 'static {
    fn fetch(
        &self,
        order_id: Uuid,
    ) -> impl Future<Output = Result<TrackingSnapshot, FetchError>> + Send;
}

/// Address resolution is an external capability; `None` means the provider
/// could not resolve the address and the session falls back to a configured
/// default point.
pub trait Geocoder: Send + Sync + 'static {
    fn geocode(&self, address: &str) -> impl Future<Output = Option<GeoPoint>> + Send;
}

pub trait TrackingView: Send + Sync + 'static {
    fn position(&self, point: GeoPoint);
    /// The courier has not reported a position yet; keep the user informed.
    fn waiting(&self);
    fn ended(&self, reason: EndReason);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Stopped,
    Denied,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub sim_tick: Duration,
    pub sim_duration: Duration,
    /// Used when geocoding the delivery address fails.
    pub fallback_destination: GeoPoint,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            sim_tick: Duration::from_millis(250),
            sim_duration: Duration::from_secs(25),
            fallback_destination: GeoPoint {
                lat: 37.8728,
                lng: 32.4922,
            },
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            sim_tick: config.sim_tick(),
            sim_duration: config.sim_duration(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
enum Command {
    Simulate,
    StopSimulation,
    Stop,
}

enum Mode {
    Polling,
    Simulating {
        from: GeoPoint,
        to: GeoPoint,
        progress: f64,
    },
}

enum PollOutcome {
    Continue,
    EnterSimulation,
    Fatal,
    Shutdown,
}

/// Owns the session task. Dropping the handle also ends the session (the
/// command channel closes and the loop exits), but `stop` additionally waits
/// for the task so no callback can fire afterwards.
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn simulate(&self) {
        let _ = self.cmd_tx.send(Command::Simulate).await;
    }

    pub async fn stop_simulation(&self) {
        let _ = self.cmd_tx.send(Command::StopSimulation).await;
    }

    pub async fn stop(self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
        let _ = self.task.await;
    }
}

pub fn start<F, G, V>(
    order_id: Uuid,
    feed: F,
    geocoder: G,
    view: V,
    config: SessionConfig,
) -> SessionHandle
where
    F: LocationFeed,
    G: Geocoder,
    V: TrackingView,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let session = TrackingSession {
        order_id,
        feed,
        geocoder,
        view,
        config,
        mode: Mode::Polling,
        last_snapshot: None,
    };
    let task = tokio::spawn(session.run(cmd_rx));
    SessionHandle { cmd_tx, task }
}

struct TrackingSession<F, G, V> {
    order_id: Uuid,
    feed: F,
    geocoder: G,
    view: V,
    config: SessionConfig,
    mode: Mode,
    last_snapshot: Option<TrackingSnapshot>,
}

impl<F, G, V> TrackingSession<F, G, V>
where
    F: LocationFeed,
    G: Geocoder,
    V: TrackingView,
{
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        // Immediate first tick: poll as soon as tracking opens.
        let mut ticker = immediate_ticker(self.config.poll_interval);

        loop {
            tokio::select! {
                biased;
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Stop) => break,
                    Some(Command::Simulate) => self.enter_simulation(&mut ticker).await,
                    Some(Command::StopSimulation) => {
                        if matches!(self.mode, Mode::Simulating { .. }) {
                            self.leave_simulation(&mut ticker);
                        }
                    }
                },
                _ = ticker.tick() => match self.mode {
                    Mode::Polling => match self.poll_once(&mut cmd_rx).await {
                        PollOutcome::Continue => {}
                        PollOutcome::EnterSimulation => self.enter_simulation(&mut ticker).await,
                        PollOutcome::Fatal => {
                            self.view.ended(EndReason::Denied);
                            return;
                        }
                        PollOutcome::Shutdown => break,
                    },
                    Mode::Simulating { .. } => self.step_simulation(&mut ticker),
                },
            }
        }

        self.view.ended(EndReason::Stopped);
    }

    /// One poll, raced against the command channel so a stop request wins
    /// over an in-flight response: the dropped fetch future is simply
    /// discarded, never applied to the view.
    async fn poll_once(&mut self, cmd_rx: &mut mpsc::Receiver<Command>) -> PollOutcome {
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                None | Some(Command::Stop) => PollOutcome::Shutdown,
                Some(Command::Simulate) => PollOutcome::EnterSimulation,
                Some(Command::StopSimulation) => PollOutcome::Continue,
            },
            result = self.feed.fetch(self.order_id) => match result {
                Ok(snapshot) => {
                    self.view.position(snapshot.delivery.location);
                    self.last_snapshot = Some(snapshot);
                    PollOutcome::Continue
                }
                Err(FetchError::NotYetAvailable) => {
                    self.view.waiting();
                    PollOutcome::Continue
                }
                Err(FetchError::Denied) => PollOutcome::Fatal,
                Err(FetchError::Transient(reason)) => {
                    warn!(order_id = %self.order_id, reason, "tracking poll failed; retrying");
                    PollOutcome::Continue
                }
            },
        }
    }

    /// Switches to local interpolation between the restaurant and the
    /// geocoded delivery address. Polling stops here: the ticker is replaced,
    /// so no further fetches happen until the simulation leaves.
    async fn enter_simulation(&mut self, ticker: &mut Interval) {
        if matches!(self.mode, Mode::Simulating { .. }) {
            return;
        }

        let Some(snapshot) = &self.last_snapshot else {
            warn!(order_id = %self.order_id, "no tracking data yet; cannot simulate");
            return;
        };

        let from = snapshot.restaurant.location;
        let to = match self.geocoder.geocode(&snapshot.order.delivery_address).await {
            Some(point) => point,
            None => {
                warn!(order_id = %self.order_id, "geocoding failed; using fallback destination");
                self.config.fallback_destination
            }
        };

        self.mode = Mode::Simulating {
            from,
            to,
            progress: 0.0,
        };
        *ticker = delayed_ticker(self.config.sim_tick);

        info!(order_id = %self.order_id, "simulated delivery started");
    }

    fn step_simulation(&mut self, ticker: &mut Interval) {
        let step = self.config.sim_tick.as_secs_f64() / self.config.sim_duration.as_secs_f64();

        let (position, done) = match &mut self.mode {
            Mode::Simulating { from, to, progress } => {
                *progress = (*progress + step).min(1.0);
                (lerp(from, to, *progress), *progress >= 1.0)
            }
            Mode::Polling => return,
        };

        self.view.position(position);

        if done {
            info!(order_id = %self.order_id, "simulated delivery finished");
            self.leave_simulation(ticker);
        }
    }

    fn leave_simulation(&mut self, ticker: &mut Interval) {
        self.mode = Mode::Polling;
        // Immediate tick: resuming polling refreshes the marker right away.
        *ticker = immediate_ticker(self.config.poll_interval);
    }
}

fn immediate_ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

fn delayed_ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
