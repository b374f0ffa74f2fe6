//! Sensor monitoring lifecycle and the polling loop
//!
//! One background task owns the sensor source and the crossing detector and
//! runs the poll -> debounce -> transition -> dispatch cycle at a fixed
//! interval. The HTTP layer talks to `MonitorController`: `start` is
//! idempotent (a second call only re-registers the callback target), `stop`
//! joins the task so it is never left running detached. Occupancy survives
//! stop/start for the life of the process; detector state does not.

use crate::domain::types::{Direction, EventNotification, SensorLevels, SensorReading};
use crate::infra::config::Config;
use crate::io::callback::CallbackDispatcher;
use crate::io::sensor::{SensorFactory, SensorSource};
use crate::services::crossing::CrossingDetector;
use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Poll cadence and detector windows, taken from config
#[derive(Debug, Clone, Copy)]
pub struct MonitorTiming {
    pub poll_interval: Duration,
    pub window: Duration,
    pub cooldown: Duration,
}

impl MonitorTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms()),
            window: Duration::from_millis(config.window_ms()),
            cooldown: Duration::from_millis(config.cooldown_ms()),
        }
    }
}

/// State shared between the polling loop and the request-handling layer
///
/// The loop is the only writer of the occupancy count; readers may race a
/// tick, so both values live behind atomics / a narrow lock.
pub struct MonitorShared {
    running: AtomicBool,
    people_inside: AtomicU64,
    callback_url: RwLock<Option<String>>,
}

impl MonitorShared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            people_inside: AtomicU64::new(0),
            callback_url: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn people_inside(&self) -> u64 {
        self.people_inside.load(Ordering::Acquire)
    }

    pub fn callback_url(&self) -> Option<String> {
        self.callback_url.read().clone()
    }

    /// Replace the registered target; last writer wins
    fn register_callback(&self, url: String) {
        *self.callback_url.write() = Some(url);
    }

    /// Apply a confirmed crossing, returning the occupancy after it.
    /// Exits are floor-clamped at zero.
    fn apply_crossing(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Entry => self.people_inside.fetch_add(1, Ordering::AcqRel) + 1,
            Direction::Exit => {
                let prev = self
                    .people_inside
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        Some(n.saturating_sub(1))
                    })
                    .unwrap_or(0);
                prev.saturating_sub(1)
            }
        }
    }
}

/// What `start` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A fresh monitoring task was launched
    Started,
    /// Already running; only the callback target was replaced
    CallbackUpdated,
}

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the monitoring task lifecycle
pub struct MonitorController {
    timing: MonitorTiming,
    dispatcher: CallbackDispatcher,
    sensors: SensorFactory,
    shared: Arc<MonitorShared>,
    task: Mutex<Option<MonitorTask>>,
}

impl MonitorController {
    pub fn new(timing: MonitorTiming, dispatcher: CallbackDispatcher, sensors: SensorFactory) -> Self {
        Self {
            timing,
            dispatcher,
            sensors,
            shared: Arc::new(MonitorShared::new()),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn people_inside(&self) -> u64 {
        self.shared.people_inside()
    }

    pub fn callback_url(&self) -> Option<String> {
        self.shared.callback_url()
    }

    /// Start monitoring, or re-register the callback target if already
    /// running. A fresh start claims the sensor lines and begins from an
    /// idle detector; the occupancy count is never reset here.
    pub fn start(&self, callback_url: String) -> anyhow::Result<StartOutcome> {
        self.shared.register_callback(callback_url.clone());

        let mut slot = self.task.lock();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                info!(callback_url = %callback_url, "monitor_callback_updated");
                return Ok(StartOutcome::CallbackUpdated);
            }
        }

        let sensor = (self.sensors)().context("failed to open sensor source")?;
        let detector = CrossingDetector::new(self.timing.window, self.timing.cooldown);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let dispatcher = self.dispatcher.clone();
        let poll_interval = self.timing.poll_interval;
        let handle = tokio::spawn(async move {
            run_monitor_loop(sensor, detector, shared, dispatcher, poll_interval, shutdown_rx)
                .await;
        });

        *slot = Some(MonitorTask { shutdown: shutdown_tx, handle });
        info!(callback_url = %callback_url, "monitor_started");
        Ok(StartOutcome::Started)
    }

    /// Signal the task to exit after its current tick and join it.
    /// No-op when not running.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            debug!("monitor_stop_not_running");
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            warn!(error = %e, "monitor_task_join_failed");
        }
        info!("monitor_stopped");
    }
}

async fn run_monitor_loop(
    mut sensor: Box<dyn SensorSource>,
    mut detector: CrossingDetector,
    shared: Arc<MonitorShared>,
    dispatcher: CallbackDispatcher,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(poll_interval_ms = %poll_interval.as_millis(), "sensor_loop_started");

    let mut poll_timer = interval(poll_interval);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = poll_timer.tick() => {}
        }

        // A failed read counts as no activity for this tick
        let levels = match sensor.poll() {
            Ok(levels) => levels,
            Err(e) => {
                warn!(error = %e, "sensor_read_failed");
                SensorLevels::inactive()
            }
        };

        let reading = SensorReading::now(levels);
        if let Some(crossing) = detector.advance(&reading) {
            let people_inside = shared.apply_crossing(crossing.direction);
            info!(
                direction = %crossing.direction.as_str(),
                people_inside = %people_inside,
                "crossing_confirmed"
            );
            dispatcher.dispatch(
                shared.callback_url(),
                EventNotification::from_crossing(&crossing, people_inside),
            );
        }
    }

    shared.running.store(false, Ordering::Release);
    info!("sensor_loop_stopped");
    // Dropping the sensor source here releases the hardware lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const POLL_MS: u64 = 5;

    fn timing() -> MonitorTiming {
        MonitorTiming {
            poll_interval: Duration::from_millis(POLL_MS),
            window: Duration::from_millis(50),
            cooldown: Duration::from_millis(120),
        }
    }

    struct ScriptedSensor {
        steps: std::vec::IntoIter<SensorLevels>,
    }

    impl SensorSource for ScriptedSensor {
        fn poll(&mut self) -> anyhow::Result<SensorLevels> {
            Ok(self.steps.next().unwrap_or_default())
        }
    }

    /// Each start replays the same script from the beginning
    fn scripted_factory(steps: Vec<SensorLevels>) -> SensorFactory {
        Box::new(move || {
            Ok(Box::new(ScriptedSensor { steps: steps.clone().into_iter() })
                as Box<dyn SensorSource>)
        })
    }

    fn entry() -> SensorLevels {
        SensorLevels { entry_active: true, exit_active: false }
    }

    fn exit() -> SensorLevels {
        SensorLevels { entry_active: false, exit_active: true }
    }

    fn quiet(n: usize) -> Vec<SensorLevels> {
        vec![SensorLevels::inactive(); n]
    }

    fn controller(steps: Vec<SensorLevels>) -> MonitorController {
        let dispatcher = CallbackDispatcher::new(Duration::from_millis(100)).unwrap();
        MonitorController::new(timing(), dispatcher, scripted_factory(steps))
    }

    // No listener on the discard port; deliveries fail fast and are logged
    fn cb_url() -> String {
        "http://127.0.0.1:9/cb".to_string()
    }

    #[test]
    fn test_entry_increments_occupancy_by_one() {
        let shared = MonitorShared::new();
        assert_eq!(shared.apply_crossing(Direction::Entry), 1);
        assert_eq!(shared.apply_crossing(Direction::Entry), 2);
    }

    #[test]
    fn test_exit_decrements_and_floors_at_zero() {
        let shared = MonitorShared::new();
        shared.apply_crossing(Direction::Entry);
        assert_eq!(shared.apply_crossing(Direction::Exit), 0);
        // Exit at zero stays at zero
        assert_eq!(shared.apply_crossing(Direction::Exit), 0);
    }

    #[tokio::test]
    async fn test_entry_crossing_counted() {
        let monitor = controller(vec![entry(), exit()]);
        monitor.start(cb_url()).unwrap();

        sleep(Duration::from_millis(100)).await;

        assert!(monitor.is_running());
        assert_eq!(monitor.people_inside(), 1);

        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_exit_crossing_at_zero_stays_zero() {
        let monitor = controller(vec![exit(), entry()]);
        monitor.start(cb_url()).unwrap();

        sleep(Duration::from_millis(100)).await;

        assert_eq!(monitor.people_inside(), 0);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_cooldown_drops_immediate_second_crossing() {
        // Second pair begins ~10ms after the first event, well inside the
        // 120ms cooldown
        let mut steps = vec![entry(), exit()];
        steps.extend(vec![entry(), exit()]);
        let monitor = controller(steps);
        monitor.start(cb_url()).unwrap();

        sleep(Duration::from_millis(150)).await;

        assert_eq!(monitor.people_inside(), 1);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_spaced_crossings_both_counted() {
        // Quiet gap of ~40 ticks (200ms) clears the 120ms cooldown
        let mut steps = vec![entry(), exit()];
        steps.extend(quiet(40));
        steps.extend(vec![entry(), exit()]);
        let monitor = controller(steps);
        monitor.start(cb_url()).unwrap();

        sleep(Duration::from_millis(400)).await;

        assert_eq!(monitor.people_inside(), 2);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_updates_callback_only() {
        let monitor = controller(quiet(400));

        assert_eq!(monitor.start("http://a/cb".to_string()).unwrap(), StartOutcome::Started);
        assert_eq!(
            monitor.start("http://b/cb".to_string()).unwrap(),
            StartOutcome::CallbackUpdated
        );

        assert_eq!(monitor.callback_url(), Some("http://b/cb".to_string()));
        assert!(monitor.is_running());
        assert_eq!(monitor.people_inside(), 0);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_idempotent() {
        let monitor = controller(quiet(10));
        monitor.stop().await;

        monitor.start(cb_url()).unwrap();
        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_restart_preserves_occupancy_with_fresh_state() {
        // The script replays on each start, so each run counts one entry;
        // the count carries across the stop/start cycle
        let monitor = controller(vec![entry(), exit()]);

        monitor.start(cb_url()).unwrap();
        sleep(Duration::from_millis(100)).await;
        monitor.stop().await;
        assert_eq!(monitor.people_inside(), 1);

        monitor.start(cb_url()).unwrap();
        sleep(Duration::from_millis(100)).await;
        monitor.stop().await;

        assert_eq!(monitor.people_inside(), 2);
    }

    #[tokio::test]
    async fn test_sensor_error_treated_as_no_activity() {
        struct FlakySensor {
            calls: usize,
        }
        impl SensorSource for FlakySensor {
            fn poll(&mut self) -> anyhow::Result<SensorLevels> {
                self.calls += 1;
                match self.calls {
                    1 => Ok(SensorLevels { entry_active: true, exit_active: false }),
                    2 => anyhow::bail!("transient read failure"),
                    3 => Ok(SensorLevels { entry_active: false, exit_active: true }),
                    _ => Ok(SensorLevels::inactive()),
                }
            }
        }

        let dispatcher = CallbackDispatcher::new(Duration::from_millis(100)).unwrap();
        let monitor = MonitorController::new(
            timing(),
            dispatcher,
            Box::new(|| Ok(Box::new(FlakySensor { calls: 0 }) as Box<dyn SensorSource>)),
        );

        monitor.start(cb_url()).unwrap();
        sleep(Duration::from_millis(100)).await;

        // The failed tick did not corrupt the correlation in progress
        assert_eq!(monitor.people_inside(), 1);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_start_fails_when_sensor_unavailable() {
        let dispatcher = CallbackDispatcher::new(Duration::from_millis(100)).unwrap();
        let monitor = MonitorController::new(
            timing(),
            dispatcher,
            Box::new(|| anyhow::bail!("sensor hardware missing")),
        );

        assert!(monitor.start(cb_url()).is_err());
        assert!(!monitor.is_running());
    }
}
