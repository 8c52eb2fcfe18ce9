//! Keeps the mount pointed at a moving target.
//!
//! A background thread recomputes the target's position every interval and
//! commands the mount. Retargeting and offset changes only touch shared
//! state; the running loop picks them up on its next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::angle::AzEl;
use crate::mount::{MountController, MountError};
use crate::target::{Target, TargetError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("timed out while reaching {target} (mount is at {current})")]
    TimedOut { target: String, current: String },
    #[error("tracking aborted")]
    Aborting,
    #[error("mount is not tracking anything")]
    NotTracking,
    #[error("mount lost its position reference")]
    Lost,
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Target(#[from] TargetError),
}

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Sets the flag [`Tracker::reach_target`] checks on every poll.
#[derive(Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Shared {
    target: Target,
    offset: AzEl,
    // the reached callback fires once per arm
    reached_armed: bool,
}

struct Callbacks {
    lost: Callback,
    reached: Callback,
}

pub struct Tracker {
    mount: Arc<MountController>,
    shared: Arc<Mutex<Shared>>,
    callbacks: Arc<Mutex<Callbacks>>,
    tracking: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    interval: Duration,
    worker: Option<JoinHandle<()>>,
}

impl Tracker {
    pub fn new(mount: Arc<MountController>, target: Target, offset: AzEl) -> Self {
        let nothing: Callback = Arc::new(|| {});
        Self {
            mount,
            shared: Arc::new(Mutex::new(Shared {
                target,
                offset,
                reached_armed: false,
            })),
            callbacks: Arc::new(Mutex::new(Callbacks {
                lost: nothing.clone(),
                reached: nothing,
            })),
            tracking: Arc::new(AtomicBool::new(false)),
            abort: Arc::new(AtomicBool::new(false)),
            interval: DEFAULT_INTERVAL,
            worker: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn mount(&self) -> &Arc<MountController> {
        &self.mount
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Called from the tracking thread when the mount loses its position
    /// reference; tracking ends afterwards.
    pub fn set_lost_callback(&self, callback: Callback) {
        self.callbacks.lock().unwrap().lost = callback;
    }

    /// Called from the tracking thread the first time the mount stands
    /// still after a start or retarget.
    pub fn set_reached_callback(&self, callback: Callback) {
        self.callbacks.lock().unwrap().reached = callback;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub fn target(&self) -> Target {
        self.shared.lock().unwrap().target.clone()
    }

    pub fn offset(&self) -> AzEl {
        self.shared.lock().unwrap().offset
    }

    pub fn set_target(&self, target: Target) {
        let mut shared = self.shared.lock().unwrap();
        shared.target = target;
        shared.reached_armed = true;
    }

    pub fn set_offset(&self, offset: AzEl) {
        let mut shared = self.shared.lock().unwrap();
        shared.offset = offset;
        shared.reached_armed = true;
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.abort.clone())
    }

    /// Makes the next (or current) [`reach_target`](Self::reach_target)
    /// fail with [`TrackingError::Aborting`].
    pub fn abort_tracking(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Commands the first pose synchronously, then starts the loop.
    pub fn start(&mut self) -> Result<(), TrackingError> {
        if self.is_tracking() {
            return Ok(());
        }
        // a finished loop may still need joining
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        // a request from before this start is stale
        self.abort.store(false, Ordering::SeqCst);

        let (name, pos) = {
            let mut shared = self.shared.lock().unwrap();
            shared.reached_armed = true;
            let offset = shared.offset;
            let pos = offset_position(shared.target.compute()?, offset);
            (shared.target.name().to_string(), pos)
        };
        self.mount.set_target(pos)?;

        self.tracking.store(true, Ordering::SeqCst);
        let job = TrackJob {
            mount: self.mount.clone(),
            shared: self.shared.clone(),
            callbacks: self.callbacks.clone(),
            tracking: self.tracking.clone(),
            interval: self.interval,
        };
        self.worker = Some(thread::spawn(move || job.run()));
        log::info!("Mount started moving to {} @ {} ...", name, pos);
        Ok(())
    }

    /// Ends the loop, waits for it, and halts the mount.
    pub fn stop(&mut self) -> Result<(), TrackingError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.tracking.store(false, Ordering::SeqCst);
        if worker.join().is_err() {
            log::error!("Tracking thread panicked");
        }
        self.mount.stop()?;
        Ok(())
    }

    /// Blocks until the mount is within beam tolerance of the target.
    ///
    /// `timeout` of `None` waits forever. Fails with
    /// [`TrackingError::NotTracking`] once the loop has ended.
    pub fn reach_target(&self, timeout: Option<Duration>) -> Result<(), TrackingError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.abort.swap(false, Ordering::SeqCst) {
                return Err(TrackingError::Aborting);
            }
            if !self.is_tracking() {
                // the loop raises the abort flag before it ends
                if self.abort.swap(false, Ordering::SeqCst) {
                    return Err(TrackingError::Aborting);
                }
                return Err(TrackingError::NotTracking);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let current = self
                    .mount
                    .current()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|e| e.to_string());
                return Err(TrackingError::TimedOut {
                    target: self.target().to_string(),
                    current,
                });
            }

            let t0 = Instant::now();
            if self.mount.is_close_to_target_beam()? {
                let target = self.target();
                log::info!("Mount is at {} @ {}.", target.name(), target.position());
                return Ok(());
            }
            if let Some(rest) = self.interval.checked_sub(t0.elapsed()) {
                thread::sleep(rest);
            }
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.tracking.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn offset_position(pos: AzEl, offset: AzEl) -> AzEl {
    AzEl::with_offset(pos, offset.signed_azimuth(), offset.elevation())
}

struct TrackJob {
    mount: Arc<MountController>,
    shared: Arc<Mutex<Shared>>,
    callbacks: Arc<Mutex<Callbacks>>,
    tracking: Arc<AtomicBool>,
    interval: Duration,
}

impl TrackJob {
    fn run(self) {
        while self.tracking.load(Ordering::SeqCst) {
            if let Err(e) = self.tick() {
                log::warn!("Tracking stopped: {}", e);
                break;
            }
        }
        self.tracking.store(false, Ordering::SeqCst);
    }

    fn tick(&self) -> Result<(), TrackingError> {
        let t0 = Instant::now();
        if self.mount.is_lost()? {
            log::error!("Mount has lost its position reference");
            let lost = self.callbacks.lock().unwrap().lost.clone();
            lost();
            return Err(TrackingError::Lost);
        }
        if self.mount.is_at_target()? {
            let armed = std::mem::replace(&mut self.shared.lock().unwrap().reached_armed, false);
            if armed {
                let reached = self.callbacks.lock().unwrap().reached.clone();
                reached();
            }
        }

        let pos = {
            let mut shared = self.shared.lock().unwrap();
            let offset = shared.offset;
            offset_position(shared.target.compute()?, offset)
        };
        self.mount.set_target(pos)?;

        if let Some(rest) = self.interval.checked_sub(t0.elapsed()) {
            thread::sleep(rest);
        }
        Ok(())
    }
}
