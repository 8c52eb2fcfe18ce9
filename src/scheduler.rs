//! Unattended batch observation: laps over the visible targets until the
//! scan time is used up, then park.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::angle::AzEl;
use crate::mount::{MountController, MountError};
use crate::observation::{
    Frequency, FrequencyPlan, Instruments, MeasurementFactory, ObservationAbort,
    ObservationContext, ObservationError, ObservationPipeline, PostPipeline, Stage,
};
use crate::planner::{PathStrategy, PlanError};
use crate::target::Target;
use crate::tracker::{Tracker, TrackingError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("mount did not finish resetting within {0:?}")]
    ResetTimedOut(Duration),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub scan_time: Duration,
    /// Minimum time from the start of one lap to the start of the next.
    pub lap_interval: Duration,
    /// `None` waits for the mount forever.
    pub reach_timeout: Option<Duration>,
    pub reset_timeout: Duration,
    pub empty_retry: Duration,
    pub poll_interval: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            scan_time: Duration::from_secs(3600),
            lap_interval: Duration::ZERO,
            reach_timeout: Some(Duration::from_secs(600)),
            reset_timeout: Duration::from_secs(600),
            empty_retry: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// How each target is observed.
#[derive(Debug, Clone)]
pub struct MeasurementSettings {
    /// Reference offset for switched measurements; 0 measures the signal only.
    pub frequency_offset_hz: f64,
    pub lna: bool,
    pub repeats_per_target: usize,
    /// Beam offset the target is tracked with. When non-zero every
    /// measurement is repeated on the target itself.
    pub offset: AzEl,
    pub settle_timeout: Option<Duration>,
    pub repeats_per_frequency: usize,
    pub diode_switching: bool,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            frequency_offset_hz: 0.0,
            lna: false,
            repeats_per_target: 1,
            offset: AzEl::zero(),
            settle_timeout: Some(Duration::from_secs(600)),
            repeats_per_frequency: 1,
            diode_switching: false,
        }
    }
}

/// Stages for one target, outermost first.
pub fn observation_stages(m: &MeasurementSettings, frequencies: Vec<Frequency>) -> Vec<Stage> {
    let mut stages = vec![if m.frequency_offset_hz != 0.0 {
        Stage::Switched(m.frequency_offset_hz)
    } else {
        Stage::Signal
    }];
    if m.lna {
        stages.push(Stage::Lna);
    }
    stages.push(Stage::Repeating(m.repeats_per_target));
    if !m.offset.is_zero() {
        // the tracker already carries the offset, so switch to the target
        stages.push(Stage::BeamSwitching {
            offset: AzEl::zero(),
            timeout: m.settle_timeout,
        });
    }
    stages.push(Stage::MultipleFrequency(frequencies));
    stages.push(Stage::Repeating(m.repeats_per_frequency));
    if m.diode_switching {
        stages.push(Stage::DiodeSwitching);
    }
    stages
}

/// Tracks and observes one target at a time.
pub struct BatchMeasurement {
    mount: Arc<MountController>,
    tracker: Tracker,
    plan: FrequencyPlan,
    measurement: MeasurementSettings,
    post: PostPipeline,
    factory: Box<dyn MeasurementFactory>,
    abort: ObservationAbort,
    reach_timeout: Option<Duration>,
    reset_timeout: Duration,
    poll_interval: Duration,
}

impl BatchMeasurement {
    /// Losing the mount aborts both the wait for the target and any
    /// running observation.
    pub fn new(
        tracker: Tracker,
        plan: FrequencyPlan,
        measurement: MeasurementSettings,
        post: PostPipeline,
        factory: Box<dyn MeasurementFactory>,
        settings: &ScheduleSettings,
    ) -> Self {
        let abort = ObservationAbort::new();
        let tracking = tracker.abort_handle();
        let observing = abort.clone();
        tracker.set_lost_callback(Arc::new(move || {
            tracking.abort();
            observing.abort();
        }));
        tracker.set_offset(measurement.offset);
        Self {
            mount: tracker.mount().clone(),
            tracker,
            plan,
            measurement,
            post,
            factory,
            abort,
            reach_timeout: settings.reach_timeout,
            reset_timeout: settings.reset_timeout,
            poll_interval: settings.poll_interval,
        }
    }

    pub fn mount(&self) -> &Arc<MountController> {
        &self.mount
    }

    /// Observes `target`. Only failures the batch cannot continue after are
    /// returned; everything else is logged.
    pub fn process(&mut self, target: Target) -> Result<(), SchedulerError> {
        self.abort.clear();
        let name = target.to_string();

        match self.track_and_observe(target) {
            Ok(()) => Ok(()),
            Err(ObservationError::Tracking(TrackingError::Aborting)) => {
                let current = self
                    .mount
                    .current()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|e| e.to_string());
                log::error!(
                    "Tracking was aborted for {} because the mount is stuck at {}. Attempting to recover",
                    name,
                    current
                );
                self.try_recover()
            }
            Err(ObservationError::Aborting) => {
                log::warn!("Observation of {} was aborted", name);
                if self.mount.is_lost()? {
                    self.try_recover()?;
                }
                Ok(())
            }
            Err(ObservationError::Mount(e @ (MountError::Io(_) | MountError::Terminated)))
            | Err(ObservationError::Tracking(TrackingError::Mount(
                e @ (MountError::Io(_) | MountError::Terminated),
            ))) => Err(e.into()),
            Err(e) => {
                log::error!("Skipping {}: {}", name, e);
                Ok(())
            }
        }
    }

    fn track_and_observe(&mut self, target: Target) -> Result<(), ObservationError> {
        self.tracker.set_target(target);
        let result = self.observe_tracked();
        if let Err(e) = self.tracker.stop() {
            log::warn!("Could not stop tracking: {}", e);
        }
        result
    }

    fn observe_tracked(&mut self) -> Result<(), ObservationError> {
        self.tracker.start()?;
        self.tracker.reach_target(self.reach_timeout)?;
        if !self.tracker.is_tracking() {
            return Err(TrackingError::NotTracking.into());
        }

        let target = self.tracker.target();
        let frequencies = self.plan.frequencies_for(&target);
        if frequencies.is_empty() {
            log::warn!("No frequencies to observe {} on", target.name());
            return Ok(());
        }
        let stages = observation_stages(&self.measurement, frequencies);
        log::debug!(
            "Observation stages: {:?}",
            stages.iter().map(<&str>::from).collect::<Vec<_>>()
        );
        let pipeline = ObservationPipeline::new(
            stages,
            self.post.clone(),
        )
        .with_abort(self.abort.clone());

        let mut ctx = ObservationContext::new(target, self.tracker.offset());
        let mut instruments = Instruments {
            frontend: self.mount.as_ref(),
            pointing: &mut self.tracker,
            factory: self.factory.as_mut(),
        };
        pipeline.execute(&mut ctx, &mut instruments)
    }

    /// Soft reset, then hard reset; fatal when both time out.
    pub fn try_recover(&mut self) -> Result<(), SchedulerError> {
        log::info!("Issuing a soft reset on the mount...");
        match self.reset(false) {
            Err(SchedulerError::ResetTimedOut(_)) => {
                log::error!("Soft reset timed out.");
            }
            other => return other,
        }
        log::info!("Issuing a hard reset on the mount...");
        match self.reset(true) {
            Err(SchedulerError::ResetTimedOut(timeout)) => {
                log::error!("Hard reset timed out. Panic!");
                Err(SchedulerError::Fatal(format!(
                    "mount did not recover after a hard reset ({:?})",
                    timeout
                )))
            }
            other => other,
        }
    }

    /// Resets the mount and waits for it to know its position again.
    pub fn reset(&mut self, hard: bool) -> Result<(), SchedulerError> {
        log::info!("Mount is resetting ...");
        if let Err(e) = self.tracker.stop() {
            log::warn!("Could not stop tracking: {}", e);
        }
        self.mount.reset(hard)?;
        self.wait_for_reset(self.reset_timeout)
    }

    pub fn wait_for_reset(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(SchedulerError::ResetTimedOut(timeout));
            }
            let t0 = Instant::now();
            if self.mount.is_reset()? {
                log::info!("Mount is reset");
                return Ok(());
            }
            if let Some(rest) = self.poll_interval.checked_sub(t0.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    /// Parks the mount and closes the connection. Failures are logged.
    pub fn terminate(&mut self) {
        if let Err(e) = self.tracker.stop() {
            log::warn!("Could not stop tracking: {}", e);
        }
        if let Err(e) = self.mount.park() {
            log::error!("Could not park the mount: {}", e);
        }
        if let Err(e) = self.mount.terminate() {
            log::error!("Could not close the mount connection: {}", e);
        }
    }
}

pub struct BatchScheduler {
    planner: Box<dyn PathStrategy>,
    batch: BatchMeasurement,
    settings: ScheduleSettings,
}

impl BatchScheduler {
    pub fn new(
        planner: Box<dyn PathStrategy>,
        batch: BatchMeasurement,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            planner,
            batch,
            settings,
        }
    }

    /// Resets the mount, observes until the scan time is used up, and parks
    /// the mount whatever happened.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        log::info!(
            "Scan time {}, at least {} between laps",
            humantime::format_duration(self.settings.scan_time),
            humantime::format_duration(self.settings.lap_interval)
        );
        let started = Instant::now();
        let result = self
            .batch
            .reset(false)
            .and_then(|_| self.scan(started));
        if let Err(e) = &result {
            log::error!("Observation ended unexpectedly: {}", e);
        }
        self.batch.terminate();
        result
    }

    fn scan(&mut self, started: Instant) -> Result<(), SchedulerError> {
        while started.elapsed() < self.settings.scan_time {
            log::info!("Starting new observation lap.");
            let t0 = Instant::now();
            match self.lap() {
                Ok(()) => {}
                Err(SchedulerError::Plan(e)) => {
                    log::warn!(
                        "{}. Retrying in {}",
                        e,
                        humantime::format_duration(self.settings.empty_retry)
                    );
                    thread::sleep(self.settings.empty_retry);
                    continue;
                }
                Err(e) => return Err(e),
            }
            let lap = t0.elapsed();
            log::info!("Lap took {:.2} seconds.", lap.as_secs_f64());
            if let Some(rest) = self.settings.lap_interval.checked_sub(lap) {
                if !rest.is_zero() {
                    log::info!("Sleeping for {:.2} s before next run", rest.as_secs_f64());
                    thread::sleep(rest);
                }
            }
        }
        log::info!("Scan complete");
        Ok(())
    }

    fn lap(&mut self) -> Result<(), SchedulerError> {
        let batch = &mut self.batch;
        for target in self.planner.route()? {
            batch.process(target)?;
        }
        Ok(())
    }
}
