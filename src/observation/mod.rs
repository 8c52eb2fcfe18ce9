//! Measurement pipeline: an ordered list of stages wrapped around one
//! terminal measurement, followed by spectrum post-processing.

mod context;
mod frequency;
mod output;
mod pointing;
mod postprocess;
mod stages;

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use context::{MeasurementKind, ObservationContext};
pub use frequency::{standard_tables, BandTable, Frequency, FrequencyPlan};
pub use output::{spectrum_file_name, MeasurementSeries, ObservationRecord};
pub use pointing::PointingOnly;
pub use postprocess::{PostPipeline, PostPipelineBuilder, PostStage};
pub use stages::Stage;

use crate::angle::AzEl;
use crate::mount::{MountController, MountError};
use crate::tracker::{Tracker, TrackingError};

#[derive(Debug, Error)]
pub enum ObservationError {
    #[error("observation aborted")]
    Aborting,
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error("measurement failed: {0}")]
    Measurement(String),
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
    #[error("output error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receiver front-end switches.
pub trait Frontend: Send + Sync {
    fn set_lna(&self, on: bool) -> Result<(), MountError>;
    fn set_noise_diode(&self, on: bool) -> Result<(), MountError>;
}

impl Frontend for MountController {
    fn set_lna(&self, on: bool) -> Result<(), MountError> {
        MountController::set_lna(self, on)
    }

    fn set_noise_diode(&self, on: bool) -> Result<(), MountError> {
        MountController::set_noise_diode(self, on)
    }
}

/// What beam switching needs from the tracker.
pub trait Pointing: Send {
    fn offset(&self) -> AzEl;
    fn set_offset(&mut self, offset: AzEl);
    fn stop(&mut self) -> Result<(), TrackingError>;
    fn start(&mut self) -> Result<(), TrackingError>;
    fn reach_target(&self, timeout: Option<Duration>) -> Result<(), TrackingError>;
}

impl Pointing for Tracker {
    fn offset(&self) -> AzEl {
        Tracker::offset(self)
    }

    fn set_offset(&mut self, offset: AzEl) {
        Tracker::set_offset(self, offset)
    }

    fn stop(&mut self) -> Result<(), TrackingError> {
        Tracker::stop(self)
    }

    fn start(&mut self) -> Result<(), TrackingError> {
        Tracker::start(self)
    }

    fn reach_target(&self, timeout: Option<Duration>) -> Result<(), TrackingError> {
        Tracker::reach_target(self, timeout)
    }
}

/// A receiver measurement. The signal processing lives behind this trait.
pub trait Measurement {
    fn measure(&mut self) -> Result<(), ObservationError>;
    fn spectrum(&mut self) -> Result<Box<dyn Spectrum>, ObservationError>;
}

/// Creates the measurement the context asks for.
pub trait MeasurementFactory: Send {
    fn create(&mut self, ctx: &ObservationContext) -> Result<Box<dyn Measurement>, ObservationError>;
}

pub trait Spectrum {
    fn remove_rfi(&mut self);
    fn decimate_channels(&mut self, channels: usize);
    fn shift_to_vlsr_frame(&mut self);
    fn observation_frequency_hz(&self) -> f64;
    fn total_power(&self) -> f64;
    /// Beam offset the spectrum was taken at.
    fn offset(&self) -> AzEl;
    /// Pose of the target when the spectrum was taken.
    fn position(&self) -> AzEl;
    fn diode_on(&self) -> bool;
    fn save_txt(&self, path: &Path) -> Result<(), ObservationError>;
}

/// Long term spectrum storage.
pub trait Archive: Send + Sync {
    fn upload(&self, name: &str, spectrum: &dyn Spectrum) -> Result<(), ObservationError>;
}

/// Everything the stages act on besides the context.
pub struct Instruments<'a> {
    pub frontend: &'a dyn Frontend,
    pub pointing: &'a mut dyn Pointing,
    pub factory: &'a mut dyn MeasurementFactory,
}

/// Cancels the pipeline at its next measurement.
#[derive(Clone, Default)]
pub struct ObservationAbort(Arc<AtomicBool>);

impl ObservationAbort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Drops a request that arrived while no pipeline was running.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

pub struct ObservationPipeline {
    stages: Vec<Stage>,
    post: PostPipeline,
    abort: ObservationAbort,
}

impl ObservationPipeline {
    pub fn new(stages: Vec<Stage>, post: PostPipeline) -> Self {
        Self {
            stages,
            post,
            abort: ObservationAbort::new(),
        }
    }

    /// Shares an abort flag that outlives this pipeline.
    pub fn with_abort(mut self, abort: ObservationAbort) -> Self {
        self.abort = abort;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn abort_handle(&self) -> ObservationAbort {
        self.abort.clone()
    }

    /// Runs every stage around the measurement. Front-end switches and the
    /// context are restored on the way out whether or not a stage failed.
    pub fn execute(
        &self,
        ctx: &mut ObservationContext,
        instruments: &mut Instruments<'_>,
    ) -> Result<(), ObservationError> {
        stages::run(self, 0, ctx, instruments)
    }

    fn measure(
        &self,
        ctx: &ObservationContext,
        instruments: &mut Instruments<'_>,
    ) -> Result<(), ObservationError> {
        if self.abort.take() {
            return Err(ObservationError::Aborting);
        }
        log::info!(
            "Observing {} on {:.3} MHz (band {})...",
            ctx.target_name(),
            ctx.frequency_hz * 1e-6,
            ctx.band
        );
        let mut measurement = instruments.factory.create(ctx)?;
        measurement.measure()?;
        let mut spectrum = measurement.spectrum()?;
        self.post.run(spectrum.as_mut(), ctx)
    }
}
