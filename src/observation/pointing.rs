//! Measurement used when no receiver is attached: it holds the pose for the
//! integration time and reports where the mount actually pointed.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::angle::AzEl;
use crate::mount::MountController;

use super::context::ObservationContext;
use super::{Measurement, MeasurementFactory, ObservationError, Spectrum};

pub struct PointingOnly {
    mount: Arc<MountController>,
    integration: Duration,
}

impl PointingOnly {
    pub fn new(mount: Arc<MountController>, integration: Duration) -> Self {
        Self { mount, integration }
    }
}

impl MeasurementFactory for PointingOnly {
    fn create(&mut self, ctx: &ObservationContext) -> Result<Box<dyn Measurement>, ObservationError> {
        Ok(Box::new(PointingMeasurement {
            mount: self.mount.clone(),
            integration: self.integration,
            result: PointingSpectrum {
                frequency_hz: ctx.frequency_hz,
                offset: ctx.offset,
                position: ctx.target.position(),
                diode: ctx.diode_on,
            },
            done: false,
        }))
    }
}

struct PointingMeasurement {
    mount: Arc<MountController>,
    integration: Duration,
    result: PointingSpectrum,
    done: bool,
}

impl Measurement for PointingMeasurement {
    fn measure(&mut self) -> Result<(), ObservationError> {
        thread::sleep(self.integration);
        self.result.position = self.mount.current()?;
        self.done = true;
        Ok(())
    }

    fn spectrum(&mut self) -> Result<Box<dyn Spectrum>, ObservationError> {
        if !self.done {
            return Err(ObservationError::Measurement(
                "spectrum requested before measuring".to_string(),
            ));
        }
        Ok(Box::new(self.result.clone()))
    }
}

/// A single channel without power.
#[derive(Debug, Clone)]
struct PointingSpectrum {
    frequency_hz: f64,
    offset: AzEl,
    position: AzEl,
    diode: bool,
}

impl Spectrum for PointingSpectrum {
    fn remove_rfi(&mut self) {}

    fn decimate_channels(&mut self, _channels: usize) {}

    fn shift_to_vlsr_frame(&mut self) {}

    fn observation_frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    fn total_power(&self) -> f64 {
        0.0
    }

    fn offset(&self) -> AzEl {
        self.offset
    }

    fn position(&self) -> AzEl {
        self.position
    }

    fn diode_on(&self) -> bool {
        self.diode
    }

    fn save_txt(&self, path: &Path) -> Result<(), ObservationError> {
        fs::write(
            path,
            format!(
                "# frequency_hz\tpower\tazimuth\televation\n{}\t{}\t{:.5}\t{:.5}\n",
                self.frequency_hz,
                self.total_power(),
                self.position.azimuth(),
                self.position.elevation()
            ),
        )?;
        Ok(())
    }
}
