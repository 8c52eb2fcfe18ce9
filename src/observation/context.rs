use crate::angle::AzEl;
use crate::target::Target;

use super::frequency::Frequency;

/// Which receiver measurement the terminal stage creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementKind {
    Signal,
    /// Signal plus a reference `ref_offset_hz` away, subtracted.
    Switched { ref_offset_hz: f64 },
}

/// Settings threaded through one pipeline run.
#[derive(Debug, Clone)]
pub struct ObservationContext {
    pub target: Target,
    pub frequency_hz: f64,
    pub band: String,
    pub offset: AzEl,
    pub diode_on: bool,
    pub lna_on: bool,
    pub kind: MeasurementKind,
}

impl ObservationContext {
    pub fn new(target: Target, offset: AzEl) -> Self {
        Self {
            target,
            frequency_hz: 0.0,
            band: "N/A".to_string(),
            offset,
            diode_on: false,
            lna_on: false,
            kind: MeasurementKind::Signal,
        }
    }

    pub fn set_frequency(&mut self, frequency: &Frequency) {
        self.frequency_hz = frequency.hz;
        self.band = frequency.band.clone();
    }

    pub fn frequency(&self) -> Frequency {
        Frequency::with_band(self.frequency_hz, self.band.clone())
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }
}
