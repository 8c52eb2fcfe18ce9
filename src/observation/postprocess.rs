//! Steps applied to a spectrum after each measurement.
//!
//! Decimation is lossy, so it runs after RFI removal; every output step
//! needs the final channel count and runs last.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use strum_macros::IntoStaticStr;

use super::context::ObservationContext;
use super::output::{spectrum_file_name, MeasurementSeries, ObservationRecord};
use super::{Archive, ObservationError, Spectrum};

#[derive(Clone, IntoStaticStr)]
pub enum PostStage {
    RemoveRfi,
    DecimateChannels(usize),
    ShiftToVlsr,
    /// Spectrum as text into the given directory.
    SaveSpectrum(PathBuf),
    RecordObservation(Arc<MeasurementSeries>),
    Summary,
    UploadToArchive(Arc<dyn Archive>),
}

impl PostStage {
    fn rank(&self) -> u8 {
        match self {
            PostStage::RemoveRfi => 0,
            PostStage::DecimateChannels(_) => 1,
            PostStage::ShiftToVlsr => 2,
            _ => 3,
        }
    }

    fn name(&self) -> &'static str {
        self.into()
    }

    fn apply(
        &self,
        spectrum: &mut dyn Spectrum,
        ctx: &ObservationContext,
    ) -> Result<(), ObservationError> {
        match self {
            PostStage::RemoveRfi => {
                log::info!("Removing RFI from signal...");
                spectrum.remove_rfi();
            }
            PostStage::DecimateChannels(channels) => spectrum.decimate_channels(*channels),
            PostStage::ShiftToVlsr => {
                log::info!("Translating freq/vel to LSR frame of reference.");
                spectrum.shift_to_vlsr_frame();
            }
            PostStage::SaveSpectrum(dir) => {
                let name =
                    spectrum_file_name(ctx.target_name(), spectrum.observation_frequency_hz(), Utc::now());
                spectrum.save_txt(&dir.join(name))?;
            }
            PostStage::RecordObservation(series) => {
                let pos = ctx.target.position();
                let offset = spectrum.offset();
                series.append(&ObservationRecord {
                    time: Utc::now(),
                    name: ctx.target_name().to_string(),
                    frequency_mhz: spectrum.observation_frequency_hz() * 1e-6,
                    azimuth: pos.azimuth(),
                    elevation: pos.elevation(),
                    power: spectrum.total_power(),
                    az_offset: offset.signed_azimuth(),
                    el_offset: offset.elevation(),
                    diode: spectrum.diode_on(),
                })?;
            }
            PostStage::Summary => {
                let offset = spectrum.offset();
                let pos = spectrum.position();
                log::info!(
                    "SPECTRUM INFO: Offset_el={:.3} deg, Offset_az={:.3} deg, Total power = {:e}, el={:.3}, az={:.3}",
                    offset.elevation(),
                    offset.signed_azimuth(),
                    spectrum.total_power(),
                    pos.elevation(),
                    pos.azimuth()
                );
            }
            PostStage::UploadToArchive(archive) => archive.upload(ctx.target_name(), spectrum)?,
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct PostPipeline {
    stages: Vec<PostStage>,
}

impl PostPipeline {
    pub fn builder() -> PostPipelineBuilder {
        PostPipelineBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn run(
        &self,
        spectrum: &mut dyn Spectrum,
        ctx: &ObservationContext,
    ) -> Result<(), ObservationError> {
        for stage in &self.stages {
            stage.apply(spectrum, ctx)?;
        }
        Ok(())
    }
}

/// Rejects stages added out of order.
#[derive(Default)]
pub struct PostPipelineBuilder {
    stages: Vec<PostStage>,
}

impl PostPipelineBuilder {
    pub fn then(mut self, stage: PostStage) -> Result<Self, ObservationError> {
        if let Some(last) = self.stages.last() {
            if stage.rank() < last.rank() {
                return Err(ObservationError::InvalidPipeline(format!(
                    "{} cannot follow {}",
                    stage.name(),
                    last.name()
                )));
            }
        }
        self.stages.push(stage);
        Ok(self)
    }

    pub fn build(self) -> PostPipeline {
        PostPipeline {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::AzEl;
    use crate::observation::testing::FakeSpectrum;
    use crate::target::Target;

    fn ctx() -> ObservationContext {
        ObservationContext::new(Target::fixed("T 1", AzEl::new(10.0, 20.0)), AzEl::zero())
    }

    #[test]
    fn runs_in_order() {
        let pipeline = PostPipeline::builder()
            .then(PostStage::RemoveRfi)
            .unwrap()
            .then(PostStage::DecimateChannels(4))
            .unwrap()
            .then(PostStage::ShiftToVlsr)
            .unwrap()
            .then(PostStage::Summary)
            .unwrap()
            .build();
        let mut spectrum = FakeSpectrum::new(1420.4e6, 16);
        pipeline.run(&mut spectrum, &ctx()).unwrap();
        assert_eq!(spectrum.log, vec!["rfi", "decimate 4", "vlsr"]);
        assert_eq!(spectrum.channels, 4);
    }

    #[test]
    fn rejects_decimation_before_rfi_removal() {
        let result = PostPipeline::builder()
            .then(PostStage::DecimateChannels(4))
            .unwrap()
            .then(PostStage::RemoveRfi);
        assert!(matches!(result, Err(ObservationError::InvalidPipeline(_))));

        let result = PostPipeline::builder()
            .then(PostStage::Summary)
            .unwrap()
            .then(PostStage::ShiftToVlsr);
        assert!(result.is_err());
    }

    #[test]
    fn saves_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let series = Arc::new(MeasurementSeries::create(dir.path()).unwrap());
        let pipeline = PostPipeline::builder()
            .then(PostStage::SaveSpectrum(dir.path().to_path_buf()))
            .unwrap()
            .then(PostStage::RecordObservation(series.clone()))
            .unwrap()
            .build();
        let mut spectrum = FakeSpectrum::new(1575.42e6, 8);
        pipeline.run(&mut spectrum, &ctx()).unwrap();

        let saved: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("T_1_1575.42_MHz_"))
            .collect();
        assert_eq!(saved.len(), 1);

        let text = std::fs::read_to_string(series.path()).unwrap();
        assert_eq!(text.lines().filter(|l| !l.starts_with('#')).count(), 1);
    }
}
