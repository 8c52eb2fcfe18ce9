use std::time::Duration;

use strum_macros::IntoStaticStr;

use crate::angle::AzEl;

use super::context::{MeasurementKind, ObservationContext};
use super::frequency::Frequency;
use super::{Instruments, ObservationError, ObservationPipeline, Pointing};

/// One step of an [`ObservationPipeline`]. Every stage runs the rest of the
/// pipeline one or more times; the last stage hands over to the measurement.
#[derive(Debug, Clone, IntoStaticStr)]
pub enum Stage {
    SingleFrequency(Frequency),
    /// The rest of the pipeline once per frequency.
    MultipleFrequency(Vec<Frequency>),
    /// Once at the current frequency, once `offset_hz` above it.
    FrequencySwitching(f64),
    Repeating(usize),
    Lna,
    Diode,
    /// Once with the noise diode on, once with it off.
    DiodeSwitching,
    /// Once at the current beam offset, once at `offset`, then back.
    BeamSwitching {
        offset: AzEl,
        timeout: Option<Duration>,
    },
    Signal,
    Switched(f64),
}

pub(super) fn run(
    pipeline: &ObservationPipeline,
    index: usize,
    ctx: &mut ObservationContext,
    inst: &mut Instruments<'_>,
) -> Result<(), ObservationError> {
    let Some(stage) = pipeline.stages.get(index) else {
        return pipeline.measure(ctx, inst);
    };
    let next = index + 1;

    match stage {
        Stage::SingleFrequency(frequency) => {
            ctx.set_frequency(frequency);
            run(pipeline, next, ctx, inst)
        }
        Stage::MultipleFrequency(frequencies) => {
            for frequency in frequencies {
                ctx.set_frequency(frequency);
                run(pipeline, next, ctx, inst)?;
            }
            Ok(())
        }
        Stage::FrequencySwitching(offset_hz) => {
            let original = ctx.frequency();
            let result = run(pipeline, next, ctx, inst).and_then(|_| {
                ctx.set_frequency(&Frequency::with_band(original.hz + offset_hz, "Switched"));
                run(pipeline, next, ctx, inst)
            });
            ctx.set_frequency(&original);
            result
        }
        Stage::Repeating(times) => {
            for _ in 0..*times {
                run(pipeline, next, ctx, inst)?;
            }
            Ok(())
        }
        // a failed switch-on may still have set the bit, so the off
        // command is sent regardless
        Stage::Lna => {
            let result = lna_pass(pipeline, next, ctx, inst);
            ctx.lna_on = false;
            restored(result, inst.frontend.set_lna(false).map_err(Into::into))
        }
        Stage::Diode => {
            let result = diode_pass(pipeline, next, ctx, inst);
            ctx.diode_on = false;
            restored(result, inst.frontend.set_noise_diode(false).map_err(Into::into))
        }
        Stage::DiodeSwitching => {
            let result = diode_pass(pipeline, next, ctx, inst);
            ctx.diode_on = false;
            restored(result, inst.frontend.set_noise_diode(false).map_err(Into::into))?;
            run(pipeline, next, ctx, inst)
        }
        Stage::BeamSwitching { offset, timeout } => {
            run(pipeline, next, ctx, inst)?;

            let original = inst.pointing.offset();
            let ctx_offset = ctx.offset;
            let result = move_beam(inst.pointing, *offset, *timeout).and_then(|_| {
                ctx.offset = *offset;
                run(pipeline, next, ctx, inst)
            });
            ctx.offset = ctx_offset;

            match result {
                Ok(()) => move_beam(inst.pointing, original, *timeout),
                Err(e) => {
                    // put the offset back without waiting for the mount
                    let reset = inst.pointing.stop().and_then(|_| {
                        inst.pointing.set_offset(original);
                        inst.pointing.start()
                    });
                    if let Err(r) = reset {
                        log::warn!("Could not restore beam offset {}: {}", original, r);
                    }
                    Err(e)
                }
            }
        }
        Stage::Signal => {
            ctx.kind = MeasurementKind::Signal;
            run(pipeline, next, ctx, inst)
        }
        Stage::Switched(ref_offset_hz) => {
            ctx.kind = MeasurementKind::Switched {
                ref_offset_hz: *ref_offset_hz,
            };
            run(pipeline, next, ctx, inst)
        }
    }
}

fn lna_pass(
    pipeline: &ObservationPipeline,
    next: usize,
    ctx: &mut ObservationContext,
    inst: &mut Instruments<'_>,
) -> Result<(), ObservationError> {
    inst.frontend.set_lna(true)?;
    ctx.lna_on = true;
    run(pipeline, next, ctx, inst)
}

fn diode_pass(
    pipeline: &ObservationPipeline,
    next: usize,
    ctx: &mut ObservationContext,
    inst: &mut Instruments<'_>,
) -> Result<(), ObservationError> {
    inst.frontend.set_noise_diode(true)?;
    ctx.diode_on = true;
    run(pipeline, next, ctx, inst)
}

fn move_beam(
    pointing: &mut dyn Pointing,
    offset: AzEl,
    timeout: Option<Duration>,
) -> Result<(), ObservationError> {
    log::info!("Moving beam to offset {}", offset);
    pointing.stop()?;
    pointing.set_offset(offset);
    pointing.start()?;
    pointing.reach_target(timeout)?;
    Ok(())
}

/// The stage's own error wins over a failed restore.
fn restored(
    result: Result<(), ObservationError>,
    restore: Result<(), ObservationError>,
) -> Result<(), ObservationError> {
    match (result, restore) {
        (Err(e), Err(r)) => {
            log::warn!("Restoring front-end state failed: {}", r);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), restore) => restore,
    }
}
