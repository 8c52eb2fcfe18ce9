use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::angle::{angular_distance, AzEl};
use crate::target::{PositionSource, TargetError};

use super::connection::MountLink;
use super::error::MountError;
use super::limits::PointingLimits;
use super::protocol::MountCommands;

const RESET_SETTLE: Duration = Duration::from_secs(1);

/// High level control of the two-axis mount.
///
/// Holds no locks of its own; every hardware exchange goes through the
/// serialized [`MountLink`].
pub struct MountController {
    commands: MountCommands,
    limits: PointingLimits,
    stow: AzEl,
    tolerance: f64,
    reset_settle: Duration,
}

impl MountController {
    /// Reads the pointing limits from the hardware. `min_az`/`min_el` are the
    /// angles of cog 0, `tolerance` the "close enough to observe" distance in
    /// degrees.
    pub fn new(
        link: Box<dyn MountLink>,
        min_az: f64,
        min_el: f64,
        stow: AzEl,
        tolerance: f64,
    ) -> Result<Self, MountError> {
        let commands = MountCommands::new(link);
        let limits = PointingLimits::read(&commands, min_az, min_el)?;
        log::info!(
            "Mount limits: az [{:.2}, {:.2}], el [{:.2}, {:.2}], step {:.4}/{:.4} deg",
            limits.min_az(),
            limits.max_az(),
            limits.min_el(),
            limits.max_el(),
            limits.az_step(),
            limits.el_step()
        );
        Ok(Self {
            commands,
            limits,
            stow,
            tolerance,
            reset_settle: RESET_SETTLE,
        })
    }

    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    pub fn limits(&self) -> &PointingLimits {
        &self.limits
    }

    pub fn stow(&self) -> AzEl {
        self.stow
    }

    pub fn terminate(&self) -> Result<(), MountError> {
        self.commands.terminate()
    }

    pub fn set_lna(&self, on: bool) -> Result<(), MountError> {
        if self.commands.set_lna(on)? {
            log::info!("Mount: LNA is now {}", on_off(on));
        }
        Ok(())
    }

    pub fn set_noise_diode(&self, on: bool) -> Result<(), MountError> {
        if self.commands.set_noise_diode(on)? {
            log::info!("Mount: noise diode is now {}", on_off(on));
        }
        Ok(())
    }

    /// Drives the mount to its end position to re-establish the pointing
    /// reference. A hard reset first restores the controller's power-on state.
    pub fn reset(&self, hard: bool) -> Result<(), MountError> {
        if hard {
            log::info!("Mount: initializing hard reset");
            if self.commands.reset_hardware()? {
                log::info!("Mount: control hardware reset to power-on state");
                thread::sleep(self.reset_settle);
            } else {
                log::warn!("Mount: control hardware failed to reset to power-on state");
            }
        } else {
            log::info!("Mount: initializing soft reset");
        }

        if self.commands.reset_pointing()? {
            log::info!("Mount: moving to end position");
            thread::sleep(self.reset_settle);
        } else {
            log::warn!("Mount: unable to move to end position");
        }
        Ok(())
    }

    pub fn is_moving(&self) -> Result<bool, MountError> {
        self.commands.motors_running()
    }

    pub fn is_at_target(&self) -> Result<bool, MountError> {
        Ok(!self.is_moving()?)
    }

    /// The controller has lost its absolute position reference (e.g. after a
    /// power cut) and needs a reset.
    pub fn is_lost(&self) -> Result<bool, MountError> {
        Ok(!self.commands.knows_position()?)
    }

    pub fn is_reset(&self) -> Result<bool, MountError> {
        self.commands.knows_position()
    }

    /// Stops any movement by making the current pose the target.
    pub fn stop(&self) -> Result<(), MountError> {
        if self.commands.motors_running()? {
            self.commands.stop_motors()?;
        }
        Ok(())
    }

    pub fn park(&self) -> Result<(), MountError> {
        log::info!("Mount: parking at {}", self.stow);
        self.set_target(self.stow)
    }

    pub fn can_reach(&self, az: f64, el: f64) -> bool {
        if el > self.limits.max_el() || el < self.limits.min_el() {
            return false;
        }
        let az = if az > self.limits.max_az() { az - 360.0 } else { az };
        az >= self.limits.min_az()
    }

    /// Commands the mount towards `pos`, choosing between the direct and the
    /// flipped pose.
    pub fn set_target(&self, pos: AzEl) -> Result<(), MountError> {
        let (c_az, c_el) = self.current_raw()?;
        let (t_az, t_el) = self.find_closest(pos.azimuth(), pos.elevation(), c_az, c_el);
        if !self.can_reach(t_az, t_el) {
            return Err(MountError::PositionUnreachable {
                azimuth: t_az,
                elevation: t_el,
                min_el: self.limits.min_el(),
                max_el: self.limits.max_el(),
                min_az: self.limits.min_az(),
                max_az: self.limits.max_az(),
            });
        }
        self.commands.set_target_az_cog(self.limits.az_to_cog(t_az))?;
        self.commands.set_target_el_cog(self.limits.el_to_cog(t_el))?;
        Ok(())
    }

    /// Current pose, azimuth in 0..360.
    pub fn current(&self) -> Result<AzEl, MountError> {
        let (az, el) = self.current_raw()?;
        Ok(AzEl::new(az, el))
    }

    pub fn target(&self) -> Result<AzEl, MountError> {
        let az = self.limits.az_from_cog(self.commands.target_az_cog()?);
        let el = self.limits.el_from_cog(self.commands.target_el_cog()?);
        Ok(AzEl::new(az, el))
    }

    pub fn is_close_to_target(&self) -> Result<bool, MountError> {
        let dist = angular_distance(&self.current()?, &self.target()?);
        Ok(dist.to_degrees().abs() < self.tolerance)
    }

    /// Both axes within 1.5 hardware steps of the target.
    pub fn is_close_to_target_beam(&self) -> Result<bool, MountError> {
        let err = (self.current()? - self.target()?).abs();
        Ok(err.azimuth() < 1.5 * self.limits.az_step()
            && err.elevation() < 1.5 * self.limits.el_step())
    }

    /// Mechanical travel between two poses, in degrees: the larger of the two
    /// axis movements once each end has picked its best pose.
    pub fn distance(&self, from: &AzEl, to: &AzEl) -> f64 {
        let (c_az, c_el) = self.find_closest(
            from.azimuth(),
            from.elevation(),
            from.azimuth(),
            from.elevation(),
        );
        let (t_az, t_el) = self.find_closest(to.azimuth(), to.elevation(), c_az, c_el);
        self.elevation_distance(c_el, t_el)
            .max(self.azimuth_distance(c_az, t_az))
    }

    /// Azimuth travel between two angles given in 0..360, measured inside the
    /// mount's local window so that going "the other way around" is counted.
    pub fn azimuth_distance(&self, az1: f64, az2: f64) -> f64 {
        (self.to_local_az(az1) - self.to_local_az(az2)).abs()
    }

    pub fn elevation_distance(&self, el1: f64, el2: f64) -> f64 {
        (el1 - el2).abs()
    }

    fn to_local_az(&self, az: f64) -> f64 {
        if az > self.limits.max_az() {
            az - 360.0
        } else if az < self.limits.min_az() {
            az + 360.0
        } else {
            az
        }
    }

    fn current_raw(&self) -> Result<(f64, f64), MountError> {
        let az = self.limits.az_from_cog(self.commands.current_az_cog()?);
        let el = self.limits.el_from_cog(self.commands.current_el_cog()?);
        Ok(((az + 360.0) % 360.0, el))
    }

    // The slower axis dominates the move time, so poses are compared on
    // max(az travel, el travel).
    fn find_closest(&self, t_az: f64, t_el: f64, c_az: f64, c_el: f64) -> (f64, f64) {
        let (f_az, f_el) = flip(t_az, t_el);
        if !self.can_reach(f_az, f_el) {
            return (t_az, t_el);
        }
        if !self.can_reach(t_az, t_el) {
            return (f_az, f_el);
        }
        let longest_flip = self
            .azimuth_distance(c_az, f_az)
            .max(self.elevation_distance(c_el, f_el));
        let longest = self
            .azimuth_distance(c_az, t_az)
            .max(self.elevation_distance(c_el, t_el));
        if longest_flip < longest {
            (f_az, f_el)
        } else {
            (t_az, t_el)
        }
    }
}

/// The other mechanical pose that points along the same ray.
pub fn flip(az: f64, el: f64) -> (f64, f64) {
    ((az + 180.0) % 360.0, 180.0 - el)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// The mount's own pointing direction as a position source.
pub struct MountPosition(pub Arc<MountController>);

impl PositionSource for MountPosition {
    fn compute(&self) -> Result<AzEl, TargetError> {
        self.0
            .current()
            .map_err(|e| TargetError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::sim::SimulatedMount;
    use approx::assert_abs_diff_eq;

    fn controller(sim: &Arc<SimulatedMount>) -> MountController {
        MountController::new(Box::new(sim.clone()), -30.0, 5.0, AzEl::new(0.0, 85.0), 0.5)
            .unwrap()
            .with_reset_settle(Duration::ZERO)
    }

    #[test]
    fn can_reach_checks_elevation_first() {
        let sim = Arc::new(SimulatedMount::new());
        let mount = controller(&sim);
        for az in [0.0, 90.0, 180.0, 300.0, 345.0] {
            assert!(!mount.can_reach(az, 4.9));
            assert!(!mount.can_reach(az, 85.5));
            assert!(mount.can_reach(az, 45.0));
        }
    }

    #[test]
    fn flip_is_used_when_direct_pose_is_out_of_range() {
        let sim = Arc::new(SimulatedMount::new());
        sim.set_speed(0);
        let mount = controller(&sim);

        // (50, 100) cannot be commanded directly; (230, 80) can
        assert!(!mount.can_reach(50.0, 100.0));
        let (f_az, f_el) = flip(50.0, 100.0);
        assert!(mount.can_reach(f_az, f_el));
        assert_eq!(mount.find_closest(50.0, 100.0, 0.0, 45.0), (230.0, 80.0));

        mount.set_target(AzEl::new(230.0, 80.0)).unwrap();
        let target = mount.target().unwrap();
        assert_abs_diff_eq!(target.azimuth(), 230.0, epsilon = 1e-6);
        assert_abs_diff_eq!(target.elevation(), 80.0, epsilon = 1e-6);
    }

    #[test]
    fn flip_tie_break_uses_slowest_axis() {
        let sim = Arc::new(SimulatedMount::new());
        // elevation range 5..175 so both poses are reachable
        sim.set_var("maxel", 1700.0);
        let mount = controller(&sim);

        // from (100, 60): direct (5, 60) moves 95 deg in az only, flipped
        // (185, 120) moves 85 deg in az and 60 in el. The flip has the smaller
        // slowest axis even though its combined travel is larger.
        assert_eq!(mount.find_closest(5.0, 60.0, 100.0, 60.0), (185.0, 120.0));

        // from (270, 120) the flipped pose is much closer
        assert_eq!(mount.find_closest(100.0, 60.0, 270.0, 120.0), (280.0, 120.0));
        // and from (110, 60) the direct one
        assert_eq!(mount.find_closest(100.0, 60.0, 110.0, 60.0), (100.0, 60.0));
    }

    #[test]
    fn unreachable_position_reports_envelope() {
        let sim = Arc::new(SimulatedMount::new());
        let mount = controller(&sim);
        match mount.set_target(AzEl::new(10.0, 2.0)) {
            Err(MountError::PositionUnreachable {
                elevation,
                min_el,
                max_el,
                ..
            }) => {
                assert_abs_diff_eq!(elevation, 2.0, epsilon = 1e-9);
                assert_abs_diff_eq!(min_el, 5.0, epsilon = 1e-9);
                assert_abs_diff_eq!(max_el, 85.0, epsilon = 1e-9);
            }
            other => panic!("expected PositionUnreachable, got {:?}", other),
        }
    }

    #[test]
    fn azimuth_distance_uses_local_window() {
        let sim = Arc::new(SimulatedMount::new());
        let mount = controller(&sim);
        // 340 lies above max_az (330) and folds to -20
        assert_abs_diff_eq!(mount.azimuth_distance(340.0, 10.0), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mount.azimuth_distance(10.0, 340.0), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mount.azimuth_distance(320.0, 10.0), 310.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mount.azimuth_distance(123.0, 123.0), 0.0);
    }

    #[test]
    fn azimuth_distance_is_symmetric() {
        let sim = Arc::new(SimulatedMount::new());
        let mount = controller(&sim);
        let angles = [0.0, 15.0, 90.0, 179.0, 250.0, 329.0, 331.0, 359.9];
        for a in angles {
            for b in angles {
                assert_abs_diff_eq!(
                    mount.azimuth_distance(a, b),
                    mount.azimuth_distance(b, a),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn closeness_tests() {
        let sim = Arc::new(SimulatedMount::new());
        sim.set_speed(0);
        let mount = controller(&sim);
        sim.set_var("c_az", 1300.0);
        sim.set_var("c_el", 400.0);
        sim.set_var("t_az", 1301.0);
        sim.set_var("t_el", 400.0);
        assert!(mount.is_close_to_target().unwrap());
        assert!(mount.is_close_to_target_beam().unwrap());

        sim.set_var("t_az", 1302.0);
        assert!(mount.is_close_to_target().unwrap());
        assert!(!mount.is_close_to_target_beam().unwrap());

        sim.set_var("t_az", 1400.0);
        assert!(!mount.is_close_to_target().unwrap());
    }

    #[test]
    fn stop_holds_current_pose() {
        let sim = Arc::new(SimulatedMount::new());
        sim.set_speed(0);
        let mount = controller(&sim);
        mount.set_target(AzEl::new(100.0, 45.0)).unwrap();
        assert!(mount.is_moving().unwrap());
        mount.stop().unwrap();
        assert!(!mount.is_moving().unwrap());
        // idle stop sends nothing new
        let sent = sim.sent().len();
        mount.stop().unwrap();
        assert_eq!(sim.sent().len(), sent);
    }

    #[test]
    fn distance_is_max_of_axes() {
        let sim = Arc::new(SimulatedMount::new());
        let mount = controller(&sim);
        let d = mount.distance(&AzEl::new(10.0, 20.0), &AzEl::new(40.0, 70.0));
        assert_abs_diff_eq!(d, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            mount.distance(&AzEl::new(10.0, 20.0), &AzEl::new(10.0, 20.0)),
            0.0
        );
    }

    #[test]
    fn reset_restores_position_reference() {
        let sim = Arc::new(SimulatedMount::new());
        let mount = controller(&sim);
        sim.set_var("knowpos", 0.0);
        assert!(mount.is_lost().unwrap());
        mount.reset(true).unwrap();
        assert!(mount.is_reset().unwrap());
        assert_eq!(
            sim.sent(),
            vec!["RS", "HX0", "HX1", "HX2", "HX3", "XQ #INIT"]
        );
    }
}
