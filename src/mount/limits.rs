use super::error::MountError;
use super::protocol::MountCommands;

/// Reachable envelope of the mount and the cog/degree conversion.
///
/// Cog 0 sits at (`min_az`, `min_el`). The azimuth window may start below
/// zero (e.g. -30..330) so that the full circle is covered without a cable
/// wrap at north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointingLimits {
    min_az_cog: i64,
    max_az_cog: i64,
    min_el_cog: i64,
    max_el_cog: i64,
    az_step: f64,
    el_step: f64,
    min_az: f64,
    max_az: f64,
    min_el: f64,
    max_el: f64,
}

impl PointingLimits {
    pub fn new(
        az_cogs: (i64, i64),
        el_cogs: (i64, i64),
        az_step: f64,
        el_step: f64,
        min_az: f64,
        min_el: f64,
    ) -> Self {
        let (min_az_cog, max_az_cog) = az_cogs;
        let (min_el_cog, max_el_cog) = el_cogs;
        Self {
            min_az_cog,
            max_az_cog,
            min_el_cog,
            max_el_cog,
            az_step,
            el_step,
            min_az,
            max_az: min_az + (max_az_cog - min_az_cog) as f64 * az_step,
            min_el,
            max_el: min_el + (max_el_cog - min_el_cog) as f64 * el_step,
        }
    }

    /// Reads the cog ranges and step sizes from the hardware.
    pub fn read(commands: &MountCommands, min_az: f64, min_el: f64) -> Result<Self, MountError> {
        let az_cogs = (commands.min_az_cog()?, commands.max_az_cog()?);
        let el_cogs = (commands.min_el_cog()?, commands.max_el_cog()?);
        let az_step = commands.az_step()?;
        let el_step = commands.el_step()?;
        Ok(Self::new(az_cogs, el_cogs, az_step, el_step, min_az, min_el))
    }

    pub fn min_az(&self) -> f64 {
        self.min_az
    }

    pub fn max_az(&self) -> f64 {
        self.max_az
    }

    pub fn min_el(&self) -> f64 {
        self.min_el
    }

    pub fn max_el(&self) -> f64 {
        self.max_el
    }

    /// Smallest azimuth step, in degrees.
    pub fn az_step(&self) -> f64 {
        self.az_step
    }

    /// Smallest elevation step, in degrees.
    pub fn el_step(&self) -> f64 {
        self.el_step
    }

    pub fn az_from_cog(&self, cog: i64) -> f64 {
        self.min_az + self.az_step * cog as f64
    }

    pub fn el_from_cog(&self, cog: i64) -> f64 {
        self.min_el + self.el_step * cog as f64
    }

    /// `az` is in 0..360 and is moved into the local window first.
    pub fn az_to_cog(&self, az: f64) -> i64 {
        let az = if az > self.max_az { az - 360.0 } else { az };
        let cog = ((az - self.min_az) / self.az_step).round() as i64;
        clamp_inside(cog, self.min_az_cog, self.max_az_cog)
    }

    pub fn el_to_cog(&self, el: f64) -> i64 {
        let cog = ((el - self.min_el) / self.el_step).round() as i64;
        clamp_inside(cog, self.min_el_cog, self.max_el_cog)
    }
}

// the end stops themselves are never commanded
fn clamp_inside(cog: i64, min: i64, max: i64) -> i64 {
    if cog <= min {
        min + 1
    } else if cog >= max {
        max - 1
    } else {
        cog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn limits() -> PointingLimits {
        PointingLimits::new((0, 3600), (0, 800), 0.1, 0.1, -30.0, 5.0)
    }

    #[test]
    fn derives_envelope() {
        let l = limits();
        assert_abs_diff_eq!(l.min_az(), -30.0);
        assert_abs_diff_eq!(l.max_az(), 330.0, epsilon = 1e-9);
        assert_abs_diff_eq!(l.min_el(), 5.0);
        assert_abs_diff_eq!(l.max_el(), 85.0, epsilon = 1e-9);
    }

    #[test]
    fn converts_both_ways() {
        let l = limits();
        assert_eq!(l.az_to_cog(0.0), 300);
        assert_eq!(l.az_to_cog(100.04), 1300);
        assert_abs_diff_eq!(l.az_from_cog(1300), 100.0, epsilon = 1e-9);
        assert_eq!(l.el_to_cog(45.0), 400);
        assert_abs_diff_eq!(l.el_from_cog(400), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn azimuth_above_window_wraps_negative() {
        let l = limits();
        // 345 deg is -15 deg in the local window
        assert_eq!(l.az_to_cog(345.0), 150);
    }

    #[test]
    fn end_stops_are_avoided() {
        let l = limits();
        assert_eq!(l.el_to_cog(5.0), 1);
        assert_eq!(l.el_to_cog(85.0), 799);
        assert_eq!(l.az_to_cog(-30.0), 1);
    }
}
