use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

const EQ_TOLERANCE: f64 = 1e-10;

/// Azimuth/elevation pointing direction in degrees.
///
/// Azimuth is kept in [0, 360). Elevations outside [-90, 90] are folded back
/// over the zenith (or nadir), rotating the azimuth by 180 degrees so the pair
/// still describes the same ray.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(from = "RawAzEl", into = "RawAzEl")]
pub struct AzEl {
    azimuth: f64,
    elevation: f64,
}

#[derive(Serialize, Deserialize)]
struct RawAzEl {
    azimuth: f64,
    elevation: f64,
}

impl From<RawAzEl> for AzEl {
    fn from(raw: RawAzEl) -> Self {
        AzEl::new(raw.azimuth, raw.elevation)
    }
}

impl From<AzEl> for RawAzEl {
    fn from(pos: AzEl) -> Self {
        RawAzEl {
            azimuth: pos.azimuth,
            elevation: pos.elevation,
        }
    }
}

impl AzEl {
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        let (azimuth, elevation) = normalize_elevation(normalize_azimuth(azimuth), elevation);
        Self { azimuth, elevation }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    /// Azimuth in (-180, 180], for offsets.
    pub fn signed_azimuth(&self) -> f64 {
        if self.azimuth > 180.0 {
            self.azimuth - 360.0
        } else {
            self.azimuth
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == AzEl::zero()
    }

    /// Adds an offset to `pos`. The azimuth part of the offset is divided by
    /// `cos(elevation)` so the on-sky separation stays constant away from the
    /// horizon. At the zenith the scaling is skipped.
    pub fn with_offset(pos: AzEl, az_offset: f64, el_offset: f64) -> AzEl {
        let scale = (pos.elevation + el_offset).to_radians().cos();
        let az_offset = if scale.abs() > f64::EPSILON {
            az_offset / scale
        } else {
            az_offset
        };
        pos + AzEl::new(az_offset, el_offset)
    }

    /// Per-axis magnitude: azimuth folded into [0, 180], elevation made positive.
    pub fn abs(&self) -> AzEl {
        let az = if self.azimuth > 180.0 {
            360.0 - self.azimuth
        } else {
            self.azimuth
        };
        AzEl::new(az, self.elevation.abs())
    }
}

impl PartialEq for AzEl {
    fn eq(&self, other: &Self) -> bool {
        (self.azimuth - other.azimuth).abs() < EQ_TOLERANCE
            && (self.elevation - other.elevation).abs() < EQ_TOLERANCE
    }
}

impl Add for AzEl {
    type Output = AzEl;

    fn add(self, rhs: AzEl) -> AzEl {
        AzEl::new(self.azimuth + rhs.azimuth, self.elevation + rhs.elevation)
    }
}

impl Sub for AzEl {
    type Output = AzEl;

    fn sub(self, rhs: AzEl) -> AzEl {
        AzEl::new(self.azimuth - rhs.azimuth, self.elevation - rhs.elevation)
    }
}

impl AddAssign for AzEl {
    fn add_assign(&mut self, rhs: AzEl) {
        *self = *self + rhs;
    }
}

impl SubAssign for AzEl {
    fn sub_assign(&mut self, rhs: AzEl) {
        *self = *self - rhs;
    }
}

impl fmt::Display for AzEl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Az={:.2}, El={:.2})", self.azimuth, self.elevation)
    }
}

pub fn normalize_azimuth(azimuth: f64) -> f64 {
    let az = azimuth.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if az >= 360.0 {
        0.0
    } else {
        az
    }
}

/// Folds `elevation` into [-90, 90], returning the (possibly flipped) azimuth
/// alongside it.
pub fn normalize_elevation(azimuth: f64, elevation: f64) -> (f64, f64) {
    // bring into (-180, 180] first
    let mut el = elevation.rem_euclid(360.0);
    if el > 180.0 {
        el -= 360.0;
    }

    if el > 90.0 {
        (normalize_azimuth(azimuth + 180.0), 180.0 - el)
    } else if el < -90.0 {
        (normalize_azimuth(azimuth + 180.0), -180.0 - el)
    } else {
        (azimuth, el)
    }
}

fn unit_vector(pos: &AzEl) -> [f64; 3] {
    let az = pos.azimuth.to_radians();
    let el = pos.elevation.to_radians();
    [el.cos() * az.sin(), el.cos() * az.cos(), el.sin()]
}

/// Great-circle separation between two directions, in radians.
pub fn angular_distance(a: &AzEl, b: &AzEl) -> f64 {
    let u = unit_vector(a);
    let v = unit_vector(b);
    let dot = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
    dot.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ray(azimuth: f64, elevation: f64) -> [f64; 3] {
        let az = azimuth.to_radians();
        let el = elevation.to_radians();
        [el.cos() * az.sin(), el.cos() * az.cos(), el.sin()]
    }

    #[test]
    fn azimuth_wraps_into_range() {
        assert_abs_diff_eq!(AzEl::new(370.0, 0.0).azimuth(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(AzEl::new(-10.0, 0.0).azimuth(), 350.0, epsilon = 1e-9);
        assert_abs_diff_eq!(AzEl::new(720.0, 0.0).azimuth(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn elevation_over_zenith_flips_azimuth() {
        let pos = AzEl::new(50.0, 100.0);
        assert_abs_diff_eq!(pos.azimuth(), 230.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pos.elevation(), 80.0, epsilon = 1e-9);

        let pos = AzEl::new(10.0, -100.0);
        assert_abs_diff_eq!(pos.azimuth(), 190.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pos.elevation(), -80.0, epsilon = 1e-9);
    }

    #[test]
    fn normalized_elevation_keeps_the_same_ray() {
        let mut el = -725.0;
        while el <= 725.0 {
            for az in [0.0, 45.0, 135.5, 270.0, 359.0] {
                let pos = AzEl::new(az, el);
                assert!((-90.0..=90.0).contains(&pos.elevation()), "el {el}");
                assert!((0.0..360.0).contains(&pos.azimuth()), "az {az}");

                let intended = ray(az, el);
                let got = ray(pos.azimuth(), pos.elevation());
                for i in 0..3 {
                    assert_abs_diff_eq!(intended[i], got[i], epsilon = 1e-9);
                }
            }
            el += 7.25;
        }
    }

    #[test]
    fn arithmetic_renormalizes() {
        let sum = AzEl::new(350.0, 80.0) + AzEl::new(20.0, 20.0);
        assert_eq!(sum, AzEl::new(190.0, 80.0));

        let mut pos = AzEl::new(5.0, 10.0);
        pos -= AzEl::new(10.0, 5.0);
        assert_eq!(pos, AzEl::new(355.0, 5.0));
    }

    #[test]
    fn equality_is_tolerant() {
        assert_eq!(AzEl::new(10.0, 20.0), AzEl::new(10.0 + 1e-12, 20.0 - 1e-12));
        assert_ne!(AzEl::new(10.0, 20.0), AzEl::new(10.0 + 1e-6, 20.0));
    }

    #[test]
    fn angular_distance_basics() {
        let a = AzEl::new(123.0, 45.0);
        assert_abs_diff_eq!(angular_distance(&a, &a), 0.0, epsilon = 1e-7);

        let north = AzEl::new(0.0, 0.0);
        let east = AzEl::new(90.0, 0.0);
        assert_abs_diff_eq!(
            angular_distance(&north, &east),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );

        let zenith = AzEl::new(200.0, 90.0);
        assert_abs_diff_eq!(
            angular_distance(&north, &zenith),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn offset_is_scaled_by_elevation() {
        let pos = AzEl::with_offset(AzEl::new(100.0, 60.0), 1.0, 0.0);
        assert_abs_diff_eq!(pos.azimuth(), 102.0, epsilon = 1e-9);

        // at the zenith the azimuth offset is applied unscaled
        let pos = AzEl::with_offset(AzEl::new(100.0, 80.0), 1.0, 10.0);
        assert_abs_diff_eq!(pos.elevation(), 90.0, epsilon = 1e-9);
        assert!(pos.azimuth().is_finite());
    }

    #[test]
    fn abs_folds_axes() {
        let a = AzEl::new(350.0, -5.0).abs();
        assert_abs_diff_eq!(a.azimuth(), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a.elevation(), 5.0, epsilon = 1e-9);
    }
}
