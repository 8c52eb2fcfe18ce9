//! Satellite look angles from TLE sets, computed with SGP4.

mod error;
mod station;
mod tle;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use error::EphemerisError;
pub use station::GroundStation;
pub use tle::{load_dir, parse_entries, TleEntry};
#[cfg(test)]
pub(crate) use tle::ISS_TLE;

use crate::angle::AzEl;
use crate::target::{PositionSource, TargetError};

/// TLE sets for a fixed observer, keyed by satellite name.
pub struct TleEphemeris {
    station: GroundStation,
    entries: BTreeMap<String, TleEntry>,
}

impl TleEphemeris {
    pub fn new(station: GroundStation, entries: Vec<TleEntry>) -> Self {
        let entries = entries.into_iter().map(|e| (e.name.clone(), e)).collect();
        Self { station, entries }
    }

    pub fn from_dir(station: GroundStation, dir: &Path) -> Result<Self, EphemerisError> {
        Ok(Self::new(station, load_dir(dir)?))
    }

    pub fn station(&self) -> &GroundStation {
        &self.station
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn look_angles(&self, name: &str, at: DateTime<Utc>) -> Result<AzEl, EphemerisError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EphemerisError::UnknownSatellite(name.to_string()))?;

        let minutes = entry
            .elements
            .datetime_to_minutes_since_epoch(&at.naive_utc())
            .map_err(|e| EphemerisError::Propagation(e.to_string()))?;
        let prediction = entry
            .constants
            .propagate(minutes)
            .map_err(|e| EphemerisError::Propagation(e.to_string()))?;

        let sidereal =
            sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&at.naive_utc()));
        let sat = teme_to_ecef(prediction.position, sidereal);
        let sta = self.station.position_ecef_km();
        let dr = [sat[0] - sta[0], sat[1] - sta[1], sat[2] - sta[2]];
        let range_km = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();

        let (east, north, up) = self.station.enu(dr);
        let azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);
        let elevation = if range_km > 0.0 {
            (up / range_km).asin().to_degrees()
        } else {
            0.0
        };
        Ok(AzEl::new(azimuth, elevation))
    }
}

fn teme_to_ecef(pos: [f64; 3], gmst: f64) -> [f64; 3] {
    let (sin_gmst, cos_gmst) = gmst.sin_cos();
    [
        pos[0] * cos_gmst + pos[1] * sin_gmst,
        -pos[0] * sin_gmst + pos[1] * cos_gmst,
        pos[2],
    ]
}

/// A satellite's position, evaluated at the time of each call.
pub struct SatelliteSource {
    ephemeris: Arc<TleEphemeris>,
    name: String,
}

impl SatelliteSource {
    pub fn new(ephemeris: Arc<TleEphemeris>, name: impl Into<String>) -> Self {
        Self {
            ephemeris,
            name: name.into(),
        }
    }
}

impl PositionSource for SatelliteSource {
    fn compute(&self) -> Result<AzEl, TargetError> {
        self.ephemeris
            .look_angles(&self.name, Utc::now())
            .map_err(|e| TargetError::Ephemeris(e.to_string()))
    }
}
