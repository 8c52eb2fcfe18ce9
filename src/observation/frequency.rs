//! Observation frequencies, either a fixed list or bands per constellation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::target::Target;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub hz: f64,
    pub band: String,
}

impl Frequency {
    pub fn new(hz: f64) -> Self {
        Self::with_band(hz, "N/A")
    }

    pub fn with_band(hz: f64, band: impl Into<String>) -> Self {
        Self {
            hz,
            band: band.into(),
        }
    }

    pub fn from_mhz(mhz: f64) -> Self {
        Self::new(mhz * 1e6)
    }

    pub fn mhz(&self) -> f64 {
        self.hz * 1e-6
    }
}

/// Band name to frequency for one navigation system. The `*0` band is the
/// configured sky frequency.
#[derive(Debug, Clone)]
pub struct BandTable {
    system: &'static str,
    bands: BTreeMap<&'static str, f64>,
}

impl BandTable {
    fn new(system: &'static str, bands: &[(&'static str, f64)]) -> Self {
        Self {
            system,
            bands: bands.iter().copied().collect(),
        }
    }

    pub fn gps(sky_hz: f64) -> Self {
        Self::new(
            "GPS",
            &[("L0", sky_hz), ("L1", 1575.42e6), ("L2", 1227.60e6), ("L5", 1176.45e6)],
        )
    }

    pub fn galileo(sky_hz: f64) -> Self {
        Self::new(
            "GALILEO",
            &[
                ("E0", sky_hz),
                ("E1", 1575.42e6),
                ("E5a", 1176.45e6),
                ("E5b", 1207.14e6),
                ("E6", 1278.75e6),
            ],
        )
    }

    pub fn beidou(sky_hz: f64) -> Self {
        Self::new(
            "BEIDOU",
            &[("E0", sky_hz), ("E2", 1561.098e6), ("E5B", 1207.14e6), ("E6", 1268.52e6)],
        )
    }

    pub fn astro(sky_hz: f64) -> Self {
        Self::new(
            "ASTRO",
            &[("A0", sky_hz), ("A1", 1550.0e6), ("A2", 1200.0e6), ("A5", 1150.0e6)],
        )
    }

    pub fn system(&self) -> &'static str {
        self.system
    }

    pub fn frequency(&self, band: &str) -> Option<Frequency> {
        self.bands.get(band).map(|&hz| Frequency::with_band(hz, band))
    }
}

/// Tables keyed by the constellation tag used in catalog names.
pub fn standard_tables(sky_hz: f64) -> BTreeMap<String, BandTable> {
    [
        ("GPS", BandTable::gps(sky_hz)),
        ("GSAT", BandTable::galileo(sky_hz)),
        ("BEIDOU", BandTable::beidou(sky_hz)),
        ("ASTRO", BandTable::astro(sky_hz)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Clone)]
pub enum FrequencyPlan {
    /// The same frequencies for every target.
    Fixed(Vec<Frequency>),
    /// Bands per constellation, resolved through the band tables.
    Bands {
        bands: BTreeMap<String, Vec<String>>,
        tables: BTreeMap<String, BandTable>,
    },
}

impl FrequencyPlan {
    pub fn fixed_mhz(mhz: &[f64]) -> Self {
        FrequencyPlan::Fixed(mhz.iter().map(|&f| Frequency::from_mhz(f)).collect())
    }

    pub fn bands(bands: BTreeMap<String, Vec<String>>, sky_hz: f64) -> Self {
        FrequencyPlan::Bands {
            bands,
            tables: standard_tables(sky_hz),
        }
    }

    /// Frequencies to observe `target` on. Bands without a known frequency
    /// are logged and skipped.
    pub fn frequencies_for(&self, target: &Target) -> Vec<Frequency> {
        match self {
            FrequencyPlan::Fixed(list) => list.clone(),
            FrequencyPlan::Bands { bands, tables } => {
                let Some(category) = target.category() else {
                    log::error!("{} has no constellation, no bands to observe", target.name());
                    return Vec::new();
                };
                let Some(wanted) = bands.get(category) else {
                    log::error!("No frequency bands configured for {}", category);
                    return Vec::new();
                };
                wanted
                    .iter()
                    .filter_map(|band| {
                        let found = tables.get(category).and_then(|t| t.frequency(band));
                        if found.is_none() {
                            log::error!(
                                "Could not get valid frequency for {} on {}. Skipping",
                                target.name(),
                                band
                            );
                        }
                        found
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::AzEl;
    use crate::target::FixedPosition;
    use std::sync::Arc;

    fn target(category: &str) -> Target {
        Target::new(
            "X",
            Some(category.to_string()),
            Arc::new(FixedPosition(AzEl::new(0.0, 45.0))),
        )
        .unwrap()
    }

    #[test]
    fn sky_band_uses_configured_frequency() {
        let gps = BandTable::gps(1420.4e6);
        assert_eq!(gps.frequency("L0"), Some(Frequency::with_band(1420.4e6, "L0")));
        assert_eq!(gps.frequency("L1").map(|f| f.hz), Some(1575.42e6));
        assert_eq!(gps.frequency("E1"), None);
    }

    #[test]
    fn bands_resolve_per_constellation() {
        let bands = [
            ("GPS".to_string(), vec!["L1".to_string(), "L9".to_string(), "L5".to_string()]),
            ("GSAT".to_string(), vec!["E5b".to_string()]),
        ]
        .into_iter()
        .collect();
        let plan = FrequencyPlan::bands(bands, 1420.4e6);

        let gps: Vec<f64> = plan.frequencies_for(&target("GPS")).iter().map(|f| f.hz).collect();
        assert_eq!(gps, vec![1575.42e6, 1176.45e6]);
        let gal = plan.frequencies_for(&target("GSAT"));
        assert_eq!(gal[0].band, "E5b");
        assert!(plan.frequencies_for(&target("COSMOS")).is_empty());
        assert!(plan.frequencies_for(&Target::fixed("Y", AzEl::zero())).is_empty());
    }

    #[test]
    fn fixed_list_ignores_target() {
        let plan = FrequencyPlan::fixed_mhz(&[1575.42, 1227.6]);
        let f = plan.frequencies_for(&target("ANY"));
        assert_eq!(f.len(), 2);
        assert!((f[1].mhz() - 1227.6).abs() < 1e-9);
        assert_eq!(f[0].band, "N/A");
    }
}
