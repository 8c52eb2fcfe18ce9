//! Where targets come from: TLE satellites, manual positions and the name
//! registry used to resolve short satellite names.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::angle::AzEl;
use crate::ephemeris::{SatelliteSource, TleEphemeris};
use crate::target::{FixedPosition, Target, TargetError};

pub const CONSTELLATIONS: [&str; 5] = ["GPS", "COSMOS", "GSAT", "BEIDOU", "ASTRO"];
pub const MANUAL: &str = "MANUAL";

/// Loads targets by category or by name.
pub trait TargetCatalog: Send + Sync {
    /// Every target of `category` at or above `el_cutoff` degrees.
    fn load_category(&self, category: &str, el_cutoff: f64) -> Result<Vec<Target>, TargetError>;

    fn load_target(&self, name: &str) -> Result<Target, TargetError>;
}

/// Full catalog names, e.g. `GPS BIIR-2  (PRN 13)`, and their abbreviations.
#[derive(Debug, Clone, Default)]
pub struct SatelliteRegistry {
    names: Vec<String>,
}

impl SatelliteRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Text inside the parentheses, or everything after the first space,
    /// without whitespace.
    pub fn abbreviation(name: &str) -> String {
        let inner = match (name.find('('), name.find(')')) {
            (Some(open), Some(close)) if open < close => &name[open + 1..close],
            _ => match name.find(' ') {
                Some(space) => &name[space + 1..],
                None => name,
            },
        };
        inner.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// A full catalog name carries a constellation tag or a parenthesised
    /// abbreviation.
    pub fn is_catalog_name(name: &str) -> bool {
        CONSTELLATIONS.iter().any(|c| name.contains(c))
            || (name.contains('(') && name.contains(')'))
    }

    pub fn constellation_of(name: &str) -> Option<&'static str> {
        CONSTELLATIONS.iter().copied().find(|c| name.contains(c))
    }

    /// First registered name whose abbreviation contains `abbrev`.
    pub fn resolve(&self, abbrev: &str) -> Result<String, TargetError> {
        let wanted: String = abbrev.chars().filter(|c| !c.is_whitespace()).collect();
        if wanted.is_empty() {
            return Err(TargetError::UnknownTarget(abbrev.to_string()));
        }
        self.names
            .iter()
            .find(|name| Self::abbreviation(name).contains(&wanted))
            .cloned()
            .ok_or_else(|| TargetError::UnknownTarget(abbrev.to_string()))
    }
}

/// Satellites from a TLE set.
pub struct TleCatalog {
    ephemeris: Arc<TleEphemeris>,
    registry: SatelliteRegistry,
}

impl TleCatalog {
    pub fn new(ephemeris: Arc<TleEphemeris>) -> Self {
        let registry = SatelliteRegistry::new(ephemeris.names());
        Self {
            ephemeris,
            registry,
        }
    }

    pub fn registry(&self) -> &SatelliteRegistry {
        &self.registry
    }

    fn satellite(&self, name: &str, category: Option<String>) -> Result<Target, TargetError> {
        let source = Arc::new(SatelliteSource::new(self.ephemeris.clone(), name));
        Target::new(name, category, source)
    }
}

impl TargetCatalog for TleCatalog {
    fn load_category(&self, category: &str, el_cutoff: f64) -> Result<Vec<Target>, TargetError> {
        let all = category.eq_ignore_ascii_case("all");
        let mut targets = Vec::new();
        for name in self.ephemeris.names() {
            if !all && !name.contains(category) {
                continue;
            }
            let tag = if all {
                SatelliteRegistry::constellation_of(name).map(str::to_string)
            } else {
                Some(category.to_string())
            };
            match self.satellite(name, tag) {
                Ok(target) if target.position().elevation() >= el_cutoff => targets.push(target),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping {}: {}", name, e),
            }
        }
        log::debug!(
            "Loaded {} {} targets above {:.1} deg",
            targets.len(),
            category,
            el_cutoff
        );
        Ok(targets)
    }

    fn load_target(&self, name: &str) -> Result<Target, TargetError> {
        let full = if SatelliteRegistry::is_catalog_name(name) {
            name.to_string()
        } else {
            self.registry.resolve(name)?
        };
        if !self.ephemeris.contains(&full) {
            return Err(TargetError::UnknownTarget(full));
        }
        let tag = SatelliteRegistry::constellation_of(&full).map(str::to_string);
        self.satellite(&full, tag)
    }
}

/// Parses `(az,el)` in degrees.
pub fn parse_manual(s: &str) -> Result<AzEl, TargetError> {
    let invalid = || TargetError::InvalidManualPosition(s.to_string());
    let inner = s
        .trim()
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let (az, el) = inner.split_once(',').ok_or_else(invalid)?;
    let az = az.trim().parse::<f64>().map_err(|_| invalid())?;
    let el = el.trim().parse::<f64>().map_err(|_| invalid())?;
    Ok(AzEl::new(az, el))
}

/// Splits `(az0,el0),(az1,el1),...` into its `(az,el)` items.
pub fn split_manual_list(s: &str) -> Result<Vec<String>, TargetError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = compact
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| TargetError::InvalidManualPosition(s.to_string()))?;
    Ok(inner.split("),(").map(|e| format!("({})", e)).collect())
}

/// Fixed positions given as `(az,el)` strings.
#[derive(Debug, Default)]
pub struct ManualCatalog {
    positions: BTreeMap<String, AzEl>,
}

impl ManualCatalog {
    pub fn new<S: AsRef<str>>(positions: &[S]) -> Result<Self, TargetError> {
        let positions = positions
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Ok((p.trim().to_string(), parse_manual(p)?))
            })
            .collect::<Result<_, TargetError>>()?;
        Ok(Self { positions })
    }
}

impl TargetCatalog for ManualCatalog {
    fn load_category(&self, category: &str, _el_cutoff: f64) -> Result<Vec<Target>, TargetError> {
        if !category.eq_ignore_ascii_case(MANUAL) {
            return Ok(Vec::new());
        }
        self.positions
            .keys()
            .map(|name| self.load_target(name))
            .collect()
    }

    fn load_target(&self, name: &str) -> Result<Target, TargetError> {
        let pos = self
            .positions
            .get(name.trim())
            .ok_or_else(|| TargetError::UnknownTarget(name.to_string()))?;
        Target::new(
            format!("{} {}", MANUAL, name.trim()),
            Some(MANUAL.to_string()),
            Arc::new(FixedPosition(*pos)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SatelliteRegistry {
        SatelliteRegistry::new([
            "GPS BIIR-2  (PRN 13)",
            "GPS BIIF-1  (PRN 25)",
            "COSMOS 2425 (716)",
            "GSAT0101 (PRN E11)",
            "BEIDOU-3 M1",
        ])
    }

    #[test]
    fn abbreviations() {
        assert_eq!(SatelliteRegistry::abbreviation("GPS BIIR-2  (PRN 13)"), "PRN13");
        assert_eq!(SatelliteRegistry::abbreviation("BEIDOU-3 M1"), "M1");
        assert_eq!(SatelliteRegistry::abbreviation("NOSPACE"), "NOSPACE");
    }

    #[test]
    fn resolves_abbreviations_ignoring_whitespace() {
        let reg = registry();
        assert_eq!(reg.resolve("PRN 25").unwrap(), "GPS BIIF-1  (PRN 25)");
        assert_eq!(reg.resolve("PRNE11").unwrap(), "GSAT0101 (PRN E11)");
        assert!(matches!(reg.resolve("PRN 99"), Err(TargetError::UnknownTarget(_))));
        assert!(reg.resolve("  ").is_err());
    }

    #[test]
    fn recognises_catalog_names() {
        assert!(SatelliteRegistry::is_catalog_name("COSMOS 2425 (716)"));
        assert!(SatelliteRegistry::is_catalog_name("SOMETHING (X)"));
        assert!(!SatelliteRegistry::is_catalog_name("PRN 13"));
        assert_eq!(SatelliteRegistry::constellation_of("GSAT0101 (PRN E11)"), Some("GSAT"));
        assert_eq!(SatelliteRegistry::constellation_of("ISS (ZARYA)"), None);
    }

    #[test]
    fn manual_positions() {
        assert_eq!(parse_manual(" (120, 45) ").unwrap(), AzEl::new(120.0, 45.0));
        assert!(parse_manual("120,45").is_err());
        assert!(parse_manual("(abc,45)").is_err());

        let items = split_manual_list("(10, 20), (30,40)").unwrap();
        assert_eq!(items, vec!["(10,20)", "(30,40)"]);
    }

    #[test]
    fn manual_catalog_only_serves_manual_category() {
        let catalog = ManualCatalog::new(&["(10,20)", "(30,40)"]).unwrap();
        assert!(catalog.load_category("GPS", 0.0).unwrap().is_empty());
        let targets = catalog.load_category("manual", 0.0).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name(), "MANUAL (10,20)");
        assert_eq!(targets[0].category(), Some("MANUAL"));
        assert!(matches!(
            catalog.load_target("(1,1)"),
            Err(TargetError::UnknownTarget(_))
        ));
    }

    #[test]
    fn tle_catalog_resolves_short_names() {
        use crate::ephemeris::{parse_entries, GroundStation, ISS_TLE};

        let entries = parse_entries(ISS_TLE, "test").unwrap();
        let eph = Arc::new(TleEphemeris::new(GroundStation::default(), entries));
        let catalog = TleCatalog::new(eph);
        assert_eq!(catalog.registry().resolve("ZARYA").unwrap(), "ISS (ZARYA)");
        assert!(catalog.load_category("GSAT", -90.0).unwrap().is_empty());
        assert!(matches!(
            catalog.load_target("PRN 13"),
            Err(TargetError::UnknownTarget(_))
        ));
    }
}
