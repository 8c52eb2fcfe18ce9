use std::fs;
use std::path::Path;

use sgp4::{Constants, Elements};

use super::error::EphemerisError;

pub struct TleEntry {
    pub name: String,
    pub elements: Elements,
    pub constants: Constants,
}

/// Loads every `.tle`/`.txt` file in `dir`. Files that fail to parse are
/// skipped with a warning.
pub fn load_dir(dir: &Path) -> Result<Vec<TleEntry>, EphemerisError> {
    if !dir.exists() {
        return Err(EphemerisError::DirectoryNotFound(dir.display().to_string()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tle = path
            .extension()
            .map(|ext| ext == "tle" || ext == "txt")
            .unwrap_or(false);
        if !path.is_file() || !is_tle {
            continue;
        }
        match load_file(&path) {
            Ok(mut parsed) => entries.append(&mut parsed),
            Err(e) => log::warn!("Failed to parse TLE file {}: {}", path.display(), e),
        }
    }
    log::info!("Loaded {} TLE entries from {}", entries.len(), dir.display());
    Ok(entries)
}

pub fn load_file(path: &Path) -> Result<Vec<TleEntry>, EphemerisError> {
    let content = fs::read_to_string(path)?;
    let filename = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    parse_entries(&content, &filename)
}

pub fn parse_entries(content: &str, source: &str) -> Result<Vec<TleEntry>, EphemerisError> {
    let invalid = |e: &dyn std::fmt::Display| EphemerisError::InvalidTle {
        file: source.to_string(),
        message: e.to_string(),
    };

    split_sets(content)
        .into_iter()
        .map(|set| {
            let name = set.name.map(str::to_string);
            let elements =
                Elements::from_tle(name.clone(), set.line1.as_bytes(), set.line2.as_bytes())
                    .map_err(|e| invalid(&e))?;
            let constants = Constants::from_elements(&elements).map_err(|e| invalid(&e))?;
            let name = name.unwrap_or_else(|| format!("NORAD {}", elements.norad_id));
            Ok(TleEntry {
                name,
                elements,
                constants,
            })
        })
        .collect()
}

struct TleSet<'a> {
    name: Option<&'a str>,
    line1: &'a str,
    line2: &'a str,
}

fn is_element_line(line: &str, number: char) -> bool {
    let mut chars = line.chars();
    chars.next() == Some(number) && chars.next() == Some(' ')
}

/// Element sets with or without a title line. A CelesTrak `0 ` title prefix
/// is dropped; lines outside a set are ignored.
fn split_sets(content: &str) -> Vec<TleSet<'_>> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut sets = Vec::new();
    let mut rest = lines.as_slice();
    while !rest.is_empty() {
        match rest {
            &[l1, l2, ..] if is_element_line(l1, '1') && is_element_line(l2, '2') => {
                sets.push(TleSet {
                    name: None,
                    line1: l1,
                    line2: l2,
                });
                rest = &rest[2..];
            }
            &[title, l1, l2, ..] if is_element_line(l1, '1') && is_element_line(l2, '2') => {
                let title = title.strip_prefix("0 ").unwrap_or(title).trim();
                sets.push(TleSet {
                    name: Some(title),
                    line1: l1,
                    line2: l2,
                });
                rest = &rest[3..];
            }
            _ => rest = &rest[1..],
        }
    }
    sets
}

#[cfg(test)]
pub(crate) const ISS_TLE: &str = "ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537
";
