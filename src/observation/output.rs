//! Per-run measurement series: a tab separated text file with a commented
//! header, mirrored as JSON lines.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

use super::ObservationError;

#[derive(Debug, Clone, Serialize)]
pub struct ObservationRecord {
    pub time: DateTime<Utc>,
    pub name: String,
    pub frequency_mhz: f64,
    pub azimuth: f64,
    pub elevation: f64,
    pub power: f64,
    pub az_offset: f64,
    pub el_offset: f64,
    pub diode: bool,
}

impl ObservationRecord {
    fn to_row(&self) -> String {
        format!(
            "{}\t{:>30}\t{:010.4}\t{:09.5}\t{:09.5}\t{:>13}\t{:09.5}\t{:09.5}\t{}",
            day_stamp(&self.time),
            self.name,
            self.frequency_mhz,
            self.azimuth,
            self.elevation,
            format!("{:.6e}", self.power),
            self.az_offset,
            self.el_offset,
            u8::from(self.diode)
        )
    }
}

/// `yyyy:ddd:sssss`, seconds counted from midnight.
fn day_stamp(t: &DateTime<Utc>) -> String {
    format!(
        "{:04}:{:03}:{:05}",
        t.year(),
        t.ordinal(),
        t.num_seconds_from_midnight()
    )
}

fn header() -> String {
    let lines = [
        "# File header. Lines beginning with # should be ignored.".to_string(),
        "# ".to_string(),
        "# Columns:".to_string(),
        "# time: yyyy:yday:dsec, e.g. 2018:032:7200 is Feb 1 2018 at 2 AM".to_string(),
        "# name: name of the observed target".to_string(),
        "# frequency: center frequency (in MHz) of the observation".to_string(),
        "# azimuth: azimuth (in degrees) of the observed target".to_string(),
        "# elevation: elevation (in degrees) of the observed target".to_string(),
        "# power: received power (in watt)".to_string(),
        "# az-offset: azimuth offset (in degrees) of the observation".to_string(),
        "# el-offset: elevation offset (in degrees) of the observation".to_string(),
        "# diode: whether or not the noise diode is turned on".to_string(),
        "# ".to_string(),
        format!(
            "# {:>12}\t{:>30}\t{:>10}\t{:>9}\t{:>9}\t{:>13}\t{:>9}\t{:>9}\t{:>5}",
            "Time", "Name", "Freq", "Azimuth", "Elevation", "Power", "Az-Offset", "El-Offset", "Diode"
        ),
        format!("# {}", "-".repeat(147)),
    ];
    lines.join("\n") + "\n"
}

pub struct MeasurementSeries {
    dir: PathBuf,
    path: PathBuf,
    json_path: PathBuf,
    write: Mutex<()>,
}

impl MeasurementSeries {
    /// Creates `<dir>/<yyyy><ddd><sssss>.txt` with its header.
    pub fn create(dir: &Path) -> Result<Self, ObservationError> {
        Self::create_at(dir, Utc::now())
    }

    pub fn create_at(dir: &Path, now: DateTime<Utc>) -> Result<Self, ObservationError> {
        fs::create_dir_all(dir)?;
        let stem = format!(
            "{:04}{:03}{:05}",
            now.year(),
            now.ordinal(),
            now.num_seconds_from_midnight()
        );
        let path = dir.join(format!("{}.txt", stem));
        let json_path = dir.join(format!("{}.jsonl", stem));
        let mut file = File::create(&path)?;
        file.write_all(header().as_bytes())?;
        File::create(&json_path)?;
        log::info!("Writing measurement series to {}", path.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            json_path,
            write: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn append(&self, record: &ObservationRecord) -> Result<(), ObservationError> {
        let _guard = self.write.lock().unwrap();
        let mut text = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(text, "{}", record.to_row())?;
        let mut json = OpenOptions::new().append(true).open(&self.json_path)?;
        writeln!(json, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}

/// File name for a saved spectrum:
/// `<name>_<MHz>_MHz_<yyyy-mm-dd>_<hh:mm:ss>.txt`, whitespace in the name
/// replaced by `_`.
pub fn spectrum_file_name(name: &str, frequency_hz: f64, at: DateTime<Utc>) -> String {
    let name = name.split_whitespace().collect::<Vec<_>>().join("_");
    format!(
        "{}_{:.2}_MHz_{}_{}.txt",
        name,
        frequency_hz * 1e-6,
        at.format("%Y-%m-%d"),
        at.format("%H:%M:%S")
    )
}
