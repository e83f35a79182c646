//! Calibration table loading.
//!
//! Each laser module ships with a set of per-serial-number calibration files
//! mapping optical frequency to drive current, sled temperature, and the two
//! etalon filter temperatures, measured at three output powers. The files
//! are CSV with at least the columns `freq, current, sled, f1, f2`; rows are
//! ordered by ascending frequency.
//!
//! A set is loaded once at connect time and is immutable afterwards. Missing
//! files do not fail the load: the files that are present still load, and
//! the set is marked incomplete so that clean-jump operations can refuse to
//! run while everything else stays available.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{LaserError, Result};

/// One calibration row: setpoints measured at a grid frequency.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalRow {
    /// Optical frequency, THz.
    pub freq: f64,
    /// Drive current, mA.
    pub current: f64,
    /// Sled temperature, degC.
    pub sled: f64,
    /// First filter temperature, degC.
    pub f1: f64,
    /// Second filter temperature, degC.
    pub f2: f64,
}

/// The seven calibration tables a module owns, named by file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Frequency map measured at 7.00 dBm.
    Map700,
    /// Frequency map measured at 10.00 dBm.
    Map1000,
    /// Frequency map measured at 13.50 dBm.
    Map1350,
    /// Fine map for the clean-sweep mode.
    SweepMap,
    /// Second drive-current map.
    Current2,
    /// Light-current characterization.
    LightCurrent,
    /// Sled temperature characterization.
    Sled,
}

impl TableKind {
    /// Every table kind, in the vendor's file order.
    pub const ALL: [TableKind; 7] = [
        TableKind::Map700,
        TableKind::Map1000,
        TableKind::Map1350,
        TableKind::SweepMap,
        TableKind::Current2,
        TableKind::LightCurrent,
        TableKind::Sled,
    ];

    /// File-name suffix appended to the device serial number.
    pub fn suffix(self) -> &'static str {
        match self {
            TableKind::Map700 => "_700_9_15_37_4_map",
            TableKind::Map1000 => "_1000_9_15_37_4_map",
            TableKind::Map1350 => "_1350_9_15_37_4_map",
            TableKind::SweepMap => "_csmap",
            TableKind::Current2 => "_current2",
            TableKind::LightCurrent => "_9_15_38_41_li",
            TableKind::Sled => "_9_15_40_23_sled",
        }
    }

    /// File name for a given device serial number.
    pub fn file_name(self, serial_number: &str) -> String {
        format!("{serial_number}{}.csv", self.suffix())
    }
}

/// An immutable, frequency-ordered calibration table.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    rows: Vec<CalRow>,
}

impl CalibrationTable {
    /// Build a table from rows, validating strictly ascending frequency.
    ///
    /// Duplicate frequencies are rejected here so the interpolator can never
    /// be handed a zero-width bracket from a loaded file.
    pub fn from_rows(rows: Vec<CalRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(LaserError::InvalidCalibration(
                "calibration table has no rows".into(),
            ));
        }
        for pair in rows.windows(2) {
            if pair[1].freq <= pair[0].freq {
                return Err(LaserError::InvalidCalibration(format!(
                    "frequency column not strictly ascending at {} THz",
                    pair[1].freq
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Parse a CSV calibration file.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<CalRow>, _>>()?;
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[CalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The calibration tables belonging to one device serial number.
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    serial_number: String,
    tables: HashMap<TableKind, CalibrationTable>,
}

impl CalibrationSet {
    /// Load every table found under `base_path` for this serial number.
    ///
    /// Absent files are logged and skipped; files that exist but fail to
    /// parse are errors, since silently dropping a corrupt table would let a
    /// jump run on stale assumptions.
    pub fn load(serial_number: &str, base_path: &Path) -> Result<Self> {
        let mut tables = HashMap::new();
        for kind in TableKind::ALL {
            let path: PathBuf = base_path.join(kind.file_name(serial_number));
            if !path.exists() {
                warn!(file = %path.display(), "calibration file not found");
                continue;
            }
            let table = CalibrationTable::from_csv_path(&path).map_err(|e| match e {
                LaserError::InvalidCalibration(msg) => LaserError::InvalidCalibration(format!(
                    "{}: {msg}",
                    path.display()
                )),
                other => other,
            })?;
            info!(file = %path.display(), rows = table.len(), "loaded calibration table");
            tables.insert(kind, table);
        }

        Ok(Self {
            serial_number: serial_number.to_string(),
            tables,
        })
    }

    /// Build a set directly from tables (tests and synthetic data).
    pub fn from_tables(
        serial_number: impl Into<String>,
        tables: HashMap<TableKind, CalibrationTable>,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            tables,
        }
    }

    /// All seven tables were found at load time.
    pub fn is_complete(&self) -> bool {
        TableKind::ALL.iter().all(|k| self.tables.contains_key(k))
    }

    /// Table kinds that were not found at load time.
    pub fn missing(&self) -> Vec<TableKind> {
        TableKind::ALL
            .iter()
            .copied()
            .filter(|k| !self.tables.contains_key(k))
            .collect()
    }

    pub fn get(&self, kind: TableKind) -> Option<&CalibrationTable> {
        self.tables.get(&kind)
    }

    /// Fetch a table, failing with `MissingCalibration` if absent.
    pub fn require(&self, kind: TableKind) -> Result<&CalibrationTable> {
        self.tables.get(&kind).ok_or_else(|| {
            LaserError::MissingCalibration(kind.file_name(&self.serial_number))
        })
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}
