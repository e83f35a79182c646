//! Shared fixtures for the integration tests: a mock-backed driver and
//! synthetic calibration files.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use ppcl550::config::LaserConfig;
use ppcl550::laser::Ppcl550;
use ppcl550::mock::MockLaser;
use ppcl550::trigger::TriggerOutput;

/// Serial number the mock reports, and the calibration files are named by.
pub const SERIAL: &str = "CRTM00PB0X";

/// Connect a driver to a fresh mock link with test-friendly timings.
pub async fn connect(mock: &MockLaser, config: LaserConfig) -> Ppcl550 {
    Ppcl550::connect(mock.spawn(), config, None)
        .await
        .expect("mock connect")
}

/// Connect with a trigger output attached.
pub async fn connect_with_trigger(
    mock: &MockLaser,
    config: LaserConfig,
    trigger: Arc<dyn TriggerOutput>,
) -> Ppcl550 {
    Ppcl550::connect(mock.spawn(), config, Some(trigger))
        .await
        .expect("mock connect")
}

/// Calibration row generator: linear current/sled, strictly decreasing
/// filter columns (everywhere continuous).
fn smooth_row(freq: f64, i: usize, current0: f64, sled0: f64, f10: f64) -> String {
    format!(
        "{freq},{},{},{},{}",
        current0 + 2.0 * i as f64,
        sled0 + 0.5 * i as f64,
        f10 - 1.5 * i as f64,
        f10 - 2.0 - 1.5 * i as f64,
    )
}

fn write_table(path: &Path, current0: f64, sled0: f64, f10: f64) {
    let mut file = std::fs::File::create(path).expect("create calibration file");
    writeln!(file, "freq,current,sled,f1,f2").expect("header");
    for i in 0..9 {
        let freq = 193.30 + 0.05 * i as f64;
        writeln!(file, "{}", smooth_row(freq, i, current0, sled0, f10)).expect("row");
    }
}

/// Write the full seven-file calibration set for `SERIAL` under `dir`.
///
/// The three power maps cover 193.30 to 193.70 THz with well-behaved
/// (continuous) filter curves.
pub fn write_calibration_files(dir: &Path) {
    let params = [
        ("_700_9_15_37_4_map", 100.0, 40.0, 80.0),
        ("_1000_9_15_37_4_map", 120.0, 42.0, 79.0),
        ("_1350_9_15_37_4_map", 140.0, 44.0, 78.0),
        ("_csmap", 100.0, 40.0, 80.0),
        ("_current2", 90.0, 40.0, 80.0),
        ("_9_15_38_41_li", 10.0, 40.0, 80.0),
        ("_9_15_40_23_sled", 100.0, 40.0, 80.0),
    ];
    for (suffix, current0, sled0, f10) in params {
        write_table(&dir.join(format!("{SERIAL}{suffix}.csv")), current0, sled0, f10);
    }
}

/// Overwrite the low-power map with filter curves that fold back with no
/// continuous neighbouring branch anywhere near the middle of the band.
pub fn break_filter_curves(dir: &Path) {
    let path = dir.join(format!("{SERIAL}_700_9_15_37_4_map.csv"));
    let mut file = std::fs::File::create(path).expect("create calibration file");
    writeln!(file, "freq,current,sled,f1,f2").expect("header");
    for i in 0..9 {
        let freq = 193.30 + 0.05 * i as f64;
        // Filter columns strictly increasing: every bracket discontinuous.
        writeln!(
            file,
            "{freq},{},{},{},{}",
            100.0 + 2.0 * i as f64,
            40.0 + 0.5 * i as f64,
            60.0 + 1.5 * i as f64,
            58.0 + 1.5 * i as f64,
        )
        .expect("row");
    }
}
