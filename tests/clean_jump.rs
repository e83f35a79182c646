//! Clean-jump orchestration: staging, setpoint upload, commit pulses, and
//! the abort paths that must leave the module untouched.

mod common;

use std::sync::Arc;

use common::{break_filter_curves, connect, connect_with_trigger, write_calibration_files};
use ppcl550::config::LaserConfig;
use ppcl550::error::LaserError;
use ppcl550::mock::MockLaser;
use ppcl550::protocol::registers;
use ppcl550::trigger::RecordingTrigger;

fn config_with_calibration(dir: &std::path::Path) -> LaserConfig {
    let mut config = LaserConfig::for_tests();
    config.calibration_dir = dir.to_path_buf();
    config
}

#[tokio::test]
async fn jump_stages_setpoints_and_fires_four_commit_pulses() {
    let dir = tempfile::tempdir().unwrap();
    write_calibration_files(dir.path());
    let mock = MockLaser::new();
    let mut laser = connect(&mock, config_with_calibration(dir.path())).await;
    assert!(laser.is_calibrated());

    // Mock power setpoint is 10.00 dBm: the power-axis blend lands exactly
    // on the 10.00 dBm map.
    let outcome = laser.clean_jump(0.012).await.unwrap();
    assert!((outcome.target_frequency - 193.512).abs() < 1e-9);

    // Bracket (193.50, 193.55), t = 0.24 into the span:
    // current = 128 + 2 * 0.24 = 128.48 mA, sled = 44 + 0.5 * 0.24 = 44.12 C
    assert!((outcome.setpoint.current - 128.48).abs() < 1e-6);
    assert!((outcome.setpoint.sled - 44.12).abs() < 1e-6);

    // Staged registers: 0.1 mA and 0.01 C units.
    assert_eq!(mock.writes_to(registers::CJ_CURRENT).await, vec![1285]);
    assert_eq!(mock.writes_to(registers::CJ_SLED).await, vec![4412]);
    assert_eq!(mock.writes_to(registers::CJ_FCF1).await, vec![193]);
    let fcf2 = mock.writes_to(registers::CJ_FCF2).await;
    assert_eq!(fcf2.len(), 1);
    assert!(
        fcf2[0] == 5119 || fcf2[0] == 5120,
        "staged fractional register {} not within one step of 5120",
        fcf2[0]
    );

    assert_eq!(mock.commit_pulses().await, 4);
    assert_eq!(laser.next_frequency(), Some(outcome.target_frequency));
    // Jump runs in whisper mode with the output on.
    assert_eq!(mock.register(registers::MODE).await, 2);
    assert_eq!(mock.register(registers::RESENA).await, 8);
}

#[tokio::test]
async fn jump_without_calibration_aborts_before_any_traffic() {
    let dir = tempfile::tempdir().unwrap(); // empty: nothing to load
    let mock = MockLaser::new();
    let mut laser = connect(&mock, config_with_calibration(dir.path())).await;
    assert!(!laser.is_calibrated());

    let err = laser.clean_jump(0.01).await.unwrap_err();
    assert!(matches!(err, LaserError::MissingCalibration(_)));
    assert_eq!(mock.commit_pulses().await, 0);
    assert_eq!(mock.write_count().await, 0);
}

#[tokio::test]
async fn undefined_filter_interpolation_aborts_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    write_calibration_files(dir.path());
    break_filter_curves(dir.path());
    let mock = MockLaser::new();
    // 8.00 dBm setpoint selects the broken low-power map's tier.
    mock.set_register(registers::POWER, 800).await;
    let mut laser = connect(&mock, config_with_calibration(dir.path())).await;
    assert!(laser.is_calibrated());

    let err = laser.clean_jump(0.012).await.unwrap_err();
    assert!(matches!(err, LaserError::UndefinedInterpolation(_)));

    // The target was staged, but nothing was committed: no setpoint
    // uploads, no execute pulses, frequency registers untouched.
    assert_eq!(mock.commit_pulses().await, 0);
    assert!(mock.writes_to(registers::CJ_CURRENT).await.is_empty());
    assert!(mock.writes_to(registers::CJ_SLED).await.is_empty());
    assert_eq!(mock.register(registers::FCF1).await, 193);
    assert_eq!(mock.register(registers::FCF2).await, 5000);
}

#[tokio::test]
async fn staged_next_frequency_is_clamped_to_device_limits() {
    let dir = tempfile::tempdir().unwrap();
    write_calibration_files(dir.path());
    let mock = MockLaser::new();
    let mut laser = connect(&mock, config_with_calibration(dir.path())).await;

    let staged = laser.stage_next_frequency(250.0).await.unwrap();
    assert!((staged - 196.25).abs() < 1e-9);
    assert_eq!(laser.next_frequency(), Some(staged));
    assert_eq!(mock.writes_to(registers::CJ_FCF1).await, vec![196]);
}

#[tokio::test]
async fn jump_fires_trigger_pulse_after_commit() {
    let dir = tempfile::tempdir().unwrap();
    write_calibration_files(dir.path());
    let mock = MockLaser::new();

    let mut config = config_with_calibration(dir.path());
    config.trigger.enabled = true;
    config.trigger.idle_width = std::time::Duration::from_millis(5);

    let trigger = Arc::new(RecordingTrigger::new());
    let mut laser = connect_with_trigger(&mock, config, trigger.clone()).await;

    laser.clean_jump(0.012).await.unwrap();
    assert_eq!(trigger.voltages().await, vec![5.0, 0.0]);
}

#[tokio::test]
async fn slope_based_sled_estimate_needs_a_staged_frequency() {
    let dir = tempfile::tempdir().unwrap();
    write_calibration_files(dir.path());
    let mock = MockLaser::new();
    let mut laser = connect(&mock, config_with_calibration(dir.path())).await;

    assert!(matches!(
        laser.staged_sled_from_slope().await,
        Err(LaserError::InvalidState(_))
    ));

    laser.on().await.unwrap();
    laser.stage_next_frequency(193.5).await.unwrap();
    let sled = laser.staged_sled_from_slope().await.unwrap();
    // 193.5 sits on the grid (row 4 of the 10 dBm map): sled = 44.0, and
    // the slope term vanishes at zero frequency distance.
    assert!((sled - 44.0).abs() < 1e-9);
}
