//! Setpoint interpolation over the calibration tables.
//!
//! Everything here is a pure function over immutable tables: no device I/O,
//! fully unit-testable. The clean-jump controller feeds the results straight
//! into the staging registers.
//!
//! The overall shape, for a target frequency and output power:
//!
//! 1. Pick the two maps bracketing the power by tier: [min, 10] dBm uses the
//!    7.00/10.00 dBm maps, (10, max] uses the 10.00/13.50 dBm maps. A power
//!    outside both tiers extrapolates with the nearest tier's pair.
//! 2. Within each map, bracket the frequency by nearest-index search and
//!    interpolate current and sled temperature linearly.
//! 3. Filter temperatures go through a continuity test first. The tuning
//!    curves for the etalon filters fold back periodically; across a fold
//!    the tabulated values jump and a straight interpolation would land
//!    between two thermal branches. In that case both neighbouring branches
//!    are extended to the target and the candidate closest to 69 degC wins.
//!    That reference temperature reproduces the module's own behaviour of
//!    snapping to the nearest valid tuning branch; treat it as a device
//!    constant, not a tunable.
//! 4. Blend the two per-map results linearly along the power axis.

use crate::calibration::store::{CalRow, CalibrationSet, CalibrationTable, TableKind};
use crate::error::{LaserError, Result};

/// Reference temperature used to choose between thermal tuning branches.
pub const FILTER_REFERENCE_TEMP: f64 = 69.0;

/// Power boundary between the two calibration tiers, dBm.
pub const POWER_TIER_EDGE: f64 = 10.0;

/// Frequency bracket around a target: either an exact grid hit or a pair of
/// adjacent rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    /// The target frequency sits exactly on a calibration row. Flagged so
    /// callers take the row's values directly instead of interpolating
    /// against a zero-width span.
    Exact(usize),
    /// Adjacent rows with `rows[lower].freq < f < rows[upper].freq`, except
    /// at the table edges where the pair extrapolates outward.
    Pair { lower: usize, upper: usize },
}

/// Interpolated setpoints from a single calibration table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSetpoint {
    pub current: f64,
    pub sled: f64,
    pub filter1: f64,
    pub filter2: f64,
}

/// Final device setpoints for a staged jump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    /// Drive current, mA.
    pub current: f64,
    /// Sled temperature, degC.
    pub sled: f64,
    /// First filter temperature, degC.
    pub filter1: f64,
    /// Second filter temperature, degC.
    pub filter2: f64,
}

/// Two-point linear interpolation.
///
/// A zero-width span is a precondition violation: it means the calibration
/// data is degenerate, and failing fast beats dividing by zero.
pub fn lerp(x1: f64, x2: f64, y1: f64, y2: f64, x: f64) -> Result<f64> {
    if x1 == x2 {
        return Err(LaserError::InvalidCalibration(format!(
            "zero-width interpolation bracket at x = {x1}"
        )));
    }
    Ok(y1 + (x - x1) * (y2 - y1) / (x2 - x1))
}

/// Index of the row whose frequency is closest to `f` (first on ties).
pub fn nearest_index(rows: &[CalRow], f: f64) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (i, row) in rows.iter().enumerate() {
        let dist = (row.freq - f).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Bracket `f` between adjacent rows.
///
/// The nearest row is found first; the neighbour is chosen on the side given
/// by the sign of `rows[nearest].freq - f`. An exact grid match is returned
/// as [`Bracket::Exact`]. A target beyond either end of the table falls back
/// to the edge pair, which extrapolates.
pub fn bracket(table: &CalibrationTable, f: f64) -> Result<Bracket> {
    let rows = table.rows();
    if rows.len() < 2 {
        return Err(LaserError::InvalidCalibration(format!(
            "need at least two rows to bracket {f} THz"
        )));
    }

    let idx = nearest_index(rows, f);
    let nearest = rows[idx].freq;
    if nearest == f {
        return Ok(Bracket::Exact(idx));
    }

    let (lower, upper) = if nearest > f {
        if idx == 0 {
            (0, 1)
        } else {
            (idx - 1, idx)
        }
    } else if idx == rows.len() - 1 {
        (rows.len() - 2, rows.len() - 1)
    } else {
        (idx, idx + 1)
    };
    Ok(Bracket::Pair { lower, upper })
}

/// Filter curves are continuous across `[i, j]` iff both strictly decrease.
fn filters_continuous(rows: &[CalRow], i: usize, j: usize) -> bool {
    rows[j].f1 < rows[i].f1 && rows[j].f2 < rows[i].f2
}

fn interp_field(
    rows: &[CalRow],
    i: usize,
    j: usize,
    f: f64,
    field: impl Fn(&CalRow) -> f64,
) -> Result<f64> {
    lerp(rows[i].freq, rows[j].freq, field(&rows[i]), field(&rows[j]), f)
}

/// Of the two candidate branch values, keep the one nearest the reference
/// temperature (first on ties).
fn nearest_branch(candidates: [f64; 2]) -> f64 {
    let d0 = (candidates[0] - FILTER_REFERENCE_TEMP).abs();
    let d1 = (candidates[1] - FILTER_REFERENCE_TEMP).abs();
    if d1 < d0 {
        candidates[1]
    } else {
        candidates[0]
    }
}

/// Filter temperatures at `f` for one table, handling curve folds.
fn filters_at(table: &CalibrationTable, bracket: Bracket, f: f64) -> Result<(f64, f64)> {
    let rows = table.rows();
    let (lower, upper) = match bracket {
        Bracket::Exact(i) => return Ok((rows[i].f1, rows[i].f2)),
        Bracket::Pair { lower, upper } => (lower, upper),
    };

    if filters_continuous(rows, lower, upper) {
        let f1 = interp_field(rows, lower, upper, f, |r| r.f1)?;
        let f2 = interp_field(rows, lower, upper, f, |r| r.f2)?;
        return Ok((f1, f2));
    }

    // Discontinuous: extend the branch below the lower row and the branch
    // above the upper row to the target, then snap to the one nearest the
    // reference temperature. Both sub-brackets must themselves be continuous
    // (and exist), otherwise there is no defined branch to pick.
    let sub_below_ok = lower > 0 && filters_continuous(rows, lower - 1, lower);
    let sub_above_ok = upper + 1 < rows.len() && filters_continuous(rows, upper, upper + 1);
    if !(sub_below_ok && sub_above_ok) {
        return Err(LaserError::UndefinedInterpolation(format!(
            "filter curves discontinuous around {f} THz with no continuous neighbouring branch"
        )));
    }

    let f1_candidates = [
        interp_field(rows, lower - 1, lower, f, |r| r.f1)?,
        interp_field(rows, upper, upper + 1, f, |r| r.f1)?,
    ];
    let f2_candidates = [
        interp_field(rows, lower - 1, lower, f, |r| r.f2)?,
        interp_field(rows, upper, upper + 1, f, |r| r.f2)?,
    ];
    Ok((nearest_branch(f1_candidates), nearest_branch(f2_candidates)))
}

/// Interpolate all four setpoint channels of one table at `f`.
pub fn table_setpoint(table: &CalibrationTable, f: f64) -> Result<TableSetpoint> {
    let rows = table.rows();
    let br = bracket(table, f)?;

    let (current, sled) = match br {
        Bracket::Exact(i) => (rows[i].current, rows[i].sled),
        Bracket::Pair { lower, upper } => (
            interp_field(rows, lower, upper, f, |r| r.current)?,
            interp_field(rows, lower, upper, f, |r| r.sled)?,
        ),
    };
    let (filter1, filter2) = filters_at(table, br, f)?;

    Ok(TableSetpoint {
        current,
        sled,
        filter1,
        filter2,
    })
}

/// The power tier bracketing `power_dbm`: table pair plus the tier's power
/// endpoints. Outside both tiers the nearest tier is used, so the final
/// power-axis blend extrapolates.
pub fn power_tier(
    power_dbm: f64,
    power_min: f64,
    power_max: f64,
) -> ((TableKind, TableKind), (f64, f64)) {
    if power_dbm <= POWER_TIER_EDGE {
        ((TableKind::Map700, TableKind::Map1000), (power_min, POWER_TIER_EDGE))
    } else {
        ((TableKind::Map1000, TableKind::Map1350), (POWER_TIER_EDGE, power_max))
    }
}

/// Full two-axis setpoint computation.
///
/// `power_min`/`power_max` are the device's power limits; they anchor the
/// power axis of the blend.
pub fn setpoint(
    calibration: &CalibrationSet,
    f: f64,
    power_dbm: f64,
    power_min: f64,
    power_max: f64,
) -> Result<Setpoint> {
    let ((low_kind, high_kind), (pw_low, pw_high)) = power_tier(power_dbm, power_min, power_max);
    let low = table_setpoint(calibration.require(low_kind)?, f)?;
    let high = table_setpoint(calibration.require(high_kind)?, f)?;

    Ok(Setpoint {
        current: lerp(pw_low, pw_high, low.current, high.current, power_dbm)?,
        sled: lerp(pw_low, pw_high, low.sled, high.sled, power_dbm)?,
        filter1: lerp(pw_low, pw_high, low.filter1, high.filter1, power_dbm)?,
        filter2: lerp(pw_low, pw_high, low.filter2, high.filter2, power_dbm)?,
    })
}

/// Sled temperature from the module-reported tuning slope.
///
/// Alternative estimate used for cross-checking the interpolated value: take
/// the single nearest row per map and extend it with the device's sled
/// tuning slope (degC per GHz), then blend across the power axis as usual.
pub fn sled_from_slope(
    calibration: &CalibrationSet,
    f: f64,
    power_dbm: f64,
    power_min: f64,
    power_max: f64,
    slope_c_per_ghz: f64,
) -> Result<f64> {
    let ((low_kind, high_kind), (pw_low, pw_high)) = power_tier(power_dbm, power_min, power_max);

    let estimate = |table: &CalibrationTable| -> f64 {
        let rows = table.rows();
        let idx = nearest_index(rows, f);
        rows[idx].sled + slope_c_per_ghz * (f - rows[idx].freq) * 1000.0
    };

    let low = estimate(calibration.require(low_kind)?);
    let high = estimate(calibration.require(high_kind)?);
    lerp(pw_low, pw_high, low, high, power_dbm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table(rows: &[(f64, f64, f64, f64, f64)]) -> CalibrationTable {
        CalibrationTable::from_rows(
            rows.iter()
                .map(|&(freq, current, sled, f1, f2)| CalRow {
                    freq,
                    current,
                    sled,
                    f1,
                    f2,
                })
                .collect(),
        )
        .unwrap()
    }

    /// Continuous filter columns: everything strictly decreasing.
    fn smooth_table() -> CalibrationTable {
        table(&[
            (1540.0, 10.0, 40.0, 74.0, 72.0),
            (1545.0, 12.0, 41.0, 72.0, 70.0),
            (1550.0, 15.0, 43.0, 70.0, 68.0),
        ])
    }

    #[test]
    fn lerp_matches_hand_computation() {
        assert_eq!(lerp(0.0, 10.0, 0.0, 5.0, 4.0).unwrap(), 2.0);
        assert_eq!(lerp(1.0, 3.0, 10.0, 20.0, 2.0).unwrap(), 15.0);
    }

    #[test]
    fn lerp_zero_width_bracket_fails_fast() {
        let err = lerp(191.5, 191.5, 10.0, 20.0, 191.5).unwrap_err();
        assert!(matches!(err, LaserError::InvalidCalibration(_)));
    }

    #[test]
    fn lerp_extrapolates_outside_bracket() {
        assert_eq!(lerp(0.0, 1.0, 0.0, 2.0, 2.0).unwrap(), 4.0);
    }

    #[test]
    fn nearest_index_prefers_first_on_tie() {
        let t = smooth_table();
        // 1542.5 is equidistant from 1540 and 1545.
        assert_eq!(nearest_index(t.rows(), 1542.5), 0);
        assert_eq!(nearest_index(t.rows(), 1549.0), 2);
    }

    #[test]
    fn bracket_picks_neighbour_by_sign() {
        let t = smooth_table();
        // 1544 is nearest to 1545 which lies above: pair is (1540, 1545).
        assert_eq!(
            bracket(&t, 1544.0).unwrap(),
            Bracket::Pair { lower: 0, upper: 1 }
        );
        // 1546 is nearest to 1545 which lies below: pair is (1545, 1550).
        assert_eq!(
            bracket(&t, 1546.0).unwrap(),
            Bracket::Pair { lower: 1, upper: 2 }
        );
    }

    #[test]
    fn bracket_flags_exact_grid_match() {
        let t = smooth_table();
        assert_eq!(bracket(&t, 1545.0).unwrap(), Bracket::Exact(1));
        // And the setpoint comes straight from the row.
        let sp = table_setpoint(&t, 1545.0).unwrap();
        assert_eq!(sp.current, 12.0);
        assert_eq!(sp.sled, 41.0);
        assert_eq!(sp.filter1, 72.0);
    }

    #[test]
    fn bracket_outside_table_uses_edge_pair() {
        let t = smooth_table();
        assert_eq!(
            bracket(&t, 1530.0).unwrap(),
            Bracket::Pair { lower: 0, upper: 1 }
        );
        assert_eq!(
            bracket(&t, 1560.0).unwrap(),
            Bracket::Pair { lower: 1, upper: 2 }
        );
    }

    #[test]
    fn worked_example_current_and_sled() {
        // current = 10 + (1542-1540)/(1545-1540) * (12-10) = 10.8
        // sled    = 40 + (2/5) * (41-40)                   = 40.4
        let sp = table_setpoint(&smooth_table(), 1542.0).unwrap();
        assert!((sp.current - 10.8).abs() < 1e-12);
        assert!((sp.sled - 40.4).abs() < 1e-12);
    }

    #[test]
    fn interpolated_current_stays_between_bracket_values() {
        let t = smooth_table();
        for f in [1540.5, 1542.0, 1544.9, 1545.1, 1548.0, 1549.9] {
            let sp = table_setpoint(&t, f).unwrap();
            assert!(sp.current >= 10.0 && sp.current <= 15.0, "f = {f}");
        }
    }

    #[test]
    fn discontinuous_filters_snap_to_branch_nearest_reference() {
        // Filter values decrease, jump back up across (1545, 1550), then
        // decrease again: a classic curve fold between rows 1 and 2.
        let t = table(&[
            (1540.0, 10.0, 40.0, 75.0, 73.0),
            (1545.0, 12.0, 41.0, 71.0, 69.0),
            (1550.0, 15.0, 43.0, 78.0, 76.0),
            (1555.0, 17.0, 44.0, 66.0, 64.0),
        ]);
        let sp = table_setpoint(&t, 1547.0).unwrap();

        // Branch below: extend (1540,1545) to 1547  -> 71 - 4*2/5   = 69.4
        // Branch above: extend (1550,1555) to 1547  -> 78 + 12*3/5  = 85.2
        // Nearest to 69 degC is the lower branch.
        assert!((sp.filter1 - 69.4).abs() < 1e-9);
        // f2: below -> 69 - 4*2/5 = 67.4, above -> 76 + 12*3/5 = 83.2.
        assert!((sp.filter2 - 67.4).abs() < 1e-9);
    }

    #[test]
    fn unresolvable_discontinuity_is_an_error_not_zero() {
        // Fold right at the table edge: no continuous sub-bracket below.
        let t = table(&[
            (1540.0, 10.0, 40.0, 70.0, 68.0),
            (1545.0, 12.0, 41.0, 75.0, 73.0),
            (1550.0, 15.0, 43.0, 71.0, 69.0),
        ]);
        let err = table_setpoint(&t, 1542.0).unwrap_err();
        assert!(matches!(err, LaserError::UndefinedInterpolation(_)));
    }

    #[test]
    fn power_tier_selection() {
        let ((lo, hi), (p0, p1)) = power_tier(8.0, 7.0, 13.5);
        assert_eq!((lo, hi), (TableKind::Map700, TableKind::Map1000));
        assert_eq!((p0, p1), (7.0, 10.0));

        let ((lo, hi), (p0, p1)) = power_tier(12.0, 7.0, 13.5);
        assert_eq!((lo, hi), (TableKind::Map1000, TableKind::Map1350));
        assert_eq!((p0, p1), (10.0, 13.5));

        // Below both tiers: nearest pair still used, blend extrapolates.
        let ((lo, _), _) = power_tier(5.0, 7.0, 13.5);
        assert_eq!(lo, TableKind::Map700);
    }

    fn two_tier_set() -> CalibrationSet {
        let mut tables = HashMap::new();
        tables.insert(TableKind::Map700, smooth_table());
        tables.insert(
            TableKind::Map1000,
            table(&[
                (1540.0, 20.0, 42.0, 73.0, 71.0),
                (1545.0, 24.0, 43.0, 71.0, 69.0),
                (1550.0, 30.0, 45.0, 69.0, 67.0),
            ]),
        );
        CalibrationSet::from_tables("CRTM0042", tables)
    }

    #[test]
    fn setpoint_blends_across_power_axis() {
        let set = two_tier_set();
        // At the tier endpoints the blend returns each map's own value.
        let at_min = setpoint(&set, 1542.0, 7.0, 7.0, 13.5).unwrap();
        assert!((at_min.current - 10.8).abs() < 1e-9);
        let at_edge = setpoint(&set, 1542.0, 10.0, 7.0, 13.5).unwrap();
        assert!((at_edge.current - 21.6).abs() < 1e-9);

        // Midway in power: midway between the two maps.
        let mid = setpoint(&set, 1542.0, 8.5, 7.0, 13.5).unwrap();
        assert!((mid.current - (10.8 + 21.6) / 2.0).abs() < 1e-9);
        assert!((mid.sled - (40.4 + 42.4) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn setpoint_requires_both_tier_tables() {
        let mut tables = HashMap::new();
        tables.insert(TableKind::Map700, smooth_table());
        let set = CalibrationSet::from_tables("CRTM0042", tables);
        let err = setpoint(&set, 1542.0, 8.0, 7.0, 13.5).unwrap_err();
        assert!(matches!(err, LaserError::MissingCalibration(_)));
    }

    #[test]
    fn slope_based_sled_estimate() {
        let set = two_tier_set();
        // Nearest row to 1542 is 1540 in both maps; slope 0.01 degC/GHz over
        // 2 THz = 2000 GHz adds 20 degC.
        let sled = sled_from_slope(&set, 1542.0, 7.0, 7.0, 13.5, 0.01).unwrap();
        assert!((sled - 60.0).abs() < 1e-9);
    }
}
