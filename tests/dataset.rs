//! Loading the FMR scan from raw readings.

use approx::assert_relative_eq;
use fmr_fit::data::fmr;
use fmr_fit::{Calibration, Dataset, FitDomain, FitError};
use std::io::Cursor;

fn scan_as_text() -> String {
    let mut text = String::from("# magnet current (A), signal (uA)\n");
    for (current, signal) in fmr::MAGNET_CURRENT.iter().zip(fmr::SIGNAL_CURRENT.iter()) {
        text.push_str(&format!("{}, {}\n", current, signal));
    }
    text
}

#[test]
fn test_text_scan_matches_builtin_scan() {
    let read = Dataset::read_pairs(
        Cursor::new(scan_as_text()),
        &Calibration::default(),
        fmr::SIGNAL_ERROR,
    )
    .unwrap();
    assert_eq!(read, fmr::dataset().unwrap());
}

#[test]
fn test_builtin_scan_field_values() {
    let data = fmr::dataset().unwrap();
    assert_eq!(data.len(), 18);

    // B = (0.1632 * I + 0.0152) * 1000
    let first = data.points()[0];
    assert_relative_eq!(first.x, 301.1264, epsilon = 1e-9);
    assert_relative_eq!(first.y, 31.0);
    assert_relative_eq!(first.y_error, 1.0);

    let (lo, hi) = data.x_range().unwrap();
    assert_relative_eq!(lo, 301.1264, epsilon = 1e-9);
    assert_relative_eq!(hi, 337.52, epsilon = 1e-9);

    // The whole scan lies inside the default fit domain.
    assert_eq!(data.restrict(&FitDomain::default()).len(), 18);
}

#[test]
fn test_custom_calibration() {
    let calibration = Calibration {
        slope: 0.2,
        offset: 0.0,
        scale: 1000.0,
    };
    let data = Dataset::from_currents(&[1.0, 2.0], &[3.0, 4.0], &calibration, 0.5).unwrap();
    assert_relative_eq!(data.points()[0].x, 200.0, epsilon = 1e-12);
    assert_relative_eq!(data.points()[1].x, 400.0, epsilon = 1e-12);
    assert!(data.iter().all(|p| p.y_error == 0.5));
}

#[test]
fn test_whitespace_and_trailing_comments() {
    let text = "1.80 27.0   # near the dip\n\n  1.85\t13.0\n";
    let data = Dataset::read_pairs(Cursor::new(text), &Calibration::default(), 1.0).unwrap();
    assert_eq!(data.len(), 2);
    assert_relative_eq!(data.points()[1].y, 13.0);
}

#[test]
fn test_malformed_lines_are_reported() {
    let text = "1.80, 27.0\n1.85, 13.0, 2.0\n";
    match Dataset::read_pairs(Cursor::new(text), &Calibration::default(), 1.0) {
        Err(FitError::InvalidInput(msg)) => assert!(msg.starts_with("Line 2"), "{}", msg),
        other => panic!("expected InvalidInput, got {:?}", other),
    }

    let text = "1.80, abc\n";
    assert!(matches!(
        Dataset::read_pairs(Cursor::new(text), &Calibration::default(), 1.0),
        Err(FitError::InvalidInput(_))
    ));
}

#[test]
fn test_non_positive_errors_are_rejected() {
    assert!(Dataset::from_columns(&[1.0, 2.0], &[1.0, 2.0], &[1.0, 0.0]).is_err());
    assert!(Dataset::from_currents(&[1.0], &[1.0], &Calibration::default(), -1.0).is_err());
    assert!(Dataset::from_columns(&[1.0], &[1.0], &[f64::NAN]).is_err());
}
