//! Rendering fit figures to disk.
#![cfg(feature = "plot")]

use fmr_fit::data::fmr;
use fmr_fit::plot::{find_system_font, register_font_file, render, PlotSpec};
use fmr_fit::{FitError, PeakFitter, PeakShape};
use std::path::PathBuf;

fn output_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}_{}", std::process::id(), name))
}

fn spec_for(shape: PeakShape) -> PlotSpec {
    let data = fmr::dataset().unwrap();
    let result = PeakFitter::for_shape(shape).fit(&data).unwrap();
    PlotSpec::for_fit(&data, &result).unwrap()
}

#[test]
fn test_gaussian_svg_carries_the_annotations() {
    let spec = spec_for(PeakShape::Gaussian);
    let path = output_path("FMR_Gaussian_1st_Fit.svg");

    render(&spec, &path).unwrap();
    let svg = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert!(svg.contains("Gaussian Peak with Linear Background"));
    assert!(svg.contains("Background"));
    assert!(svg.contains("FWHM (B)"));
}

#[test]
fn test_png_with_system_font() {
    let Some(font) = find_system_font() else {
        eprintln!("no system font found, skipping PNG output");
        return;
    };
    register_font_file(&font).unwrap();

    let spec = spec_for(PeakShape::BreitWigner);
    let path = output_path("FMR_BreitWigner_1st_Fit.png");
    render(&spec, &path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(&bytes[1..4], b"PNG");
}

#[test]
fn test_unwritable_path_is_an_error() {
    let spec = spec_for(PeakShape::BreitWigner);
    let path = std::env::temp_dir()
        .join("fmr_fit_missing_directory")
        .join("plot.svg");
    assert!(matches!(render(&spec, &path), Err(FitError::Plot(_))));
}
