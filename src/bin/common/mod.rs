//! Shared driver for the fit binaries.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use fmr_fit::data::fmr;
use fmr_fit::plot::{self, PlotSpec};
use fmr_fit::{FitConfig, FitResult, PeakFitter, PeakShape};

#[derive(Serialize)]
struct Summary<'a> {
    config: &'a FitConfig,
    result: &'a FitResult,
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Fit the FMR scan with `shape` and write `<stem>.png` (or `.svg`) and
/// `<stem>.json` to the working directory.
pub fn run(shape: PeakShape, stem: &str) -> Result<()> {
    info!("fmr-fit {}", fmr_fit::VERSION);
    let data = fmr::dataset().context("building the FMR dataset")?;
    let fitter = PeakFitter::for_shape(shape);
    let result = fitter
        .fit(&data)
        .with_context(|| format!("fitting the {} lineshape", shape))?;
    info!("\n{}", result);
    result.ensure_valid()?;

    let json_path = PathBuf::from(format!("{}.json", stem));
    let file = File::create(&json_path)
        .with_context(|| format!("creating {}", json_path.display()))?;
    serde_json::to_writer_pretty(
        BufWriter::new(file),
        &Summary {
            config: fitter.config(),
            result: &result,
        },
    )
    .with_context(|| format!("writing {}", json_path.display()))?;
    info!("wrote {}", json_path.display());

    let spec = PlotSpec::for_fit(&data, &result)?;
    let image_path = match plot::find_system_font() {
        Some(font) => match plot::register_font_file(&font) {
            Ok(()) => PathBuf::from(format!("{}.png", stem)),
            Err(e) => {
                warn!("{}; writing SVG instead of PNG", e);
                PathBuf::from(format!("{}.svg", stem))
            }
        },
        None => {
            warn!(
                "no TrueType font found (set {} to a font file); writing SVG instead of PNG",
                plot::FONT_ENV
            );
            PathBuf::from(format!("{}.svg", stem))
        }
    };
    plot::render(&spec, &image_path)
        .with_context(|| format!("rendering {}", image_path.display()))?;
    info!("wrote {}", image_path.display());

    Ok(())
}
