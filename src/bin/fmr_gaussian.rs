//! Gaussian fit of the FMR scan.

mod common;

use fmr_fit::PeakShape;

fn main() -> anyhow::Result<()> {
    common::init_logging();
    common::run(PeakShape::Gaussian, "FMR_Gaussian_1st_Fit")
}
