//! Plot description and rendering.
//!
//! [`PlotSpec`] is a plain value describing everything on the figure: data
//! with error bars, sampled curves, legend and annotation box. Building it
//! needs no drawing backend; [`render`] turns it into a PNG or SVG file with
//! `plotters`.
//!
//! Text needs a font registered through [`register_font_file`]. Without one,
//! PNG output is refused and SVG output is written with unmeasured text
//! elements, leaving font selection to the viewer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::data::{Dataset, Measurement};
use crate::error::{FitError, Result};
use crate::fit::{Estimate, FitResult};
use crate::models::PeakShape;

/// Font family every text element is drawn with.
const FONT_FAMILY: &str = "sans-serif";

/// Number of samples along each fitted curve.
pub const CURVE_SAMPLES: usize = 400;

static FONT_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Environment variable naming a font file to use instead of the system search.
pub const FONT_ENV: &str = "FMR_FONT";

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Locate a TrueType font: `$FMR_FONT` if set and present, else the first
/// existing entry of a list of common system font paths.
pub fn find_system_font() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(FONT_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        debug!("{} points to {}, which is not a file", FONT_ENV, path.display());
    }

    SYSTEM_FONTS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Register the font at `path` for all plot text.
///
/// The font data is kept for the rest of the process.
pub fn register_font_file(path: &Path) -> Result<()> {
    let bytes: &'static [u8] = Box::leak(std::fs::read(path)?.into_boxed_slice());
    plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| FitError::Plot(format!("{} is not a usable font", path.display())))?;
    FONT_REGISTERED.store(true, Ordering::SeqCst);
    debug!("registered plot font {}", path.display());
    Ok(())
}

/// Whether [`register_font_file`] has succeeded in this process.
pub fn font_registered() -> bool {
    FONT_REGISTERED.load(Ordering::SeqCst)
}

/// A sampled line on the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    pub color: (u8, u8, u8),
    pub stroke_width: u32,
    pub dashed: bool,
}

/// Rectangle in normalized device coordinates: fractions of the image, with
/// the origin in the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdcBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl NdcBox {
    /// Pixel corners (top-left, bottom-right) on an image of `size`.
    fn to_pixels(self, size: (u32, u32)) -> ((i32, i32), (i32, i32)) {
        let (w, h) = (size.0 as f64, size.1 as f64);
        (
            ((self.x0 * w).round() as i32, ((1.0 - self.y1) * h).round() as i32),
            ((self.x1 * w).round() as i32, ((1.0 - self.y0) * h).round() as i32),
        )
    }
}

/// Everything drawn on a fit figure.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Image size in pixels
    pub size: (u32, u32),
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Points drawn as markers with vertical error bars
    pub data: Vec<Measurement>,
    pub curves: Vec<Curve>,
    /// Lines of the annotation box, top to bottom
    pub annotations: Vec<String>,
    pub annotation_box: NdcBox,
    /// Legend frame; entries share its height equally, data first
    pub legend: NdcBox,
}

impl PlotSpec {
    /// Describe the figure for a fit of `dataset`.
    ///
    /// Refuses a result that is not valid.
    pub fn for_fit(dataset: &Dataset, result: &FitResult) -> Result<Self> {
        result.ensure_valid()?;

        let (x_min, x_max) = dataset
            .x_range()
            .ok_or_else(|| FitError::InvalidInput("Cannot plot an empty dataset".to_string()))?;
        let x_range = pad(x_min, x_max);

        let start = result.domain.min.max(x_range.0);
        let end = result.domain.max.min(x_range.1);
        if start >= end {
            return Err(FitError::InvalidInput(format!(
                "Fit domain [{}, {}] does not overlap the data",
                result.domain.min, result.domain.max
            )));
        }

        let total: Vec<(f64, f64)> = ndarray::Array1::linspace(start, end, CURVE_SAMPLES)
            .iter()
            .map(|&x| (x, result.value(x)))
            .collect();
        let background = result.background().sample(start, end, CURVE_SAMPLES);

        let (mut y_min, mut y_max) = dataset.y_range().unwrap_or((0.0, 1.0));
        for &(_, y) in total.iter().chain(background.iter()) {
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }

        let title = match result.shape {
            PeakShape::BreitWigner => "Breit-Wigner Peak with Linear Background",
            PeakShape::Gaussian => "Gaussian Peak with Linear Background (B)",
        };

        Ok(Self {
            title: title.to_string(),
            x_label: "B (mT)".to_string(),
            y_label: "I_s (μA)".to_string(),
            size: (800, 600),
            x_range,
            y_range: pad(y_min, y_max),
            data: dataset.points().to_vec(),
            curves: vec![
                Curve {
                    label: "Total Fit".to_string(),
                    points: total,
                    color: (255, 0, 0),
                    stroke_width: 2,
                    dashed: false,
                },
                Curve {
                    label: "Background".to_string(),
                    points: background,
                    color: (0, 255, 0),
                    stroke_width: 2,
                    dashed: true,
                },
            ],
            annotations: annotations(result)?,
            annotation_box: NdcBox {
                x0: 0.13,
                y0: 0.13,
                x1: 0.42,
                y1: 0.37,
            },
            legend: NdcBox {
                x0: 0.7,
                y0: 0.5,
                x1: 0.9,
                y1: 0.7,
            },
        })
    }
}

/// Widen `[lo, hi]` by 5% on each side.
fn pad(lo: f64, hi: f64) -> (f64, f64) {
    let margin = if hi > lo { 0.05 * (hi - lo) } else { 1.0 };
    (lo - margin, hi + margin)
}

fn annotations(result: &FitResult) -> Result<Vec<String>> {
    let center = result.center();
    let width = result.width();
    let chi2 = format!("χ²/NDF = {:.2}", result.reduced_chi_square()?);

    Ok(match result.shape {
        PeakShape::Gaussian => {
            let fwhm = result.derived_fwhm.unwrap_or_else(|| {
                Estimate::new(
                    result.shape.fwhm(width.value),
                    result.shape.fwhm(width.error),
                )
            });
            vec![
                format!("Mean (B) = {:.2} mT", center),
                format!("Sigma (B) = {:.2} mT", width),
                format!("FWHM (B) = {:.2} mT", fwhm),
                chi2,
            ]
        }
        PeakShape::BreitWigner => vec![
            format!("μ = {:.2} mT", center),
            format!("Γ = {:.2} mT", width),
            chi2,
        ],
    })
}

/// Write `spec` to `path`; the extension (`png` or `svg`) picks the backend.
pub fn render(spec: &PlotSpec, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let measured = font_registered();

    match extension.as_deref() {
        Some("png") => {
            if !measured {
                return Err(FitError::Plot(
                    "PNG output needs a registered font".to_string(),
                ));
            }
            let root = BitMapBackend::new(path, spec.size).into_drawing_area();
            draw(spec, &root, true).map_err(plot_error)
        }
        Some("svg") => {
            let root = SVGBackend::new(path, spec.size).into_drawing_area();
            draw(spec, &root, measured).map_err(plot_error)
        }
        _ => Err(FitError::InvalidInput(format!(
            "Unsupported image format: {}",
            path.display()
        ))),
    }?;

    debug!("wrote {}", path.display());
    Ok(())
}

fn plot_error<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> FitError {
    FitError::Plot(e.to_string())
}

type DrawResult<DB> =
    std::result::Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

fn text_style(size: u32) -> TextStyle<'static> {
    TextStyle::from((FONT_FAMILY, size).into_font())
}

/// Draw the figure. With `measured` false no text is laid out by plotters,
/// which needs font metrics; the title is placed at a fixed offset.
fn draw<DB: DrawingBackend>(
    spec: &PlotSpec,
    root: &DrawingArea<DB, Shift>,
    measured: bool,
) -> DrawResult<DB> {
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(root);
    builder.margin(20).x_label_area_size(55).y_label_area_size(65);
    if measured {
        builder.caption(&spec.title, (FONT_FAMILY, 24));
    } else {
        root.draw(&Text::new(
            spec.title.as_str(),
            (spec.size.0 as i32 / 2, 22),
            text_style(24).pos(Pos::new(HPos::Center, VPos::Center)),
        ))?;
        builder.margin_top(45);
    }
    let mut chart = builder.build_cartesian_2d(
        spec.x_range.0..spec.x_range.1,
        spec.y_range.0..spec.y_range.1,
    )?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(spec.x_label.as_str())
        .y_desc(spec.y_label.as_str())
        .axis_desc_style((FONT_FAMILY, 18))
        .label_style((FONT_FAMILY, 14))
        .draw()?;

    chart.draw_series(spec.data.iter().map(|p| {
        ErrorBar::new_vertical(p.x, p.y - p.y_error, p.y, p.y + p.y_error, BLACK.filled(), 6)
    }))?;
    chart.draw_series(
        spec.data
            .iter()
            .map(|p| Circle::new((p.x, p.y), 4, BLACK.filled())),
    )?;

    for curve in &spec.curves {
        let points = curve.points.iter().copied();
        if curve.dashed {
            chart.draw_series(DashedLineSeries::new(points, DASH, GAP, curve_style(curve)))?;
        } else {
            chart.draw_series(LineSeries::new(points, curve_style(curve)))?;
        }
    }

    draw_legend(spec, root)?;

    let (top_left, bottom_right) = spec.annotation_box.to_pixels(spec.size);
    root.draw(&Rectangle::new([top_left, bottom_right], WHITE.filled()))?;
    root.draw(&Rectangle::new([top_left, bottom_right], BLACK.stroke_width(1)))?;

    let lines = spec.annotations.len().max(1) as i32;
    let line_height = (bottom_right.1 - top_left.1) / lines;
    for (i, line) in spec.annotations.iter().enumerate() {
        let y = top_left.1 + line_height * i as i32 + line_height / 2;
        root.draw(&Text::new(
            line.as_str(),
            (top_left.0 + 10, y),
            text_style(17).pos(Pos::new(HPos::Left, VPos::Center)),
        ))?;
    }

    root.present()?;
    Ok(())
}

/// Dash and gap length of dashed curves, in pixels.
const DASH: u32 = 10;
const GAP: u32 = 6;

fn curve_style(curve: &Curve) -> ShapeStyle {
    let (r, g, b) = curve.color;
    RGBColor(r, g, b).stroke_width(curve.stroke_width)
}

/// Horizontal swatch segments for a curve between `x0` and `x1`.
fn swatch_segments(dashed: bool, x0: i32, x1: i32) -> Vec<(i32, i32)> {
    if !dashed {
        return vec![(x0, x1)];
    }
    let (dash, step) = (DASH as i32, (DASH + GAP) as i32);
    (x0..x1)
        .step_by(step as usize)
        .map(|start| (start, (start + dash).min(x1)))
        .collect()
}

/// Legend inside its frame: a marker for the data, then a line swatch per
/// curve, each row labelled.
fn draw_legend<DB: DrawingBackend>(
    spec: &PlotSpec,
    root: &DrawingArea<DB, Shift>,
) -> DrawResult<DB> {
    let (top_left, bottom_right) = spec.legend.to_pixels(spec.size);
    root.draw(&Rectangle::new([top_left, bottom_right], WHITE.filled()))?;
    root.draw(&Rectangle::new([top_left, bottom_right], BLACK.stroke_width(1)))?;

    let rows = 1 + spec.curves.len() as i32;
    let row_height = (bottom_right.1 - top_left.1) / rows;
    let row = |i: i32| top_left.1 + row_height * i + row_height / 2;
    let left = top_left.0;
    let label_style = text_style(16).pos(Pos::new(HPos::Left, VPos::Center));

    root.draw(&Circle::new((left + 22, row(0)), 4, BLACK.filled()))?;
    root.draw(&Text::new("Data", (left + 50, row(0)), label_style.clone()))?;
    for (i, curve) in spec.curves.iter().enumerate() {
        let y = row(i as i32 + 1);
        for (x0, x1) in swatch_segments(curve.dashed, left + 8, left + 38) {
            root.draw(&PathElement::new(vec![(x0, y), (x1, y)], curve_style(curve)))?;
        }
        root.draw(&Text::new(
            curve.label.as_str(),
            (left + 50, y),
            label_style.clone(),
        ))?;
    }
    Ok(())
}
