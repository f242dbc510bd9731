//! PNG export of the three dashboard charts.
//!
//! Charts are drawn with plotters into an in-memory RGB buffer and encoded as
//! PNG, so the same bytes can be written to disk or handed to any other sink.
//! Files are named `{TICKER}_{chart}.png`.
//!
//! Text is drawn with plotters' `ab_glyph` backend using the sans-serif face
//! bundled with egui, so no system fonts are needed.

use crate::app::Indicators;
use crate::config::HISTOGRAM_BINS;
use crate::inference::PredictionResult;
use crate::stats::ErrorDistribution;
use crate::theme::Theme;
use anyhow::{Context, Result};
use eframe::egui::FontDefinitions;
use image::{ImageFormat, RgbImage};
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use std::borrow::Cow;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// egui's default proportional face.
const CHART_FONT: &str = "Ubuntu-Light";

type Chart2d<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Forecast,
    Volume,
    Errors,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Forecast, ChartKind::Volume, ChartKind::Errors];

    pub fn slug(self) -> &'static str {
        match self {
            Self::Forecast => "forecast",
            Self::Volume => "volume",
            Self::Errors => "errors",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Forecast => "Forecast vs Actual",
            Self::Volume => "Trading Volume",
            Self::Errors => "Prediction Error Histogram",
        }
    }

    fn size(self) -> (u32, u32) {
        match self {
            Self::Forecast => (1000, 500),
            Self::Volume => (1000, 300),
            Self::Errors => (800, 400),
        }
    }
}

pub fn file_name(ticker: &str, chart: ChartKind) -> String {
    format!("{}_{}.png", ticker.trim().to_uppercase(), chart.slug())
}

fn plot_err(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("chart rendering failed: {}", e)
}

/// Make `sans-serif` resolvable for plotters. Runs once per process.
fn ensure_chart_font() -> Result<()> {
    static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            let fonts = FontDefinitions::default();
            let data = fonts
                .font_data
                .get(CHART_FONT)
                .ok_or_else(|| format!("font {CHART_FONT} is not bundled"))?;
            let bytes: &'static [u8] = match data.font.clone() {
                Cow::Borrowed(bytes) => bytes,
                Cow::Owned(bytes) => Box::leak(bytes.into_boxed_slice()),
            };
            register_font("sans-serif", FontStyle::Normal, bytes).map_err(|_| "invalid font data".to_string())
        })
        .clone()
        .map_err(|e| anyhow::anyhow!("chart font unavailable: {}", e))
}

/// Render one chart as PNG bytes.
pub fn render_png(
    chart: ChartKind,
    result: &PredictionResult,
    indicators: Indicators,
    theme: &Theme,
) -> Result<Vec<u8>> {
    ensure_chart_font()?;
    let (width, height) = chart.size();
    let mut buf = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
        root.fill(&theme.background.to_plotters()).map_err(plot_err)?;
        match chart {
            ChartKind::Forecast => draw_forecast(&root, result, indicators, theme)?,
            ChartKind::Volume => draw_volume(&root, result, theme)?,
            ChartKind::Errors => draw_errors(&root, result, theme)?,
        }
        root.present().map_err(plot_err)?;
    }
    encode_png(width, height, buf)
}

fn encode_png(width: u32, height: u32, buf: Vec<u8>) -> Result<Vec<u8>> {
    let img = RgbImage::from_raw(width, height, buf)
        .context("pixel buffer does not match chart size")?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Write every visible chart to `dir`. The volume chart follows its overlay toggle.
pub fn export_charts(
    dir: &Path,
    result: &PredictionResult,
    indicators: Indicators,
    theme: &Theme,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for chart in ChartKind::ALL {
        if chart == ChartKind::Volume && !indicators.volume {
            continue;
        }
        written.push(export_chart(dir, chart, result, indicators, theme)?);
    }
    Ok(written)
}

pub fn export_chart(
    dir: &Path,
    chart: ChartKind,
    result: &PredictionResult,
    indicators: Indicators,
    theme: &Theme,
) -> Result<PathBuf> {
    let bytes = render_png(chart, result, indicators, theme)?;
    let path = dir.join(file_name(&result.ticker, chart));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Exported chart");
    Ok(path)
}

/// `(min, max)` of `values` with 5% headroom on both sides.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    (lo - pad, hi + pad)
}

fn build_chart<'a, DB: DrawingBackend>(
    root: &'a DrawingArea<DB, Shift>,
    title: &str,
    theme: &Theme,
    x: (f64, f64),
    y: (f64, f64),
) -> Result<Chart2d<'a, DB>> {
    ChartBuilder::on(root)
        .margin(12)
        .caption(title, ("sans-serif", 22).into_font().color(&theme.label.to_plotters()))
        .x_label_area_size(36)
        .y_label_area_size(64)
        .build_cartesian_2d(x.0..x.1, y.0..y.1)
        .map_err(plot_err)
}

fn draw_axes<'a, DB: DrawingBackend + 'a>(
    chart: &mut Chart2d<'a, DB>,
    theme: &Theme,
    x_desc: &str,
    y_desc: &str,
) -> Result<()> {
    let label = theme.label.to_plotters();
    chart
        .configure_mesh()
        .bold_line_style(theme.grid.to_plotters().mix(0.3))
        .light_line_style(TRANSPARENT)
        .axis_style(label)
        .label_style(("sans-serif", 14).into_font().color(&label))
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)
}

fn draw_legend<'a, DB: DrawingBackend + 'a>(chart: &mut Chart2d<'a, DB>, theme: &Theme) -> Result<()> {
    chart
        .configure_series_labels()
        .background_style(theme.background.to_plotters().mix(0.8))
        .border_style(theme.grid.to_plotters())
        .label_font(("sans-serif", 14).into_font().color(&theme.label.to_plotters()))
        .draw()
        .map_err(plot_err)
}

fn draw_forecast<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    result: &PredictionResult,
    indicators: Indicators,
    theme: &Theme,
) -> Result<()> {
    let x = (0.0, result.len().max(1) as f64);
    let overlays = [
        (indicators.ma20, &result.ma20, "MA 20", theme.ma20),
        (indicators.ma50, &result.ma50, "MA 50", theme.ma50),
    ];
    let y = padded_range(
        result
            .actual
            .iter()
            .chain(&result.predicted)
            .copied()
            .chain(
                overlays
                    .iter()
                    .filter(|(on, ..)| *on)
                    .flat_map(|(_, values, ..)| values.iter().flatten().copied()),
            ),
    );

    let mut chart = build_chart(root, ChartKind::Forecast.title(), theme, x, y)?;
    draw_axes(&mut chart, theme, "Days", "Price ($)")?;

    for (name, values, color) in [
        ("Actual", &result.actual, theme.actual),
        ("Predicted", &result.predicted, theme.predicted),
    ] {
        let color = color.to_plotters();
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &v)| (i as f64, v)),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(name)
            .legend(move |(lx, ly)| PathElement::new(vec![(lx, ly), (lx + 20, ly)], color));
    }

    for (on, values, name, color) in overlays {
        if !on {
            continue;
        }
        let color = color.to_plotters();
        chart
            .draw_series(LineSeries::new(
                values
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.map(|v| (i as f64, v))),
                color.stroke_width(1),
            ))
            .map_err(plot_err)?
            .label(name)
            .legend(move |(lx, ly)| PathElement::new(vec![(lx, ly), (lx + 20, ly)], color));
    }

    draw_legend(&mut chart, theme)
}

fn draw_volume<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    result: &PredictionResult,
    theme: &Theme,
) -> Result<()> {
    let x = (0.0, result.len().max(1) as f64);
    let max = result.volume.iter().copied().fold(0.0, f64::max);
    let y = (0.0, if max > 0.0 { max * 1.1 } else { 1.0 });

    let mut chart = build_chart(root, ChartKind::Volume.title(), theme, x, y)?;
    draw_axes(&mut chart, theme, "Days", "Volume")?;

    let fill = theme.volume.to_plotters().mix(0.8).filled();
    chart
        .draw_series(result.volume.iter().enumerate().map(|(i, &v)| {
            let left = i as f64 + 0.1;
            Rectangle::new([(left, 0.0), (left + 0.8, v)], fill)
        }))
        .map_err(plot_err)?;
    Ok(())
}

fn draw_errors<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    result: &PredictionResult,
    theme: &Theme,
) -> Result<()> {
    let dist = ErrorDistribution::fit(&result.residuals(), HISTOGRAM_BINS);
    let (x, y) = match &dist {
        Some(d) => {
            let lo = d.bins.first().map(|b| b.start).unwrap_or(-1.0);
            let hi = d.bins.last().map(|b| b.end).unwrap_or(1.0);
            ((lo, hi), (0.0, d.max_density().max(f64::EPSILON) * 1.1))
        }
        None => ((-1.0, 1.0), (0.0, 1.0)),
    };

    let mut chart = build_chart(root, ChartKind::Errors.title(), theme, x, y)?;
    draw_axes(&mut chart, theme, "Error", "Density")?;

    let Some(dist) = dist else {
        return Ok(());
    };

    let fill = theme.histogram.to_plotters().mix(0.75).filled();
    chart
        .draw_series(
            dist.bins
                .iter()
                .map(|b| Rectangle::new([(b.start, 0.0), (b.end, b.density)], fill)),
        )
        .map_err(plot_err)?;

    if !dist.curve.is_empty() {
        let curve = theme.curve.to_plotters();
        chart
            .draw_series(LineSeries::new(dist.curve.iter().copied(), curve.stroke_width(2)))
            .map_err(plot_err)?
            .label("Normal Curve")
            .legend(move |(lx, ly)| PathElement::new(vec![(lx, ly), (lx + 20, ly)], curve));
    }

    draw_legend(&mut chart, theme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ModelOrigin;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn sample_result() -> PredictionResult {
        let n = 40;
        PredictionResult {
            ticker: "AAPL".into(),
            origin: ModelOrigin::Trained,
            actual: (0..n).map(|i| 150.0 + i as f64).collect(),
            predicted: (0..n).map(|i| 149.0 + i as f64 + (i % 3) as f64).collect(),
            ma20: (0..n).map(|i| if i < 5 { None } else { Some(140.0 + i as f64) }).collect(),
            ma50: vec![None; n],
            volume: (0..n).map(|i| 1_000.0 * (i + 1) as f64).collect(),
        }
    }

    #[test]
    fn file_names_follow_ticker_and_chart() {
        assert_eq!(file_name("aapl", ChartKind::Forecast), "AAPL_forecast.png");
        assert_eq!(file_name("MSFT", ChartKind::Volume), "MSFT_volume.png");
        assert_eq!(file_name("NVDA", ChartKind::Errors), "NVDA_errors.png");
    }

    #[test]
    fn every_chart_renders_a_png() -> Result<()> {
        let result = sample_result();
        for theme in [Theme::light(), Theme::dark()] {
            for chart in ChartKind::ALL {
                let bytes = render_png(chart, &result, Indicators::all(), &theme)?;
                assert_eq!(&bytes[..8], &PNG_MAGIC, "{chart:?}");
                let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
                assert_eq!((decoded.width(), decoded.height()), chart.size());
            }
        }
        Ok(())
    }

    #[test]
    fn background_follows_theme() -> Result<()> {
        let result = sample_result();
        let bytes = render_png(ChartKind::Volume, &result, Indicators::default(), &Theme::dark())?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgb8();
        // Corner sits in the margin, outside any series.
        assert_eq!(img.get_pixel(0, 0).0, [0x1e, 0x1e, 0x1e]);
        Ok(())
    }

    #[test]
    fn titles_and_labels_are_drawn() -> Result<()> {
        ensure_chart_font()?;
        ensure_chart_font()?;

        let result = sample_result();
        let bytes = render_png(ChartKind::Forecast, &result, Indicators::all(), &Theme::light())?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgb8();
        let white = [255, 255, 255];

        // Caption band above the plot area.
        let caption_ink = (12..36).any(|y| (300..700).any(|x| img.get_pixel(x, y).0 != white));
        assert!(caption_ink, "no caption pixels");
        // Y tick labels left of the plot area.
        let label_ink = (60..440).any(|y| (14..70).any(|x| img.get_pixel(x, y).0 != white));
        assert!(label_ink, "no y-axis label pixels");
        Ok(())
    }

    #[test]
    fn empty_result_still_renders() -> Result<()> {
        let result = PredictionResult {
            ticker: "INTC".into(),
            origin: ModelOrigin::Loaded,
            actual: Vec::new(),
            predicted: Vec::new(),
            ma20: Vec::new(),
            ma50: Vec::new(),
            volume: Vec::new(),
        };
        for chart in ChartKind::ALL {
            let bytes = render_png(chart, &result, Indicators::all(), &Theme::light())?;
            assert_eq!(&bytes[..8], &PNG_MAGIC);
        }
        Ok(())
    }

    #[test]
    fn export_skips_volume_when_hidden() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = sample_result();

        let hidden = Indicators {
            volume: false,
            ..Indicators::default()
        };
        let written = export_charts(dir.path(), &result, hidden, &Theme::light())?;
        assert_eq!(
            written,
            vec![dir.path().join("AAPL_forecast.png"), dir.path().join("AAPL_errors.png")]
        );

        let written = export_charts(dir.path(), &result, Indicators::all(), &Theme::light())?;
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("AAPL_volume.png").exists());
        Ok(())
    }
}
