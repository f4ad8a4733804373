use anyhow::Result;
use plotters::prelude::*;
use std::{ops::Range, path::Path};

const STEELBLUE: RGBColor = RGBColor(70, 130, 180);
const ORANGERED: RGBColor = RGBColor(255, 69, 0);

/// One point of the time series; NaN fields are left out of the plot.
pub struct SeriesPoint {
    pub x: f64,
    pub precipitates: f64,
    pub mean: f64,
    pub std: f64,
}

fn span(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        0.0..1.0
    } else if lo == hi {
        lo - 1.0..hi + 1.0
    } else {
        let pad = 0.05 * (hi - lo);
        lo - pad..hi + pad
    }
}

/// Two stacked panels sharing the x axis: mean precipitate size with ±1σ
/// error bars, and number of precipitates.
pub fn plot_time_series(
    path: &Path,
    points: &[SeriesPoint],
    x_label: &str,
    caption: Option<&str>,
    error_bars: usize,
) -> Result<()> {
    let sized = points
        .iter()
        .filter(|p| p.x.is_finite() && p.mean.is_finite())
        .collect::<Vec<_>>();
    let counted = points
        .iter()
        .filter(|p| p.x.is_finite() && p.precipitates.is_finite())
        .collect::<Vec<_>>();
    let x_range = span(counted.iter().map(|p| p.x));
    let mean_range = span(
        sized
            .iter()
            .flat_map(|p| [p.mean - p.std.max(0.0), p.mean + p.std.max(0.0)]),
    );
    let count_range = span(counted.iter().map(|p| p.precipitates).chain([0.0]));

    let drawing_area = SVGBackend::new(path, (800, 640)).into_drawing_area();
    drawing_area.fill(&WHITE)?;
    let (upper, lower) = drawing_area.split_vertically(320);

    let mut chart_builder = ChartBuilder::on(&upper);
    chart_builder
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60);
    if let Some(caption) = caption {
        chart_builder.caption(caption, ("sans-serif", 16));
    }
    let mut chart_context = chart_builder.build_cartesian_2d(x_range.clone(), mean_range)?;
    chart_context
        .configure_mesh()
        .y_desc("mean cluster size ± 1σ")
        .axis_style(BLACK)
        .label_style(("sans-serif", 14).into_font().color(&BLACK))
        .draw()?;
    chart_context.draw_series(LineSeries::new(
        sized.iter().map(|p| (p.x, p.mean)),
        &STEELBLUE,
    ))?;
    let every = (sized.len() / error_bars.max(1)).max(1);
    chart_context.draw_series(sized.iter().step_by(every).map(|p| {
        ErrorBar::new_vertical(
            p.x,
            p.mean - p.std,
            p.mean,
            p.mean + p.std,
            STEELBLUE.filled(),
            5,
        )
    }))?;

    let mut chart_context = ChartBuilder::on(&lower)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, count_range)?;
    chart_context
        .configure_mesh()
        .x_desc(x_label)
        .y_desc("number of clusters")
        .axis_style(BLACK)
        .label_style(("sans-serif", 14).into_font().color(&BLACK))
        .draw()?;
    chart_context.draw_series(LineSeries::new(
        counted.iter().map(|p| (p.x, p.precipitates)),
        &ORANGERED,
    ))?;

    drawing_area.present()?;
    Ok(())
}
