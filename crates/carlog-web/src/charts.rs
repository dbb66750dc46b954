//! SVG charts rendered with plotters into in-memory strings.
//!
//! Only the SVG backend without system fonts is used, so output depends on
//! the input numbers alone.

use anyhow::Result;
use plotters::prelude::*;

use crate::stats::{DashboardStats, DepreciationCurve, Heatmap, HistogramBin, ModelTimeline};
use crate::format_thousands;

const WIDE: (u32, u32) = (960, 480);
const SQUARE: (u32, u32) = (960, 720);
const BAR: RGBColor = RGBColor(14, 165, 233);
const LINE: RGBColor = RGBColor(37, 99, 235);
const HEAT_LOW: RGBColor = RGBColor(252, 253, 191);
const HEAT_HIGH: RGBColor = RGBColor(87, 21, 126);
const EMPTY_CELL: RGBColor = RGBColor(241, 245, 249);

/// A rendered chart, keyed by its file name in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub file_name: &'static str,
    pub svg: String,
}

pub fn render_all(stats: &DashboardStats, currency: &str) -> Result<Vec<Chart>> {
    let price_desc = format!("Avg Price ({currency})");
    let day_labels: Vec<String> = stats.daily.iter().map(|d| d.period.clone()).collect();
    let month_labels: Vec<String> = stats.monthly.iter().map(|m| m.period.clone()).collect();
    let fuel_counts = crate::stats::by_count_desc(&stats.fuels);

    let charts = vec![
        Chart {
            file_name: "daily_volume.svg",
            svg: line_chart(
                "Daily Listing Volume",
                "Count",
                &day_labels,
                &stats.daily.iter().map(|d| Some(d.count as f64)).collect::<Vec<_>>(),
            )?,
        },
        Chart {
            file_name: "monthly_volume.svg",
            svg: line_chart(
                "Monthly Listing Volume",
                "Count",
                &month_labels,
                &stats.monthly.iter().map(|m| Some(m.count as f64)).collect::<Vec<_>>(),
            )?,
        },
        Chart {
            file_name: "monthly_avg_price.svg",
            svg: line_chart(
                "Monthly Avg Price",
                &price_desc,
                &month_labels,
                &stats.monthly.iter().map(|m| m.avg_price).collect::<Vec<_>>(),
            )?,
        },
        Chart {
            file_name: "regional_price.svg",
            svg: bar_chart(
                "Avg Price by Region",
                &price_desc,
                &stats.regions.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
                &stats.regions.iter().map(|r| r.avg_price).collect::<Vec<_>>(),
            )?,
        },
        Chart {
            file_name: "fuel_counts.svg",
            svg: bar_chart(
                "Listings by Fuel Type",
                "Count",
                &fuel_counts.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
                &fuel_counts.iter().map(|f| f.count as f64).collect::<Vec<_>>(),
            )?,
        },
        Chart {
            file_name: "mileage_hist.svg",
            svg: histogram_chart("Mileage Distribution", "Mileage (km)", &stats.mileage_bins)?,
        },
        Chart {
            file_name: "depreciation_top8.svg",
            svg: depreciation_chart("Depreciation Curve, Top 8 Models", &price_desc, &stats.depreciation)?,
        },
        Chart {
            file_name: "historical_avg_price_top10.svg",
            svg: timeline_chart(
                "Historical Avg Price, Top 10 Models",
                &price_desc,
                &month_labels,
                &stats.model_timelines,
            )?,
        },
        Chart {
            file_name: "heatmap_model_year.svg",
            svg: heatmap_chart("Avg Price by Model & Year (Top 20 Models)", &stats.heatmap)?,
        },
    ];
    Ok(charts)
}

/// Upper end of a value axis with some headroom; never an empty range.
fn value_ceiling(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.filter(|v| v.is_finite()).fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Last index of an index axis with at least two slots.
fn index_upper(len: usize) -> i32 {
    (len as i32 - 1).max(1)
}

fn label_at(labels: &[String], idx: i32) -> String {
    usize::try_from(idx)
        .ok()
        .and_then(|i| labels.get(i))
        .cloned()
        .unwrap_or_default()
}

pub fn bar_chart(title: &str, y_desc: &str, labels: &[String], values: &[f64]) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, WIDE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(72)
            .build_cartesian_2d(
                (0..index_upper(labels.len())).into_segmented(),
                0f64..value_ceiling(values.iter().copied()),
            )?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(labels.len().max(1))
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(idx) => label_at(labels, *idx),
                _ => String::new(),
            })
            .y_desc(y_desc)
            .y_label_formatter(&|y| format_thousands(*y))
            .draw()?;
        chart.draw_series(values.iter().enumerate().map(|(i, v)| {
            let idx = i as i32;
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(idx), 0.0), (SegmentValue::Exact(idx + 1), *v)],
                BAR.filled(),
            );
            bar.set_margin(0, 0, 6, 6);
            bar
        }))?;
        root.present()?;
    }
    Ok(svg)
}

fn histogram_chart(title: &str, x_desc: &str, bins: &[HistogramBin]) -> Result<String> {
    let (lo, hi) = match (bins.first(), bins.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => (0.0, 1.0),
    };
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, WIDE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(72)
            .build_cartesian_2d(lo..hi, 0f64..value_ceiling(bins.iter().map(|b| b.count as f64)))?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(x_desc)
            .x_label_formatter(&|x| format_thousands(*x))
            .y_desc("Count")
            .y_label_formatter(&|y| format!("{y:.0}"))
            .draw()?;
        chart.draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], BAR.filled())
        }))?;
        root.present()?;
    }
    Ok(svg)
}

/// Splits an index-aligned series into runs of present values.
fn present_runs(values: &[Option<f64>]) -> Vec<Vec<(i32, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) => current.push((i as i32, *v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

pub fn line_chart(title: &str, y_desc: &str, labels: &[String], values: &[Option<f64>]) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, WIDE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(72)
            .build_cartesian_2d(
                0..index_upper(labels.len()),
                0f64..value_ceiling(values.iter().flatten().copied()),
            )?;
        chart
            .configure_mesh()
            .x_labels(labels.len().clamp(1, 12))
            .x_label_formatter(&|x| label_at(labels, *x))
            .y_desc(y_desc)
            .y_label_formatter(&|y| format_thousands(*y))
            .draw()?;
        for run in present_runs(values) {
            chart.draw_series(LineSeries::new(run.iter().copied(), LINE.stroke_width(2)))?;
            chart.draw_series(run.iter().map(|p| Circle::new(*p, 3, LINE.filled())))?;
        }
        root.present()?;
    }
    Ok(svg)
}

fn depreciation_chart(title: &str, y_desc: &str, curves: &[DepreciationCurve]) -> Result<String> {
    let ages = curves.iter().flat_map(|c| c.points.iter().map(|(age, _)| *age));
    let min_age = ages.clone().min().unwrap_or(0);
    let max_age = ages.max().unwrap_or(1).max(min_age + 1);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, WIDE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(72)
            .build_cartesian_2d(
                min_age..max_age,
                0f64..value_ceiling(curves.iter().flat_map(|c| c.points.iter().map(|(_, p)| *p))),
            )?;
        chart
            .configure_mesh()
            .x_desc("Age (years)")
            .y_desc(y_desc)
            .y_label_formatter(&|y| format_thousands(*y))
            .draw()?;
        for (i, curve) in curves.iter().enumerate() {
            let color = Palette99::pick(i).to_rgba();
            chart
                .draw_series(LineSeries::new(curve.points.iter().copied(), color.stroke_width(2)))?
                .label(curve.model.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2)));
            chart.draw_series(curve.points.iter().map(|p| Circle::new(*p, 3, color.filled())))?;
        }
        if !curves.is_empty() {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.85))
                .border_style(BLACK)
                .position(SeriesLabelPosition::UpperRight)
                .draw()?;
        }
        root.present()?;
    }
    Ok(svg)
}

fn timeline_chart(
    title: &str,
    y_desc: &str,
    month_labels: &[String],
    timelines: &[ModelTimeline],
) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, SQUARE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(72)
            .build_cartesian_2d(
                0..index_upper(month_labels.len()),
                0f64..value_ceiling(timelines.iter().flat_map(|t| t.values.iter().flatten().copied())),
            )?;
        chart
            .configure_mesh()
            .x_labels(month_labels.len().clamp(1, 12))
            .x_label_formatter(&|x| label_at(month_labels, *x))
            .x_desc("Month")
            .y_desc(y_desc)
            .y_label_formatter(&|y| format_thousands(*y))
            .draw()?;

        let mut labelled = false;
        for (i, timeline) in timelines.iter().enumerate() {
            let color = Palette99::pick(i).to_rgba();
            for (run_idx, run) in present_runs(&timeline.values).into_iter().enumerate() {
                let series = chart.draw_series(LineSeries::new(run.iter().copied(), color.stroke_width(2)))?;
                if run_idx == 0 {
                    series
                        .label(timeline.model.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2)));
                    labelled = true;
                }
                chart.draw_series(run.iter().map(|p| Circle::new(*p, 3, color.filled())))?;
            }
        }
        if labelled {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.85))
                .border_style(BLACK)
                .position(SeriesLabelPosition::UpperLeft)
                .draw()?;
        }
        root.present()?;
    }
    Ok(svg)
}

fn lerp_channel(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u8
}

fn heat_color(value: f64, min: f64, max: f64) -> RGBColor {
    let t = if max > min { ((value - min) / (max - min)).clamp(0.0, 1.0) } else { 0.5 };
    RGBColor(
        lerp_channel(HEAT_LOW.0, HEAT_HIGH.0, t),
        lerp_channel(HEAT_LOW.1, HEAT_HIGH.1, t),
        lerp_channel(HEAT_LOW.2, HEAT_HIGH.2, t),
    )
}

fn heatmap_chart(title: &str, heatmap: &Heatmap) -> Result<String> {
    let years: Vec<String> = heatmap.years.iter().map(|y| y.to_string()).collect();
    let present = heatmap.cells.iter().flatten().flatten().copied();
    let min = present.clone().fold(f64::INFINITY, f64::min);
    let max = present.fold(f64::NEG_INFINITY, f64::max);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, SQUARE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(140)
            .build_cartesian_2d(
                (0..index_upper(years.len())).into_segmented(),
                (0..index_upper(heatmap.models.len())).into_segmented(),
            )?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(years.len().max(1))
            .y_labels(heatmap.models.len().max(1))
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(idx) => label_at(&years, *idx),
                _ => String::new(),
            })
            .y_label_formatter(&|v| match v {
                SegmentValue::CenterOf(idx) => label_at(&heatmap.models, *idx),
                _ => String::new(),
            })
            .x_desc("Year")
            .draw()?;

        let cells = heatmap.cells.iter().enumerate().flat_map(|(row, values)| {
            values.iter().enumerate().map(move |(col, value)| (row as i32, col as i32, *value))
        });
        chart.draw_series(cells.map(|(row, col, value)| {
            let fill = match value {
                Some(v) => heat_color(v, min, max),
                None => EMPTY_CELL,
            };
            Rectangle::new(
                [
                    (SegmentValue::Exact(col), SegmentValue::Exact(row)),
                    (SegmentValue::Exact(col + 1), SegmentValue::Exact(row + 1)),
                ],
                fill.filled(),
            )
        }))?;
        if min.is_finite() && max.is_finite() {
            root.draw(&Text::new(
                format!("{} .. {}", format_thousands(min), format_thousands(max)),
                (24, SQUARE.1 as i32 - 24),
                ("sans-serif", 14).into_font(),
            ))?;
        }
        root.present()?;
    }
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_chart_is_deterministic_svg() {
        let labels = vec!["Benzinë".to_string(), "Naftë".to_string()];
        let first = bar_chart("Fuel", "Count", &labels, &[3.0, 5.0]).unwrap();
        let second = bar_chart("Fuel", "Count", &labels, &[3.0, 5.0]).unwrap();
        assert!(first.starts_with("<svg"));
        assert!(first.contains("Naftë"));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_series_still_render() {
        assert!(bar_chart("Empty", "Count", &[], &[]).unwrap().contains("Empty"));
        assert!(line_chart("Empty", "Count", &[], &[]).unwrap().contains("</svg>"));
        assert!(histogram_chart("Empty", "km", &[]).unwrap().contains("</svg>"));
        assert!(heatmap_chart("Empty", &Heatmap::default()).unwrap().contains("</svg>"));
    }

    #[test]
    fn gaps_split_line_runs() {
        let runs = present_runs(&[Some(1.0), None, None, Some(2.0), Some(3.0), None]);
        assert_eq!(runs, vec![vec![(0, 1.0)], vec![(3, 2.0), (4, 3.0)]]);
    }

    #[test]
    fn heat_color_spans_the_scale() {
        assert_eq!(heat_color(0.0, 0.0, 10.0), HEAT_LOW);
        assert_eq!(heat_color(10.0, 0.0, 10.0), HEAT_HIGH);
    }
}
