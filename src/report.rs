use crate::flatten::{Flattened, SeriesPoint, day_label};
use maud::{DOCTYPE, Markup, html};
use plotters::prelude::*;
use std::path::Path;

trait FormatOption {
    fn fmt_opt(self) -> String;
}

impl FormatOption for Option<f64> {
    fn fmt_opt(self) -> String {
        self.map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "-".into())
    }
}

/// Headline numbers shown above the table.
#[derive(Debug, Default, PartialEq)]
pub struct StrainSummary {
    pub records: usize,
    pub scored: usize,
    pub avg_strain: Option<f64>,
    pub max_strain: Option<f64>,
}

pub fn summarize(view: &Flattened) -> StrainSummary {
    let scored = view.series.len();
    let total: f64 = view.series.iter().map(|p| p.strain).sum();
    StrainSummary {
        records: view.rows.len(),
        scored,
        avg_strain: (scored > 0).then(|| total / scored as f64),
        max_strain: view.series.iter().map(|p| p.strain).reduce(f64::max),
    }
}

/// Write a standalone HTML page with the table and a strain chart.
///
/// The chart is rendered to a PNG next to `path` with the same stem.
pub fn export_html_report<P: AsRef<Path>>(
    path: P,
    title: &str,
    view: &Flattened,
) -> std::io::Result<()> {
    let path = path.as_ref();
    let chart_path = path.with_extension("png");
    let chart_file = match generate_strain_chart(&view.series, &chart_path) {
        Ok(_) => chart_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("")),
        Err(e) => {
            log::error!("Failed to generate chart: {}", e);
            std::ffi::OsStr::new("")
        }
    };
    let markup = build_html(title, view, chart_file);
    std::fs::write(path, markup.into_string())
}

fn generate_strain_chart(
    series: &[SeriesPoint],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (800, 400)).into_drawing_area();
    root.fill(&WHITE)?;
    if series.is_empty() {
        root.present()?;
        return Ok(());
    }
    let min_x = series.iter().map(SeriesPoint::day_value).fold(f64::INFINITY, f64::min);
    let max_x = series.iter().map(SeriesPoint::day_value).fold(f64::NEG_INFINITY, f64::max);
    let max_y = series.iter().map(|p| p.strain).fold(0.0_f64, f64::max);
    let mut chart = ChartBuilder::on(&root)
        .caption("Strain Score Over Time", ("sans-serif", 25))
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d((min_x - 0.5)..(max_x + 0.5), 0f64..(max_y + 1.0))?;
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Strain Score")
        .x_label_formatter(&|x| day_label(*x))
        .draw()?;
    let points: Vec<(f64, f64)> = series.iter().map(|p| (p.day_value(), p.strain)).collect();
    chart.draw_series(LineSeries::new(points.clone(), &BLUE))?;
    chart.draw_series(points.into_iter().map(|p| Circle::new(p, 3, BLUE.filled())))?;
    root.present()?;
    Ok(())
}

fn build_html(title: &str, view: &Flattened, chart_file: &std::ffi::OsStr) -> Markup {
    let summary = summarize(view);
    html! {
        (DOCTYPE)
        html {
            head { meta charset="utf-8"; title { (title) } }
            body {
                h1 { (title) }
                table border="1" {
                    tr { th { "Records" } td { (summary.records) } }
                    tr { th { "Scored" } td { (summary.scored) } }
                    tr { th { "Average Strain" } td { (summary.avg_strain.fmt_opt()) } }
                    tr { th { "Max Strain" } td { (summary.max_strain.fmt_opt()) } }
                }
                h2 { "Strain Score Over Time" }
                @if chart_file.is_empty() {
                    p { "Chart unavailable" }
                } @else {
                    img src=(chart_file.to_string_lossy());
                }
                h2 { "Records" }
                @if view.rows.is_empty() {
                    p { "No records" }
                } @else {
                    table border="1" {
                        tr {
                            @for col in &view.columns {
                                th { (col.name) }
                            }
                        }
                        @for row in &view.rows {
                            tr {
                                @for cell in row.cells() {
                                    td { (cell) }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use crate::{RecordId, Score, WorkoutRecord};
    use std::ffi::OsStr;

    fn view() -> Flattened {
        let scored = |id: i64, start: &str, strain: f64| WorkoutRecord {
            id: Some(RecordId::Number(id)),
            start: Some(start.into()),
            score: Some(Score {
                strain: Some(strain),
                ..Score::default()
            }),
            ..WorkoutRecord::default()
        };
        flatten(&[
            scored(1, "2024-01-01T10:00:00Z", 4.0),
            WorkoutRecord {
                id: Some(RecordId::Number(2)),
                ..WorkoutRecord::default()
            },
            scored(3, "2024-01-03T10:00:00Z", 10.0),
        ])
    }

    #[test]
    fn format_option_for_option_f64() {
        assert_eq!(None::<f64>.fmt_opt(), "-");
        assert_eq!(Some(3.46_f64).fmt_opt(), "3.5");
        assert_eq!(Some(-1.27_f64).fmt_opt(), "-1.3");
    }

    #[test]
    fn summary_counts_scored_records() {
        let s = summarize(&view());
        assert_eq!(s.records, 3);
        assert_eq!(s.scored, 2);
        assert_eq!(s.avg_strain, Some(7.0));
        assert_eq!(s.max_strain, Some(10.0));
        assert_eq!(summarize(&Flattened::default()), StrainSummary::default());
    }

    #[test]
    fn build_html_renders_table_and_chart() {
        let output = build_html("Whoop Workouts", &view(), OsStr::new("report.png")).into_string();
        assert!(output.contains("<th>Zone Five Duration (ms)</th>"));
        assert!(output.contains("<td>7.0</td>"));
        assert!(output.contains("<td>10</td>"));
        assert!(output.contains("src=\"report.png\""));
    }

    #[test]
    fn build_html_handles_empty_view() {
        let output = build_html("Whoop Workouts", &Flattened::default(), OsStr::new("")).into_string();
        assert!(output.contains("Chart unavailable"));
        assert!(output.contains("No records"));
        assert!(!output.contains("<img"));
        assert!(output.contains("<td>-</td>"));
    }
}
