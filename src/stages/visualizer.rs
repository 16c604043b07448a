//! Visualization stage.
//!
//! Writes chart files under `charts/`: one distribution histogram per
//! numeric column, a missing-values overview, and a before/after impact
//! chart per repaired column. Rendering is deliberately plain SVG bars;
//! only the file naming contract matters to the rest of the pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::domain::dataset::Column;
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};

pub struct Visualizer;

const HIST_BINS: usize = 10;
const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 360.0;

/// Render labeled values as vertical SVG bars.
pub(crate) fn bar_svg(title: &str, bars: &[(String, f64)]) -> String {
    let max = bars
        .iter()
        .map(|(_, v)| *v)
        .fold(0.0_f64, f64::max)
        .max(1e-9);
    let slot = CHART_WIDTH / bars.len().max(1) as f64;
    let plot_height = CHART_HEIGHT - 60.0;

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
         <rect width=\"{w}\" height=\"{h}\" fill=\"white\"/>\n\
         <text x=\"{tx}\" y=\"20\" text-anchor=\"middle\" font-size=\"14\">{title}</text>\n",
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        tx = CHART_WIDTH / 2.0,
        title = title
    );
    for (i, (label, value)) in bars.iter().enumerate() {
        let height = (value / max) * plot_height;
        let x = i as f64 * slot + slot * 0.15;
        let y = 30.0 + (plot_height - height);
        svg.push_str(&format!(
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"#4878a8\"/>\n",
            x,
            y,
            slot * 0.7,
            height
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\">{}</text>\n",
            x + slot * 0.35,
            CHART_HEIGHT - 12.0,
            label
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

fn histogram_bars(column: &Column) -> Vec<(String, f64)> {
    let xs = column.numeric_values();
    let (min, max) = match (column.min(), column.max()) {
        (Some(min), Some(max)) => (min, max),
        _ => return Vec::new(),
    };
    let span = (max - min).max(1e-9);
    let mut counts = vec![0usize; HIST_BINS];
    for x in &xs {
        let bin = (((x - min) / span) * HIST_BINS as f64) as usize;
        counts[bin.min(HIST_BINS - 1)] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let lo = min + span * i as f64 / HIST_BINS as f64;
            (format!("{:.1}", lo), *c as f64)
        })
        .collect()
}

#[async_trait]
impl StageHandler for Visualizer {
    fn id(&self) -> StageId {
        StageId::Visualization
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let charts_dir = ctx.charts_dir();
        tokio::fs::create_dir_all(&charts_dir)
            .await
            .with_context(|| format!("creating charts directory {}", charts_dir.display()))?;

        let mut files: Vec<PathBuf> = Vec::new();
        let write = |name: String, svg: String, files: &mut Vec<PathBuf>| {
            let path = charts_dir.join(&name);
            files.push(PathBuf::from("charts").join(&name));
            (path, svg)
        };

        let mut pending = Vec::new();

        // Distribution per numeric column (over the cleaned data).
        {
            let dataset = ctx.data.current()?;
            for col in dataset.numeric_columns() {
                let bars = histogram_bars(col);
                if bars.is_empty() {
                    continue;
                }
                let svg = bar_svg(&format!("Distribution of {}", col.name), &bars);
                pending.push(write(format!("dist_{}.svg", col.name), svg, &mut files));
            }

            // Missing values per column, as captured at ingestion.
            let original = ctx.data.original()?;
            let missing_bars: Vec<(String, f64)> = original
                .columns()
                .iter()
                .map(|c| (c.name.clone(), c.missing_count() as f64))
                .collect();
            let svg = bar_svg("Missing Values by Column", &missing_bars);
            pending.push(write("missing_values.svg".to_string(), svg, &mut files));
        }

        // Before/after impact per repaired column.
        for entry in ctx.data.change_log() {
            let before = entry.before.mean.unwrap_or(entry.before.missing_count as f64);
            let after = entry.after.mean.unwrap_or(entry.after.missing_count as f64);
            let label = if entry.before.mean.is_some() {
                "mean"
            } else {
                "missing"
            };
            let bars = vec![
                (format!("before ({})", label), before),
                (format!("after ({})", label), after),
            ];
            let svg = bar_svg(&format!("Cleaning Impact: {}", entry.column), &bars);
            pending.push(write(format!("impact_{}.svg", entry.column), svg, &mut files));
        }

        for (path, svg) in pending {
            tokio::fs::write(&path, svg)
                .await
                .with_context(|| format!("writing chart {}", path.display()))?;
        }

        debug!(charts = files.len(), "charts written");

        Ok(StageOutput {
            stage: StageId::Visualization,
            summary: format!("Generated {} charts", files.len()),
            details: json!({
                "charts": files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            }),
            files,
        })
    }
}
