//! Report generation stage.
//!
//! Assembles `report.md` from the metadata bag, the change log, and the
//! outputs of every prior stage, in a fixed section order, then wraps the
//! same content as `report.html`.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::domain::metadata::{MetadataKey, MetadataValue};
use crate::stages::{StageContext, StageHandler, StageId, StageOutput};
use crate::store::DatasetStore;

pub struct Reporter;

fn report_value(store: &DatasetStore, key: MetadataKey) -> Option<&serde_json::Value> {
    match store.get_metadata(key) {
        Some(MetadataValue::Report(value)) => Some(value),
        _ => None,
    }
}

fn render_markdown(ctx: &StageContext<'_>) -> Result<String> {
    let store = &*ctx.data;
    let dataset = store.current()?;
    let original = store.original()?;
    let mut md = String::new();

    writeln!(md, "# Exploratory Data Analysis Report")?;
    writeln!(md, "\n_Generated {}_\n", Utc::now().format("%Y-%m-%d %H:%M UTC"))?;

    // 1. Executive summary
    writeln!(md, "## Executive Summary\n")?;
    writeln!(
        md,
        "Analyzed a dataset of {} rows and {} columns. {} values were \
         repaired during cleaning; {} audit entries document every change.",
        original.row_count(),
        original.column_count(),
        store
            .change_log()
            .iter()
            .map(|e| e.affected_rows)
            .sum::<usize>(),
        store.change_log().len()
    )?;
    for stage in StageId::ALL {
        if let Some(output) = ctx.dep(stage) {
            writeln!(md, "- **{}**: {}", stage.display_name(), output.summary)?;
        }
    }

    // 2. Dataset overview
    writeln!(md, "\n## Dataset Overview\n")?;
    writeln!(md, "| Column | Type | Missing (orig.) | Unique |")?;
    writeln!(md, "|---|---|---|---|")?;
    for col in original.columns() {
        writeln!(
            md,
            "| {} | {} | {} | {} |",
            col.name,
            col.column_type,
            col.missing_count(),
            col.unique_count()
        )?;
    }

    // 3. Data quality & cleaning
    writeln!(md, "\n## Data Quality & Cleaning\n")?;
    if let Some(MetadataValue::Flags(flags)) = store.get_metadata(MetadataKey::QualityFlags) {
        if flags.is_empty() {
            writeln!(md, "No quality flags were raised during profiling.")?;
        } else {
            for flag in flags {
                writeln!(md, "- {}", flag)?;
            }
        }
    }
    for desc in store.changelog_descriptions() {
        writeln!(md, "- {}", desc)?;
    }
    writeln!(
        md,
        "\nRemaining missing values after cleaning: {}.",
        dataset.total_missing()
    )?;

    // 4. Decision audit trail, verbatim from the change log
    writeln!(md, "\n## Decision Audit Trail\n")?;
    if store.change_log().is_empty() {
        writeln!(md, "No changes were applied to the dataset.")?;
    } else {
        writeln!(
            md,
            "| # | Column | Action | Method | Value | Rows | Sample rows | Reason |"
        )?;
        writeln!(md, "|---|---|---|---|---|---|---|---|")?;
        for (i, entry) in store.change_log().iter().enumerate() {
            writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {:?} | {} |",
                i + 1,
                entry.column,
                entry.action,
                entry
                    .method
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                entry.value_used,
                entry.affected_rows,
                entry.sample_indices,
                entry.reason
            )?;
        }
    }

    // 5. Cleaning impact
    writeln!(md, "\n## Cleaning Impact\n")?;
    for entry in store.change_log() {
        match (entry.before.mean, entry.after.mean) {
            (Some(before), Some(after)) => writeln!(
                md,
                "- `{}`: mean {:.3} -> {:.3}, missing {} -> {}",
                entry.column, before, after, entry.before.missing_count, entry.after.missing_count
            )?,
            _ => writeln!(
                md,
                "- `{}`: missing {} -> {}",
                entry.column, entry.before.missing_count, entry.after.missing_count
            )?,
        }
        writeln!(md, "  ![impact](charts/impact_{}.svg)", entry.column)?;
    }
    if store.change_log().is_empty() {
        writeln!(md, "The dataset required no repairs.")?;
    }

    // 6. Statistical analysis
    writeln!(md, "\n## Statistical Analysis\n")?;
    if let Some(stats) = report_value(store, MetadataKey::DescriptiveStats) {
        if let Some(columns) = stats["columns"].as_array() {
            for entry in columns {
                let name = entry["column"].as_str().unwrap_or("?");
                writeln!(
                    md,
                    "- `{}`: mean {}, median {}, std {}{}",
                    name,
                    entry["mean"],
                    entry["median"],
                    entry["std_dev"],
                    entry["skewness_interpretation"]
                        .as_str()
                        .map(|s| format!(" ({})", s))
                        .unwrap_or_default()
                )?;
                writeln!(md, "  ![distribution](charts/dist_{}.svg)", name)?;
            }
        }
    }
    if let Some(corr) = report_value(store, MetadataKey::CorrelationAnalysis) {
        if let Some(pairs) = corr["pairs"].as_array() {
            if !pairs.is_empty() {
                writeln!(md, "\n### Notable Correlations\n")?;
                for pair in pairs {
                    writeln!(
                        md,
                        "- {} and {}: r = {:.3} ({} {})",
                        pair["a"].as_str().unwrap_or("?"),
                        pair["b"].as_str().unwrap_or("?"),
                        pair["r"].as_f64().unwrap_or(0.0),
                        pair["strength"].as_str().unwrap_or("?"),
                        pair["direction"].as_str().unwrap_or("?")
                    )?;
                }
            }
        }
    }
    if let Some(patterns) = report_value(store, MetadataKey::PatternReport) {
        writeln!(md, "\n### Patterns\n")?;
        writeln!(md, "- Duplicate rows: {}", patterns["duplicate_rows"])?;
        writeln!(md, "- Binary columns: {}", patterns["binary_columns"])?;
        writeln!(md, "- Constant columns: {}", patterns["constant_columns"])?;
    }
    writeln!(md, "\n![missing values](charts/missing_values.svg)")?;

    // 7. Model recommendation
    writeln!(md, "\n## Model Recommendation\n")?;
    match report_value(store, MetadataKey::ModelRecommendations) {
        Some(rec) => {
            writeln!(
                md,
                "Target: `{}` ({}).\n",
                rec["target"].as_str().unwrap_or("?"),
                rec["problem_type"].as_str().unwrap_or("?")
            )?;
            if let Some(suggestions) = rec["suggestions"].as_array() {
                for s in suggestions {
                    writeln!(
                        md,
                        "{}. **{}**: {}",
                        s["rank"],
                        s["model"].as_str().unwrap_or("?"),
                        s["reason"].as_str().unwrap_or("")
                    )?;
                }
            }
            if let Some(training) = ctx.dep(StageId::Training) {
                writeln!(md, "\n{}", training.summary)?;
            }
        }
        None => writeln!(md, "No model recommendation was produced.")?,
    }

    // 8. XAI insights
    writeln!(md, "\n## XAI Insights\n")?;
    match report_value(store, MetadataKey::ExplainabilitySummary) {
        Some(xai) => {
            if let Some(imp) = xai["global_importance"].as_array() {
                for entry in imp {
                    writeln!(
                        md,
                        "- {}: {:.3}",
                        entry["feature"].as_str().unwrap_or("?"),
                        entry["importance"].as_f64().unwrap_or(0.0)
                    )?;
                }
            }
            writeln!(md, "\n![feature importance](charts/importance_summary.svg)")?;
        }
        None => writeln!(md, "No explainability summary is available for this run.")?,
    }

    // 9. Next steps
    writeln!(md, "\n## Next Steps\n")?;
    writeln!(md, "- Review the audit trail before trusting downstream results.")?;
    writeln!(
        md,
        "- Replace the baseline model with the top recommended model and compare scores."
    )?;
    writeln!(
        md,
        "- Re-run the pipeline after addressing flagged quality issues at the source."
    )?;

    Ok(md)
}

/// Line-oriented markdown-to-HTML conversion, enough for the report's own
/// structure (headings, lists, tables, images).
fn render_html(markdown: &str) -> String {
    let mut body = String::new();
    let mut in_list = false;
    let mut in_table = false;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if in_list && !trimmed.starts_with("- ") {
            body.push_str("</ul>\n");
            in_list = false;
        }
        if in_table && !trimmed.starts_with('|') {
            body.push_str("</table>\n");
            in_table = false;
        }
        if let Some(h) = trimmed.strip_prefix("### ") {
            body.push_str(&format!("<h3>{}</h3>\n", h));
        } else if let Some(h) = trimmed.strip_prefix("## ") {
            body.push_str(&format!("<h2>{}</h2>\n", h));
        } else if let Some(h) = trimmed.strip_prefix("# ") {
            body.push_str(&format!("<h1>{}</h1>\n", h));
        } else if let Some(item) = trimmed.strip_prefix("- ") {
            if !in_list {
                body.push_str("<ul>\n");
                in_list = true;
            }
            body.push_str(&format!("<li>{}</li>\n", item));
        } else if trimmed.starts_with('|') {
            let cells: Vec<&str> = trimmed.trim_matches('|').split('|').collect();
            if cells.iter().all(|c| c.trim().chars().all(|ch| ch == '-')) {
                continue;
            }
            if !in_table {
                body.push_str("<table>\n");
                in_table = true;
            }
            body.push_str("<tr>");
            for cell in cells {
                body.push_str(&format!("<td>{}</td>", cell.trim()));
            }
            body.push_str("</tr>\n");
        } else if let Some(rest) = trimmed.strip_prefix("![") {
            if let Some((alt, tail)) = rest.split_once("](") {
                if let Some(src) = tail.strip_suffix(')') {
                    body.push_str(&format!("<img src=\"{}\" alt=\"{}\"/>\n", src, alt));
                }
            }
        } else if !trimmed.is_empty() {
            body.push_str(&format!("<p>{}</p>\n", trimmed));
        }
    }
    if in_list {
        body.push_str("</ul>\n");
    }
    if in_table {
        body.push_str("</table>\n");
    }
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <title>EDA Report</title>\
         <style>body{{font-family:sans-serif;max-width:60em;margin:2em auto}}\
         table{{border-collapse:collapse}}td{{border:1px solid #ccc;padding:4px 8px}}\
         img{{max-width:100%}}</style></head><body>\n{}</body></html>\n",
        body
    )
}

#[async_trait]
impl StageHandler for Reporter {
    fn id(&self) -> StageId {
        StageId::Report
    }

    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput> {
        let markdown = render_markdown(&ctx)?;
        let html = render_html(&markdown);

        let md_path = ctx.output_dir.join("report.md");
        tokio::fs::write(&md_path, &markdown)
            .await
            .with_context(|| format!("writing {}", md_path.display()))?;
        let html_path = ctx.output_dir.join("report.html");
        tokio::fs::write(&html_path, &html)
            .await
            .with_context(|| format!("writing {}", html_path.display()))?;

        Ok(StageOutput {
            stage: StageId::Report,
            summary: "Report rendered as markdown and HTML".to_string(),
            details: json!({
                "sections": [
                    "Executive Summary",
                    "Dataset Overview",
                    "Data Quality & Cleaning",
                    "Decision Audit Trail",
                    "Cleaning Impact",
                    "Statistical Analysis",
                    "Model Recommendation",
                    "XAI Insights",
                    "Next Steps",
                ],
            }),
            files: vec![PathBuf::from("report.md"), PathBuf::from("report.html")],
        })
    }
}
