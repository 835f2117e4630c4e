//! Text (terminal) reporter with colors and formatting

use super::TrainingSummary;
use crate::classifier::{ClassMetrics, ClassificationReport};
use crate::models::{PredictionResult, RiskLevel};
use crate::pipeline::DatasetStats;
use console::style;

fn risk_cell(level: RiskLevel) -> String {
    let label = format!("{:<8}", level.to_string());
    match level {
        RiskLevel::High => style(label).red().bold().to_string(),
        RiskLevel::Elevated => style(label).yellow().to_string(),
        RiskLevel::Low => style(label).green().to_string(),
    }
}

fn days_cell(days: Option<f64>) -> String {
    match days {
        Some(d) => format!("{d:.1}"),
        None => "no sales".to_string(),
    }
}

fn metric(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Prediction table, one row per result in the given order
pub fn render_predictions(results: &[PredictionResult]) -> String {
    let mut out = String::new();
    let flagged = results.iter().filter(|r| r.predicted_stockout).count();
    let high = results
        .iter()
        .filter(|r| r.risk_level == RiskLevel::High)
        .count();

    out.push_str(&format!("\n{}\n", style("Stockout Risk").bold()));
    out.push_str(&format!(
        "{}\n",
        style("──────────────────────────────────────").dim()
    ));
    out.push_str(&format!(
        "Items: {}  Predicted stockouts: {}  High risk: {}\n\n",
        results.len(),
        flagged,
        high
    ));

    if results.is_empty() {
        out.push_str("No records to score.\n");
        return out;
    }

    out.push_str(&format!(
        "{}\n",
        style(format!(
            "{:<12} {:<24} {:>9} {:>9} {:>10} {:>7}  {:<8}",
            "PRODUCT", "NAME", "STOCK", "SALES", "DAYS LEFT", "PROB", "RISK"
        ))
        .bold()
    ));
    for r in results {
        out.push_str(&format!(
            "{:<12} {:<24} {:>9.1} {:>9.1} {:>10} {:>7.3}  {}\n",
            truncate(&r.product_id, 12),
            truncate(&r.product_name, 24),
            r.stock_quantity,
            r.sales_volume,
            days_cell(r.days_until_stockout),
            r.predicted_probability,
            risk_cell(r.risk_level)
        ));
    }
    out
}

fn class_row(name: &str, m: &ClassMetrics) -> String {
    format!(
        "{:>12} {:>10} {:>10} {:>10} {:>10}\n",
        name,
        metric(m.precision),
        metric(m.recall),
        metric(m.f1),
        m.support
    )
}

/// Per-class precision/recall/F1 table
pub fn render_classification_report(report: &ClassificationReport, accuracy: f64) -> String {
    let support = report.no_stockout.support + report.stockout.support;
    let mut out = format!(
        "{:>12} {:>10} {:>10} {:>10} {:>10}\n\n",
        "", "precision", "recall", "f1-score", "support"
    );
    out.push_str(&class_row("no_stockout", &report.no_stockout));
    out.push_str(&class_row("stockout", &report.stockout));
    out.push('\n');
    out.push_str(&format!(
        "{:>12} {:>10} {:>10} {:>10.2} {:>10}\n",
        "accuracy", "", "", accuracy, support
    ));
    for (name, avg) in [("macro avg", &report.macro_avg), ("weighted avg", &report.weighted_avg)] {
        out.push_str(&format!(
            "{:>12} {:>10} {:>10} {:>10} {:>10}\n",
            name,
            metric(avg.precision),
            metric(avg.recall),
            metric(avg.f1),
            support
        ));
    }
    out
}

pub fn render_training(summary: &TrainingSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", style("Training Complete").bold()));
    out.push_str(&format!(
        "{}\n",
        style("──────────────────────────────────────").dim()
    ));
    out.push_str(&format!(
        "Model: {:?}  Records: {} ({} train / {} eval)  Epochs: {}{}\n",
        summary.model_kind,
        summary.records,
        summary.train_size,
        summary.eval_size,
        summary.epochs_run,
        if summary.stopped_early {
            style(" (stopped early)").yellow().to_string()
        } else {
            String::new()
        }
    ));
    out.push_str(&format!(
        "Final loss: train {}  validation {}\n",
        metric_loss(summary.final_train_loss),
        metric_loss(summary.final_val_loss)
    ));
    out.push_str(&format!(
        "Accuracy: {}  (threshold {:.2})\n\n",
        style(format!("{:.3}", summary.accuracy)).bold(),
        summary.threshold
    ));

    out.push_str(&format!("{}\n", style("CLASSIFICATION REPORT").bold()));
    out.push_str(&render_classification_report(&summary.report, summary.accuracy));

    let c = &summary.confusion;
    out.push_str(&format!(
        "\n{}\n  TP {}  FP {}  TN {}  FN {}\n",
        style("CONFUSION MATRIX").bold(),
        c.true_positives,
        c.false_positives,
        c.true_negatives,
        c.false_negatives
    ));

    if !summary.sample_predictions.is_empty() {
        out.push_str(&format!("\n{}", style("SAMPLE PREDICTIONS").bold()));
        out.push_str(&render_predictions(&summary.sample_predictions));
    }
    out
}

fn metric_loss(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

pub fn render_dataset_stats(stats: &DatasetStats) -> String {
    let mut out = format!("\n{}\n", style("Dataset").bold());
    out.push_str(&format!("  Records:        {}\n", stats.records));
    out.push_str(&format!(
        "  Stockout:       {} ({:.1}%)\n",
        stats.stockout,
        stats.stockout_rate * 100.0
    ));
    out.push_str(&format!("  No stockout:    {}\n", stats.no_stockout));
    out.push_str(&format!("  Zero sales:     {}\n", stats.zero_sales));
    out.push_str(&format!(
        "  Mean runway:    {}\n",
        stats
            .mean_days_until_stockout
            .map_or_else(|| "n/a".to_string(), |d| format!("{d:.1} days"))
    ));
    out
}
