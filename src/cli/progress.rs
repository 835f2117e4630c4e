//! Epoch progress bar for training runs

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use stockguard::classifier::{EpochObserver, EpochStats, TracingObserver, TrainReport};

fn create_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} epochs {msg}")
        .map(|s| s.progress_chars("█▓▒░  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Draws one tick per epoch and forwards epochs to the tracing log
pub struct ProgressObserver {
    bar: ProgressBar,
    log: TracingObserver,
}

impl ProgressObserver {
    pub fn new(epochs: usize) -> Self {
        let bar = ProgressBar::new(epochs as u64);
        bar.set_style(create_bar_style());
        Self {
            bar,
            log: TracingObserver,
        }
    }
}

impl EpochObserver for ProgressObserver {
    fn on_epoch(&mut self, stats: &EpochStats) {
        let log = &mut self.log;
        self.bar.suspend(|| log.on_epoch(stats));
        let msg = match stats.val_loss {
            Some(val) => format!("loss {:.4} / val {:.4}", stats.train_loss, val),
            None => format!("loss {:.4}", stats.train_loss),
        };
        self.bar.set_message(msg);
        self.bar.inc(1);
    }

    fn on_finish(&mut self, report: &TrainReport) {
        self.bar.finish_with_message(format!(
            "{}Trained {} epochs",
            style("✓ ").green(),
            report.epochs_run
        ));
    }
}
