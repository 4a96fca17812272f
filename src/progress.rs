//! Console feedback while symbols are being brought up
//!
//! Startup resolves filters, opens a user-data session and fetches a
//! snapshot for every symbol; these bars show where each one stands.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_STRINGS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_STRINGS)
}

/// Spinner for quick operations
pub struct Spinner {
    pub spinner: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style("{spinner:.green} {msg}"));
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(message.to_string());

        Self { spinner }
    }

    pub fn update(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.spinner.finish_with_message(format!("✅ {}", message));
    }

    pub fn finish_with_error(&self, message: &str) {
        self.spinner.finish_with_message(format!("❌ {}", message));
    }
}

/// One spinner line per symbol during startup.
pub struct StartupProgress {
    #[allow(dead_code)]
    multi: MultiProgress,
    bars: Vec<(String, ProgressBar)>,
}

impl StartupProgress {
    pub fn new(symbols: &[String]) -> Self {
        let multi = MultiProgress::new();
        let bars = symbols
            .iter()
            .map(|symbol| {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(spinner_style(&format!("{{spinner:.green}} {:<12} {{msg}}", symbol)));
                pb.enable_steady_tick(Duration::from_millis(100));
                pb.set_message("⏳ waiting");
                (symbol.clone(), pb)
            })
            .collect();

        Self { multi, bars }
    }

    fn bar(&self, symbol: &str) -> Option<&ProgressBar> {
        self.bars.iter().find(|(s, _)| s == symbol).map(|(_, pb)| pb)
    }

    pub fn update(&self, symbol: &str, message: &str) {
        if let Some(pb) = self.bar(symbol) {
            pb.set_message(message.to_string());
        }
    }

    pub fn ready(&self, symbol: &str) {
        if let Some(pb) = self.bar(symbol) {
            pb.finish_with_message("✅ ready");
        }
    }

    pub fn failed(&self, symbol: &str, reason: &str) {
        if let Some(pb) = self.bar(symbol) {
            pb.finish_with_message(format!("❌ {}", reason));
        }
    }

    /// Clear anything still spinning.
    pub fn finish_all(&self) {
        for (_, pb) in &self.bars {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
    }
}
