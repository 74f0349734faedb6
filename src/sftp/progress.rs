//! Transfer progress accounting and terminal rendering
//!
//! Accounting always happens; drawing only when stderr is a terminal
//! (indicatif hides the bar otherwise).

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// At most one redraw per 100ms
const REFRESH_HZ: u8 = 10;

const TEMPLATE: &str = "{msg} [{bar:24}] {percent:>3}% {bytes}/{total_bytes} {bytes_per_sec}";

fn transfer_style() -> ProgressStyle {
    ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Byte-accounting progress bar for one planned transfer batch
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Progress drawn on stderr. Renders the first frame immediately.
    pub fn new(total_bytes: u64, label: impl Into<String>) -> Self {
        Self::with_target(
            total_bytes,
            label,
            ProgressDrawTarget::stderr_with_hz(REFRESH_HZ),
        )
    }

    /// Accounting only, nothing is drawn
    pub fn hidden(total_bytes: u64, label: impl Into<String>) -> Self {
        Self::with_target(total_bytes, label, ProgressDrawTarget::hidden())
    }

    pub fn with_target(
        total_bytes: u64,
        label: impl Into<String>,
        target: ProgressDrawTarget,
    ) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total_bytes), target)
            .with_style(transfer_style())
            .with_message(label.into());
        bar.tick();
        Self { bar }
    }

    pub fn total_bytes(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.bar.position()
    }

    /// Completion percentage (0-100); an empty batch counts as complete
    pub fn percentage(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            100.0
        } else {
            (self.transferred_bytes() as f64 / total as f64 * 100.0).min(100.0)
        }
    }

    /// Account `bytes` more; redraws are rate limited by the draw target
    pub fn add(&mut self, bytes: u64) {
        self.bar.inc(bytes);
    }

    /// Force the final frame and end the line
    pub fn finish(self) {
        self.bar.finish();
    }
}
