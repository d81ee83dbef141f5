// Progress reporting for long-running remote work (installation polling, release downloads)
//
// The terminal bar keeps a fixed-width label column so the bar itself does not jump around
// as stage names change, and it re-reads the terminal width on every update so a resized
// window does not wrap the line.

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

pub const LABEL_WIDTH: usize = 30;
pub const DEFAULT_MAX_WIDTH: u16 = 100;

// " [" + "] " + "100%"
const DECORATION_WIDTH: u16 = 8;
const MIN_BAR_WIDTH: u16 = 10;

pub trait ProgressReporter: Send {
    fn start(&mut self, label: &str);
    /// `percent` is already clamped to `0..=100`.
    fn update(&mut self, percent: u8, label: &str);
    /// A one-off line outside the bar (a finished wizard step, for example).
    fn step(&mut self, message: &str);
    fn finish(&mut self);
    /// Stop reporting after a failure, leaving the last position visible.
    fn abandon(&mut self) {
        self.finish();
    }
}

/// Truncate or pad `label` to exactly `LABEL_WIDTH` characters.
pub fn format_label(label: &str) -> String {
    let truncated: String = label.chars().take(LABEL_WIDTH).collect();
    format!("{:<width$}", truncated, width = LABEL_WIDTH)
}

/// Width left for the bar once the label column and decorations are taken out of the line.
pub fn bar_width(terminal_width: u16, max_width: u16) -> u16 {
    let line = terminal_width.min(max_width);
    line.saturating_sub(LABEL_WIDTH as u16 + DECORATION_WIDTH)
        .max(MIN_BAR_WIDTH)
}

fn bar_style(width: u16) -> ProgressStyle {
    ProgressStyle::with_template(&format!("{{msg}} [{{bar:{}}}] {{percent:>3}}%", width))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("# ")
}

pub struct TerminalProgress {
    bar: Option<ProgressBar>,
    max_width: u16,
    current_width: u16,
    position: u64,
}

impl TerminalProgress {
    pub fn new(max_width: u16) -> Self {
        Self {
            bar: None,
            max_width,
            current_width: 0,
            position: 0,
        }
    }

    fn terminal_width(&self) -> u16 {
        crossterm::terminal::size()
            .map(|(cols, _rows)| cols)
            .unwrap_or(self.max_width)
    }

    fn reclamp(&mut self) {
        let width = bar_width(self.terminal_width(), self.max_width);
        if width != self.current_width {
            if let Some(bar) = &self.bar {
                bar.set_style(bar_style(width));
            }
            self.current_width = width;
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WIDTH)
    }
}

impl ProgressReporter for TerminalProgress {
    fn start(&mut self, label: &str) {
        let bar = ProgressBar::new(100);
        self.current_width = 0;
        self.position = 0;
        bar.set_message(format_label(label));
        self.bar = Some(bar);
        self.reclamp();
    }

    fn update(&mut self, percent: u8, label: &str) {
        if self.bar.is_none() {
            self.start(label);
        }
        self.reclamp();
        // The remote stages report their own percentages; a later stage starting at a lower
        // number must not move the bar backwards.
        self.position = self.position.max(u64::from(percent.min(100)));
        if let Some(bar) = &self.bar {
            bar.set_message(format_label(label));
            bar.set_position(self.position);
        }
    }

    fn step(&mut self, message: &str) {
        match &self.bar {
            Some(bar) => bar.println(message),
            None => println!("{}", message),
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.set_position(self.position);
            bar.finish();
        }
    }

    fn abandon(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

/// Progress written to the log, for runs without a terminal.
#[derive(Debug, Default)]
pub struct LogProgress {
    last: Option<(u8, String)>,
}

impl ProgressReporter for LogProgress {
    fn start(&mut self, label: &str) {
        self.last = None;
        info!("[PHASE: progress] [STEP: start] {}", label);
    }

    fn update(&mut self, percent: u8, label: &str) {
        let current = (percent, label.to_string());
        if self.last.as_ref() == Some(&current) {
            return;
        }
        info!("[PHASE: progress] [STEP: update] {:>3}% {}", percent, label);
        self.last = Some(current);
    }

    fn step(&mut self, message: &str) {
        info!("[PHASE: progress] [STEP: step] {}", message);
    }

    fn finish(&mut self) {
        info!("[PHASE: progress] [STEP: finish] Done");
    }

    fn abandon(&mut self) {
        match self.last.take() {
            Some((percent, label)) => {
                warn!("[PHASE: progress] [STEP: abandon] Stopped at {}% ({})", percent, label)
            }
            None => warn!("[PHASE: progress] [STEP: abandon] Stopped before any progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_padded_and_truncated() {
        assert_eq!(format_label("Installing").len(), LABEL_WIDTH);
        assert!(format_label("Installing").starts_with("Installing "));

        let long = "Inserting default data for the Forums application";
        let label = format_label(long);
        assert_eq!(label.chars().count(), LABEL_WIDTH);
        assert_eq!(label, "Inserting default data for the");
    }

    #[test]
    fn label_counts_characters_not_bytes() {
        let label = format_label("Überprüfung");
        assert_eq!(label.chars().count(), LABEL_WIDTH);
    }

    #[test]
    fn bar_width_is_clamped_to_max_width() {
        assert_eq!(bar_width(200, 100), 100 - 38);
        assert_eq!(bar_width(80, 100), 80 - 38);
        assert_eq!(bar_width(20, 100), MIN_BAR_WIDTH);
    }

    #[test]
    fn terminal_position_never_moves_backwards() {
        let mut progress = TerminalProgress::new(DEFAULT_MAX_WIDTH);
        progress.start("Installing");
        progress.update(40, "Step 1");
        progress.update(10, "Step 2");
        assert_eq!(progress.position, 40);
        progress.update(255, "Done");
        assert_eq!(progress.position, 100);
        progress.finish();
        assert!(progress.bar.is_none());
    }

    #[test]
    fn abandoned_bar_is_released() {
        let mut progress = TerminalProgress::new(DEFAULT_MAX_WIDTH);
        progress.start("Downloading");
        progress.update(30, "Downloading");
        progress.abandon();
        assert!(progress.bar.is_none());
        assert_eq!(progress.position, 30);
    }

    #[test]
    fn log_progress_skips_repeats() {
        let mut progress = LogProgress::default();
        progress.update(10, "Step 1");
        progress.update(10, "Step 1");
        assert_eq!(progress.last, Some((10, "Step 1".to_string())));
    }
}
