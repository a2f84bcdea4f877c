//! Terminal presentation of the live event stream.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::events::{PipelineEvent, Severity};

/// Prints pipeline events as they arrive, with a spinner between them.
pub struct RunPrinter {
    spinner: ProgressBar,
    verbose: bool,
}

impl RunPrinter {
    pub fn new(verbose: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { spinner, verbose }
    }

    pub fn print_event(&self, event: &PipelineEvent) {
        let phase = style(format!("[{}]", event.phase)).dim();
        let line = match event.severity {
            Severity::Info => format!("{} {}", phase, event.message),
            Severity::Warning => format!("{} {}", phase, style(&event.message).yellow()),
            Severity::Error => format!("{} {}", phase, style(&event.message).red().bold()),
        };
        // Phase transitions are noise unless asked for
        if !self.verbose && event.message.starts_with("phase:") {
            self.spinner.set_message(event.message.clone());
            return;
        }
        self.spinner.println(line);
        self.spinner.set_message(event.message.clone());
    }

    pub fn finish(&self, message: &str) {
        self.spinner.finish_with_message(message.to_string());
    }
}
