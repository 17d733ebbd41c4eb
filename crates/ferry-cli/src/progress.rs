//! Transfer progress display with progress bars.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use ferry_core::ProgressSink;

/// Progress rendering for one transfer session.
pub struct CliProgress {
    bar: Option<ProgressBar>,
}

impl CliProgress {
    /// Create an idle progress display; the bar appears once the
    /// manifest totals are known.
    #[must_use]
    pub fn new() -> Self {
        Self { bar: None }
    }

    /// Finish with a closing message.
    pub fn finish(&mut self, msg: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(msg.to_string());
        } else {
            println!("{msg}");
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for CliProgress {
    fn session_ready(&mut self, connection_string: &str) {
        println!(
            "Share this connection string with the receiver:\n\n    {}\n",
            style(connection_string).bold().cyan()
        );
        println!("Waiting for the receiver to connect...");
    }

    fn batch_started(&mut self, total_files: u64, total_bytes: u64) {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg}\n[{elapsed}] {bar:38.green} {bytes} of {total_bytes} at {bytes_per_sec}, eta {eta}",
                )
                .expect("static progress template")
                .progress_chars("=> "),
        );
        bar.set_message(format!(
            "Transferring {total_files} file(s), {}",
            format_bytes(total_bytes)
        ));
        self.bar = Some(bar);
    }

    fn file_started(&mut self, path: &str, _size: u64) {
        if let Some(bar) = &self.bar {
            bar.set_message(path.to_string());
        }
    }

    fn bytes_transferred(&mut self, n: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(n);
        }
    }

    fn file_finished(&mut self, path: &str) {
        tracing::debug!("finished {path}");
    }

    fn retry_scheduled(&mut self, paths: &[String]) {
        if let Some(bar) = &self.bar {
            bar.println(format!(
                "{} retrying {} file(s)",
                style("!").yellow().bold(),
                paths.len()
            ));
        }
    }
}

/// Render a byte count with binary units.
///
/// Exact below 1 KiB, one decimal above (`512 B`, `1.5 KiB`, `3.0 GiB`).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    // log2(bytes) / 10 picks the unit, clamped at TiB.
    let exp = usize::min(((63 - bytes.leading_zeros()) / 10) as usize, UNITS.len());
    let value = bytes as f64 / (1u64 << (10 * exp)) as f64;
    format!("{value:.1} {}", UNITS[exp - 1])
}
