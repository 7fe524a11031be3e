//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements [`ProgressCallback`]
//! to display progress bars on stderr while a run is in flight.
//!
//! The finder reports three phases:
//! - `loading`: one step per mailbox
//! - `hashing`: one step per parsed mail
//! - `validating`: one step per set with more than one member

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for the phases of a deduplication run.
///
/// Implement this trait to receive progress updates while mails are loaded,
/// hashed and validated.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (`loading`, `hashing`, `validating`)
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `item` - Mailbox path, message reference or short fingerprint
    fn on_progress(&self, current: usize, item: &str);

    /// Called when a mail has been hashed, with its body size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    loading: Mutex<Option<ProgressBar>>,
    hashing: Mutex<Option<ProgressBar>>,
    validating: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use maildedup::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            loading: Mutex::new(None),
            hashing: Mutex::new(None),
            validating: Mutex::new(None),
            quiet,
        }
    }

    fn slot(&self, phase: &str) -> Option<&Mutex<Option<ProgressBar>>> {
        match phase {
            "loading" => Some(&self.loading),
            "hashing" => Some(&self.hashing),
            "validating" => Some(&self.validating),
            _ => None,
        }
    }

    /// The bar of the latest phase still running.
    fn active(&self) -> Option<ProgressBar> {
        [&self.validating, &self.hashing, &self.loading]
            .into_iter()
            .find_map(|slot| slot.lock().ok().and_then(|bar| bar.clone()))
    }

    fn style(phase: &str) -> ProgressStyle {
        let template = match phase {
            "loading" => "{spinner:.green} {msg} [{elapsed_precise}] {pos}/{len} mailboxes",
            "hashing" => {
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} {per_sec}"
            }
            _ => "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg}",
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let Some(slot) = self.slot(phase) else {
            return;
        };

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::style(phase));
        let message = match phase {
            "loading" => {
                pb.enable_steady_tick(Duration::from_millis(100));
                "Loading mailboxes"
            }
            "hashing" => "Hashing",
            _ => "Validating sets",
        };
        pb.set_message(message);
        if let Ok(mut bar) = slot.lock() {
            *bar = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, item: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(item, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let finished = self
            .slot(phase)
            .and_then(|slot| slot.lock().ok().and_then(|mut bar| bar.take()));
        if let Some(pb) = finished {
            pb.finish_with_message(format!("{phase} complete"));
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active() {
            pb.set_message(message.to_string());
        }
    }
}

/// Truncate a path or message reference for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let len = file_name.chars().count();
    if len + 4 > max_len {
        let tail: String = file_name.chars().skip(len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
