//! Progress indicators for network steps
//!
//! An [`Activity`] spins while an archive downloads or a repository is cloned
//! or pulled, and disappears when dropped, on failure as well as success.
//! Downloads with a known size switch to a byte bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const TICK: Duration = Duration::from_millis(80);

/// A running step shown under the current `sub_action` line
pub struct Activity {
    bar: ProgressBar,
}

impl Activity {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("     {spinner:.cyan} {msg}") {
            bar.set_style(style.tick_chars(TICKS));
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(TICK);
        Self { bar }
    }

    /// Switch to a byte bar for a transfer of `total` bytes
    pub fn expect_bytes(&self, total: u64) {
        self.bar.set_length(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("     {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {bytes}/{total_bytes}")
        {
            self.bar.set_style(style.progress_chars("━╸━"));
        }
    }

    pub fn transferred(&self, bytes: u64) {
        self.bar.set_position(bytes);
    }
}

impl Drop for Activity {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Run `step` while `message` spins.
pub fn during<T, E>(message: &str, step: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    let _activity = Activity::start(message);
    step()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_bar_tracks_transfer() {
        let activity = Activity::start("downloading openerp-7.0-1.tar.gz");
        activity.expect_bytes(1000);
        activity.transferred(500);
        assert_eq!(activity.bar.length(), Some(1000));
        assert_eq!(activity.bar.position(), 500);
    }

    #[test]
    fn test_cleared_when_dropped() {
        let activity = Activity::start("cloning addons");
        let bar = activity.bar.clone();
        assert!(!bar.is_finished());
        drop(activity);
        assert!(bar.is_finished());
    }

    #[test]
    fn test_during_passes_errors_through() {
        let ok: Result<u32, String> = during("pulling", || Ok(3));
        assert_eq!(ok, Ok(3));
        let err: Result<u32, String> = during("pulling", || Err("offline".into()));
        assert_eq!(err.unwrap_err(), "offline");
    }
}
