#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the batch tools.
//!
//! Provides an `indicatif`-backed progress bar behind the
//! [`ProgressCallback`] trait, plus [`init_logger`] which sets up
//! `indicatif-log-bridge` so that `log::info!` and friends are suspended
//! while progress bars redraw.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use oss_batch::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Log filter used with `--verbose`: debug output from this workspace's
/// crates only.
const VERBOSE_FILTER: &str = "info,oss_batch=debug";

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a progress bar for a batch run. The total grows page by
    /// page, so it starts as a spinner and transitions to a full bar with
    /// percentage/ETA on the first `set_total()`.
    #[must_use]
    pub fn batch_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        Arc::new(Self::styled(bar, message))
    }

    fn styled(bar: ProgressBar, message: &str) -> Self {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.yellow/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        if self.bar.length().is_none() {
            // Switch from spinner to bar style now that we know the total.
            self.bar.set_style(self.bar_style.clone());
        }
        self.bar.set_length(total);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// `RUST_LOG` is honored when set; otherwise the level is `info`. With
/// `verbose`, this workspace's crates log at `debug` regardless of
/// `RUST_LOG`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger(verbose: bool) -> MultiProgress {
    let multi = MultiProgress::new();

    let filters = log_filters(verbose, std::env::var("RUST_LOG").ok());
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}

fn log_filters(verbose: bool, rust_log: Option<String>) -> String {
    if verbose {
        return VERBOSE_FILTER.to_string();
    }
    rust_log
        .filter(|filters| !filters.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growing_total_keeps_position() {
        let progress = IndicatifProgress::styled(ProgressBar::hidden(), "test");

        progress.set_total(3);
        progress.inc(2);
        progress.set_total(5);

        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.bar.length(), Some(5));
    }

    #[test]
    fn filters_prefer_verbose_then_rust_log() {
        assert_eq!(log_filters(true, Some("warn".to_string())), VERBOSE_FILTER);
        assert_eq!(log_filters(false, Some("warn".to_string())), "warn");
        assert_eq!(log_filters(false, Some(" ".to_string())), DEFAULT_FILTER);
        assert_eq!(log_filters(false, None), DEFAULT_FILTER);
    }
}
