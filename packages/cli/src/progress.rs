//! Terminal progress and logging.
//!
//! Log lines go through `indicatif-log-bridge` so they are printed above the
//! progress bar instead of tearing through it.

use std::sync::Arc;
use std::time::Duration;

use backcountry_scraper::progress::ProgressCallback;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// An `indicatif` [`ProgressBar`] that implements [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a bar that spins while the search page is being read and
    /// turns into a counted bar once the number of reports is known.
    #[must_use]
    pub fn reports_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::spinner(multi, message))
    }

    fn spinner(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
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
}

/// Installs `pretty_env_logger` behind an `indicatif` bridge and returns the
/// [`MultiProgress`] that progress bars must be added to.
///
/// The filter is read from `RUST_LOG`.
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when called twice (tests).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_tracks_total_and_position() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let bar = multi.add(ProgressBar::new_spinner());
        let progress = IndicatifProgress {
            bar: bar.clone(),
            bar_style: ProgressStyle::default_bar(),
        };

        progress.set_total(3);
        progress.inc(1);
        progress.inc(1);
        assert_eq!(bar.length(), Some(3));
        assert_eq!(bar.position(), 2);

        progress.finish("done".to_owned());
        assert!(bar.is_finished());
    }

    #[test]
    fn reports_bar_spins_until_total_is_known() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::spinner(&multi, "Scraping 2025-01-15");
        assert_eq!(progress.bar.length(), None);
        assert_eq!(progress.bar.message(), "Scraping 2025-01-15");

        std::thread::sleep(Duration::from_millis(250));
        assert!(!progress.bar.is_finished());

        progress.set_total(2);
        progress.inc(2);
        assert_eq!(progress.bar.length(), Some(2));
        progress.finish("Collected 2 reports".to_owned());
        assert!(progress.bar.is_finished());
    }
}
