//! Progress bar over training episodes.

use indicatif::{ProgressBar, ProgressStyle};

use trainer::MetricsSink;

/// Advances an indicatif bar per episode and shows the active-search count.
pub struct ProgressSink {
    pb: ProgressBar,
}

impl ProgressSink {
    pub fn new(num_episodes: usize) -> Self {
        let pb = ProgressBar::new(num_episodes as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { pb }
    }
}

impl MetricsSink for ProgressSink {
    fn scalar(&mut self, name: &str, value: f64, _step: usize) {
        if name == "active_search" {
            self.pb.set_message(format!("best={value}"));
        }
    }

    fn on_episode(&mut self, episode: usize, total: usize) {
        self.pb.set_position(episode as u64);
        if episode == total {
            self.pb.finish_with_message("done");
        }
    }
}
