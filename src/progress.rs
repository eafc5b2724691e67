use atomic_counter::{AtomicCounter, RelaxedCounter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A thread-safe progress bar.
///
/// Wraps an indicatif bar behind a relaxed atomic counter so worker threads
/// can tick without contending on the bar itself; a background thread
/// flushes the counter into the bar at the refresh rate.
pub struct Bar {
    counter: Arc<RelaxedCounter>,
    pub pbar: Arc<ProgressBar>,
}

impl Bar {
    /// Creates a hidden bar with a size, refresh rate in milliseconds and a
    /// prefix.
    pub fn new(len: u64, refresh_rate: u64, prefix: String) -> Self {
        let pbar = ProgressBar::hidden();
        pbar.set_length(len);
        pbar.set_prefix(prefix);
        pbar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix}[{bar:40}] [{elapsed_precise}] {percent:>3}%")
                .progress_chars("=>-"),
        );
        let pbar = Arc::new(pbar);
        let flush_bar = pbar.clone();
        let counter = Arc::new(RelaxedCounter::new(0));
        let flush_counter = counter.clone();
        thread::spawn(move || {
            while Arc::strong_count(&flush_counter) > 1 && !flush_bar.is_finished() {
                flush_bar.set_position(flush_counter.get() as u64);
                thread::sleep(Duration::from_millis(refresh_rate));
            }
        });
        Self { counter, pbar }
    }

    /// Creates a bar drawn to stderr.
    pub fn visible(len: u64, refresh_rate: u64, prefix: String) -> Self {
        let bar = Self::new(len, refresh_rate, prefix);
        bar.pbar.set_draw_target(ProgressDrawTarget::stderr());
        bar
    }

    /// Advance the bar by one unit of work.
    pub fn tick(&self) {
        self.counter.inc();
    }
}

impl Drop for Bar {
    /// Clear the bar when dropped so partial bars don't linger on screen.
    fn drop(&mut self) {
        if !self.pbar.is_finished() {
            self.pbar.set_position(self.counter.get() as u64);
            self.pbar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_new() {
        let bar = Bar::new(10, 1, String::new());
        assert_eq!(bar.counter.get(), 0);
    }

    #[test]
    fn progress_tick() {
        let bar = Bar::new(10, 1, String::new());
        bar.tick();
        bar.tick();
        assert_eq!(bar.counter.get(), 2)
    }
}
