use heapless::Vec;

use super::{StatusIndicator, StatusPattern};

/// Status indicator that remembers what it was asked to show.
///
/// Stands in for the LED in host tests.
#[derive(Debug, Default)]
pub struct RecordingStatus<const N: usize> {
    shown: Vec<StatusPattern, N>,
}

impl<const N: usize> RecordingStatus<N> {
    pub const fn new() -> Self {
        Self { shown: Vec::new() }
    }

    pub fn shown(&self) -> &[StatusPattern] {
        &self.shown
    }

    pub fn count(&self, pattern: StatusPattern) -> usize {
        self.shown.iter().filter(|&&p| p == pattern).count()
    }
}

impl<const N: usize> StatusIndicator for RecordingStatus<N> {
    fn show(&mut self, pattern: StatusPattern) {
        // Oldest entries win once full.
        let _ = self.shown.push(pattern);
    }
}
