//! Window driver over a signal source

use super::SignalSource;
use std::sync::Arc;
use thiserror::Error;

/// Samples per classifier window (one second of ECG at 360 Hz)
pub const DEFAULT_WINDOW_SIZE: usize = 360;

/// Fewer than a full window of samples remain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("end of signal stream")]
pub struct EndOfStream;

/// Contiguous, fixed-length slice of the source
#[derive(Debug, Clone)]
pub struct SignalWindow {
    samples: Arc<[f32]>,
    start: usize,
    len: usize,
}

impl SignalWindow {
    pub fn samples(&self) -> &[f32] {
        &self.samples[self.start..self.start + self.len]
    }

    /// Offset of the first sample in the source
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Cursor over a [`SignalSource`] yielding windows in source order
///
/// Deterministic and replayable: two drivers over the same source yield
/// identical windows.
#[derive(Debug, Clone)]
pub struct WindowDriver {
    source: SignalSource,
    cursor: usize,
    window_size: usize,
    stride: usize,
}

impl WindowDriver {
    /// Non-overlapping windows of `window_size` samples
    pub fn new(source: SignalSource, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            source,
            cursor: 0,
            window_size,
            stride: window_size,
        }
    }

    /// Advance by `stride` instead of a full window (overlapping when smaller)
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride.max(1);
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of samples not yet consumed by the cursor
    pub fn remaining(&self) -> usize {
        self.source.len().saturating_sub(self.cursor)
    }

    /// Next window starting at the cursor
    ///
    /// A trailing remainder shorter than the window is never returned.
    pub fn next_window(&mut self) -> Result<SignalWindow, EndOfStream> {
        if self.remaining() < self.window_size {
            return Err(EndOfStream);
        }

        let window = SignalWindow {
            samples: self.source.shared(),
            start: self.cursor,
            len: self.window_size,
        };
        self.cursor += self.stride;
        Ok(window)
    }
}

impl Iterator for WindowDriver {
    type Item = SignalWindow;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> SignalSource {
        SignalSource::from_samples((0..n).map(|i| i as f32).collect())
    }

    #[test]
    fn test_window_count_is_floor_of_length() {
        for n in [0, 1, 359, 360, 361, 719, 720, 1000, 3600] {
            let driver = WindowDriver::new(ramp(n), DEFAULT_WINDOW_SIZE);
            let windows: Vec<_> = driver.collect();
            assert_eq!(windows.len(), n / DEFAULT_WINDOW_SIZE, "n = {}", n);
            assert!(windows.iter().all(|w| w.len() == DEFAULT_WINDOW_SIZE));
        }
    }

    #[test]
    fn test_windows_are_contiguous_and_ordered() {
        let mut driver = WindowDriver::new(ramp(1000), DEFAULT_WINDOW_SIZE);

        let first = driver.next_window().unwrap();
        let second = driver.next_window().unwrap();

        assert_eq!(first.start(), 0);
        assert_eq!(first.samples()[0], 0.0);
        assert_eq!(first.samples()[359], 359.0);
        assert_eq!(second.start(), 360);
        assert_eq!(second.samples()[0], 360.0);

        // 280 samples remain, not enough for a third window
        assert_eq!(driver.remaining(), 280);
        assert_eq!(driver.next_window().unwrap_err(), EndOfStream);
        // Cursor does not move on end of stream
        assert_eq!(driver.cursor(), 720);
    }

    #[test]
    fn test_overlapping_stride() {
        let driver = WindowDriver::new(ramp(20), 10).with_stride(5);
        let starts: Vec<usize> = driver.map(|w| w.start()).collect();
        assert_eq!(starts, vec![0, 5, 10]);
    }

    #[test]
    fn test_replayable() {
        let source = ramp(1080);
        let a: Vec<Vec<f32>> = WindowDriver::new(source.clone(), 360)
            .map(|w| w.samples().to_vec())
            .collect();
        let b: Vec<Vec<f32>> = WindowDriver::new(source, 360)
            .map(|w| w.samples().to_vec())
            .collect();
        assert_eq!(a, b);
    }
}
