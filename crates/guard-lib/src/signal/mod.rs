//! Biosignal sources and fixed-size windowing
//!
//! Samples are loaded once from an append-only source (file, asset or
//! stream) and sliced into fixed-length windows for the classifier.

mod source;
mod window;

pub use source::{SignalError, SignalSource};
pub use window::{EndOfStream, SignalWindow, WindowDriver, DEFAULT_WINDOW_SIZE};
