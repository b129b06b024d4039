//! Fixed-Capacity Ring Buffer
//!
//! Provides a bounded FIFO window for per-frame sample history. Once the
//! buffer is full, every push evicts the oldest sample.

mod buffer;

pub use buffer::RingBuffer;
