//! The building blocks the `SyncEngine` is assembled from.
//!
//! Each component owns one concern: finding the nearest sample, limiting the
//! rate of pointer input, fanning the cursor out to views, and driving the
//! viewport. They share session state only through a `SyncContext`.

pub mod broadcaster;
pub mod consumer;
pub mod limiter;
pub mod resolver;
pub mod scrubber;
