// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Open-time tunables for each driver family, re-exported from one
//! place for discoverability.
//!
//! This crate keeps no persisted configuration on disk. The teacher's
//! `util::config::State` round-trips a JSON file through
//! `serde`/`dirs_next` because an interactive CLI needs to remember a
//! choice across runs; a device-driver core has no such session, so
//! [`StreamConfig`], [`EnumerationConfig`], and [`RetryPolicy`] are
//! plain in-memory `Default` values a caller constructs fresh each time
//! it opens a device.

pub use crate::driver::enumeration::EnumerationConfig;
pub use crate::driver::stream::StreamConfig;
pub use crate::retry::RetryPolicy;
