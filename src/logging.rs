// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Ambient logging setup, mirroring the way application-level verbosity
//! flags usually map onto `log`'s level filter. The crate itself only
//! ever calls `log::{debug,info,warn,error}!`; wiring up a subscriber
//! (this one, or any other) is a caller decision.

#[derive(Copy, Clone, Debug)]
pub enum LogVerbosity {
    Normal,
    Verbose,
    Debug,
}

/// Installs an `env_logger` subscriber at the given verbosity. Safe to
/// call more than once (subsequent calls are no-ops via `try_init`).
pub fn init_logger(verbosity: LogVerbosity) {
    let level = match verbosity {
        LogVerbosity::Normal => log::LevelFilter::Info,
        LogVerbosity::Verbose => log::LevelFilter::Debug,
        LogVerbosity::Debug => log::LevelFilter::Trace,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init();
}
