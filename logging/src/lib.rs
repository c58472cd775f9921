//! Shared logging glue.
//!
//! Every crate in the workspace logs through `tracing` with an explicit target taken
//! from [`Log`], so that a single `RPSENSE_LOG` filter can silence or amplify one
//! subsystem at a time (e.g `RPSENSE_LOG=info,rpsense::transport=debug`).

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the log filter.
pub const LOG_ENV_VAR: &str = "RPSENSE_LOG";

/// Log targets. These are plain string constants so they can be used directly in
/// `tracing::info!(target: Log::Session, ...)`.
#[derive(Debug)]
pub struct Log;

#[allow(non_upper_case_globals)]
impl Log {
    /// Round sequencing, state transitions and scoring.
    pub const Session: &'static str = "rpsense::session";

    /// Camera acquisition and frame buffering.
    pub const Capture: &'static str = "rpsense::capture";

    /// Anything that talks to the inference service.
    pub const Transport: &'static str = "rpsense::transport";

    /// Match history persistence.
    pub const History: &'static str = "rpsense::history";

    /// Configuration loading.
    pub const Config: &'static str = "rpsense::config";
}

/// Installs the global fmt subscriber. The filter is read from `RPSENSE_LOG` and
/// falls back to `info` when unset or unparseable.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init().is_err() {
        tracing::debug!(target: Log::Config, "Global subscriber already installed");
    }
}
