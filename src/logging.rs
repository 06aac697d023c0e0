//! tracing setup. starts at `info` (or RUST_LOG) so config loading is visible,
//! then switches to `[logging] level` once the config file has been read.

use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

pub fn init() -> LogHandle {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, handle) = reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    LogHandle { handle, from_env }
}

impl LogHandle {
    /// RUST_LOG always wins over the config file
    pub fn apply_config_level(&self, level: &str) {
        if self.from_env {
            return;
        }
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = self.handle.reload(filter) {
                    tracing::warn!("[CONFIG] Could not apply log level {:?}: {}", level, e);
                }
            }
            Err(e) => tracing::warn!("[CONFIG] Invalid log level {:?}: {}", level, e),
        }
    }
}
