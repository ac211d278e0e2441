use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::models::{CoreError, Operation};

pub const LOG_ENV_VAR: &str = "RENTSCOPE_LOG";

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global fmt subscriber. The filter comes from `RENTSCOPE_LOG`,
/// then `RUST_LOG`, then `default_directive`. Later calls are no-ops, as is
/// a host that already installed its own subscriber.
pub fn init_logging(default_directive: &str) -> Result<(), CoreError> {
    if LOGGER_INIT.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|error| {
            CoreError::invalid_input(
                Operation::Configure,
                format!("invalid log directive '{default_directive}': {error}"),
            )
        })?;

    LOGGER_INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
    Ok(())
}
