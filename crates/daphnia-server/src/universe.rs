//! Building the universe at startup and saving it at shutdown.

use std::path::Path;
use std::sync::Arc;

use daphnia_core::{ConfigError, DaphniaConfig};
use daphnia_ether::{Ether, load_universe, save_universe};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::info;

use crate::error::ServerError;

/// Create the grid from `config`, loading `universe.file` when set.
pub fn build_universe(config: &DaphniaConfig) -> Result<Arc<Ether>, ServerError> {
    let size = config.physical_size().ok_or_else(|| ConfigError::Invalid {
        reason: "universe size times scale overflows".to_owned(),
    })?;
    let ether = Ether::new(size)?
        .with_weakening(config.effective_weakening())
        .with_seed(config.universe.seed);

    if let Some(path) = &config.universe.file {
        // Crumb colors are drawn from the universe seed so reloads repeat.
        let mut rng = SmallRng::seed_from_u64(config.universe.seed);
        load_universe(&ether, config.universe.scale, path, &mut rng)?;
    }

    info!(
        size = %size,
        scale = config.universe.scale,
        weakening = config.effective_weakening(),
        "universe ready"
    );
    Ok(Arc::new(ether))
}

/// Write the universe to `path`.
pub fn save(ether: &Ether, config: &DaphniaConfig, path: &Path) -> Result<(), ServerError> {
    save_universe(ether, config.universe.scale, path)?;
    Ok(())
}
