// Storage operator construction from configuration.

use anyhow::Result;
use opendal::Operator;
use tracing::info;

use tally_config::{StorageBackend, StorageConfig};

/// Build an OpenDAL operator for the configured backend.
pub fn build_operator(config: &StorageConfig) -> Result<Operator> {
    let operator = match config.backend {
        StorageBackend::Fs => {
            let fs = config.fs.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.fs configuration required for the filesystem backend")
            })?;
            info!("Using filesystem storage at: {}", fs.path);

            let builder = opendal::services::Fs::default().root(&fs.path);
            Operator::new(builder)?.finish()
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage (contents lost on restart)");
            Operator::new(opendal::services::Memory::default())?.finish()
        }
    };

    Ok(operator)
}
