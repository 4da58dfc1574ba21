//! File-backed [`ServiceRegistry`].

use super::{RegistryDocument, ServiceDescriptor, ServiceRegistry};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// [`ServiceRegistry`] persisted as a pretty-printed JSON file.
///
/// Reads take the shared side of an in-process lock and writes the
/// exclusive side. Writes go to a sibling temp file that is renamed over
/// the target, so no reader ever sees a half-written registry.
pub struct FileServiceRegistry {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileServiceRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "services.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_unlocked(&self) -> GatewayResult<Vec<ServiceDescriptor>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            GatewayError::RegistryUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let doc = RegistryDocument::from_slice(&bytes).map_err(GatewayError::RegistryUnavailable)?;
        Ok(doc.services)
    }
}

#[async_trait]
impl ServiceRegistry for FileServiceRegistry {
    async fn load(&self) -> GatewayResult<Vec<ServiceDescriptor>> {
        let _guard = self.lock.read().await;
        self.read_unlocked().await
    }

    #[instrument(skip(self, payload), fields(path = %self.path.display(), services = payload.services.len()))]
    async fn replace(&self, payload: RegistryDocument) -> GatewayResult<Vec<ServiceDescriptor>> {
        payload.validate().map_err(GatewayError::InvalidRegistry)?;
        let bytes = serde_json::to_vec_pretty(&payload)
            .map_err(|e| GatewayError::RegistryWriteError(e.to_string()))?;

        let _guard = self.lock.write().await;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| GatewayError::RegistryWriteError(format!("{}: {e}", temp.display())))?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            GatewayError::RegistryWriteError(format!("{}: {e}", self.path.display()))
        })?;
        info!("service registry replaced");

        self.read_unlocked().await
    }
}
