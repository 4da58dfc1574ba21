//! In-memory [`ServiceRegistry`] implementation.

use super::{RegistryDocument, ServiceDescriptor, ServiceRegistry};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// [`ServiceRegistry`] backed by a `Vec` behind a lock.
///
/// Suitable for tests and for embedding the gateway where the registry is
/// owned by the host process.
#[derive(Default)]
pub struct InMemoryServiceRegistry {
    services: RwLock<Vec<ServiceDescriptor>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry. The seed is not validated.
    pub fn with_services(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services: RwLock::new(services),
        }
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn load(&self) -> GatewayResult<Vec<ServiceDescriptor>> {
        Ok(self.services.read().await.clone())
    }

    async fn replace(&self, payload: RegistryDocument) -> GatewayResult<Vec<ServiceDescriptor>> {
        payload.validate().map_err(GatewayError::InvalidRegistry)?;
        let mut services = self.services.write().await;
        *services = payload.services;
        Ok(services.clone())
    }
}
