//! Storage manager: routes operations to the provider owning a namespace.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use vaultkeeper_core::error::AppError;
use vaultkeeper_core::result::AppResult;
use vaultkeeper_core::traits::storage::StorageProvider;
use vaultkeeper_core::types::Namespace;

/// Central storage manager that holds one provider per namespace.
#[derive(Debug, Clone)]
pub struct StorageManager {
    /// Map of namespace → provider instance.
    providers: Arc<RwLock<HashMap<Namespace, Arc<dyn StorageProvider>>>>,
}

impl StorageManager {
    /// Create a new empty storage manager.
    pub fn new() -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or replace) the provider for a namespace.
    pub async fn register(&self, namespace: Namespace, provider: Arc<dyn StorageProvider>) {
        let mut providers = self.providers.write().await;
        providers.insert(namespace, provider);
    }

    /// Get the provider for a namespace.
    pub async fn get(&self, namespace: Namespace) -> AppResult<Arc<dyn StorageProvider>> {
        let providers = self.providers.read().await;
        providers.get(&namespace).cloned().ok_or_else(|| {
            AppError::configuration(format!("No storage provider for namespace '{namespace}'"))
        })
    }

    /// Get the primary content store provider.
    pub async fn content(&self) -> AppResult<Arc<dyn StorageProvider>> {
        self.get(Namespace::Content).await
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}
