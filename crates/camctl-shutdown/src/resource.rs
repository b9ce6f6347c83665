use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// A cleanup target registered with a [`ResourceManager`].
#[async_trait]
pub trait Resource: Send + Sync {
    async fn cleanup(&self) -> Result<(), ResourceError>;

    fn name(&self) -> &str;

    /// Lower values run first.
    fn priority(&self) -> u32 {
        100
    }
}

/// Runs registered resources' cleanup in priority order during shutdown.
pub struct ResourceManager {
    resources: Vec<Arc<dyn Resource>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        info!("Registering resource: {}", resource.name());
        self.resources.push(resource);
    }

    pub async fn cleanup_all(&mut self) {
        self.resources.sort_by_key(|r| r.priority());

        info!("Cleaning up {} resources", self.resources.len());

        for resource in &self.resources {
            info!("Cleaning up resource: {}", resource.name());

            match resource.cleanup().await {
                Ok(_) => {
                    info!("Successfully cleaned up: {}", resource.name());
                }
                Err(e) => {
                    error!("Failed to cleanup {}: {}", resource.name(), e);
                }
            }
        }

        info!("Resource cleanup complete");
    }

    pub fn count(&self) -> usize {
        self.resources.len()
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestResource {
        name: String,
        should_fail: bool,
    }

    #[async_trait]
    impl Resource for TestResource {
        async fn cleanup(&self) -> Result<(), ResourceError> {
            if self.should_fail {
                Err(ResourceError::CleanupFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[tokio::test]
    async fn test_resource_manager() {
        let mut manager = ResourceManager::new();

        let resource1 = Arc::new(TestResource {
            name: "resource1".to_string(),
            should_fail: false,
        });

        let resource2 = Arc::new(TestResource {
            name: "resource2".to_string(),
            should_fail: false,
        });

        manager.register(resource1);
        manager.register(resource2);

        assert_eq!(manager.count(), 2);

        manager.cleanup_all().await;
    }

    #[tokio::test]
    async fn test_cleanup_with_failure() {
        let mut manager = ResourceManager::new();

        let resource = Arc::new(TestResource {
            name: "failing_resource".to_string(),
            should_fail: true,
        });

        manager.register(resource);

        // Cleanup continues past a failing resource.
        manager.cleanup_all().await;
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        struct PriorityResource {
            name: String,
            priority: u32,
        }

        #[async_trait]
        impl Resource for PriorityResource {
            async fn cleanup(&self) -> Result<(), ResourceError> {
                Ok(())
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn priority(&self) -> u32 {
                self.priority
            }
        }

        let mut manager = ResourceManager::new();

        let low = Arc::new(PriorityResource {
            name: "low".to_string(),
            priority: 50,
        });
        let high = Arc::new(PriorityResource {
            name: "high".to_string(),
            priority: 10,
        });

        manager.register(low);
        manager.register(high);

        manager.cleanup_all().await;
    }
}
