//! # Stage Registry - Runtime Discovery and Lifecycle Management
//!
//! Manages stage registration and lifecycle.
//!
//! ## Features
//!
//! - **Runtime registration**: the container registers whichever stages
//!   its configuration allows
//! - **Deterministic ordering**: stages start in ascending `StageId` order
//!   and stop in reverse
//! - **Graceful degradation**: optional stages that fail to start are
//!   logged and skipped
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = StageRegistry::new();
//! registry.register(Box::new(MetadataStage::new(ctx.clone())));
//! registry.start_all().await?;
//! // ...
//! registry.stop_all().await;
//! ```

use crate::entities::StageId;
use crate::stage_trait::{DynStage, Stage, StageError, StageInfo, StageStatus};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Entry for a registered stage.
struct StageEntry {
    stage: Arc<dyn Stage>,
    status: StageStatus,
    info: StageInfo,
}

/// Central registry for all pipeline stages.
pub struct StageRegistry {
    stages: BTreeMap<StageId, Mutex<StageEntry>>,
}

impl StageRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    /// Register a stage. A stage with the same id is replaced.
    pub fn register(&mut self, stage: DynStage) {
        let id = stage.id();
        let info = stage.info();

        info!(stage = %id, name = %info.name, "[Registry] Registering stage");

        if self.stages.contains_key(&id) {
            warn!(stage = %id, "[Registry] Stage already registered, replacing");
        }

        self.stages.insert(
            id,
            Mutex::new(StageEntry {
                stage: Arc::from(stage),
                status: StageStatus::Stopped,
                info,
            }),
        );
    }

    /// Check if a stage is registered.
    #[must_use]
    pub fn is_registered(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    /// Get the status of a stage.
    #[must_use]
    pub fn status(&self, id: StageId) -> Option<StageStatus> {
        self.stages.get(&id).map(|e| e.lock().status)
    }

    /// Get info about a registered stage.
    #[must_use]
    pub fn info(&self, id: StageId) -> Option<StageInfo> {
        self.stages.get(&id).map(|e| e.lock().info.clone())
    }

    /// Registered stage ids in start order.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<StageId> {
        self.stages.keys().copied().collect()
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Start all registered stages.
    ///
    /// Required stages fail hard; optional ones are logged and left stopped.
    pub async fn start_all(&self) -> Result<(), StageError> {
        info!(count = self.stages.len(), "[Registry] Starting stages");

        for (id, entry) in &self.stages {
            let (stage, required) = {
                let mut entry = entry.lock();
                entry.status = StageStatus::Starting;
                (entry.stage.clone(), entry.info.required)
            };

            let result = stage.start().await;
            let mut entry = entry.lock();
            match result {
                Ok(()) => {
                    entry.status = StageStatus::Healthy;
                    info!(stage = %id, "[Registry] ✓ Stage started");
                }
                Err(e) if required => {
                    entry.status = StageStatus::Error;
                    error!(stage = %id, error = %e, "[Registry] ✗ Required stage failed");
                    return Err(e);
                }
                Err(e) => {
                    entry.status = StageStatus::Error;
                    warn!(stage = %id, error = %e, "[Registry] ✗ Optional stage failed");
                }
            }
        }

        info!("[Registry] All stages started");
        Ok(())
    }

    /// Stop all running stages in reverse order.
    pub async fn stop_all(&self) {
        info!("[Registry] Stopping all stages");

        for (id, entry) in self.stages.iter().rev() {
            let stage = {
                let mut entry = entry.lock();
                if !matches!(entry.status, StageStatus::Healthy | StageStatus::Degraded) {
                    continue;
                }
                entry.status = StageStatus::ShuttingDown;
                entry.stage.clone()
            };

            let result = stage.stop().await;
            let mut entry = entry.lock();
            match result {
                Ok(()) => {
                    entry.status = StageStatus::Stopped;
                    info!(stage = %id, "[Registry] ✓ Stage stopped");
                }
                Err(e) => {
                    entry.status = StageStatus::Error;
                    error!(stage = %id, error = %e, "[Registry] ✗ Stage failed to stop cleanly");
                }
            }
        }

        info!("[Registry] All stages stopped");
    }

    /// Run health checks on all stages.
    pub async fn health_check_all(&self) -> BTreeMap<StageId, StageStatus> {
        let mut results = BTreeMap::new();

        for (id, entry) in &self.stages {
            let stage = entry.lock().stage.clone();
            results.insert(*id, stage.health_check().await);
        }

        results
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_trait::StageErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStage {
        id: StageId,
        fail_start: bool,
        required: bool,
        starts: Arc<AtomicUsize>,
    }

    impl MockStage {
        fn new(id: StageId) -> Self {
            Self {
                id,
                fail_start: false,
                required: false,
                starts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Stage for MockStage {
        fn id(&self) -> StageId {
            self.id
        }
        fn name(&self) -> &'static str {
            "Mock"
        }
        fn info(&self) -> StageInfo {
            let info = StageInfo::new(self.id, self.name());
            if self.required {
                info.required()
            } else {
                info
            }
        }
        async fn start(&self) -> Result<(), StageError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(StageError::new(self.id, StageErrorKind::InitializationFailed, "boom"));
            }
            Ok(())
        }
        async fn stop(&self) -> Result<(), StageError> {
            Ok(())
        }
        async fn health_check(&self) -> StageStatus {
            StageStatus::Healthy
        }
    }

    #[test]
    fn test_registry_register() {
        let mut registry = StageRegistry::new();
        registry.register(Box::new(MockStage::new(StageId::Graph)));
        registry.register(Box::new(MockStage::new(StageId::Metadata)));

        assert!(registry.is_registered(StageId::Graph));
        assert!(!registry.is_registered(StageId::Narrative));
        assert_eq!(registry.registered_ids(), vec![StageId::Metadata, StageId::Graph]);
        assert_eq!(registry.status(StageId::Graph), Some(StageStatus::Stopped));
    }

    #[tokio::test]
    async fn test_optional_failure_does_not_abort() {
        let mut registry = StageRegistry::new();
        let mut failing = MockStage::new(StageId::Profiler);
        failing.fail_start = true;
        registry.register(Box::new(failing));
        registry.register(Box::new(MockStage::new(StageId::Graph)));

        assert!(registry.start_all().await.is_ok());
        assert_eq!(registry.status(StageId::Profiler), Some(StageStatus::Error));
        assert_eq!(registry.status(StageId::Graph), Some(StageStatus::Healthy));

        registry.stop_all().await;
        assert_eq!(registry.status(StageId::Graph), Some(StageStatus::Stopped));
        assert_eq!(registry.status(StageId::Profiler), Some(StageStatus::Error));
    }

    #[tokio::test]
    async fn test_required_failure_aborts() {
        let mut registry = StageRegistry::new();
        let mut failing = MockStage::new(StageId::Persistence);
        failing.fail_start = true;
        failing.required = true;
        registry.register(Box::new(failing));

        let err = registry.start_all().await.unwrap_err();
        assert_eq!(err.stage_id, StageId::Persistence);
    }

    #[tokio::test]
    async fn test_health_check_all() {
        let mut registry = StageRegistry::new();
        let stage = MockStage::new(StageId::Metadata);
        let starts = stage.starts.clone();
        registry.register(Box::new(stage));
        registry.start_all().await.unwrap();
        registry.start_all().await.unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 2);
        let health = registry.health_check_all().await;
        assert_eq!(health.get(&StageId::Metadata), Some(&StageStatus::Healthy));
    }
}
