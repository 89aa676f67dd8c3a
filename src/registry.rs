//! Process-wide holder of the active model.

use crate::artifact::ModelArtifact;
use crate::audio::check_sample_rate;
use crate::error::{Error, Result};
use crate::labels::check_class_labels;
use crate::model::SceneModel;
use crate::types::ModelMetadata;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Sample rate assumed when the artifact does not declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

struct ActiveModel {
    model: Arc<dyn SceneModel>,
    metadata: ModelMetadata,
}

/// Holds at most one active model and its metadata.
///
/// Loads are serialized. Readers always observe either the previous model or
/// the new one, never a mix. A failed load leaves no model loaded.
///
/// # Example
///
/// ```ignore
/// use scene_eval::ModelRegistry;
///
/// let registry = ModelRegistry::new();
/// let metadata = registry.load_file("scene_cnn.json")?;
/// println!("{} classes", metadata.num_classes);
/// ```
pub struct ModelRegistry {
    load_lock: Mutex<()>,
    active: RwLock<Option<Arc<ActiveModel>>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            load_lock: Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    /// Load an artifact from bytes and make it active.
    ///
    /// # Errors
    /// Returns the detection or construction error; the registry is then
    /// empty.
    pub fn load(&self, bytes: &[u8]) -> Result<ModelMetadata> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let built = ModelArtifact::detect(bytes).and_then(|artifact| {
            let kind = artifact.kind();
            let model = artifact.into_model()?;
            tracing::debug!(kind, "artifact decoded");
            Ok(model)
        });
        match built {
            Ok(model) => self.activate(model),
            Err(e) => {
                tracing::warn!(error = %e, "model load failed");
                self.set(None);
                Err(e)
            }
        }
    }

    /// Read an artifact file and load it.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be read (registry state is
    /// untouched) or any error from [`ModelRegistry::load`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ModelMetadata> {
        let bytes = std::fs::read(path.as_ref())?;
        self.load(&bytes)
    }

    /// Make an already constructed model active.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedArchitecture`] for a model with zero
    /// classes, repeated labels, a label count that differs from its class
    /// count, or an out-of-range sample rate; the registry is then empty.
    pub fn install(&self, model: Arc<dyn SceneModel>) -> Result<ModelMetadata> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.activate(model)
    }

    /// Drop the active model.
    pub fn unload(&self) {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.set(None);
        tracing::info!("model unloaded");
    }

    /// Active model and its metadata.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotLoaded`] if no model is active.
    pub fn get_active(&self) -> Result<(Arc<dyn SceneModel>, ModelMetadata)> {
        let active = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::ModelNotLoaded)?;
        Ok((Arc::clone(&active.model), active.metadata.clone()))
    }

    /// Metadata of the active model, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.metadata.clone())
    }

    /// Whether a model is active.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // Caller holds `load_lock`.
    fn activate(&self, model: Arc<dyn SceneModel>) -> Result<ModelMetadata> {
        if let Err(reason) = validate(model.as_ref()) {
            self.set(None);
            return Err(Error::UnsupportedArchitecture { reason });
        }
        let metadata = describe(model.as_ref());
        tracing::info!(
            architecture = %metadata.model_type_and_architecture.lines().next().unwrap_or_default(),
            num_classes = metadata.num_classes,
            sample_rate = metadata.sample_rate,
            confidence = metadata.confidence_level.as_str(),
            "model loaded"
        );
        self.set(Some(Arc::new(ActiveModel {
            model,
            metadata: metadata.clone(),
        })));
        Ok(metadata)
    }

    fn set(&self, value: Option<Arc<ActiveModel>>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

fn validate(model: &dyn SceneModel) -> std::result::Result<(), String> {
    if model.num_classes() == 0 {
        return Err("model reports zero output classes".to_string());
    }
    if let Some(labels) = model.class_labels() {
        check_class_labels(labels, model.num_classes())?;
    }
    if let Some(rate) = model.sample_rate() {
        check_sample_rate(rate)?;
    }
    Ok(())
}

fn describe(model: &dyn SceneModel) -> ModelMetadata {
    ModelMetadata {
        model_type_and_architecture: model.architecture(),
        num_classes: model.num_classes(),
        class_labels: model.class_labels().map(<[String]>::to_vec),
        sample_rate: model.sample_rate().unwrap_or(DEFAULT_SAMPLE_RATE),
        num_trainable_parameters: model.trainable_parameters(),
        model_loading_timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        confidence_level: model.confidence_level(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::testutil::{StubModel, checkpoint_bytes, checkpoint_document};
    use crate::types::ConfidenceLevel;

    #[test]
    fn test_starts_unloaded() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_loaded());
        assert!(registry.metadata().is_none());
        assert!(matches!(registry.get_active(), Err(Error::ModelNotLoaded)));
    }

    #[test]
    fn test_load_checkpoint_with_labels() {
        let mut doc = checkpoint_document(2, &[0.0, 0.0]);
        doc.class_labels = Some(vec!["cat".to_string(), "dog".to_string()]);
        let registry = ModelRegistry::new();

        let metadata = registry.load(&checkpoint_bytes(&doc)).unwrap();
        assert_eq!(metadata.num_classes, 2);
        assert_eq!(
            metadata.class_labels,
            Some(vec!["cat".to_string(), "dog".to_string()])
        );
        assert_eq!(metadata.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(metadata.confidence_level, ConfidenceLevel::High);
        assert!(metadata.num_trainable_parameters > 0);
        assert!(!metadata.model_loading_timestamp.is_empty());
        assert!(registry.is_loaded());
    }

    #[test]
    fn test_load_checkpoint_without_labels() {
        let registry = ModelRegistry::new();
        let metadata = registry
            .load(&checkpoint_bytes(&checkpoint_document(3, &[0.0; 3])))
            .unwrap();
        assert!(metadata.class_labels.is_none());
        assert_eq!(metadata.confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn test_failed_load_clears_previous_model() {
        let registry = ModelRegistry::new();
        registry.install(Arc::new(StubModel::fixed(&["a", "b"], vec![0.0, 1.0]))).unwrap();
        assert!(registry.is_loaded());

        let mut doc = checkpoint_document(2, &[0.0, 0.0]);
        doc.num_classes = None;
        let err = registry.load(&checkpoint_bytes(&doc)).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint { .. }));
        assert!(matches!(registry.get_active(), Err(Error::ModelNotLoaded)));
    }

    #[test]
    fn test_garbage_artifact_is_unsupported() {
        let registry = ModelRegistry::new();
        let err = registry.load(b"{not json at all").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_load_replaces_active_model() {
        let registry = ModelRegistry::new();
        registry.install(Arc::new(StubModel::fixed(&["a", "b"], vec![0.0, 1.0]))).unwrap();
        let metadata = registry
            .install(Arc::new(StubModel::fixed(&["x", "y", "z"], vec![0.0; 3])))
            .unwrap();
        assert_eq!(metadata.num_classes, 3);
        let (model, active) = registry.get_active().unwrap();
        assert_eq!(model.num_classes(), 3);
        assert_eq!(active, metadata);
    }

    #[test]
    fn test_unload() {
        let registry = ModelRegistry::new();
        registry.install(Arc::new(StubModel::fixed(&["a"], vec![0.0]))).unwrap();
        registry.unload();
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_install_rejects_zero_classes() {
        let registry = ModelRegistry::new();
        let err = registry
            .install(Arc::new(StubModel::fixed(&[], Vec::new())))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedArchitecture { .. }));
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_install_rejects_duplicate_labels() {
        let registry = ModelRegistry::new();
        registry.install(Arc::new(StubModel::fixed(&["a", "b"], vec![0.0, 1.0]))).unwrap();

        let err = registry
            .install(Arc::new(StubModel::fixed(&["cat", "cat"], vec![0.0, 0.0])))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedArchitecture { .. }));
        assert!(err.to_string().contains("'cat'"));
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_install_rejects_label_count_mismatch() {
        let registry = ModelRegistry::new();
        let err = registry
            .install(Arc::new(
                StubModel::fixed(&["cat", "dog"], vec![0.0, 0.0]).with_num_classes(3),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedArchitecture { .. }));
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_install_rejects_bad_sample_rate() {
        let registry = ModelRegistry::new();
        for rate in [0, u32::MAX] {
            let model = StubModel::fixed(&["a", "b"], vec![0.0, 1.0]).with_sample_rate(rate);
            let err = registry.install(Arc::new(model)).unwrap_err();
            assert!(err.to_string().contains("sample rate"), "{rate}");
        }
        let model = StubModel::fixed(&["a", "b"], vec![0.0, 1.0]).with_sample_rate(22_050);
        assert_eq!(registry.install(Arc::new(model)).unwrap().sample_rate, 22_050);
    }

    #[test]
    fn test_load_rejects_duplicate_checkpoint_labels() {
        let mut doc = checkpoint_document(2, &[0.0, 0.0]);
        doc.class_labels = Some(vec!["cat".to_string(), "cat".to_string()]);
        let registry = ModelRegistry::new();

        let err = registry.load(&checkpoint_bytes(&doc)).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint { .. }));
        assert!(matches!(registry.get_active(), Err(Error::ModelNotLoaded)));
    }

    #[test]
    fn test_load_rejects_zero_sample_rate() {
        let mut doc = checkpoint_document(2, &[0.0, 0.0]);
        doc.sample_rate = Some(0);
        let registry = ModelRegistry::new();

        let err = registry.load(&checkpoint_bytes(&doc)).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint { .. }));
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_load_file_missing_is_io_error() {
        let registry = ModelRegistry::new();
        let err = registry.load_file("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_concurrent_readers_see_consistent_metadata() {
        let registry = Arc::new(ModelRegistry::new());
        registry.install(Arc::new(StubModel::fixed(&["a", "b"], vec![0.0, 1.0]))).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if let Ok((model, metadata)) = registry.get_active() {
                            assert_eq!(model.num_classes(), metadata.num_classes);
                        }
                    }
                })
            })
            .collect();
        for _ in 0..20 {
            registry
                .install(Arc::new(StubModel::fixed(&["x", "y", "z"], vec![0.0; 3])))
                .unwrap();
            registry.install(Arc::new(StubModel::fixed(&["a", "b"], vec![0.0, 1.0]))).unwrap();
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
