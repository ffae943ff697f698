//! Distance layers and the registry that resolves them by name.
//!
//! A split siamese model names the elementwise op that joins its two
//! embedding branches (e.g. `L1Dist`). The name is resolved here when the
//! model is loaded, so an unknown layer fails before any inference runs.

use ndarray::{Array2, ArrayView2};
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::ModelError;

/// Elementwise combination of two `[1, D]` embeddings.
pub trait DistanceLayer: Send + Sync {
    /// Name the layer is registered and referenced under.
    fn name(&self) -> &'static str;

    /// Callers guarantee both views have the same shape.
    fn apply(&self, input: ArrayView2<f32>, validation: ArrayView2<f32>) -> Array2<f32>;
}

/// Absolute elementwise difference, `|input - validation|`.
pub struct L1Dist;

impl DistanceLayer for L1Dist {
    fn name(&self) -> &'static str {
        "L1Dist"
    }

    fn apply(&self, input: ArrayView2<f32>, validation: ArrayView2<f32>) -> Array2<f32> {
        (&input - &validation).mapv(f32::abs)
    }
}

/// Name → layer lookup table.
pub struct LayerRegistry {
    layers: HashMap<&'static str, Arc<dyn DistanceLayer>>,
}

impl LayerRegistry {
    /// Registry with no layers at all.
    pub fn empty() -> Self {
        Self {
            layers: HashMap::new(),
        }
    }

    /// Add a layer, replacing any previous layer of the same name.
    pub fn register(&mut self, layer: Arc<dyn DistanceLayer>) {
        tracing::debug!(layer = layer.name(), "registered distance layer");
        self.layers.insert(layer.name(), layer);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DistanceLayer>, ModelError> {
        self.layers.get(name).cloned().ok_or_else(|| {
            tracing::warn!(layer = name, known = ?self.names(), "unknown distance layer");
            ModelError::UnknownLayer(name.to_string())
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.layers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for LayerRegistry {
    /// Registry holding the built-in layers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(L1Dist));
        registry
    }
}
