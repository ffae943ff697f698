//! Siamese similarity model via ONNX Runtime.
//!
//! Two artifact layouts are supported:
//!
//! - **fused**: one graph taking `(probe, reference)` and returning the score.
//! - **split**: a shared embedding encoder, a distance layer resolved from the
//!   [`LayerRegistry`], and a classifier head mapping the distance to a score.
//!
//! A path ending in `.onnx` is loaded as a fused graph; anything else is read
//! as a TOML manifest describing one of the layouts above.

use crate::layers::{DistanceLayer, LayerRegistry};
use crate::preprocess::{ImageTensor, INPUT_SIZE};
use crate::types::SimilarityModel;
use ndarray::Array2;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model manifest not found: {0}")]
    ManifestNotFound(PathBuf),
    #[error("failed to read model manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown distance layer: {0}")]
    UnknownLayer(String),
    #[error("model graph not found: {0}")]
    GraphNotFound(PathBuf),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("embedding shape mismatch: probe {probe:?}, reference {reference:?}")]
    ShapeMismatch {
        probe: Vec<usize>,
        reference: Vec<usize>,
    },
    #[error("score {0} outside [0, 1]")]
    ScoreOutOfRange(f32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// On-disk description of a model artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum ModelManifest {
    Fused {
        graph: PathBuf,
    },
    Split {
        encoder: PathBuf,
        distance: String,
        head: PathBuf,
    },
}

impl ModelManifest {
    /// Read a manifest, resolving relative graph paths against its directory.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::ManifestNotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = toml::from_str(&raw).map_err(|source| ModelError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(manifest.relative_to(base))
    }

    fn relative_to(self, base: &Path) -> Self {
        match self {
            Self::Fused { graph } => Self::Fused {
                graph: base.join(graph),
            },
            Self::Split {
                encoder,
                distance,
                head,
            } => Self::Split {
                encoder: base.join(encoder),
                distance,
                head: base.join(head),
            },
        }
    }
}

enum Backend {
    Fused {
        session: Session,
    },
    Split {
        encoder: Session,
        distance: Arc<dyn DistanceLayer>,
        head: Session,
    },
}

/// Pretrained siamese network scoring a probe against one reference image.
pub struct SiameseModel {
    backend: Backend,
}

impl SiameseModel {
    /// Load a model from a fused `.onnx` graph or a TOML manifest.
    pub fn load(path: &Path, registry: &LayerRegistry) -> Result<Self, ModelError> {
        let manifest = if path.extension().is_some_and(|ext| ext == "onnx") {
            ModelManifest::Fused {
                graph: path.to_path_buf(),
            }
        } else {
            ModelManifest::from_file(path)?
        };

        Self::from_manifest(manifest, registry)
    }

    /// Build sessions for a manifest. The distance layer is resolved before
    /// any graph is touched.
    pub fn from_manifest(
        manifest: ModelManifest,
        registry: &LayerRegistry,
    ) -> Result<Self, ModelError> {
        let backend = match manifest {
            ModelManifest::Fused { graph } => Backend::Fused {
                session: open_session(&graph)?,
            },
            ModelManifest::Split {
                encoder,
                distance,
                head,
            } => {
                let distance = registry.resolve(&distance)?;
                Backend::Split {
                    encoder: open_session(&encoder)?,
                    distance,
                    head: open_session(&head)?,
                }
            }
        };

        Ok(Self { backend })
    }

    /// Human-readable layout, for logs and diagnostics.
    pub fn describe(&self) -> String {
        match &self.backend {
            Backend::Fused { .. } => "fused".to_string(),
            Backend::Split { distance, .. } => format!("split ({})", distance.name()),
        }
    }
}

impl SimilarityModel for SiameseModel {
    fn score(
        &mut self,
        probe: &ImageTensor,
        reference: &ImageTensor,
    ) -> Result<f32, InferenceError> {
        check_input(probe)?;
        check_input(reference)?;

        match &mut self.backend {
            Backend::Fused { session } => {
                let outputs = session.run(ort::inputs![
                    TensorRef::from_array_view(probe.view())?,
                    TensorRef::from_array_view(reference.view())?
                ])?;
                scalar_output(&outputs[0])
            }
            Backend::Split {
                encoder,
                distance,
                head,
            } => {
                let probe_emb = embed(encoder, probe)?;
                let reference_emb = embed(encoder, reference)?;
                if probe_emb.shape() != reference_emb.shape() {
                    return Err(InferenceError::ShapeMismatch {
                        probe: probe_emb.shape().to_vec(),
                        reference: reference_emb.shape().to_vec(),
                    });
                }

                let joined = distance.apply(probe_emb.view(), reference_emb.view());
                let outputs = head.run(ort::inputs![TensorRef::from_array_view(joined.view())?])?;
                scalar_output(&outputs[0])
            }
        }
    }
}

fn open_session(path: &Path) -> Result<Session, ModelError> {
    if !path.exists() {
        return Err(ModelError::GraphNotFound(path.to_path_buf()));
    }

    let session = Session::builder()?
        .with_intra_threads(INTRA_THREADS)?
        .commit_from_file(path)?;

    tracing::info!(
        path = %path.display(),
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded ONNX graph"
    );

    Ok(session)
}

fn check_input(tensor: &ImageTensor) -> Result<(), InferenceError> {
    if tensor.shape() != [1, INPUT_SIZE, INPUT_SIZE, 3] {
        return Err(InferenceError::InferenceFailed(format!(
            "expected input of shape [1, {INPUT_SIZE}, {INPUT_SIZE}, 3], got {:?}",
            tensor.shape()
        )));
    }
    Ok(())
}

/// Run the encoder and flatten its output into a `[1, D]` embedding.
fn embed(encoder: &mut Session, image: &ImageTensor) -> Result<Array2<f32>, InferenceError> {
    let outputs = encoder.run(ort::inputs![TensorRef::from_array_view(image.view())?])?;
    let (_, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::InferenceFailed(format!("embedding extraction: {e}")))?;

    if data.is_empty() {
        return Err(InferenceError::InferenceFailed(
            "encoder produced an empty embedding".into(),
        ));
    }

    Array2::from_shape_vec((1, data.len()), data.to_vec())
        .map_err(|e| InferenceError::InferenceFailed(format!("embedding reshape: {e}")))
}

fn scalar_output(value: &DynValue) -> Result<f32, InferenceError> {
    let (_, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::InferenceFailed(format!("score extraction: {e}")))?;

    match data {
        [score] => Ok(*score),
        [] => Err(InferenceError::InferenceFailed("model produced no score".into())),
        _ => Err(InferenceError::InferenceFailed(format!(
            "expected a single score, got {} values",
            data.len()
        ))),
    }
}
