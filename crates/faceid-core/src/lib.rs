//! faceid-core: siamese face verification engine.
//!
//! Preprocesses probe and gallery images, scores each pair with a pretrained
//! siamese network running via ONNX Runtime, and aggregates the scores into a
//! verified / unverified decision.

pub mod gallery;
pub mod layers;
pub mod model;
pub mod preprocess;
pub mod types;
pub mod verify;

pub use gallery::{Gallery, GalleryError};
pub use layers::{DistanceLayer, L1Dist, LayerRegistry};
pub use model::{InferenceError, ModelError, ModelManifest, SiameseModel};
pub use preprocess::{ImageTensor, PreprocessError, INPUT_SIZE};
pub use types::{SimilarityModel, Verification, DETECTION_THRESHOLD, VERIFICATION_THRESHOLD};
pub use verify::{Report, Verifier, VerifyError};
