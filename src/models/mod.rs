//! Trained model adapters

pub mod classifier;
pub mod inference;
pub mod loader;
pub mod predictor;

pub use classifier::{Classifier, ClassifierOutput};
pub use inference::OnnxClassifier;
pub use loader::{LoadedModel, ModelLoader};
pub use predictor::Predictor;
