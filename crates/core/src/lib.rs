pub mod error;
pub mod language;
pub mod models;
pub mod registry;

pub use error::{AnonymizeError, ClassifierError, RegistryError};
pub use language::{detect_language, normalize_text};
pub use models::*;
pub use registry::{Intent, IntentLabel, IntentRegistry};
