pub mod audit;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod resolver;
pub mod source;
pub mod store;
pub mod visibility;

pub use classify::{Classifier, DomainClassifier, Visibility};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{IngestOutcome, Ingestor};
pub use resolver::{LinkSource, ProjectCatalog, SqliteCatalog};
pub use source::{NormalizedTranscript, SourceRegistry, TranscriptSource};
pub use store::Store;
pub use visibility::{AdminDirectory, Viewer, VisibilityEvaluator};
