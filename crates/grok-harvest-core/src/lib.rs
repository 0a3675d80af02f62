pub mod aggregate;
pub mod config;
pub mod context;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod filename;
pub mod model;
pub mod observation;
pub mod progress;
pub mod retrieval;
pub mod session;
pub mod storage;

pub use config::AppConfig;
pub use context::{ContextKind, ViewContext};
pub use engine::{ContextStats, HarvestEngine};
pub use error::Error;
pub use model::{Asset, Group, MediaKind};
pub use progress::{ProgressReporter, SilentReporter};
pub use retrieval::{RetrievalOutcome, Retriever, RunOutcome, RunState};
