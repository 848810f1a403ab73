pub mod aggregator;
pub mod patchers;
pub mod status_syncer;
pub mod translation_service;
pub mod watchers;

pub use aggregator::{aggregate, AggregatedOutput};
pub use patchers::KubeStatusWriter;
pub use status_syncer::{StatusSyncer, StatusWriter};
pub use translation_service::TranslationService;
