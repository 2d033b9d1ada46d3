pub mod collector;
pub mod config;
pub mod dedup;
pub mod http_client;
pub mod output;
pub mod scope;
pub mod sources;

// re-export the pieces the runner and tests wire together
pub use crate::collector::Collector;
pub use crate::dedup::{dedupe, Deduplicator, ErrorRecord, UrlRecord};
pub use crate::scope::ScopeSpec;
pub use crate::sources::{Session, Source, SourceResult};
