pub mod audit;
pub mod database;
pub mod import_session;
pub mod integrity;
pub mod matching;
pub mod metrics;
pub mod posting;
pub mod reconcile;
pub mod statement_format;

pub use audit::AuditRecorder;
pub use database::Database;
pub use import_session::SessionStore;
pub use integrity::IntegritySweep;
pub use matching::Matcher;
pub use posting::PostingEngine;
pub use reconcile::Reconciler;
pub use statement_format::CompiledFormat;
