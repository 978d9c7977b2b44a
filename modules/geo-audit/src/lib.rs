pub mod adapters;
pub mod auditor;
pub mod coherence;
pub mod competitive;
pub mod crawler;
pub mod lifecycle;
pub mod report;
pub mod similarity;
pub mod store;
pub mod suggestion;
pub mod synthesizer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use auditor::{AuditorFactory, GeoAuditor, LiveAuditorFactory};
pub use lifecycle::{process_run, TriggerError, TriggerRecord};
pub use report::{extract_json_object, AuditReport};
pub use suggestion::{Suggestion, WebsiteImprover};
pub use traits::*;
