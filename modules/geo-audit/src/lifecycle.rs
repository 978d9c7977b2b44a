// Audit run state machine: pending → processing → {done, error}.

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use geo_common::error::Result;
use geo_common::{AuditOutcome, RunCompletion};

use crate::auditor::GeoAuditor;
use crate::traits::RunStore;

/// `{"record": {"id", "url"}}` as sent by the storage trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("payload has no \"record\" object")]
    MissingRecord,
    #[error("record is missing \"{0}\"")]
    MissingField(&'static str),
}

impl TriggerRecord {
    pub fn from_payload(payload: &Value) -> std::result::Result<Self, TriggerError> {
        let record = payload
            .get("record")
            .and_then(Value::as_object)
            .ok_or(TriggerError::MissingRecord)?;

        let field = |name: &'static str| {
            record
                .get(name)
                .and_then(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .ok_or(TriggerError::MissingField(name))
        };

        Ok(Self {
            id: field("id")?,
            url: field("url")?,
        })
    }
}

/// Drive one triggered run to a terminal state.
///
/// The processing write happens before any work so a crash mid-run leaves
/// `processing` rather than `pending`. State writes are best effort: a
/// failed write is logged and the run's result is still returned.
pub async fn process_run(
    auditor: &GeoAuditor,
    store: &dyn RunStore,
    id: &str,
    url: &str,
) -> Result<AuditOutcome> {
    if let Err(e) = store.mark_processing(id).await {
        warn!(run_id = id, error = %e, "Failed to mark run processing");
    }
    info!(run_id = id, url, "Run processing");

    match auditor.run(url).await {
        Ok(outcome) => {
            if let Err(e) = store.mark_done(id, &RunCompletion::from(&outcome)).await {
                error!(run_id = id, error = %e, "Failed to persist finished run");
            } else {
                info!(run_id = id, score = ?outcome.geo_score, "Run done");
            }
            Ok(outcome)
        }
        Err(err) => {
            let trace = err.diagnostic_trace();
            if let Err(e) = store.mark_error(id, &trace).await {
                error!(run_id = id, error = %e, "Failed to persist run error");
            }
            error!(run_id = id, kind = err.kind(), error = %err, "Run failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trigger_requires_record_id_and_url() {
        assert_eq!(
            TriggerRecord::from_payload(&json!({"record": {"id": "r1", "url": "https://a.example"}})),
            Ok(TriggerRecord {
                id: "r1".into(),
                url: "https://a.example".into()
            })
        );
        assert_eq!(
            TriggerRecord::from_payload(&json!({"record": {"id": "r1"}})),
            Err(TriggerError::MissingField("url"))
        );
        assert_eq!(
            TriggerRecord::from_payload(&json!({"record": {"url": "https://a.example"}})),
            Err(TriggerError::MissingField("id"))
        );
        assert_eq!(
            TriggerRecord::from_payload(&json!({"record": {"id": "r1", "url": "  "}})),
            Err(TriggerError::MissingField("url"))
        );
        assert_eq!(
            TriggerRecord::from_payload(&json!({"id": "r1", "url": "https://a.example"})),
            Err(TriggerError::MissingRecord)
        );
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let rec = TriggerRecord::from_payload(&json!({"record": {"id": 42, "url": "https://a.example"}}))
            .unwrap();
        assert_eq!(rec.id, "42");
    }
}
