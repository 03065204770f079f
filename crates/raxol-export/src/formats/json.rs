//! Pretty-printed JSON array.

use serde_json::Value;

use raxol_contracts::{AuditEvent, AuditResult};

use super::event_object;

pub fn encode(events: &[AuditEvent], include_metadata: bool) -> AuditResult<Vec<u8>> {
    let array = events
        .iter()
        .map(|e| event_object(e, include_metadata).map(Value::Object))
        .collect::<AuditResult<Vec<_>>>()?;
    Ok(serde_json::to_vec_pretty(&array)?)
}
