//! Fire-and-forget alert fan-out.
//!
//! Each dispatch runs every registered handler on one detached thread. A
//! handler error or panic is logged and never reaches the logger.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use raxol_contracts::{AuditEvent, AuditResult};
use raxol_core::AlertHandler;

#[derive(Clone, Default)]
pub struct AlertDispatcher {
    handlers: Vec<Arc<dyn AlertHandler>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn AlertHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Hand `event` to every handler without waiting for them.
    ///
    /// Returns false when there was nothing to dispatch to.
    pub fn dispatch(&self, event: &AuditEvent) -> AuditResult<bool> {
        if self.handlers.is_empty() {
            return Ok(false);
        }
        let handlers = self.handlers.clone();
        let event = event.clone();
        std::thread::Builder::new()
            .name("audit-alert".to_string())
            .spawn(move || {
                for handler in handlers {
                    match catch_unwind(AssertUnwindSafe(|| handler.on_alert(&event))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(event_id = %event.event_id, error = %e, "alert handler failed"),
                        Err(_) => error!(event_id = %event.event_id, "alert handler panicked"),
                    }
                }
                debug!(event_id = %event.event_id, "alert dispatched");
            })?;
        Ok(true)
    }
}
