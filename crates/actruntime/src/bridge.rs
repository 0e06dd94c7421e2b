use crate::instance::WorkflowInstance;
use std::sync::{Arc, Weak};

/// Bridges a native event source to a workflow instance.
///
/// A binding is a cheap cloneable handle the host hands to whatever raises
/// the event; firing it converts the event into a redirection request at the
/// registered handler activity's own priority. The binding does not keep the
/// instance alive: firing after the instance is dropped is a no-op.
#[derive(Clone)]
pub struct EventBinding {
    instance: Weak<WorkflowInstance>,
    event: String,
}

impl EventBinding {
    pub fn new(instance: &Arc<WorkflowInstance>, event: impl Into<String>) -> Self {
        Self {
            instance: Arc::downgrade(instance),
            event: event.into(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Fire the native event. Returns the number of handler activities the
    /// firing was routed to.
    pub fn fire(&self) -> usize {
        match self.instance.upgrade() {
            Some(instance) => instance.fire_event(&self.event),
            None => {
                tracing::debug!(event = %self.event, "event fired after instance dropped");
                0
            }
        }
    }
}
