//! Default trigger action.

use async_trait::async_trait;
use event_triggers_scheduler::{ActionError, Trigger, TriggerAction};
use tracing::info;

/// Emits a structured `trigger fired` event for every firing.
///
/// Deployments that need a real side effect supply their own
/// [`TriggerAction`] at the composition root.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAction;

#[async_trait]
impl TriggerAction for LogAction {
    async fn run(&self, trigger: &Trigger) -> Result<(), ActionError> {
        info!(
            trigger = %trigger.name,
            kind = %trigger.kind(),
            payload = ?trigger.payload,
            "trigger fired"
        );
        Ok(())
    }
}
