//! Publishing status changes onto the realtime channel.

use std::sync::Arc;

use tracing::warn;

use creatives_events::{EventBus, StatusEvent, Subscription};

/// Object-safe view of an `EventBus<StatusEvent>`.
///
/// Publish failures are logged, never returned: the change is already
/// persisted and the consistency scanner repairs any aggregate a lost
/// notification leaves stale.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, event: StatusEvent);

    fn subscribe(&self) -> Subscription<StatusEvent>;
}

impl<B> StatusNotifier for B
where
    B: EventBus<StatusEvent>,
{
    fn notify(&self, event: StatusEvent) {
        let topic = event.topic();
        let owner_id = event.owner_id();
        if let Err(err) = self.publish(event) {
            warn!(topic, owner_id = %owner_id, error = ?err, "failed to publish status event");
        }
    }

    fn subscribe(&self) -> Subscription<StatusEvent> {
        EventBus::subscribe(self)
    }
}

pub type SharedNotifier = Arc<dyn StatusNotifier>;

#[cfg(test)]
mod tests {
    use super::*;
    use creatives_core::{JobId, JobStatus, OwnerId};
    use creatives_events::InMemoryEventBus;

    #[test]
    fn notifier_forwards_to_bus_subscribers() {
        let notifier: SharedNotifier = Arc::new(InMemoryEventBus::<StatusEvent>::new());
        let sub = notifier.subscribe();

        let event = StatusEvent::job_status_changed(OwnerId::new(), JobId::new(), None, JobStatus::Queued);
        notifier.notify(event.clone());

        assert_eq!(sub.try_recv().unwrap(), event);
    }
}
