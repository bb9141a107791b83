use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{events, rooms, DomainEvent, Notification};

/// Fans lifecycle events out to the realtime broadcast channel and the
/// in-app inbox. Delivery is fire-and-forget: a committed ride status never
/// depends on a listener, so send failures are logged and swallowed.
pub struct Notifier {
    events_tx: broadcast::Sender<DomainEvent>,
    inbox: DashMap<Uuid, Vec<Notification>>,
}

impl Notifier {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            events_tx,
            inbox: DashMap::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events_tx.subscribe()
    }

    /// Publishes an event to a room. A send error only means nobody is
    /// subscribed right now.
    pub fn broadcast(&self, room: String, event: &'static str, payload: serde_json::Value) {
        let event = DomainEvent {
            room,
            event,
            payload,
            at: Utc::now(),
        };

        if self.events_tx.send(event).is_err() {
            tracing::debug!("no realtime subscribers connected");
        }
    }

    /// Writes an inbox record and mirrors it to the user's room.
    pub fn notify_user(&self, user_id: Uuid, title: &str, body: &str) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            body: body.to_string(),
            read: false,
            created_at: Utc::now(),
        };

        self.inbox
            .entry(user_id)
            .or_insert_with(Vec::new)
            .push(notification.clone());

        match serde_json::to_value(&notification) {
            Ok(payload) => self.broadcast(rooms::user(user_id), events::NEW_NOTIFICATION, payload),
            Err(err) => tracing::warn!(error = %err, "failed to serialize notification"),
        }

        notification
    }

    /// Inbox for a user, newest first.
    pub fn list_for_user(&self, user_id: Uuid) -> Vec<Notification> {
        let mut notifications = self
            .inbox
            .get(&user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }

    pub fn mark_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Notification, AppError> {
        let mut entries = self.inbox.get_mut(&user_id).ok_or_else(|| {
            AppError::NotFound(format!("notification {notification_id} not found"))
        })?;

        let notification = entries
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("notification {notification_id} not found"))
            })?;
        notification.read = true;
        Ok(notification.clone())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::Notifier;
    use crate::models::event::events;

    #[test]
    fn notify_user_writes_the_inbox_and_broadcasts() {
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();
        let user_id = Uuid::new_v4();

        let sent = notifier.notify_user(user_id, "Driver found", "Your driver is on the way");

        let inbox = notifier.list_for_user(user_id);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, sent.id);
        assert!(!inbox[0].read);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, events::NEW_NOTIFICATION);
        assert_eq!(event.room, format!("user:{user_id}"));
    }

    #[test]
    fn broadcast_without_subscribers_does_not_panic() {
        let notifier = Notifier::new(16);
        notifier.broadcast(
            "drivers".to_string(),
            events::RIDE_REQUESTED,
            serde_json::json!({}),
        );
    }

    #[test]
    fn mark_read_flips_the_flag() {
        let notifier = Notifier::new(16);
        let user_id = Uuid::new_v4();
        let sent = notifier.notify_user(user_id, "Driver found", "On the way");

        let updated = notifier.mark_read(user_id, sent.id).unwrap();
        assert!(updated.read);
        assert!(notifier.list_for_user(user_id)[0].read);

        assert!(notifier.mark_read(user_id, Uuid::new_v4()).is_err());
    }
}
