//! Push notifications fanned out to every `/notifications` subscriber.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
}

/// Broadcast hub. Subscribers that fall more than `capacity` messages behind
/// skip the ones they missed.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver to current subscribers. Returns how many received it.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Notifications published from now on. Lagged gaps are dropped.
    pub fn subscribe(&self) -> impl Stream<Item = Notification> + Send + use<> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| item.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let notifier = Notifier::new(8);
        let mut a = Box::pin(notifier.subscribe());
        let mut b = Box::pin(notifier.subscribe());

        let delivered = notifier.publish(Notification {
            message: "new photos".into(),
        });
        assert_eq!(delivered, 2);
        assert_eq!(a.next().await.unwrap().message, "new photos");
        assert_eq!(b.next().await.unwrap().message, "new photos");
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let notifier = Notifier::new(8);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(
            notifier.publish(Notification {
                message: "nobody".into()
            }),
            0
        );
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_missed_messages() {
        let notifier = Notifier::new(2);
        let mut slow = Box::pin(notifier.subscribe());
        for i in 0..5 {
            notifier.publish(Notification {
                message: format!("m{i}"),
            });
        }
        assert_eq!(slow.next().await.unwrap().message, "m3");
        assert_eq!(slow.next().await.unwrap().message, "m4");
    }
}
