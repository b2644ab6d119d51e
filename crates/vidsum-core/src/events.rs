//! Publish/subscribe over named channels (spec.md §4.3), grounded in the
//! `tokio::sync::broadcast` + `Lagged`/`Closed` handling used throughout
//! `querymt_agent`'s UI and remote-mesh event plumbing
//! (`crates/agent/src/ui/connection.rs`, `crates/agent/src/agent/handle.rs`).

use futures::stream::{self, Stream};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::model::EventBusMessage;

const CHANNEL_CAPACITY: usize = 64;

/// Publish/subscribe over channels keyed by video id. Each message is
/// `{event, data}` (see [`EventBusMessage`]). Subscriptions are a lazy,
/// finite sequence terminated by the first `Close` or by an idle timeout.
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish. A channel with no subscribers silently
    /// drops the message.
    fn publish(&self, channel: &str, message: EventBusMessage);

    /// Subscribe to a channel. The returned stream ends after the first
    /// `Close` message (which it still yields) or after `idle_timeout`
    /// elapses with no new message.
    fn subscribe(
        &self,
        channel: &str,
        idle_timeout: Duration,
    ) -> Pin<Box<dyn Stream<Item = EventBusMessage> + Send>>;
}

/// In-process implementation backed by one `broadcast` channel per topic.
#[derive(Default)]
pub struct InMemoryEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<EventBusMessage>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<EventBusMessage> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, channel: &str, message: EventBusMessage) {
        let is_close = matches!(message, EventBusMessage::Close);

        let sender = {
            let channels = self.channels.lock().unwrap();
            channels.get(channel).cloned()
        };

        let Some(sender) = sender else {
            debug!(channel, "publish to channel with no subscribers, dropping");
            return;
        };

        // Fire-and-forget: an error here just means every receiver has
        // already dropped, which is not a failure for the publisher.
        let _ = sender.send(message);

        if is_close {
            // The channel is done; idempotent close and the "transient
            // topic" semantics of spec.md §3 mean we drop the entry so a
            // late `publish` is a no-op rather than resurrecting history
            // for a future subscriber.
            self.channels.lock().unwrap().remove(channel);
        }
    }

    fn subscribe(
        &self,
        channel: &str,
        idle_timeout: Duration,
    ) -> Pin<Box<dyn Stream<Item = EventBusMessage> + Send>> {
        let rx = self.sender_for(channel).subscribe();
        let channel = channel.to_string();

        Box::pin(stream::unfold(Some(rx), move |state| {
            let channel = channel.clone();
            async move {
                let mut rx = state?;
                loop {
                    match tokio::time::timeout(idle_timeout, rx.recv()).await {
                        Ok(Ok(EventBusMessage::Close)) => {
                            return Some((EventBusMessage::Close, None));
                        }
                        Ok(Ok(msg)) => return Some((msg, Some(rx))),
                        Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                            warn!(channel, lagged = n, "subscriber lagged, continuing");
                            continue;
                        }
                        Ok(Err(broadcast::error::RecvError::Closed)) => {
                            debug!(channel, "channel sender dropped, ending subscription");
                            return None;
                        }
                        Err(_elapsed) => {
                            debug!(channel, "subscription idle timeout elapsed");
                            return None;
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SummaryPayload, SummaryState};
    use futures::StreamExt;

    fn done_payload() -> EventBusMessage {
        EventBusMessage::Summary(SummaryPayload {
            state: SummaryState::Done,
            chapters: vec![],
        })
    }

    #[tokio::test]
    async fn publish_before_subscribe_is_a_no_op() {
        let bus = InMemoryEventBus::new();
        bus.publish("vid1", done_payload());
        // No subscriber existed, so nothing should be buffered; a fresh
        // subscribe only sees what's published after it subscribes.
        let mut sub = bus.subscribe("vid1", Duration::from_millis(50));
        bus.publish("vid1", EventBusMessage::Close);
        let first = sub.next().await;
        assert!(matches!(first, Some(EventBusMessage::Close)));
    }

    #[tokio::test]
    async fn subscriber_observes_done_then_close_in_order() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe("vid2", Duration::from_secs(5));
        bus.publish("vid2", done_payload());
        bus.publish("vid2", EventBusMessage::Close);

        let first = sub.next().await.unwrap();
        assert!(matches!(first, EventBusMessage::Summary(_)));
        let second = sub.next().await.unwrap();
        assert!(matches!(second, EventBusMessage::Close));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn idle_subscriber_times_out() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe("vid3", Duration::from_millis(20));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_the_message() {
        let bus = InMemoryEventBus::new();
        let mut a = bus.subscribe("vid4", Duration::from_secs(5));
        let mut b = bus.subscribe("vid4", Duration::from_secs(5));
        bus.publish("vid4", EventBusMessage::Close);
        assert!(matches!(a.next().await, Some(EventBusMessage::Close)));
        assert!(matches!(b.next().await, Some(EventBusMessage::Close)));
    }
}
