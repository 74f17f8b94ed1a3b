use crate::message::WorkMessage;
use async_trait::async_trait;
use precompute_core::Result;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A delivered message plus the delivery handle the consumer acks/nacks.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: u64,
    pub message: WorkMessage,
}

/// At-least-once queue contract (§6.2, §4.4a): visibility-timeout based
/// redelivery, batch size one, a dead-letter sink after `max_redeliveries`.
/// An external broker is a deployment decision; swapping one in only
/// requires a new implementation of this trait.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, message: WorkMessage) -> Result<()>;

    /// Returns the next message whose visible-at has passed, immediately
    /// pushing its visible-at forward by the visibility timeout. `None` if
    /// nothing is currently visible.
    async fn receive(&self) -> Option<Delivery>;

    /// Removes a delivered message permanently.
    async fn ack(&self, delivery_id: u64) -> Result<()>;

    /// Makes a delivered message immediately visible again, incrementing its
    /// redelivery counter. Moves it to the dead-letter sink instead once the
    /// counter exceeds the configured bound.
    async fn nack(&self, delivery_id: u64) -> Result<()>;

    async fn dead_letters(&self) -> Vec<WorkMessage>;

    async fn len(&self) -> usize;
}

struct Entry {
    id: u64,
    message: WorkMessage,
    visible_at: Instant,
    redelivery_count: u32,
}

struct State {
    next_id: u64,
    entries: VecDeque<Entry>,
    dead_letters: Vec<WorkMessage>,
}

/// In-process implementation suitable for a single-binary deployment and
/// tests. Entries live in a mutex-guarded deque, the same shape the fetcher's
/// sliding-window rate limiter and the controller's bounded fan-out already
/// use for their own shared state.
pub struct InProcessQueue {
    state: Mutex<State>,
    visibility_timeout: Duration,
    max_redeliveries: u32,
}

impl InProcessQueue {
    pub fn new(visibility_timeout: Duration, max_redeliveries: u32) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                entries: VecDeque::new(),
                dead_letters: Vec::new(),
            }),
            visibility_timeout,
            max_redeliveries,
        }
    }
}

#[async_trait]
impl WorkQueue for InProcessQueue {
    async fn enqueue(&self, message: WorkMessage) -> Result<()> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push_back(Entry {
            id,
            message,
            visible_at: Instant::now(),
            redelivery_count: 0,
        });
        Ok(())
    }

    async fn receive(&self) -> Option<Delivery> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let now = Instant::now();
        let visibility_timeout = self.visibility_timeout;

        let position = state.entries.iter().position(|e| e.visible_at <= now)?;
        let entry = &mut state.entries[position];
        entry.visible_at = now + visibility_timeout;

        Some(Delivery {
            id: entry.id,
            message: entry.message.clone(),
        })
    }

    async fn ack(&self, delivery_id: u64) -> Result<()> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.entries.retain(|e| e.id != delivery_id);
        Ok(())
    }

    async fn nack(&self, delivery_id: u64) -> Result<()> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let max_redeliveries = self.max_redeliveries;

        let Some(position) = state.entries.iter().position(|e| e.id == delivery_id) else {
            return Ok(());
        };

        let exceeded = state.entries[position].redelivery_count >= max_redeliveries;
        if exceeded {
            let entry = state.entries.remove(position).expect("position was just found");
            tracing::warn!(
                delivery_id,
                redeliveries = entry.redelivery_count,
                "message exceeded redelivery bound, moving to dead-letter sink"
            );
            state.dead_letters.push(entry.message);
        } else {
            let entry = &mut state.entries[position];
            entry.redelivery_count += 1;
            entry.visible_at = Instant::now();
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Vec<WorkMessage> {
        let state = self.state.lock().expect("queue mutex poisoned");
        state.dead_letters.clone()
    }

    async fn len(&self) -> usize {
        let state = self.state.lock().expect("queue mutex poisoned");
        state.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_message() -> WorkMessage {
        WorkMessage {
            phase: crate::message::Phase::Raw,
            symbol: "AAPL".to_string(),
            master_id: 1,
            business_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            correlation_id: "run-1".to_string(),
        }
    }

    #[tokio::test]
    async fn receive_returns_none_on_empty_queue() {
        let queue = InProcessQueue::new(Duration::from_secs(30), 3);
        assert!(queue.receive().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_then_receive_then_ack_drains_the_queue() {
        let queue = InProcessQueue::new(Duration::from_secs(30), 3);
        queue.enqueue(sample_message()).await.unwrap();

        let delivery = queue.receive().await.expect("message should be visible");
        assert_eq!(delivery.message.symbol, "AAPL");
        assert_eq!(queue.len().await, 1, "acked message is removed, not the in-flight one");

        queue.ack(delivery.id).await.unwrap();
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn a_delivered_message_is_not_immediately_redelivered() {
        let queue = InProcessQueue::new(Duration::from_secs(30), 3);
        queue.enqueue(sample_message()).await.unwrap();

        let first = queue.receive().await.unwrap();
        assert!(queue.receive().await.is_none(), "visibility timeout should hide it");
        queue.ack(first.id).await.unwrap();
    }

    #[tokio::test]
    async fn nack_makes_the_message_immediately_visible_again() {
        let queue = InProcessQueue::new(Duration::from_secs(30), 3);
        queue.enqueue(sample_message()).await.unwrap();

        let first = queue.receive().await.unwrap();
        queue.nack(first.id).await.unwrap();

        let redelivered = queue.receive().await.expect("nack should make it visible again");
        assert_eq!(redelivered.id, first.id);
    }

    #[tokio::test]
    async fn exceeding_max_redeliveries_moves_the_message_to_dead_letters() {
        let queue = InProcessQueue::new(Duration::from_secs(30), 2);
        queue.enqueue(sample_message()).await.unwrap();

        for _ in 0..3 {
            let delivery = queue.receive().await.expect("message should still be receivable");
            queue.nack(delivery.id).await.unwrap();
        }

        assert!(queue.receive().await.is_none());
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].symbol, "AAPL");
    }
}
