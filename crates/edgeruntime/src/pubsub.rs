use edgecore::Tuple;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// In-process topic broker connecting published streams to external
/// collectors.
///
/// Each subscriber sees every tuple published after it subscribed, once and
/// in publication order.
pub struct PublishSubscribe {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Tuple>>>>,
}

impl PublishSubscribe {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Tuple> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver `tuple` to every live subscriber of `topic`, returning how
    /// many received it. Dropped subscribers are pruned.
    pub fn publish(&self, topic: &str, tuple: Tuple) -> usize {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(subscribers) = topics.get_mut(topic) else {
            return 0;
        };
        subscribers.retain(|tx| tx.send(tuple.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(topic)
            .map_or(0, |subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
    }
}

impl Default for PublishSubscribe {
    fn default() -> Self {
        Self::new()
    }
}
