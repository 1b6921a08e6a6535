use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{ConnError, ServerError};
use crate::frame::Frame;
use crate::subscription::AckMode;

/// Callback invoked for every MESSAGE delivered to a subscription.
pub type MessageHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Outcome delivered to whoever waits on a receipt: the RECEIPT frame, or
/// the ERROR frame that carried the matching `receipt-id`.
pub(crate) type ReceiptOutcome = Result<Frame, ServerError>;

/// Internal subscription entry stored for each subscription id.
pub(crate) struct SubscriptionEntry {
    pub(crate) destination: String,
    pub(crate) ack: AckMode,
    pub(crate) handler: MessageHandler,
}

/// An ack id awaiting ACK/NACK, and which MESSAGE header carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingAck {
    pub(crate) id: String,
    /// Taken from the `ack` header (answered with `id`) rather than
    /// `message-id` (answered with `message-id` + `subscription`).
    pub(crate) from_ack_header: bool,
}

/// Where a retired ack id was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetiredAck {
    pub(crate) subscription: String,
    pub(crate) from_ack_header: bool,
}

/// What happened to an inbound MESSAGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    UnknownSubscription,
    NoSubscriptionHeader,
}

/// Correlation state shared between the session task and caller handles.
///
/// Ids come from per-connection counters, so they are unique for the
/// lifetime of one connection. Every map sits behind its own lock; when two
/// are needed the order is always `subscriptions` then `pending_acks`.
#[derive(Default)]
pub(crate) struct DispatchTable {
    sub_counter: AtomicU64,
    receipt_counter: AtomicU64,
    tx_counter: AtomicU64,
    /// subscription id -> entry
    subscriptions: Mutex<HashMap<String, SubscriptionEntry>>,
    /// subscription id -> ack ids awaiting ACK/NACK, in delivery order.
    ///
    /// For `client` ack mode acknowledgement is cumulative: acking id `M`
    /// retires every id delivered before `M` on the same subscription.
    /// For `client-individual` only `M` itself is retired.
    pending_acks: Mutex<HashMap<String, VecDeque<PendingAck>>>,
    /// receipt id -> completion
    receipts: Mutex<HashMap<String, oneshot::Sender<ReceiptOutcome>>>,
    /// open transaction ids
    transactions: Mutex<HashSet<String>>,
}

impl DispatchTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_subscription_id(&self) -> String {
        format!("sub-{}", self.sub_counter.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_receipt_id(&self) -> String {
        format!("rcpt-{}", self.receipt_counter.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn next_transaction_id(&self) -> String {
        format!("tx-{}", self.tx_counter.fetch_add(1, Ordering::SeqCst))
    }

    // subscriptions

    pub(crate) async fn register_subscription(
        &self,
        id: &str,
        entry: SubscriptionEntry,
    ) -> Result<(), ConnError> {
        let mut map = self.subscriptions.lock().await;
        if map.contains_key(id) {
            return Err(ConnError::DuplicateSubscription(id.to_string()));
        }
        debug!(id, destination = %entry.destination, ack = entry.ack.as_str(), "subscription registered");
        map.insert(id.to_string(), entry);
        Ok(())
    }

    /// Remove a subscription and forget its unacknowledged messages.
    pub(crate) async fn remove_subscription(&self, id: &str) -> Option<SubscriptionEntry> {
        let mut map = self.subscriptions.lock().await;
        let entry = map.remove(id)?;
        self.pending_acks.lock().await.remove(id);
        debug!(id, destination = %entry.destination, "subscription removed");
        Some(entry)
    }

    /// Remove every subscription on `destination`, returning their ids in
    /// sorted order.
    pub(crate) async fn remove_destination(&self, destination: &str) -> Vec<String> {
        let mut map = self.subscriptions.lock().await;
        let mut ids: Vec<String> = map
            .iter()
            .filter(|(_, entry)| entry.destination == destination)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        let mut pending = self.pending_acks.lock().await;
        for id in &ids {
            map.remove(id);
            pending.remove(id);
        }
        debug!(destination, removed = ids.len(), "subscriptions removed by destination");
        ids
    }

    /// Route a MESSAGE to its subscription handler.
    ///
    /// On client-ack subscriptions the MESSAGE's `ack` header is recorded as
    /// its ack id, falling back to `message-id` when the broker sent none.
    /// The handler runs while the subscription map is locked, so once
    /// `remove_subscription` has returned no further call for that id can
    /// happen. Handlers must therefore not block.
    pub(crate) async fn deliver(&self, frame: Frame) -> Delivery {
        let Some(sub_id) = frame.get_header("subscription").map(str::to_string) else {
            return Delivery::NoSubscriptionHeader;
        };
        let map = self.subscriptions.lock().await;
        let Some(entry) = map.get(&sub_id) else {
            return Delivery::UnknownSubscription;
        };

        if entry.ack != AckMode::Auto {
            let token = match frame.get_header("ack") {
                Some(id) => Some((id, true)),
                None => frame.get_header("message-id").map(|id| (id, false)),
            };
            match token {
                Some((id, from_ack_header)) => {
                    let mut pending = self.pending_acks.lock().await;
                    pending.entry(sub_id.clone()).or_default().push_back(PendingAck {
                        id: id.to_string(),
                        from_ack_header,
                    });
                }
                None => warn!(
                    subscription = %sub_id,
                    "MESSAGE without ack or message-id on a client-ack subscription"
                ),
            }
        }

        trace!(subscription = %sub_id, "delivering MESSAGE");
        (entry.handler)(frame);
        Delivery::Delivered
    }

    /// Retire `ack_id` from the pending queue it was delivered on.
    pub(crate) async fn retire_ack(&self, ack_id: &str) -> Result<RetiredAck, ConnError> {
        let map = self.subscriptions.lock().await;
        let mut pending = self.pending_acks.lock().await;

        let found = pending.iter().find_map(|(sub_id, queue)| {
            queue
                .iter()
                .position(|p| p.id == ack_id)
                .map(|pos| (sub_id.clone(), pos, queue[pos].from_ack_header))
        });
        let Some((sub_id, pos, from_ack_header)) = found else {
            return Err(ConnError::UnknownAckId(ack_id.to_string()));
        };

        let mode = map
            .get(&sub_id)
            .map(|entry| entry.ack)
            .unwrap_or(AckMode::Client);
        if let Some(queue) = pending.get_mut(&sub_id) {
            if mode == AckMode::Client {
                queue.drain(..=pos);
            } else {
                queue.remove(pos);
            }
            if queue.is_empty() {
                pending.remove(&sub_id);
            }
        }
        Ok(RetiredAck {
            subscription: sub_id,
            from_ack_header,
        })
    }

    /// Ack ids still awaiting ACK/NACK for a subscription, oldest first.
    pub(crate) async fn pending_acks(&self, sub_id: &str) -> Vec<String> {
        self.pending_acks
            .lock()
            .await
            .get(sub_id)
            .map(|q| q.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    // receipts

    /// Start waiting for a receipt. An id that is already pending is
    /// refused so the earlier waiter keeps its entry.
    pub(crate) async fn register_receipt(
        &self,
        id: &str,
    ) -> Result<oneshot::Receiver<ReceiptOutcome>, ConnError> {
        let mut receipts = self.receipts.lock().await;
        if receipts.contains_key(id) {
            return Err(ConnError::DuplicateReceipt(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        receipts.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Register a generated receipt id, skipping any a caller already used.
    pub(crate) async fn register_fresh_receipt(&self) -> (String, oneshot::Receiver<ReceiptOutcome>) {
        loop {
            let id = self.next_receipt_id();
            if let Ok(rx) = self.register_receipt(&id).await {
                return (id, rx);
            }
        }
    }

    /// Resolve a pending receipt exactly once.
    ///
    /// Unknown or already resolved ids are logged and ignored. Returns
    /// whether an entry was resolved.
    pub(crate) async fn resolve_receipt(&self, id: &str, outcome: ReceiptOutcome) -> bool {
        let sender = self.receipts.lock().await.remove(id);
        match sender {
            Some(sender) => {
                if sender.send(outcome).is_err() {
                    trace!(receipt = id, "receipt resolved after waiter went away");
                }
                true
            }
            None => {
                warn!(receipt = id, "no pending receipt with this id");
                false
            }
        }
    }

    /// Forget a receipt nobody will wait for anymore.
    pub(crate) async fn discard_receipt(&self, id: &str) {
        self.receipts.lock().await.remove(id);
    }

    pub(crate) async fn pending_receipt_count(&self) -> usize {
        self.receipts.lock().await.len()
    }

    // transactions

    pub(crate) async fn begin_transaction(&self, id: &str) -> Result<(), ConnError> {
        if !self.transactions.lock().await.insert(id.to_string()) {
            return Err(ConnError::TransactionExists(id.to_string()));
        }
        Ok(())
    }

    pub(crate) async fn end_transaction(&self, id: &str) -> Result<(), ConnError> {
        if !self.transactions.lock().await.remove(id) {
            return Err(ConnError::UnknownTransaction(id.to_string()));
        }
        Ok(())
    }

    pub(crate) async fn has_transaction(&self, id: &str) -> bool {
        self.transactions.lock().await.contains(id)
    }

    /// Drop all correlation state. Pending receipt waiters observe their
    /// sender being dropped and fail with `ConnectionClosed`.
    pub(crate) async fn clear(&self) {
        let failed = {
            let mut receipts = self.receipts.lock().await;
            let n = receipts.len();
            receipts.clear();
            n
        };
        if failed > 0 {
            debug!(failed, "pending receipts failed on connection close");
        }
        self.subscriptions.lock().await.clear();
        self.pending_acks.lock().await.clear();
        self.transactions.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Command;
    use std::sync::Mutex as StdMutex;

    fn recording_entry(ack: AckMode) -> (SubscriptionEntry, Arc<StdMutex<Vec<Frame>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let entry = SubscriptionEntry {
            destination: "/queue/x".to_string(),
            ack,
            handler: Arc::new(move |f: Frame| sink.lock().unwrap().push(f)),
        };
        (entry, seen)
    }

    fn message(sub: &str, ack: &str) -> Frame {
        Frame::new(Command::Message)
            .header("subscription", sub)
            .header("message-id", format!("m-{}", ack))
            .header("ack", ack)
    }

    #[test]
    fn generated_ids_are_unique_per_kind() {
        let table = DispatchTable::new();
        let subs: HashSet<String> = (0..100).map(|_| table.next_subscription_id()).collect();
        let receipts: HashSet<String> = (0..100).map(|_| table.next_receipt_id()).collect();
        assert_eq!(subs.len(), 100);
        assert_eq!(receipts.len(), 100);
        assert!(table.next_transaction_id().starts_with("tx-"));
    }

    #[tokio::test]
    async fn cumulative_ack_retires_prefix() {
        let table = DispatchTable::new();
        let (entry, _seen) = recording_entry(AckMode::Client);
        table.register_subscription("s1", entry).await.unwrap();
        for id in ["a", "b", "c"] {
            assert_eq!(table.deliver(message("s1", id)).await, Delivery::Delivered);
        }

        assert_eq!(table.retire_ack("b").await.unwrap().subscription, "s1");
        assert_eq!(table.pending_acks("s1").await, vec!["c".to_string()]);
        assert!(matches!(
            table.retire_ack("a").await,
            Err(ConnError::UnknownAckId(id)) if id == "a"
        ));
    }

    #[tokio::test]
    async fn individual_ack_retires_only_one() {
        let table = DispatchTable::new();
        let (entry, _seen) = recording_entry(AckMode::ClientIndividual);
        table.register_subscription("s2", entry).await.unwrap();
        for id in ["a", "b", "c"] {
            table.deliver(message("s2", id)).await;
        }

        table.retire_ack("b").await.unwrap();
        assert_eq!(
            table.pending_acks("s2").await,
            vec!["a".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn auto_subscriptions_track_no_acks() {
        let table = DispatchTable::new();
        let (entry, seen) = recording_entry(AckMode::Auto);
        table.register_subscription("s3", entry).await.unwrap();
        table.deliver(message("s3", "a")).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(table.pending_acks("s3").await.is_empty());
        assert!(table.retire_ack("a").await.is_err());
    }

    #[tokio::test]
    async fn removed_subscription_receives_nothing() {
        let table = DispatchTable::new();
        let (entry, seen) = recording_entry(AckMode::Client);
        table.register_subscription("s4", entry).await.unwrap();
        table.deliver(message("s4", "a")).await;
        assert!(table.remove_subscription("s4").await.is_some());

        assert_eq!(
            table.deliver(message("s4", "b")).await,
            Delivery::UnknownSubscription
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(table.pending_acks("s4").await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_subscription_id_is_rejected() {
        let table = DispatchTable::new();
        let (a, _) = recording_entry(AckMode::Auto);
        let (b, _) = recording_entry(AckMode::Auto);
        table.register_subscription("dup", a).await.unwrap();
        assert!(matches!(
            table.register_subscription("dup", b).await,
            Err(ConnError::DuplicateSubscription(_))
        ));
    }

    #[tokio::test]
    async fn receipt_resolves_once_and_leaves_others_alone() {
        let table = DispatchTable::new();
        let rx1 = table.register_receipt("r1").await.unwrap();
        let _rx2 = table.register_receipt("r2").await.unwrap();

        let receipt = Frame::new(Command::Receipt).header("receipt-id", "r1");
        assert!(table.resolve_receipt("r1", Ok(receipt.clone())).await);
        assert!(!table.resolve_receipt("r1", Ok(receipt)).await);
        assert!(!table.resolve_receipt("never", Err(ServerError::from_frame(Frame::new(Command::Error)))).await);

        assert_eq!(rx1.await.unwrap().unwrap().command, Command::Receipt);
        assert_eq!(table.pending_receipt_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_receipt_id_keeps_first_waiter() {
        let table = DispatchTable::new();
        let rx = table.register_receipt("rcpt-0").await.unwrap();
        assert!(matches!(
            table.register_receipt("rcpt-0").await,
            Err(ConnError::DuplicateReceipt(id)) if id == "rcpt-0"
        ));

        let (fresh, _rx) = table.register_fresh_receipt().await;
        assert_eq!(fresh, "rcpt-1");

        let receipt = Frame::new(Command::Receipt).header("receipt-id", "rcpt-0");
        assert!(table.resolve_receipt("rcpt-0", Ok(receipt)).await);
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn ack_id_falls_back_to_message_id() {
        let table = DispatchTable::new();
        let (entry, _seen) = recording_entry(AckMode::ClientIndividual);
        table.register_subscription("s5", entry).await.unwrap();
        table.deliver(message("s5", "a")).await;
        let legacy = Frame::new(Command::Message)
            .header("subscription", "s5")
            .header("message-id", "m-9");
        table.deliver(legacy).await;

        assert_eq!(table.pending_acks("s5").await, vec!["a".to_string(), "m-9".to_string()]);
        assert!(table.retire_ack("a").await.unwrap().from_ack_header);
        let retired = table.retire_ack("m-9").await.unwrap();
        assert_eq!(retired.subscription, "s5");
        assert!(!retired.from_ack_header);
    }

    #[tokio::test]
    async fn clear_fails_pending_receipts() {
        let table = DispatchTable::new();
        let rx = table.register_receipt("r").await.unwrap();
        table.begin_transaction("tx").await.unwrap();
        table.clear().await;

        assert!(rx.await.is_err());
        assert!(!table.has_transaction("tx").await);
    }

    #[tokio::test]
    async fn transactions_open_and_close_once() {
        let table = DispatchTable::new();
        table.begin_transaction("t1").await.unwrap();
        assert!(matches!(
            table.begin_transaction("t1").await,
            Err(ConnError::TransactionExists(_))
        ));
        table.end_transaction("t1").await.unwrap();
        assert!(matches!(
            table.end_transaction("t1").await,
            Err(ConnError::UnknownTransaction(_))
        ));
    }
}
