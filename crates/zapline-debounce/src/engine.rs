// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dedup/debounce engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use zapline_config::model::DebounceConfig;
use zapline_core::{InboundBatch, MessageId, TenantId};
use zapline_resilience::TtlCache;

/// Receives a sealed batch. Runs outside the engine lock.
pub type FlushCallback = Arc<dyn Fn(InboundBatch) -> BoxFuture<'static, ()> + Send + Sync>;

/// Batches are keyed per tenant and sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub tenant_id: TenantId,
    pub sender: String,
}

impl BatchKey {
    pub fn new(tenant_id: TenantId, sender: impl Into<String>) -> Self {
        Self {
            tenant_id,
            sender: sender.into(),
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.sender)
    }
}

/// How a newly added message should be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Buffer and (re)start the quiet-period timer.
    Deferred,
    /// Flush now, together with anything already pending for the key.
    Immediate,
}

/// What `add_message` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The id was already pending or processed; nothing changed.
    Duplicate,
    /// Buffered; `pending` fragments now wait for the quiet period.
    Buffered { pending: usize },
    /// Flushed before returning.
    ProcessedImmediately,
}

#[derive(Debug, Clone)]
pub struct DebounceSettings {
    pub quiet_period: Duration,
    pub processed_ttl: Duration,
    pub max_processed: usize,
    pub separator: String,
}

impl DebounceSettings {
    /// The dispatch mode implied by the quiet period.
    pub fn default_dispatch(&self) -> Dispatch {
        if self.quiet_period.is_zero() {
            Dispatch::Immediate
        } else {
            Dispatch::Deferred
        }
    }
}

impl From<&DebounceConfig> for DebounceSettings {
    fn from(config: &DebounceConfig) -> Self {
        Self {
            quiet_period: config.quiet_period(),
            processed_ttl: config.processed_ttl(),
            max_processed: config.max_processed_ids,
            separator: config.separator.clone(),
        }
    }
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self::from(&DebounceConfig::default())
    }
}

struct PendingBatch {
    fragments: Vec<String>,
    message_ids: Vec<MessageId>,
    first_received_at: DateTime<Utc>,
    /// Bumped on every arrival; a timer only flushes the generation it was armed for.
    generation: u64,
    timer: Option<JoinHandle<()>>,
    on_flush: FlushCallback,
}

struct EngineState {
    pending: HashMap<BatchKey, PendingBatch>,
    processed: TtlCache<(BatchKey, MessageId), ()>,
    next_generation: u64,
}

struct Inner {
    settings: DebounceSettings,
    state: Mutex<EngineState>,
}

/// Buffers message fragments per [`BatchKey`] and flushes each batch once.
///
/// Append, timer reset and flush all happen under one lock, so a flush that
/// races a new arrival either includes it or leaves it for the next batch.
#[derive(Clone)]
pub struct DebounceEngine {
    inner: Arc<Inner>,
}

impl DebounceEngine {
    pub fn new(settings: DebounceSettings) -> Self {
        let processed = TtlCache::with_capacity(settings.processed_ttl, settings.max_processed);
        Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(EngineState {
                    pending: HashMap::new(),
                    processed,
                    next_generation: 0,
                }),
            }),
        }
    }

    pub fn settings(&self) -> &DebounceSettings {
        &self.inner.settings
    }

    /// Adds one message to the batch for `key`.
    ///
    /// A message id already pending or processed for the same key is a
    /// silent no-op. The most recent `on_flush` wins for the batch.
    pub async fn add_message(
        &self,
        key: BatchKey,
        text: &str,
        message_id: MessageId,
        dispatch: Dispatch,
        on_flush: FlushCallback,
    ) -> AddOutcome {
        let mut state = self.inner.state.lock().await;

        let dedup_key = (key.clone(), message_id.clone());
        let pending_dup = state
            .pending
            .get(&key)
            .is_some_and(|batch| batch.message_ids.contains(&message_id));
        if pending_dup || state.processed.contains_key(&dedup_key) {
            debug!(batch = %key, message_id = %message_id, "duplicate message ignored");
            return AddOutcome::Duplicate;
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let batch = state
            .pending
            .entry(key.clone())
            .or_insert_with(|| PendingBatch {
                fragments: Vec::new(),
                message_ids: Vec::new(),
                first_received_at: Utc::now(),
                generation,
                timer: None,
                on_flush: on_flush.clone(),
            });
        batch.fragments.push(text.trim().to_string());
        batch.message_ids.push(message_id);
        batch.generation = generation;
        batch.on_flush = on_flush;
        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }

        match dispatch {
            Dispatch::Immediate => {
                let Some(batch) = state.pending.remove(&key) else {
                    return AddOutcome::Duplicate;
                };
                let (sealed, callback) = seal(&self.inner.settings, &mut state, key, batch);
                drop(state);
                callback(sealed).await;
                AddOutcome::ProcessedImmediately
            }
            Dispatch::Deferred => {
                let pending = batch.fragments.len();
                let inner = Arc::clone(&self.inner);
                let timer_key = key.clone();
                batch.timer = Some(tokio::spawn(async move {
                    flush_after_quiet_period(inner, timer_key, generation).await;
                }));
                trace!(batch = %key, pending, "debounce timer armed");
                AddOutcome::Buffered { pending }
            }
        }
    }

    /// Drops every pending batch of a tenant without flushing it.
    pub async fn cancel_tenant(&self, tenant_id: &TenantId) -> usize {
        let mut state = self.inner.state.lock().await;
        let keys: Vec<BatchKey> = state
            .pending
            .keys()
            .filter(|key| &key.tenant_id == tenant_id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(batch) = state.pending.remove(key)
                && let Some(timer) = batch.timer
            {
                timer.abort();
            }
        }
        if !keys.is_empty() {
            debug!(tenant_id = %tenant_id, dropped = keys.len(), "pending batches cancelled");
        }
        keys.len()
    }

    /// Drops the pending batch of one sender without flushing it.
    pub async fn clear_sender(&self, key: &BatchKey) -> bool {
        let mut state = self.inner.state.lock().await;
        match state.pending.remove(key) {
            Some(batch) => {
                if let Some(timer) = batch.timer {
                    timer.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Aborts every timer. Pending fragments are discarded.
    pub async fn cancel_all(&self) {
        let mut state = self.inner.state.lock().await;
        for (_, batch) in state.pending.drain() {
            if let Some(timer) = batch.timer {
                timer.abort();
            }
        }
    }

    /// Fragments currently buffered for `key`.
    pub async fn pending_len(&self, key: &BatchKey) -> usize {
        let state = self.inner.state.lock().await;
        state.pending.get(key).map_or(0, |batch| batch.fragments.len())
    }

    /// Whether `message_id` has already been flushed for `key`.
    pub async fn is_processed(&self, key: &BatchKey, message_id: &MessageId) -> bool {
        let state = self.inner.state.lock().await;
        state
            .processed
            .contains_key(&(key.clone(), message_id.clone()))
    }
}

async fn flush_after_quiet_period(inner: Arc<Inner>, key: BatchKey, generation: u64) {
    tokio::time::sleep(inner.settings.quiet_period).await;

    let mut state = inner.state.lock().await;
    let current = state.pending.get(&key).map(|batch| batch.generation);
    if current != Some(generation) {
        // A newer arrival re-armed the timer, or the batch was cancelled.
        return;
    }
    let Some(batch) = state.pending.remove(&key) else {
        return;
    };
    let (sealed, callback) = seal(&inner.settings, &mut state, key, batch);
    drop(state);
    callback(sealed).await;
}

/// Marks the batch's ids processed and builds the downstream batch.
fn seal(
    settings: &DebounceSettings,
    state: &mut EngineState,
    key: BatchKey,
    batch: PendingBatch,
) -> (InboundBatch, FlushCallback) {
    for id in &batch.message_ids {
        state.processed.insert((key.clone(), id.clone()), ());
    }
    let text = batch
        .fragments
        .iter()
        .filter(|fragment| !fragment.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(&settings.separator);
    debug!(
        batch = %key,
        fragments = batch.fragments.len(),
        "flushing coalesced batch"
    );
    let sealed = InboundBatch {
        tenant_id: key.tenant_id,
        sender: key.sender,
        text,
        fragments: batch.fragments,
        message_ids: batch.message_ids,
        first_received_at: batch.first_received_at,
    };
    (sealed, batch.on_flush)
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use tokio::sync::mpsc;

    use super::*;

    fn engine(quiet_ms: u64) -> DebounceEngine {
        DebounceEngine::new(DebounceSettings {
            quiet_period: Duration::from_millis(quiet_ms),
            processed_ttl: Duration::from_secs(3600),
            max_processed: 1000,
            separator: " ".into(),
        })
    }

    fn collector() -> (FlushCallback, mpsc::UnboundedReceiver<InboundBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: FlushCallback = Arc::new(move |batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
            }
            .boxed()
        });
        (callback, rx)
    }

    fn key(sender: &str) -> BatchKey {
        BatchKey::new(TenantId::from("acme"), sender)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_fragments_coalesce_into_one_flush() {
        let engine = engine(3000);
        let (on_flush, mut rx) = collector();

        for (i, text) in ["oi", "quero", "um apartamento"].into_iter().enumerate() {
            let outcome = engine
                .add_message(
                    key("5511"),
                    text,
                    MessageId(format!("m{i}")),
                    Dispatch::Deferred,
                    on_flush.clone(),
                )
                .await;
            assert_eq!(outcome, AddOutcome::Buffered { pending: i + 1 });
            tokio::time::advance(Duration::from_millis(700)).await;
        }

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.text, "oi quero um apartamento");
        assert_eq!(batch.message_ids.len(), 3);
        for i in 0..3 {
            assert!(engine.is_processed(&key("5511"), &MessageId(format!("m{i}"))).await);
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn each_arrival_resets_the_timer() {
        let engine = engine(3000);
        let (on_flush, mut rx) = collector();

        engine
            .add_message(key("s"), "a", "1".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        tokio::time::advance(Duration::from_millis(2900)).await;
        engine
            .add_message(key("s"), "b", "2".into(), Dispatch::Deferred, on_flush.clone())
            .await;

        tokio::time::advance(Duration::from_millis(2900)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(200)).await;
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.fragments, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ids_never_flush_twice() {
        let engine = engine(1000);
        let (on_flush, mut rx) = collector();

        let first = engine
            .add_message(key("s"), "hi", "dup".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        let pending_dup = engine
            .add_message(key("s"), "hi", "dup".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        assert!(matches!(first, AddOutcome::Buffered { .. }));
        assert_eq!(pending_dup, AddOutcome::Duplicate);

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.message_ids, vec![MessageId::from("dup")]);

        let processed_dup = engine
            .add_message(key("s"), "hi", "dup".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        assert_eq!(processed_dup, AddOutcome::Duplicate);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn same_id_from_another_sender_is_distinct() {
        let engine = engine(1000);
        let (on_flush, mut rx) = collector();

        engine
            .add_message(key("a"), "x", "id".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        let other = engine
            .add_message(key("b"), "y", "id".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        assert_eq!(other, AddOutcome::Buffered { pending: 1 });

        let mut senders = vec![rx.recv().await.unwrap().sender, rx.recv().await.unwrap().sender];
        senders.sort();
        assert_eq!(senders, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_dispatch_takes_pending_fragments_along() {
        let engine = engine(3000);
        let (on_flush, mut rx) = collector();

        engine
            .add_message(key("s"), "quero", "1".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        let outcome = engine
            .add_message(key("s"), "agora", "2".into(), Dispatch::Immediate, on_flush.clone())
            .await;
        assert_eq!(outcome, AddOutcome::ProcessedImmediately);

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.text, "quero agora");

        // The superseded timer must not produce a second, empty flush.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_tenant_discards_without_flushing() {
        let engine = engine(1000);
        let (on_flush, mut rx) = collector();

        engine
            .add_message(key("a"), "x", "1".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        engine
            .add_message(
                BatchKey::new(TenantId::from("other"), "a"),
                "y",
                "2".into(),
                Dispatch::Deferred,
                on_flush.clone(),
            )
            .await;

        assert_eq!(engine.cancel_tenant(&TenantId::from("acme")).await, 1);
        assert_eq!(engine.pending_len(&key("a")).await, 0);

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.tenant_id, TenantId::from("other"));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn processed_ids_expire() {
        let engine = DebounceEngine::new(DebounceSettings {
            quiet_period: Duration::ZERO,
            processed_ttl: Duration::from_secs(60),
            max_processed: 10,
            separator: " ".into(),
        });
        let (on_flush, mut rx) = collector();

        let dispatch = engine.settings().default_dispatch();
        assert_eq!(dispatch, Dispatch::Immediate);

        engine
            .add_message(key("s"), "x", "1".into(), dispatch, on_flush.clone())
            .await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let again = engine
            .add_message(key("s"), "x", "1".into(), dispatch, on_flush.clone())
            .await;
        assert_eq!(again, AddOutcome::ProcessedImmediately);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_fragments_are_skipped_in_text() {
        let engine = engine(10);
        let (on_flush, mut rx) = collector();

        engine
            .add_message(key("s"), "  oi ", "1".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        engine
            .add_message(key("s"), "   ", "2".into(), Dispatch::Deferred, on_flush.clone())
            .await;
        engine
            .add_message(key("s"), "tudo bem?", "3".into(), Dispatch::Deferred, on_flush.clone())
            .await;

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.text, "oi tudo bem?");
        assert_eq!(batch.message_ids.len(), 3);
    }
}
