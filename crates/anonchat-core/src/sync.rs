use std::{sync::Arc, time::Duration};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    domain::{Message, Session},
    errors::Error,
    gateway::ChatGateway,
    Result,
};

/// A running poll loop: cancellation token plus its task handle.
///
/// `stop` cancels and then awaits the task, so once it returns nothing
/// started under the previous identity can mutate state.
pub(crate) struct PollTask {
    pub(crate) cancel: CancellationToken,
    pub(crate) handle: JoinHandle<()>,
}

impl PollTask {
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

/// The locally held message list, sorted by id ascending with no duplicates.
///
/// Mutated only by the synchronizer; the rendering layer takes snapshots and
/// watches the version counter for changes.
pub struct MessageFeed {
    messages: Mutex<Vec<Message>>,
    version: watch::Sender<u64>,
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            version: watch::channel(0).0,
        }
    }
}

impl MessageFeed {
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Receiver for the version counter; bumped on every applied poll or
    /// accepted send.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub async fn clear(&self) {
        self.messages.lock().await.clear();
        self.bump();
    }

    /// Replace the whole list with the server's canonical view.
    pub(crate) async fn replace(&self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);
        *self.messages.lock().await = messages;
        self.bump();
    }

    /// Insert one server-confirmed message, keeping the id ordering. A
    /// duplicate id means the poll already delivered this message; drop it.
    pub(crate) async fn insert(&self, message: Message) {
        let mut messages = self.messages.lock().await;
        match messages.binary_search_by_key(&message.id, |m| m.id) {
            Ok(_) => return,
            Err(pos) => messages.insert(pos, message),
        }
        drop(messages);
        self.bump();
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

/// Polls the backend on a fixed interval while the client is joined and
/// merges the authoritative list into [`MessageFeed`].
///
/// Sends are confirmation-first: nothing is appended locally until the server
/// returns the canonical message, which rules out the ghost-duplicate class
/// of bug entirely.
pub struct MessageSynchronizer {
    gateway: Arc<dyn ChatGateway>,
    feed: Arc<MessageFeed>,
    poll_interval: Duration,
    task: Mutex<Option<PollTask>>,
}

impl MessageSynchronizer {
    pub fn new(gateway: Arc<dyn ChatGateway>, poll_interval: Duration) -> Self {
        Self {
            gateway,
            feed: Arc::new(MessageFeed::default()),
            poll_interval,
            task: Mutex::new(None),
        }
    }

    pub fn feed(&self) -> Arc<MessageFeed> {
        self.feed.clone()
    }

    /// Start the poll loop. An already-running loop is torn down first, so
    /// `start` after a rejoin never leaves a stale timer behind.
    pub async fn start(&self) {
        self.stop().await;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let gateway = self.gateway.clone();
        let feed = self.feed.clone();
        let period = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        match poll_messages(gateway.as_ref(), &feed, &token).await {
                            Ok(()) => debug!("message poll cycle complete"),
                            Err(e) => warn!("{e}"),
                        }
                    }
                }
            }
        });

        *self.task.lock().await = Some(PollTask { cancel, handle });
    }

    /// Tear the poll loop down deterministically. A poll in flight finishes
    /// its request but its result is discarded before any state mutation.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.stop().await;
        }
    }

    /// Submit a message. On success the server-returned canonical copy is
    /// appended (server id/timestamp, no local guess) and one out-of-band
    /// poll runs to pull in concurrent messages from other clients. On
    /// failure nothing is appended, so the caller can let the user retry
    /// with the input intact.
    pub async fn send_message(&self, session: &Session, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Send("message text must not be empty".to_string()));
        }

        let message = self
            .gateway
            .send_message(session, text)
            .await
            .map_err(|e| Error::Send(format!("message submission failed: {e}")))?;

        self.feed.insert(message.clone()).await;

        // A failed follow-up poll is not a send failure; the next scheduled
        // tick will catch up.
        if let Err(e) = self.poll_now().await {
            warn!("post-send {e}");
        }

        Ok(message)
    }

    /// One immediate fetch-and-replace cycle, subject to the running loop's
    /// cancellation token if there is one.
    pub async fn poll_now(&self) -> Result<()> {
        let token = self
            .task
            .lock()
            .await
            .as_ref()
            .map(|t| t.cancel.clone())
            .unwrap_or_default();
        poll_messages(self.gateway.as_ref(), &self.feed, &token).await
    }
}

async fn poll_messages(
    gateway: &dyn ChatGateway,
    feed: &MessageFeed,
    cancel: &CancellationToken,
) -> Result<()> {
    let messages = gateway
        .fetch_messages()
        .await
        .map_err(|e| Error::Sync(format!("message poll failed: {e}")))?;

    // Stale-response suppression: the client may have left (or rejoined as a
    // different identity) while this request was in flight.
    if cancel.is_cancelled() {
        return Ok(());
    }

    feed.replace(messages).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Invitation, MessageId, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

    struct FakeGateway {
        /// Server-side store; `fetch_messages` returns it verbatim.
        messages: Mutex<Vec<Message>>,
        next_id: AtomicI64,
        fail_send: AtomicBool,
        fail_fetch: AtomicBool,
        fetch_calls: AtomicUsize,
        fetch_delay: Duration,
    }

    impl Default for FakeGateway {
        fn default() -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(0),
                fail_send: AtomicBool::new(false),
                fail_fetch: AtomicBool::new(false),
                fetch_calls: AtomicUsize::new(0),
                fetch_delay: Duration::ZERO,
            }
        }
    }

    impl FakeGateway {
        async fn seed(&self, messages: Vec<Message>) {
            *self.messages.lock().await = messages;
        }
    }

    fn msg(id: i64, nickname: &str, text: &str) -> Message {
        Message {
            id: MessageId(id),
            nickname: nickname.to_string(),
            text: text.to_string(),
            timestamp: id * 1000,
        }
    }

    fn session() -> Session {
        Session {
            user_id: UserId(1),
            nickname: "Fox".to_string(),
        }
    }

    #[async_trait]
    impl ChatGateway for FakeGateway {
        async fn register(&self, nickname: &str) -> Result<Session> {
            Ok(Session {
                user_id: UserId(1),
                nickname: nickname.to_string(),
            })
        }

        async fn fetch_messages(&self) -> Result<Vec<Message>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(Error::External("backend unavailable".to_string()));
            }
            Ok(self.messages.lock().await.clone())
        }

        async fn send_message(&self, session: &Session, text: &str) -> Result<Message> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(Error::External("backend unavailable".to_string()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let message = msg(id, &session.nickname, text);
            self.messages.lock().await.push(message.clone());
            Ok(message)
        }

        async fn fetch_invitations(&self, _user_id: UserId) -> Result<Vec<Invitation>> {
            Ok(Vec::new())
        }

        async fn send_invite(
            &self,
            _session: &Session,
            _telegram_username: &str,
            _invite_link: &str,
        ) -> Result<Invitation> {
            unreachable!("not used by sync tests")
        }
    }

    #[tokio::test]
    async fn poll_sorts_by_id_and_drops_duplicates() {
        let gateway = Arc::new(FakeGateway::default());
        gateway
            .seed(vec![msg(3, "Owl", "c"), msg(1, "Fox", "a"), msg(1, "Fox", "a")])
            .await;
        let sync = MessageSynchronizer::new(gateway, Duration::from_secs(3));

        sync.poll_now().await.unwrap();

        let ids: Vec<i64> = sync.feed().snapshot().await.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn failed_send_appends_nothing() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_send.store(true, Ordering::SeqCst);
        let sync = MessageSynchronizer::new(gateway, Duration::from_secs(3));

        let err = sync.send_message(&session(), "hi").await.unwrap_err();
        assert!(matches!(err, Error::Send(_)));
        assert!(sync.feed().is_empty().await);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_reaching_the_backend() {
        let gateway = Arc::new(FakeGateway::default());
        let sync = MessageSynchronizer::new(gateway.clone(), Duration::from_secs(3));

        let err = sync.send_message(&session(), "   ").await.unwrap_err();
        assert!(matches!(err, Error::Send(_)));
        assert_eq!(gateway.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_then_poll_leaves_exactly_one_canonical_copy() {
        // join as Fox, send "hi", poll returns the single server row: the
        // local list must be exactly that entry, no duplicate from the send
        // response.
        let gateway = Arc::new(FakeGateway::default());
        let sync = MessageSynchronizer::new(gateway.clone(), Duration::from_secs(3));

        sync.send_message(&session(), "hi").await.unwrap();
        sync.poll_now().await.unwrap();

        let feed = sync.feed().snapshot().await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, MessageId(1));
        assert_eq!(feed[0].nickname, "Fox");
        assert_eq!(feed[0].text, "hi");
    }

    #[tokio::test]
    async fn repeated_sends_stay_strictly_sorted_and_unique() {
        let gateway = Arc::new(FakeGateway::default());
        let sync = MessageSynchronizer::new(gateway, Duration::from_secs(3));

        for text in ["one", "two", "three", "four"] {
            sync.send_message(&session(), text).await.unwrap();
        }
        sync.poll_now().await.unwrap();

        let ids: Vec<i64> = sync.feed().snapshot().await.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn failed_poll_keeps_previous_state() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.seed(vec![msg(1, "Fox", "hi")]).await;
        let sync = MessageSynchronizer::new(gateway.clone(), Duration::from_secs(3));

        sync.poll_now().await.unwrap();
        gateway.fail_fetch.store(true, Ordering::SeqCst);

        let err = sync.poll_now().await.unwrap_err();
        assert!(matches!(err, Error::Sync(_)));
        assert_eq!(sync.feed().len().await, 1);
    }

    #[tokio::test]
    async fn stop_halts_the_poll_loop() {
        let gateway = Arc::new(FakeGateway::default());
        let sync = MessageSynchronizer::new(gateway.clone(), Duration::from_millis(10));

        sync.start().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        sync.stop().await;

        let after_stop = gateway.fetch_calls.load(Ordering::SeqCst);
        assert!(after_stop >= 1, "loop should have polled at least once");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            gateway.fetch_calls.load(Ordering::SeqCst),
            after_stop,
            "no polls may run after stop returns"
        );
    }

    #[tokio::test]
    async fn poll_in_flight_at_stop_is_discarded() {
        let gateway = Arc::new(FakeGateway {
            fetch_delay: Duration::from_millis(150),
            ..FakeGateway::default()
        });
        gateway.seed(vec![msg(1, "Owl", "late")]).await;
        let sync = MessageSynchronizer::new(gateway, Duration::from_secs(3));

        // First tick fires immediately; its fetch is still sleeping when we
        // stop. stop() awaits the task, so by the time it returns the fetch
        // has completed and its result must have been thrown away.
        sync.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        sync.stop().await;

        assert!(sync.feed().is_empty().await);
    }

    #[tokio::test]
    async fn restart_tears_down_the_previous_loop() {
        let gateway = Arc::new(FakeGateway::default());
        let sync = MessageSynchronizer::new(gateway.clone(), Duration::from_millis(10));

        sync.start().await;
        sync.start().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        sync.stop().await;
        sync.stop().await; // idempotent

        assert!(gateway.fetch_calls.load(Ordering::SeqCst) >= 1);
    }
}
