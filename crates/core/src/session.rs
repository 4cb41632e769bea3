//! Conversation Session
//!
//! Owns the conversation log and drives one chat round trip at a time. A
//! submit appends the user's message and a pending model placeholder, asks
//! the [`ChatTransport`] for a reply and then resolves the placeholder in
//! place, with the reply on success or a fixed error text on failure.
//!
//! All log mutations happen synchronously under a short lock that is never
//! held across an `.await`, so readers always see a consistent log.

use crate::chat::{ChatTransport, ChatTransportError};
use crate::message::{HistoryTurn, Message, MessageId, Role, request_history};
use crate::prompts::{REPLY_FAILURE_TEXT, WELCOME_MESSAGE};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The log changed (append or finalize); the view should scroll to the
    /// newest message.
    ScrollToNewest { newest: MessageId, len: usize },
    /// The busy flag flipped.
    BusyChanged(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The input was empty after trimming.
    EmptyInput,
    /// A reply is still in flight.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing was appended.
    Rejected(Rejection),
    /// The placeholder was finalized with the model's reply.
    Answered(MessageId),
    /// The placeholder was finalized with the fixed error text.
    Failed(MessageId),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Seed message shown first and never sent to the model.
    pub welcome: Option<String>,
    /// Upper bound on a single chat call. `None` waits forever.
    pub reply_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            welcome: Some(WELCOME_MESSAGE.to_string()),
            reply_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Default)]
struct Conversation {
    log: Vec<Message>,
    seed: Option<MessageId>,
    next_id: u64,
    busy: bool,
}

impl Conversation {
    fn push(&mut self, build: impl FnOnce(MessageId) -> Message) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.log.push(build(id));
        id
    }

    fn has_pending(&self) -> bool {
        self.log.iter().any(Message::is_pending)
    }
}

pub struct ConversationSession {
    transport: Arc<dyn ChatTransport>,
    reply_timeout: Option<Duration>,
    conversation: Mutex<Conversation>,
    events: broadcast::Sender<SessionEvent>,
}

/// Tracks the single in-flight reply.
///
/// Dropping it always clears the busy flag. If the reply was never settled
/// (the submit future was dropped or the transport panicked) the placeholder
/// is finalized with the error text first.
struct InFlight<'a> {
    session: &'a ConversationSession,
    pending: MessageId,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, text: &str) {
        self.session.finalize(self.pending, text);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(message_id = %self.pending, "Reply abandoned before the transport settled");
            self.session.finalize(self.pending, REPLY_FAILURE_TEXT);
        }
        self.session.set_busy(false);
    }
}

impl ConversationSession {
    pub fn new(transport: Arc<dyn ChatTransport>, options: SessionOptions) -> Self {
        let mut conversation = Conversation::default();
        if let Some(welcome) = options.welcome {
            let id = conversation.push(|id| Message::new(id, Role::Model, welcome));
            conversation.seed = Some(id);
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            reply_timeout: options.reply_timeout,
            conversation: Mutex::new(conversation),
            events,
        }
    }

    /// Sends `text` to the tutor and waits for the placeholder to settle.
    ///
    /// Empty input and input arriving while a reply is in flight are rejected
    /// without touching the log.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty input");
            return SubmitOutcome::Rejected(Rejection::EmptyInput);
        }

        let (history, pending) = match self.begin(text) {
            Ok(started) => started,
            Err(rejection) => {
                debug!(?rejection, "Submit refused");
                return SubmitOutcome::Rejected(rejection);
            }
        };
        let flight = InFlight {
            session: self,
            pending,
            settled: false,
        };

        info!(message_id = %pending, turns = history.len(), "Requesting tutor reply");
        let reply = self.transport.send(history, text.to_string());
        let result = match self.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, reply)
                .await
                .unwrap_or(Err(ChatTransportError::Timeout(limit))),
            None => reply.await,
        };

        match result {
            Ok(reply) => {
                flight.settle(&reply);
                SubmitOutcome::Answered(pending)
            }
            Err(e) => {
                warn!(error = %e, message_id = %pending, "Chat transport failed");
                flight.settle(REPLY_FAILURE_TEXT);
                SubmitOutcome::Failed(pending)
            }
        }
    }

    /// Appends the user message and the placeholder in one step.
    ///
    /// The history is taken before the user message is appended, because the
    /// new utterance travels to the transport on its own.
    fn begin(&self, text: &str) -> Result<(Vec<HistoryTurn>, MessageId), Rejection> {
        let mut conversation = self.lock();
        if conversation.busy || conversation.has_pending() {
            return Err(Rejection::Busy);
        }

        let history = request_history(&conversation.log, conversation.seed);
        let user = conversation.push(|id| Message::new(id, Role::User, text));
        self.scrolled(user, conversation.log.len());
        let pending = conversation.push(Message::placeholder);
        self.scrolled(pending, conversation.log.len());

        conversation.busy = true;
        self.emit(SessionEvent::BusyChanged(true));
        Ok((history, pending))
    }

    fn finalize(&self, id: MessageId, text: &str) {
        let mut conversation = self.lock();
        let len = conversation.log.len();
        let finalized = conversation
            .log
            .iter_mut()
            .find(|m| m.id() == id)
            .is_some_and(|m| m.finalize(text));
        if finalized {
            self.scrolled(id, len);
        } else {
            warn!(message_id = %id, "Placeholder already finalized");
        }
    }

    fn set_busy(&self, busy: bool) {
        let mut conversation = self.lock();
        if conversation.busy != busy {
            conversation.busy = busy;
            self.emit(SessionEvent::BusyChanged(busy));
        }
    }

    fn scrolled(&self, newest: MessageId, len: usize) {
        self.emit(SessionEvent::ScrollToNewest { newest, len });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the log, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().log.clone()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.lock().log.iter().find(|m| m.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().log.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    pub fn pending(&self) -> Option<Message> {
        self.lock().log.iter().find(|m| m.is_pending()).cloned()
    }

    pub fn seed(&self) -> Option<MessageId> {
        self.lock().seed
    }

    /// The history the next submit would send.
    pub fn request_history(&self) -> Vec<HistoryTurn> {
        let conversation = self.lock();
        request_history(&conversation.log, conversation.seed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatTransport;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn session_with(mock: MockChatTransport) -> ConversationSession {
        ConversationSession::new(Arc::new(mock), SessionOptions::default())
    }

    /// Blocks every send until the gate is opened.
    struct GatedTransport {
        gate: Arc<Notify>,
        reply: String,
    }

    #[async_trait]
    impl ChatTransport for GatedTransport {
        async fn send(
            &self,
            _history: Vec<HistoryTurn>,
            _message: String,
        ) -> Result<String, ChatTransportError> {
            self.gate.notified().await;
            Ok(self.reply.clone())
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl ChatTransport for PanickingTransport {
        async fn send(
            &self,
            _history: Vec<HistoryTurn>,
            _message: String,
        ) -> Result<String, ChatTransportError> {
            panic!("transport blew up");
        }
    }

    #[tokio::test]
    async fn test_submit_success_scenario() {
        let mut mock = MockChatTransport::new();
        mock.expect_send()
            .withf(|history, message| {
                history.is_empty() && message == "Fix this sentence: I has a dog."
            })
            .times(1)
            .returning(|_, _| Ok("You have a dog.".to_string()));
        let session = session_with(mock);
        assert_eq!(session.len(), 1);

        let outcome = session.submit("Fix this sentence: I has a dog.").await;

        let log = session.messages();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].role(), Role::User);
        assert_eq!(log[1].text(), "Fix this sentence: I has a dog.");
        assert_eq!(log[2].role(), Role::Model);
        assert_eq!(log[2].text(), "You have a dog.");
        assert!(!log[2].is_pending());
        assert_eq!(outcome, SubmitOutcome::Answered(log[2].id()));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_submit_failure_scenario() {
        let mut mock = MockChatTransport::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ChatTransportError::Request("connection reset".into())));
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("Try again: I have a cat.".to_string()));
        let session = session_with(mock);

        let outcome = session.submit("I has a cat.").await;
        let log = session.messages();
        assert_eq!(outcome, SubmitOutcome::Failed(log[2].id()));
        assert_eq!(log[2].text(), REPLY_FAILURE_TEXT);
        assert!(!log[2].is_pending());
        assert!(!session.is_busy());

        let outcome = session.submit("I has a cat.").await;
        assert!(matches!(outcome, SubmitOutcome::Answered(_)));
        assert_eq!(session.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let mut mock = MockChatTransport::new();
        mock.expect_send().never();
        let session = session_with(mock);

        assert_eq!(
            session.submit("").await,
            SubmitOutcome::Rejected(Rejection::EmptyInput)
        );
        assert_eq!(
            session.submit("  \n\t ").await,
            SubmitOutcome::Rejected(Rejection::EmptyInput)
        );
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_while_pending_is_rejected() {
        let gate = Arc::new(Notify::new());
        let session = Arc::new(ConversationSession::new(
            Arc::new(GatedTransport {
                gate: Arc::clone(&gate),
                reply: "done".into(),
            }),
            SessionOptions::default(),
        ));
        let mut events = session.subscribe();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit("first").await }
        });
        loop {
            if events.recv().await.unwrap() == SessionEvent::BusyChanged(true) {
                break;
            }
        }

        assert!(session.is_busy());
        assert!(session.pending().is_some());
        let before = session.messages();
        assert_eq!(
            session.submit("second").await,
            SubmitOutcome::Rejected(Rejection::Busy)
        );
        assert_eq!(session.messages(), before);

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), SubmitOutcome::Answered(_)));
        assert!(session.pending().is_none());
        assert_eq!(session.len(), 3);
    }

    #[tokio::test]
    async fn test_history_excludes_seed_pending_and_new_message() {
        let mut mock = MockChatTransport::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("You have a dog.".to_string()));
        mock.expect_send()
            .withf(|history, message| {
                *history
                    == vec![
                        HistoryTurn { role: Role::User, text: "I has a dog.".into() },
                        HistoryTurn { role: Role::Model, text: "You have a dog.".into() },
                    ]
                    && message == "Thanks!"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("You're welcome!".to_string()));
        let session = session_with(mock);

        session.submit("I has a dog.").await;
        session.submit("  Thanks!  ").await;

        let log = session.messages();
        assert_eq!(log[3].text(), "Thanks!", "user text is trimmed");
        assert_eq!(session.request_history().len(), 4);
        assert!(
            session
                .request_history()
                .iter()
                .all(|turn| !turn.text.contains("EngBuddy"))
        );
    }

    #[tokio::test]
    async fn test_events_fire_on_every_mutation() {
        let mut mock = MockChatTransport::new();
        mock.expect_send()
            .returning(|_, _| Ok("reply".to_string()));
        let session = session_with(mock);
        let mut events = session.subscribe();

        session.submit("hello").await;

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                SessionEvent::ScrollToNewest { newest: MessageId(2), len: 2 },
                SessionEvent::ScrollToNewest { newest: MessageId(3), len: 3 },
                SessionEvent::BusyChanged(true),
                SessionEvent::ScrollToNewest { newest: MessageId(3), len: 3 },
                SessionEvent::BusyChanged(false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout_finalizes_with_error() {
        let session = ConversationSession::new(
            Arc::new(GatedTransport {
                gate: Arc::new(Notify::new()),
                reply: "never".into(),
            }),
            SessionOptions {
                reply_timeout: Some(Duration::from_secs(30)),
                ..SessionOptions::default()
            },
        );

        let outcome = session.submit("hello").await;
        let log = session.messages();
        assert_eq!(outcome, SubmitOutcome::Failed(log[2].id()));
        assert_eq!(log[2].text(), REPLY_FAILURE_TEXT);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_cancelled_submit_releases_busy() {
        let gate = Arc::new(Notify::new());
        let session = ConversationSession::new(
            Arc::new(GatedTransport {
                gate,
                reply: "never".into(),
            }),
            SessionOptions::default(),
        );
        let mut events = session.subscribe();

        {
            let submit = session.submit("hello");
            tokio::pin!(submit);
            tokio::select! {
                _ = &mut submit => panic!("transport should be blocked"),
                _ = async {
                    while events.recv().await.unwrap() != SessionEvent::BusyChanged(true) {}
                } => {}
            }
        }

        assert!(!session.is_busy());
        let log = session.messages();
        assert_eq!(log.len(), 3);
        assert!(!log[2].is_pending());
        assert_eq!(log[2].text(), REPLY_FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_transport_panic_releases_busy() {
        let session = Arc::new(ConversationSession::new(
            Arc::new(PanickingTransport),
            SessionOptions::default(),
        ));

        let result = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit("hello").await }
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert!(!session.is_busy());
        assert!(session.pending().is_none());
        assert_eq!(session.messages()[2].text(), REPLY_FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_session_without_seed() {
        let mut mock = MockChatTransport::new();
        mock.expect_send()
            .returning(|_, _| Ok("hi".to_string()));
        let session = ConversationSession::new(
            Arc::new(mock),
            SessionOptions {
                welcome: None,
                reply_timeout: None,
            },
        );
        assert!(session.is_empty());
        assert!(session.seed().is_none());

        session.submit("hello").await;
        assert_eq!(session.len(), 2);
        assert_eq!(session.request_history().len(), 2);
        assert!(session.message(MessageId(1)).is_some());
    }
}
