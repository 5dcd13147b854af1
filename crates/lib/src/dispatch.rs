//! Request dispatcher: one streaming turn at a time.
//!
//! `dispatch` supersedes whatever turn is in flight, appends the turn's messages to the
//! session and spawns a reader task for the response body. The reader never touches the
//! session; it sends [`DispatchUpdate`]s back to the owner, which applies them through
//! [`Dispatcher::handle`]. Updates from a superseded turn are dropped there.

use crate::backend::{AgentRequest, Transport, TransportError};
use crate::checkin::CheckinSnapshot;
use crate::config::{Config, MessagesConfig};
use crate::session::{MessageId, SessionState};
use crate::stream::{apply_event, events_from_frame, Applied, FrameDecoder, StreamEvent};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Turn issued without user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTrigger {
    /// First check-in of the session.
    Greeting,
    /// Check-in values changed after the greeting.
    CheckinUpdated,
}

impl SystemTrigger {
    /// `message` field the backend expects for this trigger.
    pub fn wire_message(&self) -> &'static str {
        match self {
            SystemTrigger::Greeting => "__greeting__",
            SystemTrigger::CheckinUpdated => "__checkin_updated__",
        }
    }
}

/// What started a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchKind {
    UserMessage(String),
    SystemTrigger(SystemTrigger),
}

impl DispatchKind {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DispatchKind::SystemTrigger(_))
    }

    fn wire_message(&self) -> String {
        match self {
            DispatchKind::UserMessage(text) => text.clone(),
            DispatchKind::SystemTrigger(t) => t.wire_message().to_string(),
        }
    }
}

/// Identifies one dispatch within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(u64);

/// Failure of a turn, as surfaced to the user.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("stream read failed: {0}")]
    StreamReadFailed(String),
}

impl From<TransportError> for DispatchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::RateLimited => DispatchError::RateLimited,
            TransportError::StreamRead(msg) => DispatchError::StreamReadFailed(msg),
            other => DispatchError::RequestFailed(other.to_string()),
        }
    }
}

impl DispatchError {
    /// Text for the session's error slot.
    pub fn user_message(&self, messages: &MessagesConfig) -> String {
        match self {
            DispatchError::RateLimited => messages.rate_limited.clone(),
            DispatchError::RequestFailed(_) | DispatchError::StreamReadFailed(_) => {
                messages.request_failed.clone()
            }
        }
    }
}

/// Progress reported by a reader task.
#[derive(Debug)]
pub enum StreamUpdate {
    Event(StreamEvent),
    Failed(DispatchError),
    Finished,
}

#[derive(Debug)]
pub struct DispatchUpdate {
    pub dispatch: DispatchId,
    pub update: StreamUpdate,
}

struct ActiveDispatch {
    id: DispatchId,
    placeholder: MessageId,
    token: CancellationToken,
    /// Set once the backend reported an error; later events are ignored.
    halted: bool,
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    history_limit: usize,
    messages: MessagesConfig,
    updates: mpsc::UnboundedSender<DispatchUpdate>,
    active: Option<ActiveDispatch>,
    next_id: u64,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &Config,
        updates: mpsc::UnboundedSender<DispatchUpdate>,
    ) -> Self {
        Self {
            transport,
            history_limit: config.session.history_limit,
            messages: config.messages.clone(),
            updates,
            active: None,
            next_id: 0,
        }
    }

    /// True while a turn is streaming (or waiting for its response).
    pub fn in_flight(&self) -> bool {
        self.active.is_some()
    }

    /// Start a turn, superseding any turn in flight. Must be called inside a tokio runtime.
    pub fn dispatch(
        &mut self,
        state: &mut SessionState,
        checkin: &CheckinSnapshot,
        kind: DispatchKind,
    ) -> DispatchId {
        self.supersede(state);

        let history = state.history(self.history_limit);
        if let DispatchKind::UserMessage(text) = &kind {
            state.append_user(text.clone());
        }
        let placeholder = state.append_assistant_placeholder();
        state.set_loading(true);
        state.set_error(None);

        self.next_id += 1;
        let id = DispatchId(self.next_id);
        let token = CancellationToken::new();
        let request = AgentRequest {
            message: kind.wire_message(),
            checkin: *checkin,
            history,
        };
        log::info!(
            "dispatch {}: {} turn, {} history entries",
            id.0,
            if kind.is_synthetic() { "synthetic" } else { "user" },
            request.history.len()
        );
        tokio::spawn(read_stream(
            id,
            token.clone(),
            Arc::clone(&self.transport),
            request,
            self.updates.clone(),
        ));
        self.active = Some(ActiveDispatch {
            id,
            placeholder,
            token,
            halted: false,
        });
        id
    }

    /// Invalidate the turn in flight without touching the session (teardown).
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            log::debug!("dispatch {} cancelled", active.id.0);
            active.token.cancel();
        }
    }

    /// Cancel the turn in flight; a placeholder it left empty is removed.
    fn supersede(&mut self, state: &mut SessionState) {
        if let Some(active) = self.active.take() {
            log::debug!("dispatch {} superseded", active.id.0);
            active.token.cancel();
            if state.get(active.placeholder).is_some_and(|m| m.content.is_empty()) {
                state.remove(active.placeholder);
            }
        }
    }

    /// Apply a reader update. Returns true when the session changed.
    pub fn handle(&mut self, state: &mut SessionState, update: DispatchUpdate) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.id != update.dispatch || active.token.is_cancelled() {
            log::debug!("ignoring update from superseded dispatch {}", update.dispatch.0);
            return false;
        }
        match update.update {
            StreamUpdate::Event(event) => {
                if active.halted {
                    return false;
                }
                if apply_event(state, active.placeholder, event) == Applied::Halt {
                    log::warn!("dispatch {}: backend reported an error", active.id.0);
                    active.halted = true;
                }
                true
            }
            StreamUpdate::Failed(err) => {
                log::warn!("dispatch {} failed: {}", active.id.0, err);
                state.remove(active.placeholder);
                state.set_error(Some(err.user_message(&self.messages)));
                state.set_loading(false);
                self.active = None;
                true
            }
            StreamUpdate::Finished => {
                log::info!("dispatch {} finished", active.id.0);
                state.set_loading(false);
                self.active = None;
                true
            }
        }
    }
}

/// Reader task: open the request, decode the body, forward events until the end of the
/// stream or until `token` is cancelled.
async fn read_stream(
    id: DispatchId,
    token: CancellationToken,
    transport: Arc<dyn Transport>,
    request: AgentRequest,
    updates: mpsc::UnboundedSender<DispatchUpdate>,
) {
    let send = |update: StreamUpdate| {
        if token.is_cancelled() {
            return false;
        }
        updates
            .send(DispatchUpdate {
                dispatch: id,
                update,
            })
            .is_ok()
    };

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        res = transport.open(&request) => res,
    };
    let mut body = match opened {
        Ok(body) => body,
        Err(e) => {
            send(StreamUpdate::Failed(e.into()));
            return;
        }
    };

    let mut decoder = FrameDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            chunk = body.next() => chunk,
        };
        let (frames, done) = match chunk {
            Some(Ok(bytes)) => (decoder.push(&bytes), false),
            Some(Err(e)) => {
                send(StreamUpdate::Failed(e.into()));
                return;
            }
            None => (decoder.finish(), true),
        };
        for frame in &frames {
            for event in events_from_frame(frame) {
                if !send(StreamUpdate::Event(event)) {
                    return;
                }
            }
        }
        if done {
            send(StreamUpdate::Finished);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::ScriptedTransport;
    use crate::session::Role;

    struct Harness {
        transport: Arc<ScriptedTransport>,
        dispatcher: Dispatcher,
        updates: mpsc::UnboundedReceiver<DispatchUpdate>,
        state: SessionState,
    }

    impl Harness {
        fn new() -> Self {
            let transport = ScriptedTransport::new();
            let (tx, rx) = mpsc::unbounded_channel();
            let dispatcher = Dispatcher::new(transport.clone(), &Config::default(), tx);
            Self {
                transport,
                dispatcher,
                updates: rx,
                state: SessionState::new(),
            }
        }

        fn dispatch(&mut self, kind: DispatchKind) -> DispatchId {
            self.dispatcher
                .dispatch(&mut self.state, &CheckinSnapshot::default(), kind)
        }

        /// Feed updates until no turn is in flight.
        async fn drain(&mut self) {
            while self.dispatcher.in_flight() {
                let update = self.updates.recv().await.expect("reader update");
                self.dispatcher.handle(&mut self.state, update);
            }
        }
    }

    #[tokio::test]
    async fn user_turn_streams_into_placeholder() {
        let mut h = Harness::new();
        h.transport.push_chunks(&[
            "data: {\"text\":\"Hel",
            "lo\"}\n\ndata: {\"text\":\"!\"}\n\n",
        ]);
        h.dispatch(DispatchKind::UserMessage("hi".into()));
        assert!(h.state.loading());
        h.drain().await;

        let msgs = h.state.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!((msgs[0].role, msgs[0].content.as_str()), (Role::User, "hi"));
        assert_eq!((msgs[1].role, msgs[1].content.as_str()), (Role::Assistant, "Hello!"));
        assert!(!h.state.loading());
        assert_eq!(h.state.error(), None);
    }

    #[tokio::test]
    async fn synthetic_turn_has_no_user_message() {
        let mut h = Harness::new();
        h.transport.push_chunks(&["data: {\"text\":\"Welcome back\"}\n\n"]);
        h.dispatch(DispatchKind::SystemTrigger(SystemTrigger::Greeting));
        h.drain().await;

        assert_eq!(h.state.messages().len(), 1);
        assert_eq!(h.state.messages()[0].role, Role::Assistant);
        assert_eq!(h.transport.requests()[0].message, "__greeting__");
    }

    #[tokio::test]
    async fn rate_limit_removes_placeholder() {
        let mut h = Harness::new();
        h.transport.push_error(TransportError::RateLimited);
        h.dispatch(DispatchKind::UserMessage("hello".into()));
        h.drain().await;

        assert_eq!(h.state.messages().len(), 1);
        assert_eq!(h.state.messages()[0].role, Role::User);
        assert_eq!(
            h.state.error(),
            Some(Config::default().messages.rate_limited.as_str())
        );
        assert!(!h.state.loading());
    }

    #[tokio::test]
    async fn other_status_is_generic_failure() {
        let mut h = Harness::new();
        h.transport.push_error(TransportError::Status {
            status: 500,
            body: "oops".into(),
        });
        h.dispatch(DispatchKind::UserMessage("hello".into()));
        h.drain().await;

        assert_eq!(
            h.state.error(),
            Some(Config::default().messages.request_failed.as_str())
        );
        assert!(h.state.messages().iter().all(|m| m.role == Role::User));
    }

    #[tokio::test]
    async fn backend_error_event_stops_applying() {
        let mut h = Harness::new();
        h.transport.push_chunks(&[
            "data: {\"text\":\"a\"}\n\ndata: {\"error\":\"quota\"}\n\ndata: {\"text\":\"b\"}\n\n",
        ]);
        h.dispatch(DispatchKind::UserMessage("x".into()));
        h.drain().await;

        assert_eq!(h.state.messages()[1].content, "a");
        assert_eq!(h.state.error(), Some("quota"));
        assert!(!h.state.loading());
    }

    #[tokio::test]
    async fn malformed_payload_keeps_earlier_content() {
        let mut h = Harness::new();
        h.transport.push_chunks(&[
            "data: {\"text\":\"ok\"}\n\n",
            "data: {not json}\n\n",
            "data: {\"text\":\" then more\"}\n\n",
        ]);
        h.dispatch(DispatchKind::UserMessage("x".into()));
        h.drain().await;

        assert_eq!(h.state.messages()[1].content, "ok then more");
        assert_eq!(h.state.error(), None);
    }

    #[tokio::test]
    async fn stream_read_failure_removes_placeholder() {
        let mut h = Harness::new();
        let body = h.transport.push_channel();
        h.dispatch(DispatchKind::UserMessage("x".into()));
        body.send(Ok(b"data: {\"text\":\"par".to_vec())).unwrap();
        body.send(Err(TransportError::StreamRead("reset".into())))
            .unwrap();
        h.drain().await;

        assert_eq!(h.state.messages().len(), 1);
        assert!(h.state.error().is_some());
        assert!(!h.state.loading());
    }

    #[tokio::test]
    async fn history_excludes_current_turn_and_empty_messages() {
        let mut h = Harness::new();
        h.transport.push_chunks(&["data: {\"text\":\"first reply\"}\n\n"]);
        h.dispatch(DispatchKind::UserMessage("one".into()));
        h.drain().await;
        h.dispatch(DispatchKind::UserMessage("two".into()));
        h.drain().await;

        let requests = h.transport.requests();
        assert!(requests[0].history.is_empty());
        let contents: Vec<&str> = requests[1]
            .history
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "first reply"]);
        assert_eq!(requests[1].message, "two");
    }

    #[tokio::test]
    async fn superseded_turn_cannot_write() {
        let mut h = Harness::new();
        let first_body = h.transport.push_channel();
        h.transport.push_chunks(&["data: {\"text\":\"second\"}\n\n"]);

        let first = h.dispatch(DispatchKind::UserMessage("a".into()));
        first_body.send(Ok(b"data: {\"text\":\"early\"}\n\n".to_vec())).unwrap();
        let update = h.updates.recv().await.unwrap();
        assert_eq!(update.dispatch, first);
        h.dispatcher.handle(&mut h.state, update);

        h.dispatch(DispatchKind::UserMessage("b".into()));
        let _ = first_body.send(Ok(b"data: {\"text\":\" late\"}\n\n".to_vec()));
        // An update that was already queued from the first turn is dropped as well.
        let stale = DispatchUpdate {
            dispatch: first,
            update: StreamUpdate::Event(StreamEvent::Append(" late".into())),
        };
        assert!(!h.dispatcher.handle(&mut h.state, stale));
        h.drain().await;

        let contents: Vec<&str> = h
            .state
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["a", "early", "b", "second"]);
        assert!(!h.state.loading());
    }

    #[tokio::test]
    async fn superseding_removes_empty_placeholder() {
        let mut h = Harness::new();
        let _pending = h.transport.push_channel();
        h.dispatch(DispatchKind::UserMessage("a".into()));
        while h.transport.requests().is_empty() {
            tokio::task::yield_now().await;
        }
        h.dispatch(DispatchKind::UserMessage("b".into()));
        h.drain().await;

        let roles: Vec<Role> = h.state.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Assistant]);
    }
}
