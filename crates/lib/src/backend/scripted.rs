//! In-memory transport for controller tests: records requests, replays scripted bodies.

use crate::backend::{AgentRequest, BodyStream, Transport, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub(crate) type BodySender = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

enum Scripted {
    Chunks(Vec<String>),
    Channel(mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>),
    Fail(TransportError),
}

/// Responses are consumed in order; once exhausted every request gets an empty body.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    requests: Mutex<Vec<AgentRequest>>,
    responses: Mutex<VecDeque<Scripted>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_chunks(&self, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| c.to_string()).collect();
        self.responses.lock().unwrap().push_back(Scripted::Chunks(chunks));
    }

    /// Body fed by the returned sender; ends when the sender is dropped.
    pub(crate) fn push_channel(&self) -> BodySender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.responses.lock().unwrap().push_back(Scripted::Channel(rx));
        tx
    }

    pub(crate) fn push_error(&self, err: TransportError) {
        self.responses.lock().unwrap().push_back(Scripted::Fail(err));
    }

    pub(crate) fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: &AgentRequest) -> Result<BodyStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            None => Ok(futures_util::stream::empty::<Result<Vec<u8>, TransportError>>().boxed()),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Chunks(chunks)) => Ok(futures_util::stream::iter(
                chunks.into_iter().map(|c| Ok::<_, TransportError>(c.into_bytes())),
            )
            .boxed()),
            Some(Scripted::Channel(rx)) => Ok(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
        }
    }
}
