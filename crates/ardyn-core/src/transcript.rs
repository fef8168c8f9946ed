//! The transcript controller: owns the conversation and the one request that
//! may be in flight for it.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::ai::{CompletionClient, CompletionError};
use crate::state::{ChatMessage, ConversationState};

struct InFlight {
    cancel: CancellationToken,
    outcome: oneshot::Receiver<Result<String, CompletionError>>,
}

/// Ordered chat history plus the request-in-flight bookkeeping.
///
/// At most one completion runs at a time. It executes on a spawned tokio
/// task; its result is applied by [`poll`](Transcript::poll) or
/// [`settle`](Transcript::settle), so all state changes happen on the caller's
/// side.
pub struct Transcript {
    client: CompletionClient,
    state: ConversationState,
    in_flight: Option<InFlight>,
}

impl Transcript {
    pub fn new(client: CompletionClient) -> Self {
        Self {
            client,
            state: ConversationState::new(),
            in_flight: None,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.state.messages
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending_request
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Swap the client used for future submits. An in-flight request keeps
    /// the client it started with.
    pub fn set_client(&mut self, client: CompletionClient) {
        self.client = client;
    }

    /// Start a completion for `text`.
    ///
    /// Returns false and leaves the state untouched when `text` is blank or a
    /// request is already pending. Must be called inside a tokio runtime.
    pub fn submit(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            tracing::debug!("ignoring blank submit");
            return false;
        }
        if self.state.pending_request {
            tracing::debug!("ignoring submit while a request is pending");
            return false;
        }

        let message = ChatMessage::user(text);
        tracing::info!(id = %message.id, chars = text.chars().count(), "submitting prompt");

        self.state.messages.push(message);
        self.state.pending_request = true;
        self.state.last_error = None;

        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let token = cancel.clone();
        let prompt = text.to_string();

        tokio::spawn(async move {
            let outcome = client.complete_with_cancel(&prompt, &token).await;
            // The receiver is gone if the transcript was cleared or dropped
            let _ = tx.send(outcome);
        });

        self.in_flight = Some(InFlight { cancel, outcome: rx });
        true
    }

    /// Apply the in-flight result if it has arrived. Never blocks.
    ///
    /// Returns true when a request settled during this call.
    pub fn poll(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return false;
        };

        let outcome = match in_flight.outcome.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => {
                tracing::error!("completion task ended without reporting a result");
                Err(CompletionError::Interrupted)
            }
        };

        self.in_flight = None;
        self.apply(outcome);
        true
    }

    /// Wait for the in-flight request (if any) and apply its result.
    ///
    /// Cancel-safe: if this future is dropped the request stays in flight.
    pub async fn settle(&mut self) -> bool {
        let outcome = match self.in_flight.as_mut() {
            Some(in_flight) => (&mut in_flight.outcome).await,
            None => return false,
        };

        self.in_flight = None;
        self.apply(outcome.unwrap_or_else(|_| {
            tracing::error!("completion task ended without reporting a result");
            Err(CompletionError::Interrupted)
        }));
        true
    }

    /// Submit and wait for the answer.
    pub async fn send(&mut self, text: &str) -> bool {
        if !self.submit(text) {
            return false;
        }
        self.settle().await
    }

    /// Ask the in-flight request to stop. It settles with
    /// [`CompletionError::Cancelled`] on the next poll/settle.
    pub fn cancel(&mut self) -> bool {
        match &self.in_flight {
            Some(in_flight) if !in_flight.cancel.is_cancelled() => {
                tracing::info!("cancelling in-flight completion");
                in_flight.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Drop all messages and any in-flight request.
    ///
    /// A response that arrives after this is discarded.
    pub fn clear(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
        self.state = ConversationState::new();
        tracing::info!("conversation cleared");
    }

    pub fn dismiss_error(&mut self) {
        self.state.last_error = None;
    }

    fn apply(&mut self, outcome: Result<String, CompletionError>) {
        self.state.pending_request = false;

        match outcome {
            Ok(content) => {
                let message = ChatMessage::assistant(content);
                tracing::info!(id = %message.id, chars = message.content.chars().count(), "received reply");
                self.state.messages.push(message);
            }
            Err(err) => {
                tracing::error!(error = %err, status = ?err.status(), "completion failed");
                self.state.last_error = Some(err.to_string());
            }
        }
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            in_flight.cancel.cancel();
        }
    }
}
