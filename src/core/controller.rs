//! Send/cancel state machine over the session store.
//!
//! [`ChatController`] is a clonable handle; every clone drives the same
//! state. The state lock is only taken in short synchronous sections and is
//! never held across an `.await`, so the single-flight check and the move to
//! [`ChatState::Sending`] happen in one critical section.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ChatRequest;
use crate::core::chat_stream::StreamEvent;
use crate::core::client::{CompletionClient, CompletionOutcome};
use crate::core::error::ChatError;
use crate::core::request::{build_request, GenerationParameters};
use crate::core::session::{ConversationSession, SessionStore};

pub const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Where requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub endpoint_url: String,
    pub api_key: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatSettings {
    pub connection: ConnectionSettings,
    pub generation: GenerationParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
}

/// Snapshot of what the UI shows as loading/error state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatStatus {
    pub is_sending: bool,
    pub last_error: Option<String>,
}

/// Notifications pushed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StatusChanged(ChatStatus),
    /// A streamed fragment for live display. Not committed until the send succeeds.
    Delta { session: String, text: String },
    RequestUpdated { session: String, buffer: String },
    ResponseUpdated { session: String, buffer: String },
    SessionsChanged { sessions: Vec<String>, current: String },
    ParseError(String),
    Rejected(ChatError),
}

struct ControllerState {
    state: ChatState,
    last_error: Option<String>,
    sessions: SessionStore,
    settings: ChatSettings,
    cancel_token: Option<CancellationToken>,
    subscribers: Vec<mpsc::UnboundedSender<ChatEvent>>,
}

impl ControllerState {
    fn status(&self) -> ChatStatus {
        ChatStatus {
            is_sending: self.state == ChatState::Sending,
            last_error: self.last_error.clone(),
        }
    }

    fn notify(&mut self, event: ChatEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn notify_status(&mut self) {
        let status = self.status();
        self.notify(ChatEvent::StatusChanged(status));
    }

    fn notify_sessions(&mut self) {
        let event = ChatEvent::SessionsChanged {
            sessions: self.sessions.names(),
            current: self.sessions.current_name().to_string(),
        };
        self.notify(event);
    }

    fn notify_request(&mut self, session: &ConversationSession) {
        self.notify(ChatEvent::RequestUpdated {
            session: session.name().to_string(),
            buffer: session.request_buffer().to_string(),
        });
    }

    fn notify_response(&mut self, session: &ConversationSession) {
        self.notify(ChatEvent::ResponseUpdated {
            session: session.name().to_string(),
            buffer: session.response_buffer().to_string(),
        });
    }

    fn return_to_idle(&mut self) {
        self.state = ChatState::Idle;
        self.cancel_token = None;
    }
}

/// Everything a send needs once it has left the critical section.
struct SendTicket {
    session: String,
    endpoint_url: String,
    api_key: String,
    payload: ChatRequest,
    cancel: CancellationToken,
}

/// Puts the controller back to idle if a send future is dropped mid-flight.
struct InFlight<'a> {
    controller: &'a ChatController,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.controller.lock();
        if let Some(token) = state.cancel_token.take() {
            token.cancel();
        }
        state.return_to_idle();
        state.notify_status();
    }
}

#[derive(Clone)]
pub struct ChatController {
    client: CompletionClient,
    inner: Arc<Mutex<ControllerState>>,
}

impl ChatController {
    pub fn new(client: CompletionClient, settings: ChatSettings) -> Self {
        Self::with_sessions(client, settings, SessionStore::new())
    }

    pub fn with_sessions(
        client: CompletionClient,
        settings: ChatSettings,
        sessions: SessionStore,
    ) -> Self {
        let settings = ChatSettings {
            generation: settings.generation.clamped(),
            ..settings
        };

        Self {
            client,
            inner: Arc::new(Mutex::new(ControllerState {
                state: ChatState::Idle,
                last_error: None,
                sessions,
                settings,
                cancel_token: None,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        lock_state(&self.inner)
    }

    /// Receive every subsequent [`ChatEvent`].
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> ChatState {
        self.lock().state
    }

    pub fn status(&self) -> ChatStatus {
        self.lock().status()
    }

    pub fn settings(&self) -> ChatSettings {
        self.lock().settings.clone()
    }

    /// Replace the settings used by future sends. An in-flight send keeps
    /// the snapshot it started with.
    pub fn update_settings(&self, settings: ChatSettings) {
        let mut state = self.lock();
        state.settings = ChatSettings {
            generation: settings.generation.clamped(),
            ..settings
        };
    }

    pub fn update_generation(&self, generation: GenerationParameters) {
        self.lock().settings.generation = generation.clamped();
    }

    pub fn current_session(&self) -> ConversationSession {
        self.lock().sessions.current().clone()
    }

    pub fn session(&self, name: &str) -> Option<ConversationSession> {
        self.lock().sessions.get(name).cloned()
    }

    pub fn sessions(&self) -> Vec<String> {
        self.lock().sessions.names()
    }

    pub fn create_session(&self) -> String {
        let mut state = self.lock();
        let name = state.sessions.create_session();
        state.notify_sessions();
        name
    }

    pub fn switch_session(&self, name: &str) -> Result<(), ChatError> {
        let mut state = self.lock();
        match state.sessions.switch_to(name) {
            Ok(()) => {
                state.notify_sessions();
                Ok(())
            }
            Err(err) => {
                state.notify(ChatEvent::Rejected(err.clone()));
                Err(err)
            }
        }
    }

    pub fn clear_request(&self) {
        let mut state = self.lock();
        state.sessions.current_mut().clear_request();
        let session = state.sessions.current().clone();
        state.notify_request(&session);
    }

    pub fn clear_response(&self) {
        let mut state = self.lock();
        state.sessions.current_mut().clear_response();
        let session = state.sessions.current().clone();
        state.notify_response(&session);
    }

    /// Abort the in-flight send, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let state = self.lock();
        match &state.cancel_token {
            Some(token) => {
                debug!("cancelling in-flight send");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Send `prompt` on the current session and wait for the outcome.
    ///
    /// Rejections (`Busy`, `Validation`) leave every buffer untouched and
    /// come back as `Err`. Anything that reached the client resolves to
    /// `Ok` with the terminal [`CompletionOutcome`]; a successful reply is
    /// committed to the session that was current when the send started.
    pub async fn send(&self, prompt: &str) -> Result<CompletionOutcome, ChatError> {
        let ticket = match self.begin_send(prompt) {
            Ok(ticket) => ticket,
            Err(err) => {
                debug!(error = %err, "send rejected");
                self.lock().notify(ChatEvent::Rejected(err.clone()));
                return Err(err);
            }
        };

        let mut guard = InFlight {
            controller: self,
            finished: false,
        };

        let observer_state = Arc::clone(&self.inner);
        let session = ticket.session.clone();
        let outcome = self
            .client
            .send(
                &ticket.endpoint_url,
                &ticket.api_key,
                &ticket.payload,
                &ticket.cancel,
                move |event| match event {
                    StreamEvent::ContentDelta(text) => {
                        lock_state(&observer_state).notify(ChatEvent::Delta {
                            session: session.clone(),
                            text: text.clone(),
                        });
                    }
                    StreamEvent::ParseError(raw) => {
                        lock_state(&observer_state).notify(ChatEvent::ParseError(raw.clone()));
                    }
                    StreamEvent::Done => {}
                },
            )
            .await;

        self.finish_send(&ticket.session, &outcome);
        guard.finished = true;
        Ok(outcome)
    }

    fn begin_send(&self, prompt: &str) -> Result<SendTicket, ChatError> {
        let mut state = self.lock();
        if state.state == ChatState::Sending {
            return Err(ChatError::Busy);
        }

        let generation = state.settings.generation.clone();
        let payload = build_request(prompt, &generation.system_message, &generation)?;

        let cancel = CancellationToken::new();
        state.state = ChatState::Sending;
        state.last_error = None;
        state.cancel_token = Some(cancel.clone());

        state.sessions.current_mut().append_request(prompt);
        let session = state.sessions.current().clone();
        state.notify_request(&session);
        state.notify_status();

        Ok(SendTicket {
            session: session.name().to_string(),
            endpoint_url: state.settings.connection.endpoint_url.clone(),
            api_key: state.settings.connection.api_key.clone(),
            payload,
            cancel,
        })
    }

    fn finish_send(&self, session_name: &str, outcome: &CompletionOutcome) {
        let mut state = self.lock();
        state.return_to_idle();

        match outcome {
            CompletionOutcome::Success(reply) => {
                let committed = state.sessions.get_mut(session_name).map(|session| {
                    session.commit_response(reply);
                    session.clone()
                });
                if let Some(session) = committed {
                    state.notify_response(&session);
                }
            }
            CompletionOutcome::Failure(reason) => {
                debug!(error = %reason, "send failed");
                state.last_error = Some(reason.to_string());
            }
            CompletionOutcome::Cancelled => {
                debug!(session = %session_name, "send cancelled");
            }
        }

        state.notify_status();
    }
}

fn lock_state(inner: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
