use tracing::debug;

use crate::core::error::ChatError;

/// Delimits consecutive turns inside a session buffer.
pub const TURN_SEPARATOR: &str = "\n\n---\n\n";

pub const DEFAULT_SESSION_NAME: &str = "Session 1";

/// A named conversation with its own request and response history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    name: String,
    request_buffer: String,
    response_buffer: String,
}

impl ConversationSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_buffer: String::new(),
            response_buffer: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_buffer(&self) -> &str {
        &self.request_buffer
    }

    pub fn response_buffer(&self) -> &str {
        &self.response_buffer
    }

    /// Record a prompt as a new turn in the request history.
    pub fn append_request(&mut self, prompt: &str) {
        self.request_buffer.push_str(TURN_SEPARATOR);
        self.request_buffer.push_str(prompt);
    }

    /// Commit a finished reply, separating it from earlier replies.
    pub fn commit_response(&mut self, reply: &str) {
        if !self.response_buffer.is_empty() {
            self.response_buffer.push_str(TURN_SEPARATOR);
        }
        self.response_buffer.push_str(reply);
    }

    pub fn clear_request(&mut self) {
        self.request_buffer.clear();
    }

    pub fn clear_response(&mut self) {
        self.response_buffer.clear();
    }
}

/// Ordered set of sessions with exactly one current session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Vec<ConversationSession>,
    current: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: vec![ConversationSession::new(DEFAULT_SESSION_NAME)],
            current: 0,
        }
    }

    /// Append a fresh session named `Session N` and make it current.
    pub fn create_session(&mut self) -> String {
        let mut number = self.sessions.len() + 1;
        let mut name = format!("Session {number}");
        while self.position(&name).is_some() {
            number += 1;
            name = format!("Session {number}");
        }

        self.sessions.push(ConversationSession::new(name.clone()));
        self.current = self.sessions.len() - 1;
        debug!(session = %name, "created session");
        name
    }

    pub fn switch_to(&mut self, name: &str) -> Result<(), ChatError> {
        let index = self
            .position(name)
            .ok_or_else(|| ChatError::UnknownSession(name.to_string()))?;
        self.current = index;
        debug!(session = %name, "switched session");
        Ok(())
    }

    pub fn current(&self) -> &ConversationSession {
        &self.sessions[self.current]
    }

    pub fn current_mut(&mut self) -> &mut ConversationSession {
        &mut self.sessions[self.current]
    }

    pub fn current_name(&self) -> &str {
        self.current().name()
    }

    pub fn get(&self, name: &str) -> Option<&ConversationSession> {
        self.sessions.iter().find(|session| session.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ConversationSession> {
        self.sessions.iter_mut().find(|session| session.name == name)
    }

    /// Session names in creation order.
    pub fn names(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(|session| session.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sessions.iter().position(|session| session.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_a_current_default_session() {
        let store = SessionStore::new();
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert_eq!(store.current_name(), DEFAULT_SESSION_NAME);
        assert_eq!(store.current().request_buffer(), "");
        assert_eq!(store.current().response_buffer(), "");
    }

    #[test]
    fn created_sessions_are_numbered_after_the_default() {
        let mut store = SessionStore::new();
        let names: Vec<String> = (0..3).map(|_| store.create_session()).collect();

        assert_eq!(names, vec!["Session 2", "Session 3", "Session 4"]);
        assert_eq!(
            store.names(),
            vec!["Session 1", "Session 2", "Session 3", "Session 4"]
        );
        assert_eq!(store.current_name(), "Session 4");
        for name in &names {
            let session = store.get(name).unwrap();
            assert_eq!(session.request_buffer(), "");
            assert_eq!(session.response_buffer(), "");
        }
    }

    #[test]
    fn created_sessions_have_independent_buffers() {
        let mut store = SessionStore::new();
        let second = store.create_session();
        store.current_mut().commit_response("only in second");

        store.switch_to(DEFAULT_SESSION_NAME).unwrap();
        assert_eq!(store.current().response_buffer(), "");
        assert_eq!(
            store.get(&second).unwrap().response_buffer(),
            "only in second"
        );
    }

    #[test]
    fn switching_away_and_back_restores_buffers() {
        let mut store = SessionStore::new();
        store.current_mut().append_request("question a");
        store.current_mut().commit_response("answer a");
        let before = store.current().clone();

        let other = store.create_session();
        store.current_mut().append_request("question b");

        store.switch_to(DEFAULT_SESSION_NAME).unwrap();
        store.switch_to(&other).unwrap();
        store.switch_to(DEFAULT_SESSION_NAME).unwrap();

        assert_eq!(store.current(), &before);
        assert_eq!(
            store.get(&other).unwrap().request_buffer(),
            "\n\n---\n\nquestion b"
        );
    }

    #[test]
    fn switching_to_unknown_session_keeps_current() {
        let mut store = SessionStore::new();
        let second = store.create_session();

        let err = store.switch_to("Session 99").unwrap_err();
        assert_eq!(err, ChatError::UnknownSession("Session 99".into()));
        assert_eq!(store.current_name(), second);
    }

    #[test]
    fn response_turns_are_separated() {
        let mut session = ConversationSession::new("s");
        session.commit_response("first");
        session.commit_response("second");
        assert_eq!(session.response_buffer(), "first\n\n---\n\nsecond");

        session.clear_response();
        session.commit_response("again");
        assert_eq!(session.response_buffer(), "again");
    }

    #[test]
    fn request_turns_always_start_with_separator() {
        let mut session = ConversationSession::new("s");
        session.append_request("hi");
        session.append_request("there");
        assert_eq!(session.request_buffer(), "\n\n---\n\nhi\n\n---\n\nthere");

        session.clear_request();
        assert_eq!(session.request_buffer(), "");
    }
}
