//! AI chat console for admins.

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;

use crate::api::ApiClient;
use crate::models::{ChatMessage, Role};

/// Non-system messages kept and sent with each request.
pub const HISTORY_LIMIT: usize = 20;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Du är en assistent för bastuföreningens administratörer. \
Svara kort och på svenska.";

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.chat_completion(messages).await
    }
}

pub struct ChatConsole<B> {
    backend: B,
    system_prompt: String,
    history: VecDeque<ChatMessage>,
}

impl<B: ChatBackend> ChatConsole<B> {
    pub fn new(backend: B) -> Self {
        Self::with_system_prompt(backend, DEFAULT_SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(backend: B, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
        }
    }

    /// Send a user message and return the assistant's reply.
    ///
    /// The user turn is only kept when the backend answers, so a failed
    /// request can simply be retried.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let user = ChatMessage::user(text.trim());
        let request = self.request_with(&user);
        let reply = self.backend.complete(&request).await?;

        self.push(user);
        self.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    fn request_with(&self, pending: &ChatMessage) -> Vec<ChatMessage> {
        let mut request = Vec::with_capacity(self.history.len() + 2);
        request.push(ChatMessage::system(self.system_prompt.clone()));
        // Leave room for the pending turn within the limit
        let skip = (self.history.len() + 1).saturating_sub(HISTORY_LIMIT);
        request.extend(self.history.iter().skip(skip).cloned());
        request.push(pending.clone());
        request
    }

    fn push(&mut self, message: ChatMessage) {
        if message.role == Role::System {
            return;
        }
        self.history.push_back(message);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
