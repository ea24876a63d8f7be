//! Conversation memory for the translator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of history entries rendered into a prompt
pub const PROMPT_HISTORY: usize = 3;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// One stored conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

/// Recent turns plus the last command and its output.
///
/// The full history is kept; prompts only ever see the last
/// [`PROMPT_HISTORY`] entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    messages: Vec<ConversationMessage>,
    last_command: Option<String>,
    last_output: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            last_command: None,
            last_output: None,
            updated_at: Utc::now(),
        }
    }

    pub fn builder() -> ConversationContextBuilder {
        ConversationContextBuilder::default()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
        });
        self.touch();
    }

    pub fn set_last_command(&mut self, command: impl Into<String>) {
        self.last_command = Some(command.into());
        self.touch();
    }

    pub fn set_last_output(&mut self, output: impl Into<String>) {
        self.last_output = Some(output.into());
        self.touch();
    }

    /// Most recent messages, oldest first
    pub fn recent(&self, count: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    /// Context block placed between the instructions and the request
    pub fn render(&self) -> String {
        let mut block = String::new();

        if let Some(command) = &self.last_command {
            block.push_str(&format!("Last command executed: {}\n", command));
        }
        if let Some(output) = &self.last_output {
            block.push_str(&format!("Last command output: {}\n", output));
        }

        let recent = self.recent(PROMPT_HISTORY);
        if !recent.is_empty() {
            block.push_str("Recent conversation:\n");
            for message in recent {
                block.push_str(&format!("{}: {}\n", message.role, message.content));
            }
        }
        block
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ConversationContext
#[derive(Default)]
pub struct ConversationContextBuilder {
    messages: Vec<ConversationMessage>,
    last_command: Option<String>,
    last_output: Option<String>,
}

impl ConversationContextBuilder {
    pub fn with_message(mut self, role: Role, content: impl Into<String>) -> Self {
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
        });
        self
    }

    pub fn with_last_command(mut self, command: impl Into<String>) -> Self {
        self.last_command = Some(command.into());
        self
    }

    pub fn with_last_output(mut self, output: impl Into<String>) -> Self {
        self.last_output = Some(output.into());
        self
    }

    pub fn build(self) -> ConversationContext {
        ConversationContext {
            messages: self.messages,
            last_command: self.last_command,
            last_output: self.last_output,
            updated_at: Utc::now(),
        }
    }
}
