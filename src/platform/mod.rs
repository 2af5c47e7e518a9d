pub mod telegram;

/// A message received from the chat transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform-specific chat/channel ID as string
    pub chat_id: String,
    /// Platform-specific user ID as string
    pub user_id: String,
    /// Display name of the user
    pub user_name: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Document {
        file_name: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Telegram HTML subset; dynamic content must already be escaped.
    Html,
    Plain,
}

/// A file sent alongside a reply. The content is captured when the reply
/// is built, so later writes elsewhere cannot change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// One logical response, before chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: ReplyFormat,
    pub attachment: Option<Attachment>,
}

impl Reply {
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::Html,
            attachment: None,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::Plain,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}
