use async_trait::async_trait;
use gift_core::UserId;
use thiserror::Error;

pub type ChannelId = i64;
pub type MessageId = i64;
pub type RoleId = i64;

/// Failures surfaced by the chat platform. Callers log and swallow these;
/// a committed ledger mutation is never rolled back for a failed delivery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("missing permission")]
    Forbidden,
    #[error("chat platform rejected the request: {0}")]
    Rejected(String),
}

/// Outbound operations the minigame consumes from the chat platform.
///
/// The actual client (gateway connection, rate limiting, embeds) lives in the
/// embedding process; this is only the slice the gift flow needs.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_dm(&self, user: UserId, content: &str) -> Result<(), ChatError>;

    async fn send_channel(&self, channel: ChannelId, content: &str) -> Result<(), ChatError>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId)
        -> Result<(), ChatError>;

    async fn add_role(&self, user: UserId, role: RoleId, reason: &str) -> Result<(), ChatError>;

    /// Whether the member holds the moderation role gating `peek` and
    /// `reset_user`.
    async fn member_is_staff(&self, user: UserId) -> Result<bool, ChatError>;
}
