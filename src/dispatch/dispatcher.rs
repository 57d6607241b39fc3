//! Public entry point used by the HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::dispatch::command::Command;
use crate::error::{BridgeError, BridgeResult};
use crate::session::SessionRegistry;

/// Turns logical commands into backend round trips.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
    reply_timeout: Option<Duration>,
}

impl CommandDispatcher {
    /// Create a dispatcher over an existing registry.
    pub fn new(registry: Arc<SessionRegistry>, backend: &BackendConfig) -> Self {
        Self {
            registry,
            reply_timeout: backend.reply_timeout_secs.map(Duration::from_secs),
        }
    }

    /// The registry this dispatcher routes through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open (or join) the session for `username` and wait for the handshake.
    pub async fn login(&self, username: &str) -> BridgeResult<()> {
        let session = self.registry.get_or_create(username);
        session.wait_open().await?;
        tracing::info!(username = %username, session_id = %session.id(), "User logged in");
        Ok(())
    }

    /// Log out and close the session for `username`.
    pub async fn logout(&self, username: &str) -> BridgeResult<()> {
        let session = self
            .registry
            .get(username)
            .ok_or_else(|| BridgeError::NotLoggedIn(username.to_string()))?;
        session.close();
        session.closed().await;
        tracing::info!(username = %username, session_id = %session.id(), "User logged out");
        Ok(())
    }

    pub async fn send_message(&self, from: &str, to: &str, content: &str) -> BridgeResult<String> {
        self.dispatch(Command::PrivateMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
        })
        .await
    }

    pub async fn send_group_message(
        &self,
        from: &str,
        group: &str,
        content: &str,
    ) -> BridgeResult<String> {
        self.dispatch(Command::GroupMessage {
            from: from.to_string(),
            group: group.to_string(),
            content: content.to_string(),
        })
        .await
    }

    pub async fn create_group(&self, group_name: &str, creator: &str) -> BridgeResult<String> {
        self.dispatch(Command::CreateGroup {
            group_name: group_name.to_string(),
            creator: creator.to_string(),
        })
        .await
    }

    pub async fn join_group(&self, group_name: &str, username: &str) -> BridgeResult<String> {
        self.dispatch(Command::JoinGroup {
            group_name: group_name.to_string(),
            username: username.to_string(),
        })
        .await
    }

    pub async fn get_groups(&self, username: &str) -> BridgeResult<String> {
        self.dispatch(Command::GetGroups {
            username: username.to_string(),
        })
        .await
    }

    pub async fn get_online_users(&self, username: &str) -> BridgeResult<String> {
        self.dispatch(Command::GetOnlineUsers {
            username: username.to_string(),
        })
        .await
    }

    /// Send `command` on the sender's session and wait for the raw reply.
    pub async fn dispatch(&self, command: Command) -> BridgeResult<String> {
        let sender = command.sender();
        let session = self
            .registry
            .get(sender)
            .ok_or_else(|| BridgeError::NotLoggedIn(sender.to_string()))?;

        let pending = session.send(&command.to_wire())?;
        tracing::debug!(
            username = %sender,
            session_id = %session.id(),
            command = command.name(),
            "Command dispatched"
        );

        match self.reply_timeout {
            None => pending.recv().await,
            Some(limit) => match tokio::time::timeout(limit, pending.recv()).await {
                Ok(reply) => reply,
                Err(_) => {
                    tracing::warn!(
                        username = %sender,
                        command = command.name(),
                        timeout_secs = limit.as_secs(),
                        "Backend reply timed out"
                    );
                    Err(BridgeError::ReplyTimeout(limit.as_secs()))
                }
            },
        }
    }
}
