//! Logical commands and their wire representation.

use crate::wire::{MessageKind, WireMessage};

/// A command issued on behalf of a logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PrivateMessage { from: String, to: String, content: String },
    GroupMessage { from: String, group: String, content: String },
    CreateGroup { group_name: String, creator: String },
    JoinGroup { group_name: String, username: String },
    GetGroups { username: String },
    GetOnlineUsers { username: String },
}

impl Command {
    /// Identity whose session carries the command.
    ///
    /// Always the sender, never a recipient.
    pub fn sender(&self) -> &str {
        match self {
            Command::PrivateMessage { from, .. } | Command::GroupMessage { from, .. } => from,
            Command::CreateGroup { creator, .. } => creator,
            Command::JoinGroup { username, .. }
            | Command::GetGroups { username }
            | Command::GetOnlineUsers { username } => username,
        }
    }

    /// Endpoint-style name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::PrivateMessage { .. } => "send_message",
            Command::GroupMessage { .. } => "send_group_message",
            Command::CreateGroup { .. } => "create_group",
            Command::JoinGroup { .. } => "join_group",
            Command::GetGroups { .. } => "get_groups",
            Command::GetOnlineUsers { .. } => "get_online_users",
        }
    }

    /// Build the wire message with the backend's fixed field set.
    pub fn to_wire(&self) -> WireMessage {
        match self {
            Command::PrivateMessage { from, to, content } => {
                WireMessage::new(MessageKind::PrivateMessage)
                    .with("from", from)
                    .with("to", to)
                    .with("content", content)
            }
            Command::GroupMessage { from, group, content } => {
                WireMessage::new(MessageKind::GroupMessage)
                    .with("from", from)
                    .with("group", group)
                    .with("content", content)
            }
            Command::CreateGroup { group_name, creator } => {
                WireMessage::new(MessageKind::CreateGroup)
                    .with("group_name", group_name)
                    .with("creator", creator)
            }
            Command::JoinGroup { group_name, username } => {
                WireMessage::new(MessageKind::JoinGroup)
                    .with("group_name", group_name)
                    .with("username", username)
            }
            Command::GetGroups { username } => {
                WireMessage::new(MessageKind::GetGroups).with("username", username)
            }
            Command::GetOnlineUsers { username } => {
                WireMessage::new(MessageKind::GetOnlineUsers).with("username", username)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_forms() {
        let cmd = Command::PrivateMessage {
            from: "alice".into(),
            to: "bob".into(),
            content: "hi".into(),
        };
        assert_eq!(cmd.to_wire().encode(), "type:private_message|from:alice|to:bob|content:hi");

        let cmd = Command::CreateGroup {
            group_name: "devs".into(),
            creator: "alice".into(),
        };
        assert_eq!(cmd.to_wire().encode(), "type:create_group|group_name:devs|creator:alice");

        let cmd = Command::GetGroups {
            username: "alice".into(),
        };
        assert_eq!(cmd.to_wire().encode(), "type:get_groups|username:alice");

        let cmd = Command::GroupMessage {
            from: "alice".into(),
            group: "devs".into(),
            content: "standup".into(),
        };
        assert_eq!(
            cmd.to_wire().encode(),
            "type:group_message|from:alice|group:devs|content:standup"
        );
    }

    #[test]
    fn test_sender_is_issuing_identity() {
        let cmd = Command::PrivateMessage {
            from: "alice".into(),
            to: "bob".into(),
            content: "hi".into(),
        };
        assert_eq!(cmd.sender(), "alice");

        let cmd = Command::CreateGroup {
            group_name: "devs".into(),
            creator: "carol".into(),
        };
        assert_eq!(cmd.sender(), "carol");
    }
}
