//! Encoding and classification of pipe-delimited backend messages.

use std::fmt;

const FIELD_SEPARATOR: char = '|';
const KEY_SEPARATOR: char = ':';
const TYPE_KEY: &str = "type";

/// Message class, taken from the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Login,
    LoginSuccess,
    LoginError,
    Logout,
    PrivateMessage,
    GroupMessage,
    CreateGroup,
    JoinGroup,
    GetGroups,
    GetOnlineUsers,
    /// A `type` field was found but its value is not one we act on.
    Other(String),
    /// No `type` field at all.
    Unrecognized,
}

impl MessageKind {
    /// Wire name of the kind (`""` for [`MessageKind::Unrecognized`]).
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Login => "login",
            MessageKind::LoginSuccess => "login_success",
            MessageKind::LoginError => "login_error",
            MessageKind::Logout => "logout",
            MessageKind::PrivateMessage => "private_message",
            MessageKind::GroupMessage => "group_message",
            MessageKind::CreateGroup => "create_group",
            MessageKind::JoinGroup => "join_group",
            MessageKind::GetGroups => "get_groups",
            MessageKind::GetOnlineUsers => "get_online_users",
            MessageKind::Other(kind) => kind,
            MessageKind::Unrecognized => "",
        }
    }

    fn from_wire(value: &str) -> Self {
        match value {
            "login" => MessageKind::Login,
            "login_success" => MessageKind::LoginSuccess,
            "login_error" => MessageKind::LoginError,
            "logout" => MessageKind::Logout,
            "private_message" => MessageKind::PrivateMessage,
            "group_message" => MessageKind::GroupMessage,
            "create_group" => MessageKind::CreateGroup,
            "join_group" => MessageKind::JoinGroup,
            "get_groups" => MessageKind::GetGroups,
            "get_online_users" => MessageKind::GetOnlineUsers,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flat `type` + ordered fields message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub kind: MessageKind,
    pub fields: Vec<(String, String)>,
}

impl WireMessage {
    /// Start a message of the given kind with no fields.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Append a field. Values are written verbatim.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Look up the first field with the given key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize as `type:<kind>|k1:v1|...` with no trailing delimiter.
    pub fn encode(&self) -> String {
        let mut out = format!("{}{}{}", TYPE_KEY, KEY_SEPARATOR, self.kind);
        for (key, value) in &self.fields {
            out.push(FIELD_SEPARATOR);
            out.push_str(key);
            out.push(KEY_SEPARATOR);
            out.push_str(value);
        }
        out
    }

    /// Login command sent right after connecting.
    pub fn login(username: &str) -> Self {
        Self::new(MessageKind::Login).with("username", username)
    }

    /// Logout command sent before closing a session.
    pub fn logout(username: &str) -> Self {
        Self::new(MessageKind::Logout).with("username", username)
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn split_field(segment: &str) -> Option<(&str, &str)> {
    segment.split_once(KEY_SEPARATOR)
}

/// Decode a raw message. Segments without a `:` are skipped.
pub fn decode(raw: &str) -> WireMessage {
    let mut kind = None;
    let mut fields = Vec::new();

    for segment in raw.split(FIELD_SEPARATOR) {
        let Some((key, value)) = split_field(segment) else {
            continue;
        };
        if key == TYPE_KEY && kind.is_none() {
            kind = Some(MessageKind::from_wire(value));
        } else {
            fields.push((key.to_string(), value.to_string()));
        }
    }

    WireMessage {
        kind: kind.unwrap_or(MessageKind::Unrecognized),
        fields,
    }
}

/// Extract the message class from the first `type` field.
pub fn classify(raw: &str) -> MessageKind {
    raw.split(FIELD_SEPARATOR)
        .filter_map(split_field)
        .find(|(key, _)| *key == TYPE_KEY)
        .map(|(_, value)| MessageKind::from_wire(value.trim_end()))
        .unwrap_or(MessageKind::Unrecognized)
}

/// The raw message with its `type` field removed.
///
/// Falls back to the whole message when nothing else is left.
pub fn detail(raw: &str) -> String {
    let rest: Vec<&str> = raw
        .split(FIELD_SEPARATOR)
        .filter(|segment| !matches!(split_field(segment), Some((TYPE_KEY, _))))
        .collect();

    if rest.iter().all(|segment| segment.is_empty()) {
        raw.to_string()
    } else {
        rest.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_has_no_trailing_delimiter() {
        let msg = WireMessage::new(MessageKind::PrivateMessage)
            .with("from", "alice")
            .with("to", "bob")
            .with("content", "hi");
        assert_eq!(msg.encode(), "type:private_message|from:alice|to:bob|content:hi");

        let bare = WireMessage::new(MessageKind::Other("ping".into()));
        assert_eq!(bare.encode(), "type:ping");
    }

    #[test]
    fn test_decode_reproduces_kind_and_fields() {
        let msg = WireMessage::new(MessageKind::CreateGroup)
            .with("group_name", "rustaceans")
            .with("creator", "alice");
        let decoded = decode(&msg.encode());
        assert_eq!(decoded, msg);
        assert_eq!(decoded.field("creator"), Some("alice"));
    }

    #[test]
    fn test_classify_known_and_unknown_kinds() {
        assert_eq!(classify("type:login_success"), MessageKind::LoginSuccess);
        assert_eq!(
            classify("type:login_error|reason:banned"),
            MessageKind::LoginError
        );
        assert_eq!(
            classify("type:message_sent_ok|id:1"),
            MessageKind::Other("message_sent_ok".into())
        );
        assert_eq!(classify("hello there"), MessageKind::Unrecognized);
        assert_eq!(classify(""), MessageKind::Unrecognized);
    }

    #[test]
    fn test_classify_finds_type_anywhere() {
        assert_eq!(
            classify("from:bob|type:private_message|content:yo"),
            MessageKind::PrivateMessage
        );
    }

    #[test]
    fn test_delimiter_in_value_breaks_fields_deterministically() {
        let msg = WireMessage::new(MessageKind::PrivateMessage).with("content", "a|b:c");
        let decoded = decode(&msg.encode());
        assert_eq!(decoded.kind, MessageKind::PrivateMessage);
        assert_eq!(decoded.field("content"), Some("a"));
        assert_eq!(decoded.field("b"), Some("c"));
    }

    #[test]
    fn test_detail_strips_type_field() {
        assert_eq!(detail("type:login_error|reason:banned"), "reason:banned");
        assert_eq!(
            detail("type:login_error|message:name in use|code:7"),
            "message:name in use|code:7"
        );
        assert_eq!(detail("type:login_error"), "type:login_error");
    }
}
