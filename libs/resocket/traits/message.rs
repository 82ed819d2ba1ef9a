use serde::Serialize;
use serde_json::Value;

/// Kind used for inbound messages that carry no `type` field
pub const DEFAULT_KIND: &str = "data";

/// Control kind: the server asks the client to stop
pub const CLOSED_KIND: &str = "closed";

/// Raw WebSocket payload, text or binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(_) => None,
            WsMessage::Binary(b) => Some(b),
        }
    }

    /// Check if message is text
    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }

    /// Check if message is binary
    pub fn is_binary(&self) -> bool {
        matches!(self, WsMessage::Binary(_))
    }

    /// Size estimate used for buffered-amount reporting.
    ///
    /// Text counts characters rather than encoded bytes.
    pub fn size_hint(&self) -> usize {
        match self {
            WsMessage::Text(s) => s.chars().count(),
            WsMessage::Binary(b) => b.len(),
        }
    }
}

impl From<String> for WsMessage {
    fn from(value: String) -> Self {
        WsMessage::Text(value)
    }
}

impl From<&str> for WsMessage {
    fn from(value: &str) -> Self {
        WsMessage::Text(value.to_string())
    }
}

impl From<Vec<u8>> for WsMessage {
    fn from(value: Vec<u8>) -> Self {
        WsMessage::Binary(value)
    }
}

/// A parsed inbound message
///
/// `body` is the full JSON object as received; `kind` is its `type` field
/// (non-string tags as their JSON text), or [`DEFAULT_KIND`] when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedMessage {
    #[serde(skip)]
    pub kind: String,
    #[serde(flatten)]
    pub body: serde_json::Map<String, Value>,
}

impl FeedMessage {
    /// Parse a text payload.
    ///
    /// Returns `None` for empty keep-alive payloads and for anything that is
    /// not a JSON object.
    pub fn parse(text: &str) -> Option<Self> {
        if is_empty_payload(text) {
            return None;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(body)) => {
                let kind = match body.get("type") {
                    None | Some(Value::Null) => DEFAULT_KIND.to_string(),
                    Some(Value::String(kind)) => kind.clone(),
                    // numeric and other tags keep their JSON text
                    Some(other) => other.to_string(),
                };
                Some(Self { kind, body })
            }
            _ => None,
        }
    }

    /// Whether this is the server's close request
    pub fn is_closed(&self) -> bool {
        self.kind == CLOSED_KIND
    }

    /// Deserialize the body into a concrete type
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.body.clone()))
    }
}

/// Payloads the server sends as separators or keep-alives
pub fn is_empty_payload(text: &str) -> bool {
    text.is_empty() || text == "," || text == "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults_to_data() {
        let msg = FeedMessage::parse(r#"{"id":"a","headline":"x"}"#).unwrap();
        assert_eq!(msg.kind, DEFAULT_KIND);
        assert!(!msg.is_closed());
    }

    #[test]
    fn test_kind_from_type_field() {
        let msg = FeedMessage::parse(r#"{"type":"closed","payload":null}"#).unwrap();
        assert!(msg.is_closed());
    }

    #[test]
    fn test_non_string_type_is_its_own_kind() {
        let numeric = FeedMessage::parse(r#"{"type":1,"seq":1}"#).unwrap();
        assert_eq!(numeric.kind, "1");
        assert_ne!(numeric.kind, DEFAULT_KIND);

        let flag = FeedMessage::parse(r#"{"type":true}"#).unwrap();
        assert_eq!(flag.kind, "true");

        let null = FeedMessage::parse(r#"{"type":null}"#).unwrap();
        assert_eq!(null.kind, DEFAULT_KIND);
    }

    #[test]
    fn test_rejects_plain_strings_and_scalars() {
        assert!(FeedMessage::parse("Welcome to the WebSocket server!").is_none());
        assert!(FeedMessage::parse("42").is_none());
        assert!(FeedMessage::parse("\"quoted\"").is_none());
        assert!(FeedMessage::parse("[1,2]").is_none());
    }

    #[test]
    fn test_ignores_keepalive_payloads() {
        assert!(FeedMessage::parse("").is_none());
        assert!(FeedMessage::parse(",").is_none());
        assert!(FeedMessage::parse("\n").is_none());
    }

    #[test]
    fn test_size_hint_counts_chars() {
        assert_eq!(WsMessage::from("héllo").size_hint(), 5);
        assert_eq!(WsMessage::from(vec![1u8, 2, 3]).size_hint(), 3);
    }
}
