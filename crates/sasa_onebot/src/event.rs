//! OneBot v11 wire types: inbound events, API echo responses, outbound actions.
//!
//! Inbound frames are heterogeneous: push events carry a `post_type`, while
//! API responses carry `status`/`retcode`/`echo` instead. `RawEvent::parse`
//! sorts a frame into the right shape without failing the connection on
//! anything unrecognized.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "post_type")]
pub enum OneBotEvent {
    #[serde(rename = "message")]
    Message(MessageEvent),
    #[serde(rename = "meta_event")]
    Meta(serde_json::Value),
    #[serde(rename = "notice")]
    Notice(serde_json::Value),
    #[serde(rename = "request")]
    Request(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_type: String, // "private" or "group"
    pub message_id: i64,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub self_id: i64,
    #[serde(default)]
    pub raw_message: String,
    pub sender: Option<Sender>,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: Option<i64>,
    pub nickname: Option<String>,
    pub card: Option<String>,
    pub role: Option<String>,
}

/// Response to a prior API call, matched back by its `echo` token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub status: String,
    pub retcode: i64,
    pub data: Option<serde_json::Value>,
    pub echo: Option<String>,
}

impl EchoResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// `raw_message` of the fetched message, falling back to the structured
    /// `message` field rendered as a string.
    pub fn raw_message(&self) -> String {
        let data = match &self.data {
            Some(d) => d,
            None => return String::new(),
        };
        if let Some(raw) = data.get("raw_message").and_then(|v| v.as_str()) {
            return raw.to_string();
        }
        match data.get("message") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

/// One inbound WebSocket frame, sorted by shape.
#[derive(Debug, Clone)]
pub enum RawEvent {
    Event(OneBotEvent),
    Api(EchoResponse),
    Unknown(serde_json::Value),
}

impl RawEvent {
    pub fn parse(text: &str) -> Option<RawEvent> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        if value.get("post_type").is_some() {
            if let Ok(event) = serde_json::from_value::<OneBotEvent>(value.clone()) {
                return Some(RawEvent::Event(event));
            }
        } else if value.get("status").is_some() && value.get("echo").is_some() {
            if let Ok(resp) = serde_json::from_value::<EchoResponse>(value.clone()) {
                return Some(RawEvent::Api(resp));
            }
        }
        Some(RawEvent::Unknown(value))
    }
}

// ============================================================================
// Outbound actions
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ApiAction {
    pub action: String,
    pub params: ApiParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl ApiAction {
    /// `send_msg` routed by message type: group messages carry `group_id`,
    /// private ones `user_id`.
    pub fn send_msg(
        message_type: &str,
        user_id: Option<i64>,
        group_id: Option<i64>,
        message: String,
    ) -> Self {
        let params = if message_type == "group" {
            ApiParams {
                message_type: Some("group".to_string()),
                group_id,
                message: Some(message),
                ..Default::default()
            }
        } else {
            ApiParams {
                message_type: Some("private".to_string()),
                user_id,
                message: Some(message),
                ..Default::default()
            }
        };
        Self {
            action: "send_msg".to_string(),
            params,
            echo: None,
        }
    }

    /// `get_msg` carrying a correlation token so the response can be matched
    /// back to the request.
    pub fn get_msg(message_id: &str, echo: &str) -> Self {
        Self {
            action: "get_msg".to_string(),
            params: ApiParams {
                message_id: Some(message_id.to_string()),
                ..Default::default()
            },
            echo: Some(echo.to_string()),
        }
    }
}
