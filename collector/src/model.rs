use chrono::{DateTime, Utc};
use collector_core::{timestamp, Result};
use serde::{Deserialize, Serialize};

/// One message record from the remote API. Only `date` carries meaning for
/// the collector; everything else rides along as opaque payload and is
/// forwarded to the sink verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub date: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    pub fn logical_time(&self) -> Result<DateTime<Utc>> {
        timestamp::parse(&self.date)
    }
}

/// A bounded batch of messages as returned by `GET /v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub messages: Vec<Message>,
    pub count: u32,
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// What gets handed to the event sink: the input the record came from, the
/// record's own `date` as its logical time, and the full record as payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub source: String,
    pub time: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn from_message(source: &str, message: &Message) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            time: message.date.clone(),
            data: serde_json::to_value(message)?,
        })
    }
}
