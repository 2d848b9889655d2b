use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Snapshot of one origin response, replayable on later hits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordDocument", into = "RecordDocument")]
pub struct OriginResponse {
    pub status_code: u16,
    pub headers: HashMap<String, Vec<Bytes>>,
    pub body: Bytes,
}

impl OriginResponse {
    pub fn new(status_code: u16, headers: HashMap<String, Vec<Bytes>>, body: Bytes) -> Self {
        Self {
            status_code,
            headers,
            body,
        }
    }

    /// Append a header value, keeping earlier values for the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyEncoding {
    Base64,
}

/// Header value as stored: plain text, or `{"base64": ...}` for raw bytes
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum HeaderValueDocument {
    Text(String),
    Encoded { base64: String },
}

impl From<Bytes> for HeaderValueDocument {
    fn from(value: Bytes) -> Self {
        match std::str::from_utf8(&value) {
            Ok(text) => HeaderValueDocument::Text(text.to_string()),
            Err(_) => HeaderValueDocument::Encoded {
                base64: STANDARD.encode(&value),
            },
        }
    }
}

impl TryFrom<HeaderValueDocument> for Bytes {
    type Error = String;

    fn try_from(value: HeaderValueDocument) -> Result<Self, Self::Error> {
        match value {
            HeaderValueDocument::Text(text) => Ok(Bytes::from(text)),
            HeaderValueDocument::Encoded { base64 } => STANDARD
                .decode(base64.as_bytes())
                .map(Bytes::from)
                .map_err(|e| format!("invalid base64 header value: {}", e)),
        }
    }
}

/// JSON shape shared with the Redis store
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordDocument {
    status_code: u16,
    #[serde(default)]
    headers: HashMap<String, Vec<HeaderValueDocument>>,
    #[serde(default)]
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_encoding: Option<BodyEncoding>,
}

impl From<OriginResponse> for RecordDocument {
    fn from(record: OriginResponse) -> Self {
        let (body, body_encoding) = match std::str::from_utf8(&record.body) {
            Ok(text) => (text.to_string(), None),
            Err(_) => (STANDARD.encode(&record.body), Some(BodyEncoding::Base64)),
        };

        let headers = record
            .headers
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().map(Into::into).collect()))
            .collect();

        Self {
            status_code: record.status_code,
            headers,
            body,
            body_encoding,
        }
    }
}

impl TryFrom<RecordDocument> for OriginResponse {
    type Error = String;

    fn try_from(doc: RecordDocument) -> Result<Self, Self::Error> {
        let body = match doc.body_encoding {
            None => Bytes::from(doc.body),
            Some(BodyEncoding::Base64) => STANDARD
                .decode(doc.body.as_bytes())
                .map(Bytes::from)
                .map_err(|e| format!("invalid base64 body: {}", e))?,
        };

        let mut headers = HashMap::with_capacity(doc.headers.len());
        for (name, values) in doc.headers {
            let values = values
                .into_iter()
                .map(Bytes::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            headers.insert(name, values);
        }

        Ok(Self {
            status_code: doc.status_code,
            headers,
            body,
        })
    }
}
