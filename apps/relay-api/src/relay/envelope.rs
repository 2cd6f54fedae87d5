//! Wire format delivered to subscribers.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One webhook event as relayed to subscribers:
/// `{"headers": {"<Name>": ["<value>", ...]}, "body": <original JSON>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookEnvelope {
    /// Request headers, name -> values in arrival order.
    pub headers: BTreeMap<String, Vec<String>>,
    /// The webhook body, verbatim.
    #[schema(value_type = Object)]
    pub body: Value,
}

impl WebhookEnvelope {
    pub fn new(headers: BTreeMap<String, Vec<String>>, body: Value) -> Self {
        Self { headers, body }
    }

    /// Build an envelope from an inbound request.
    ///
    /// Header names are canonicalized (`x-github-event` -> `X-Github-Event`)
    /// so subscribers see the same keys regardless of how the HTTP stack
    /// normalizes them. Repeated headers keep their order. `Host` is part of
    /// the request line, not the event, and is left out.
    pub fn from_request(headers: &HeaderMap, body: Value) -> Self {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            if name == header::HOST {
                continue;
            }
            map.entry(canonical_header_name(name.as_str()))
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        Self::new(map, body)
    }

    /// Serialize once for the whole fan-out.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Capitalize the first letter and every letter following a hyphen; lower
/// case the rest. Names containing a byte that is not an HTTP token
/// character are returned unchanged.
pub fn canonical_header_name(name: &str) -> String {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// RFC 9110 `tchar`.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}
