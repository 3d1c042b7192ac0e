//! SockJS framing shared by the SockJS WebSocket and XHR transports.
//!
//! Server frames are a one-letter type followed by an optional JSON body:
//! `o` open, `h` heart-beat, `a[..]` message batch, `m".."` single message
//! and `c[code,"reason"]` close. Clients send JSON arrays of strings.

use serde_json::Value;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

/// Parse one server frame
pub fn parse_frame(raw: &str) -> Result<SockJsFrame, String> {
    let raw = raw.trim_end_matches(['\n', '\r']);
    let (kind, body) = match raw.char_indices().nth(1) {
        Some((split, _)) => raw.split_at(split),
        None => (raw, ""),
    };

    match kind {
        "o" => Ok(SockJsFrame::Open),
        "h" => Ok(SockJsFrame::Heartbeat),
        "a" => serde_json::from_str::<Vec<String>>(body)
            .map(SockJsFrame::Messages)
            .map_err(|e| format!("bad SockJS message batch: {}", e)),
        "m" => serde_json::from_str::<String>(body)
            .map(|message| SockJsFrame::Messages(vec![message]))
            .map_err(|e| format!("bad SockJS message: {}", e)),
        "c" => {
            let values: Vec<Value> = serde_json::from_str(body)
                .map_err(|e| format!("bad SockJS close frame: {}", e))?;
            let code = values
                .first()
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(1000);
            let reason = values
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(SockJsFrame::Close { code, reason })
        }
        "" => Err("empty SockJS frame".to_string()),
        other => Err(format!("unknown SockJS frame type '{}'", other)),
    }
}

/// Client messages as a SockJS send body
pub fn encode_messages(messages: &[String]) -> String {
    // A Vec<String> always serializes
    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string())
}

/// Fresh `(server, session)` path segments for one SockJS session
pub fn session_ids() -> (String, String) {
    let server = format!("{:03}", Uuid::new_v4().as_u128() % 1000);
    let session = Uuid::new_v4().simple().to_string();
    (server, session)
}

/// `{base}/{server}/{session}/{suffix}`
pub fn session_url(base: &Url, server: &str, session: &str, suffix: &str) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{} cannot carry a SockJS path", base))?
        .pop_if_empty()
        .extend([server, session, suffix]);
    Ok(url)
}
