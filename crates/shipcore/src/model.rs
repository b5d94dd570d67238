//! Model gateway: prompt construction, the chat-completion HTTP call, and
//! the recovery pipeline that turns whatever text a model produces into a
//! usable reply. A deterministic mock stands in when no endpoint is
//! configured; its output flows through the same parsing, XP and cache path.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

pub const MODEL_TIMEOUT: Duration = Duration::from_secs(30);

pub const PROCESSING_DELAY_RESPONSE: &str =
    "Processing delay. The main computer is rerouting power to compensation circuits.";
pub const SENSORS_OFFLINE_RESPONSE: &str =
    "Unable to access the knowledge database. Sensor arrays are offline.";
pub const DATA_CORRUPTION_RESPONSE: &str =
    "Data corruption detected. Unable to parse logic stream.";
pub const SYSTEM_FAILURE_RESPONSE: &str =
    "A critical system failure has occurred. Diagnostics initiated.";
/// Used when a parsed reply object carries no `response` key.
pub const DEFAULT_RESPONSE: &str = "Processing complete.";

const FILLER_RESPONSES: &[&str] = &[
    "Processing parameters.",
    "Working...",
    "Unable to comply with that specific request.",
    "Please restate the command.",
    "Input received.",
];

#[derive(Debug, Clone)]
pub enum GatewayError {
    Timeout,
    Network(String),
    Status(u16),
    Decode(&'static str),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Timeout => write!(f, "model request timed out"),
            GatewayError::Network(s) => write!(f, "network error: {s}"),
            GatewayError::Status(code) => write!(f, "model endpoint returned http {code}"),
            GatewayError::Decode(s) => write!(f, "bad model output: {s}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// What the engine consumes: integer deltas, the spoken line, and whether
/// this turn completed the active mission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub updates: BTreeMap<String, i64>,
    pub response: String,
    pub mission_success: bool,
}

#[derive(Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug)]
pub enum ModelGateway {
    Mock,
    Http(HttpGateway),
    #[cfg(test)]
    Canned(String),
    #[cfg(test)]
    Fail(GatewayError),
}

impl ModelGateway {
    pub fn mock() -> Self {
        ModelGateway::Mock
    }

    pub fn http(url: &str, model: &str, api_key: Option<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(MODEL_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(ModelGateway::Http(HttpGateway {
            client,
            url: normalize_url(url),
            model: model.to_string(),
            api_key,
        }))
    }

    /// Raw completion text for the given prompts. The snapshot is only used
    /// by the mock, which has no prompt to read the shield level from.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
        snapshot: &BTreeMap<String, i64>,
    ) -> Result<String, GatewayError> {
        match self {
            ModelGateway::Mock => Ok(mock_content(user_text, snapshot)),
            ModelGateway::Http(gw) => gw.complete(system_prompt, user_text).await,
            #[cfg(test)]
            ModelGateway::Canned(s) => Ok(s.clone()),
            #[cfg(test)]
            ModelGateway::Fail(e) => Err(e.clone()),
        }
    }
}

impl HttpGateway {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String, GatewayError> {
        let req = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_text},
            ],
            "temperature": 0.1,
        });

        let mut builder = self.client.post(&self.url).json(&req);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(classify_reqwest)?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(GatewayError::Status(status.as_u16()));
        }
        let body = resp.text().await.map_err(classify_reqwest)?;

        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("choices")?
                    .as_array()?
                    .first()?
                    .get("message")?
                    .get("content")?
                    .as_str()
                    .map(|s| s.to_string())
            })
            .ok_or(GatewayError::Decode("missing chat completion content"))
    }
}

fn classify_reqwest(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(e.to_string())
    }
}

/// Accept a bare host, a `/v1` base, or a full chat-completions URL.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with("/chat/completions") {
        url.to_string()
    } else if url.ends_with("/v1") {
        format!("{url}/chat/completions")
    } else {
        format!("{url}/v1/chat/completions")
    }
}

pub fn build_system_prompt(
    rank_title: &str,
    clearance: &str,
    location: &str,
    snapshot_json: &str,
    directive: &str,
) -> String {
    format!(
        "You are the onboard computer of the USS Enterprise, responding to a crew member. \
         User's Rank: {rank_title}. You must address the user by this rank, and never anything else. \
         Rank Clearance: {clearance} \
         User's Location: {location}. \
         Ship Systems Status: {snapshot_json}. \
         Current Mission Directive: {directive} \
         Your response MUST be a single, valid JSON object with at least two keys: 'updates' \
         (a dictionary of system names to new integer values) and 'response' (a string for TTS). \
         Crucially, if the user satisfies the current mission success criteria, you must include \
         a key 'mission_success': true in the JSON object. Do NOT mention this key in the TTS \
         response."
    )
}

/// Deterministic stand-in when no completion endpoint is reachable. Emits
/// the same JSON shape a real model is asked for.
fn mock_content(text: &str, snapshot: &BTreeMap<String, i64>) -> String {
    let response = if text.contains("damage") || text.contains("report") {
        let shields = snapshot.get("shields").copied().unwrap_or(0);
        format!("Damage report: Shields at {shields}%. Radiation levels nominal.")
    } else if text.contains("scan") {
        "Sensors indicate no immediate threats in this sector.".to_string()
    } else if text.contains("beam") || text.contains("transport") {
        "Transporter room reports ready for transport.".to_string()
    } else {
        let sum = text.bytes().map(|b| b as usize).sum::<usize>();
        FILLER_RESPONSES[sum % FILLER_RESPONSES.len()].to_string()
    };
    serde_json::json!({ "updates": {}, "response": response }).to_string()
}

/// Best-effort extraction of a JSON value from free-form model output:
/// direct parse first, then the greedy first-`{`..last-`}` span.
pub fn extract_json_value(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(v);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&raw[start..=end]).ok()
}

/// Code-fence markers stripped for the raw-text fallback.
pub fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Turn raw model output into a reply, applying the defaulting rules:
/// no JSON anywhere -> the whole output is the spoken response; a non-object
/// value -> stringified response; missing keys get defaults. A present but
/// malformed `updates` map is a validation error, not a fallback.
pub fn extract_reply(raw: &str) -> Result<ModelReply, GatewayError> {
    let Some(value) = extract_json_value(raw) else {
        return Ok(ModelReply {
            response: strip_fences(raw),
            ..ModelReply::default()
        });
    };

    let Value::Object(map) = value else {
        let response = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Ok(ModelReply {
            response,
            ..ModelReply::default()
        });
    };

    let mission_success = map
        .get("mission_success")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let response = match map.get("response") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => DEFAULT_RESPONSE.to_string(),
    };

    let mut updates = BTreeMap::new();
    match map.get("updates") {
        None | Some(Value::Null) => {}
        Some(Value::Object(u)) => {
            for (k, v) in u {
                if k == "rank_up" {
                    continue;
                }
                updates.insert(k.clone(), coerce_int(v)?);
            }
        }
        Some(_) => return Err(GatewayError::Decode("updates is not an object")),
    }

    Ok(ModelReply {
        updates,
        response,
        mission_success,
    })
}

fn coerce_int(v: &Value) -> Result<i64, GatewayError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or(GatewayError::Decode("update value out of range")),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .ok_or(GatewayError::Decode("update value is not numeric"))
        }
        Value::Bool(b) => Ok(*b as i64),
        _ => Err(GatewayError::Decode("update value is not numeric")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_json_parses_directly() {
        let r = extract_reply(r#"{"updates": {"shields": 50}, "response": "Shields raised."}"#)
            .unwrap();
        assert_eq!(r.response, "Shields raised.");
        assert_eq!(r.updates.get("shields"), Some(&50));
        assert!(!r.mission_success);
    }

    #[test]
    fn fenced_json_parses_via_span() {
        let r = extract_reply("```json\n{\"updates\": {}, \"response\": \"X\"}\n```").unwrap();
        assert_eq!(r.response, "X");
        assert!(r.updates.is_empty());
    }

    #[test]
    fn mixed_content_parses_via_span() {
        let r = extract_reply("Here: {\"updates\": {}, \"response\": \"Y\"} done").unwrap();
        assert_eq!(r.response, "Y");
    }

    #[test]
    fn plain_text_falls_back_to_response() {
        let r = extract_reply("plain text").unwrap();
        assert_eq!(r.response, "plain text");
        assert!(r.updates.is_empty());
    }

    #[test]
    fn truncated_json_falls_back_to_raw_text() {
        let raw = r#"{"updates": {}, "response": "Cut off..."#;
        let r = extract_reply(raw).unwrap();
        assert_eq!(r.response, raw);
        assert!(r.updates.is_empty());
    }

    #[test]
    fn empty_output_yields_empty_response() {
        let r = extract_reply("").unwrap();
        assert_eq!(r.response, "");
        assert!(r.updates.is_empty());
    }

    #[test]
    fn non_object_json_is_stringified() {
        let r = extract_reply("[1,2,3]").unwrap();
        assert_eq!(r.response, "[1,2,3]");

        let r = extract_reply("\"just a string\"").unwrap();
        assert_eq!(r.response, "just a string");
    }

    #[test]
    fn missing_keys_get_defaults() {
        let r = extract_reply(r#"{"updates": {"warp": 90}}"#).unwrap();
        assert_eq!(r.response, DEFAULT_RESPONSE);

        let r = extract_reply(r#"{"response": "ok"}"#).unwrap();
        assert!(r.updates.is_empty());
    }

    #[test]
    fn mission_success_and_rank_up_handling() {
        let r = extract_reply(
            r#"{"updates": {"rank_up": "ignored", "shields": 10}, "response": "ok", "mission_success": true}"#,
        )
        .unwrap();
        assert!(r.mission_success);
        assert_eq!(r.updates.len(), 1);
        assert_eq!(r.updates.get("shields"), Some(&10));
    }

    #[test]
    fn numeric_strings_coerce_and_junk_errors() {
        let r = extract_reply(r#"{"updates": {"shields": "75"}, "response": "ok"}"#).unwrap();
        assert_eq!(r.updates.get("shields"), Some(&75));

        assert!(extract_reply(r#"{"updates": {"shields": "lots"}, "response": "ok"}"#).is_err());
        assert!(extract_reply(r#"{"updates": [1,2], "response": "ok"}"#).is_err());
    }

    #[test]
    fn mock_is_deterministic_and_reads_shields() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("shields".to_string(), 42);
        let a = mock_content("damage report", &snapshot);
        assert!(a.contains("Shields at 42%"));
        assert_eq!(a, mock_content("damage report", &snapshot));

        let b = mock_content("do something odd", &snapshot);
        let r = extract_reply(&b).unwrap();
        assert!(FILLER_RESPONSES.contains(&r.response.as_str()));
    }

    #[test]
    fn url_normalization() {
        assert_eq!(
            normalize_url("http://localhost:8000"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            normalize_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            normalize_url("http://host/v1/chat/completions"),
            "http://host/v1/chat/completions"
        );
    }
}
