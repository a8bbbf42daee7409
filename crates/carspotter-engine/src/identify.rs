use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::util::{first_non_empty_env, non_empty_env, response_json_or_error};

pub const GEMINI_DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const PLAIN_INSTRUCTION: &str = "You are a car recognition expert. Respond ONLY with \
'YEAR, MAKE, MODEL, COLOR' where COLOR is the car's paint as a hex code like #1a2b3c. \
No other text.";

const BOXED_INSTRUCTION: &str = "You are a car recognition expert. Respond ONLY with \
'(YEAR, MAKE, MODEL, COLOR), (X1, Y1, X2, Y2)' where COLOR is the car's paint as a hex \
code like #1a2b3c and X1, Y1, X2, Y2 are integer pixel coordinates of the top-left and \
bottom-right corners of the car. No other text.";

pub fn identification_instruction(want_bbox: bool) -> &'static str {
    if want_bbox {
        BOXED_INSTRUCTION
    } else {
        PLAIN_INSTRUCTION
    }
}

/// Vision model returning its raw reply for one photographed vehicle.
pub trait VehicleIdentifier: Send + Sync {
    fn name(&self) -> &str;
    fn identify(&self, image: &[u8], want_bbox: bool) -> Result<String>;
}

#[derive(Default)]
pub struct IdentifierRegistry {
    identifiers: BTreeMap<String, Box<dyn VehicleIdentifier>>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I: VehicleIdentifier + 'static>(&mut self, identifier: I) {
        self.identifiers
            .insert(identifier.name().to_string(), Box::new(identifier));
    }

    pub fn get(&self, name: &str) -> Option<&dyn VehicleIdentifier> {
        self.identifiers.get(name).map(|identifier| identifier.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn VehicleIdentifier>> {
        self.identifiers.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.identifiers.keys().cloned().collect()
    }
}

pub fn default_identifier_registry(vision_model: &str) -> IdentifierRegistry {
    let mut registry = IdentifierRegistry::new();
    registry.register(DryrunIdentifier::default());
    registry.register(GeminiIdentifier::new(vision_model));
    registry
}

/// Offline identifier with canned replies.
#[derive(Debug, Clone)]
pub struct DryrunIdentifier {
    plain_reply: String,
    boxed_reply: String,
}

impl Default for DryrunIdentifier {
    fn default() -> Self {
        Self {
            plain_reply: "2023, Tesla, Model S, #000000".to_string(),
            boxed_reply: "(2023, Tesla, Model S, #000000), (10, 20, 300, 250)".to_string(),
        }
    }
}

impl DryrunIdentifier {
    /// Same reply whether or not a box was requested.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            plain_reply: reply.clone(),
            boxed_reply: reply,
        }
    }
}

impl VehicleIdentifier for DryrunIdentifier {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn identify(&self, image: &[u8], want_bbox: bool) -> Result<String> {
        if image.is_empty() {
            bail!("dryrun identifier received an empty image");
        }
        if want_bbox {
            Ok(self.boxed_reply.clone())
        } else {
            Ok(self.plain_reply.clone())
        }
    }
}

pub struct GeminiIdentifier {
    api_base: String,
    model: String,
    http: HttpClient,
}

impl GeminiIdentifier {
    pub fn new(model: &str) -> Self {
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| GEMINI_DEFAULT_API_BASE.to_string()),
            model: model.trim().to_string(),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        first_non_empty_env(&["GEMINI_API_KEY", "GOOGLE_AI_API", "GOOGLE_API_KEY"])
    }

    fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn request_payload(image: &[u8], want_bbox: bool) -> Value {
        let mime = image::guess_format(image)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/jpeg");
        let prompt = if want_bbox {
            "Identify this car and locate it in format: '(YEAR, MAKE, MODEL, COLOR), (X1, Y1, X2, Y2)'"
        } else {
            "Identify this car in format: 'YEAR, MAKE, MODEL, COLOR'"
        };
        json!({
            "systemInstruction": {
                "parts": [{"text": identification_instruction(want_bbox)}],
            },
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": prompt},
                    {"inlineData": {"mimeType": mime, "data": BASE64.encode(image)}},
                ],
            }],
        })
    }
}

impl VehicleIdentifier for GeminiIdentifier {
    fn name(&self) -> &str {
        "gemini"
    }

    fn identify(&self, image: &[u8], want_bbox: bool) -> Result<String> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_AI_API or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .timeout(Duration::from_secs(60))
            .json(&Self::request_payload(image, want_bbox))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error("gemini", response)?;
        let text = extract_candidate_text(&payload);
        if text.is_empty() {
            bail!("Gemini returned no text for model {}", self.model);
        }
        Ok(text)
    }
}

fn extract_candidate_text(payload: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for candidate in candidates {
        let rows = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in rows {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    parts.push(text.trim().to_string());
                }
            }
        }
        if !parts.is_empty() {
            break;
        }
    }
    parts.join("\n").trim().to_string()
}
