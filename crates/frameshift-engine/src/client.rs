//! Single round-trip calls: image edits and caption suggestions.

use std::sync::Arc;

use frameshift_contracts::requests::{GeneratedAsset, GenerationRequest, TextSuggestionRequest};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::codec::{decode_inline_result, inline_mime_type, EncodedImage};
use crate::config::EngineConfig;
use crate::credentials::{Credential, CredentialSource};
use crate::error::{Result, StudioError};
use crate::transport::GenerativeTransport;

pub const SUGGESTION_SYSTEM_INSTRUCTION: &str = "You are an assistant that writes short, \
creative and striking text to be placed on an image. Your answers must contain only the \
suggested text and no other explanation.";

/// Starting points offered next to the instruction box.
pub const EXAMPLE_EDIT_INSTRUCTIONS: [&str; 4] = [
    "Add a retro, vintage filter",
    "Make it look like a watercolor painting",
    "Add a cute, smiling cat to the foreground",
    "Remove the person in the background",
];

pub struct GenerationClient {
    config: Arc<EngineConfig>,
    transport: Arc<dyn GenerativeTransport>,
    credential: Credential,
}

impl GenerationClient {
    /// Resolves the credential once; the client keeps it for its own lifetime.
    pub fn new(
        config: Arc<EngineConfig>,
        transport: Arc<dyn GenerativeTransport>,
        credentials: &dyn CredentialSource,
    ) -> Result<Self> {
        let credential = credentials.resolve_credential()?;
        Ok(Self {
            config,
            transport,
            credential,
        })
    }

    pub fn edit_image(&self, request: &GenerationRequest) -> Result<GeneratedAsset> {
        let endpoint = self
            .config
            .model_endpoint(&self.config.image_model, "generateContent");
        let image = EncodedImage::new(request.image_bytes.clone(), request.mime_type.clone());
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    image.inline_part(),
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        });

        info!(model = %self.config.image_model, bytes = request.image_bytes.len(), "requesting image edit");
        let response = self
            .transport
            .post_json("Gemini", &endpoint, &self.credential, &payload)?;

        let Some(part) = first_candidate_part(&response) else {
            warn!("image edit response had no content parts");
            return Err(StudioError::NoImageInResponse);
        };
        if !has_inline_payload(part) {
            return Err(StudioError::NoImageInResponse);
        }
        let bytes = decode_inline_result(part)?;
        if bytes.is_empty() {
            return Err(StudioError::NoImageInResponse);
        }
        Ok(GeneratedAsset::Image {
            bytes,
            mime_type: inline_mime_type(part),
        })
    }

    pub fn generate_text_suggestion(&self, request: &TextSuggestionRequest) -> Result<String> {
        let endpoint = self
            .config
            .model_endpoint(&self.config.text_model, "generateContent");
        let payload = json!({
            "systemInstruction": {
                "parts": [{ "text": SUGGESTION_SYSTEM_INSTRUCTION }],
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": compose_suggestion_prompt(request) }],
            }],
        });

        info!(model = %self.config.text_model, "requesting text suggestion");
        let response = self
            .transport
            .post_json("Gemini", &endpoint, &self.credential, &payload)?;
        normalize_suggestion(&response_text(&response))
    }
}

pub fn compose_suggestion_prompt(request: &TextSuggestionRequest) -> String {
    let mut prompt = format!(
        "A user is editing an image with this instruction: \"{}\".",
        request.instruction
    );
    if let Some(topic) = request.topic() {
        prompt.push_str(&format!(
            " The user wants the suggested text to be about \"{topic}\"."
        ));
    }
    prompt.push_str(
        " Suggest a short, eye-catching text that could be added to this image and fits these \
instructions. For example, 'Colors of the Past' for 'vintage filter'. Return only the text.",
    );
    prompt
}

/// Trims the model's answer and drops one wrapping `"` on each side.
///
/// Not a parser: escaped or nested quotes are left alone.
pub fn normalize_suggestion(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StudioError::EmptySuggestion);
    }
    let unquoted = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
    if unquoted.trim().is_empty() {
        return Err(StudioError::EmptySuggestion);
    }
    Ok(unquoted.to_string())
}

/// Folds caption text the user wants drawn onto the image into the edit instruction.
pub fn compose_edit_instruction(instruction: &str, overlay_text: Option<&str>) -> String {
    match overlay_text.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => format!(
            "{instruction}. Also, add the text \"{text}\" to the image in an aesthetic and legible way."
        ),
        None => instruction.to_string(),
    }
}

fn first_candidate_part(response: &Value) -> Option<&Value> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)
}

fn has_inline_payload(part: &Value) -> bool {
    part.get("inlineData")
        .or_else(|| part.get("inline_data"))
        .and_then(|inline| inline.get("data"))
        .and_then(Value::as_str)
        .map(|data| !data.is_empty())
        .unwrap_or(false)
}

/// Concatenated text parts of the first candidate.
fn response_text(response: &Value) -> String {
    response
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::testing::{image_response, text_response, Reply, ScriptedTransport};

    fn client_with(transport: Arc<ScriptedTransport>) -> anyhow::Result<GenerationClient> {
        let credentials = StaticCredentials::new(Some(Credential::new("test-key")?));
        Ok(GenerationClient::new(
            Arc::new(EngineConfig::default().with_api_base("https://api.test/v1beta")),
            transport,
            &credentials,
        )?)
    }

    fn hat_request() -> GenerationRequest {
        GenerationRequest::new(b"source-image".to_vec(), "image/png", "add a hat")
    }

    #[test]
    fn edit_image_returns_inline_bytes_exactly() -> anyhow::Result<()> {
        let edited = b"\x89PNG edited".to_vec();
        let transport = ScriptedTransport::new(vec![Reply::Json(image_response(&edited))]);
        let client = client_with(transport.clone())?;

        let GeneratedAsset::Image { bytes, mime_type } = client.edit_image(&hat_request())? else {
            anyhow::bail!("expected an image asset");
        };
        assert_eq!(bytes, edited);
        assert_eq!(mime_type.as_deref(), Some("image/png"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].url,
            "https://api.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(calls[0].credential.as_deref(), Some("test-key"));
        let payload = calls[0].payload.clone().unwrap_or_default();
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[1]["text"], json!("add a hat"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
        Ok(())
    }

    #[test]
    fn edit_image_without_inline_part_is_no_image() -> anyhow::Result<()> {
        for response in [
            json!({"candidates": [{"content": {"parts": [{"text": "I can't do that"}]}}]}),
            json!({"candidates": []}),
            json!({"promptFeedback": {"blockReason": "SAFETY"}}),
            json!({"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": ""}}]}}]}),
        ] {
            let transport = ScriptedTransport::new(vec![Reply::Json(response)]);
            let err = client_with(transport)?.edit_image(&hat_request()).err();
            assert!(matches!(err, Some(StudioError::NoImageInResponse)));
        }
        Ok(())
    }

    #[test]
    fn edit_image_only_reads_the_first_part() -> anyhow::Result<()> {
        let mut response = image_response(b"late-image");
        if let Some(parts) = response["candidates"][0]["content"]["parts"].as_array_mut() {
            parts.insert(0, json!({"text": "Here is your image"}));
        }
        let transport = ScriptedTransport::new(vec![Reply::Json(response)]);
        let err = client_with(transport)?.edit_image(&hat_request()).err();
        assert!(matches!(err, Some(StudioError::NoImageInResponse)));
        Ok(())
    }

    #[test]
    fn suggestion_sends_system_instruction_and_topic() -> anyhow::Result<()> {
        let transport =
            ScriptedTransport::new(vec![Reply::Json(text_response("  \"Colors of the Past\"\n"))]);
        let client = client_with(transport.clone())?;

        let request = TextSuggestionRequest::new("vintage filter", Some("travel".to_string()));
        assert_eq!(client.generate_text_suggestion(&request)?, "Colors of the Past");

        let calls = transport.calls();
        let payload = calls[0].payload.clone().unwrap_or_default();
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            json!(SUGGESTION_SYSTEM_INSTRUCTION)
        );
        let prompt = payload["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert!(prompt.contains("\"vintage filter\""));
        assert!(prompt.contains("about \"travel\""));
        assert!(calls[0].url.ends_with("models/gemini-2.5-flash:generateContent"));
        Ok(())
    }

    #[test]
    fn suggestion_with_blank_answer_fails() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(vec![Reply::Json(text_response(" \n\t "))]);
        let err = client_with(transport)?
            .generate_text_suggestion(&TextSuggestionRequest::new("blur", None))
            .err();
        assert!(matches!(err, Some(StudioError::EmptySuggestion)));
        Ok(())
    }

    #[test]
    fn prompt_omits_blank_topic() {
        let prompt =
            compose_suggestion_prompt(&TextSuggestionRequest::new("sepia", Some(" ".to_string())));
        assert!(prompt.starts_with("A user is editing an image with this instruction: \"sepia\"."));
        assert!(!prompt.contains("to be about"));
        assert!(prompt.ends_with("Return only the text."));
    }

    #[test]
    fn normalize_strips_at_most_one_quote_per_side() -> anyhow::Result<()> {
        assert_eq!(normalize_suggestion("\"Hello\"")?, "Hello");
        assert_eq!(normalize_suggestion("\"Hello\" said she\"")?, "Hello\" said she");
        assert_eq!(normalize_suggestion("\"\"Twice\"\"")?, "\"Twice\"");
        assert_eq!(normalize_suggestion("  plain  ")?, "plain");
        assert_eq!(normalize_suggestion("'single'")?, "'single'");
        assert!(matches!(
            normalize_suggestion("\""),
            Err(StudioError::EmptySuggestion)
        ));
        assert!(matches!(
            normalize_suggestion(""),
            Err(StudioError::EmptySuggestion)
        ));
        Ok(())
    }

    #[test]
    fn overlay_text_is_folded_into_instruction() {
        assert_eq!(
            compose_edit_instruction("add a hat", Some("Party Time")),
            "add a hat. Also, add the text \"Party Time\" to the image in an aesthetic and legible way."
        );
        assert_eq!(compose_edit_instruction("add a hat", Some("  ")), "add a hat");
        assert_eq!(compose_edit_instruction("add a hat", None), "add a hat");
    }
}
