use serde_json::Value as JsonValue;

/// Encodes JSON-typed properties to their wire text and back.
pub trait JsonCodec: Send + Sync {
    /// Encodes a structured value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded.
    fn encode(&self, value: &JsonValue) -> anyhow::Result<String>;

    /// Decodes wire text into a structured value.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid for the codec.
    fn decode(&self, text: &str) -> anyhow::Result<JsonValue>;
}

/// Compact JSON text via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn encode(&self, value: &JsonValue) -> anyhow::Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, text: &str) -> anyhow::Result<JsonValue> {
        Ok(serde_json::from_str(text)?)
    }
}
