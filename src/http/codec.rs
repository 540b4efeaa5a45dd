//! Serializer registry.
//!
//! Maps MIME types to codecs. Handlers reach it through the request context
//! (`ctx.decode_body()`, `ctx.encode(..)`); the pipeline itself never
//! serializes payloads.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain";

/// Error raised by a codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no codec registered for `{0}`")]
    Unsupported(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Encodes and decodes payloads of one MIME type.
pub trait Codec: Send + Sync + 'static {
    fn mime(&self) -> &'static str;
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn mime(&self) -> &'static str {
        APPLICATION_JSON
    }

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

/// Treats the payload as a single UTF-8 string.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn mime(&self) -> &'static str {
        TEXT_PLAIN
    }

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        Ok(match value {
            Value::String(s) => Bytes::from(s.clone()),
            other => Bytes::from(other.to_string()),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

/// MIME type → codec.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    fallback: String,
}

impl CodecRegistry {
    /// Empty registry; `fallback` is used when a request has no content type.
    pub fn empty(fallback: &str) -> Self {
        Self {
            codecs: HashMap::new(),
            fallback: essence(fallback),
        }
    }

    pub fn register(&mut self, codec: impl Codec) {
        self.codecs.insert(codec.mime().to_string(), Arc::new(codec));
    }

    /// Codec for a `Content-Type` value; parameters such as `charset` are ignored.
    pub fn get(&self, content_type: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(&essence(content_type))
    }

    /// Codec for an optional content type, falling back to the default.
    pub fn resolve(&self, content_type: Option<&str>) -> Result<&Arc<dyn Codec>, CodecError> {
        let mime = content_type.unwrap_or(&self.fallback);
        self.get(mime)
            .ok_or_else(|| CodecError::Unsupported(essence(mime)))
    }

    pub fn mimes(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty(APPLICATION_JSON);
        registry.register(JsonCodec);
        registry.register(TextCodec);
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("mimes", &self.codecs.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback)
            .finish()
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_ignores_parameters_and_case() {
        let registry = CodecRegistry::default();
        assert!(registry.get("Application/JSON; charset=utf-8").is_some());
        assert!(registry.get("text/plain").is_some());
        assert!(registry.get("application/xml").is_none());
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.resolve(None).unwrap().mime(), APPLICATION_JSON);
        assert!(matches!(
            registry.resolve(Some("application/xml")),
            Err(CodecError::Unsupported(m)) if m == "application/xml"
        ));
    }

    #[test]
    fn json_codec_decodes_and_rejects_garbage() {
        let codec = JsonCodec;
        assert_eq!(codec.decode(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(codec.decode(b"{nope"), Err(CodecError::Malformed(_))));
        assert_eq!(codec.encode(&json!([1, 2])).unwrap().as_ref(), b"[1,2]");
    }

    #[test]
    fn text_codec_keeps_strings_raw() {
        let codec = TextCodec;
        assert_eq!(codec.encode(&json!("hi")).unwrap().as_ref(), b"hi");
        assert_eq!(codec.decode(b"hi").unwrap(), json!("hi"));
        assert!(codec.decode(&[0xff, 0xfe]).is_err());
    }
}
