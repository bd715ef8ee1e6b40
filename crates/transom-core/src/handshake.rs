//! Window-name handshake. The parent encodes everything the child needs to
//! find it into the child window's name before navigation; the child decodes
//! it once at bootstrap. Both sides must agree on this format exactly.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PayloadError;
use crate::types::RenderContext;

pub const PAYLOAD_VERSION: u32 = 1;

const NAME_PREFIX: &str = "__transom__";
const NAME_SUFFIX: &str = "__";

/// How the child should locate its parent window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowRef {
    /// `window.opener` (popups).
    Opener,
    /// The top window of this frame tree.
    Top,
    /// The ancestor `distance` levels above the top-most child, counted from
    /// the top window down.
    Parent { distance: u32 },
    /// A same-origin frame registered in the shared scope under this uid.
    Global { uid: String },
}

/// How the child should obtain its initial props.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropsRef {
    /// Props small enough to travel inline, pre-serialized.
    Raw { value: Value },
    /// Props parked in the parent's shared scope; requires same-origin
    /// access to read.
    Uid { uid: String },
}

/// Where the parent listens for the child's first call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportsRef {
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub version: u32,
    pub uid: String,
    pub tag: String,
    pub context: RenderContext,
    pub parent_domain: String,
    pub parent: WindowRef,
    pub props: PropsRef,
    pub exports: ExportsRef,
}

/// Builds `__transom__{name}__{base64(json)}__`. The standard base64
/// alphabet keeps `_` out of the encoded segment; the `__` framing relies
/// on that.
pub fn encode_window_name(
    component_name: &str,
    payload: &HandshakePayload,
) -> Result<String, PayloadError> {
    let json = serde_json::to_vec(payload)?;
    let encoded = STANDARD_NO_PAD.encode(json);
    Ok(format!("{NAME_PREFIX}{component_name}__{encoded}{NAME_SUFFIX}"))
}

pub fn is_payload_name(name: &str) -> bool {
    name.starts_with(NAME_PREFIX) && name.ends_with(NAME_SUFFIX)
}

pub fn decode_window_name(name: &str) -> Result<HandshakePayload, PayloadError> {
    let body = name
        .strip_prefix(NAME_PREFIX)
        .and_then(|rest| rest.strip_suffix(NAME_SUFFIX))
        .ok_or(PayloadError::NotAPayload)?;
    let (_, encoded) = body.rsplit_once("__").ok_or(PayloadError::NotAPayload)?;
    let json = STANDARD_NO_PAD.decode(encoded)?;
    let payload: HandshakePayload = serde_json::from_slice(&json)?;
    if payload.version != PAYLOAD_VERSION {
        return Err(PayloadError::UnsupportedVersion(payload.version));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> HandshakePayload {
        HandshakePayload {
            version: PAYLOAD_VERSION,
            uid: "uid-1".into(),
            tag: "test-component".into(),
            context: RenderContext::Iframe,
            parent_domain: "https://parent.example.com".into(),
            parent: WindowRef::Parent { distance: 1 },
            props: PropsRef::Uid { uid: "props-1".into() },
            exports: ExportsRef {
                endpoint: "transom_xports_uid-1".into(),
            },
        }
    }

    #[test]
    fn roundtrip() {
        let payload = sample_payload();
        let name = encode_window_name("test_component", &payload).unwrap();
        assert!(name.starts_with("__transom__test_component__"));
        assert!(name.ends_with("__"));
        assert!(is_payload_name(&name));

        let decoded = decode_window_name(&name).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn component_name_with_inner_double_underscore() {
        // tag "a--b" becomes name "a__b"; the framing must still parse.
        let mut payload = sample_payload();
        payload.tag = "a--b".into();
        let name = encode_window_name("a__b", &payload).unwrap();
        let decoded = decode_window_name(&name).unwrap();
        assert_eq!(decoded.tag, "a--b");
    }

    #[test]
    fn rejects_plain_window_names() {
        assert!(!is_payload_name("my-window"));
        assert!(matches!(
            decode_window_name("my-window"),
            Err(PayloadError::NotAPayload)
        ));
        assert!(matches!(
            decode_window_name(""),
            Err(PayloadError::NotAPayload)
        ));
        assert!(matches!(
            decode_window_name("__transom__nopayload"),
            Err(PayloadError::NotAPayload)
        ));
    }

    #[test]
    fn rejects_corrupt_base64() {
        let name = "__transom__comp__!!!not-base64!!!__";
        assert!(matches!(
            decode_window_name(name),
            Err(PayloadError::Base64(_))
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut payload = sample_payload();
        payload.version = 99;
        let name = encode_window_name("test_component", &payload).unwrap();
        assert!(matches!(
            decode_window_name(&name),
            Err(PayloadError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn window_ref_wire_form() {
        let json = serde_json::to_string(&WindowRef::Parent { distance: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"parent","distance":2}"#);

        let json = serde_json::to_string(&WindowRef::Opener).unwrap();
        assert_eq!(json, r#"{"type":"opener"}"#);

        let parsed: WindowRef = serde_json::from_str(r#"{"type":"global","uid":"g1"}"#).unwrap();
        assert_eq!(parsed, WindowRef::Global { uid: "g1".into() });
    }

    #[test]
    fn props_ref_wire_form() {
        let raw = PropsRef::Raw {
            value: serde_json::json!({"amount": 10}),
        };
        let json = serde_json::to_string(&raw).unwrap();
        assert_eq!(json, r#"{"type":"raw","value":{"amount":10}}"#);

        let parsed: PropsRef = serde_json::from_str(r#"{"type":"uid","uid":"p1"}"#).unwrap();
        assert_eq!(parsed, PropsRef::Uid { uid: "p1".into() });
    }
}
