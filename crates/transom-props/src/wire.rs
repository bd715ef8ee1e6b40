//! Wire form for props crossing the window boundary. Plain JSON values
//! travel as themselves; callback props travel as markers naming the bus
//! endpoint the child can invoke them through. Window-valued props have no
//! wire form and are dropped.

use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use transom_core::Result;

use crate::definition::PropSchema;
use crate::value::{PropBag, PropValue};

pub const FUNCTION_MARKER: &str = "__transom_function__";

/// Invokes a parent-side prop function from the child: `(method, name,
/// payload) -> result`. Built by the child over its bus client.
pub type RemoteCaller =
    Arc<dyn Fn(String, String, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Encodes the props the child is allowed to see. `send_to_child: false`
/// props are withheld; `same_domain` props are withheld from cross-origin
/// children; functions become markers pointing at `call_method`.
pub fn encode_props_for_child(
    schema: &PropSchema,
    props: &PropBag,
    same_domain: bool,
    call_method: &str,
) -> Value {
    let mut out = Map::new();

    for (name, value) in props.iter() {
        if let Some(def) = schema.get(name) {
            if !def.send_to_child {
                continue;
            }
            if def.same_domain && !same_domain {
                continue;
            }
        }

        match value {
            PropValue::Json(json) => {
                out.insert(name.to_string(), json.clone());
            }
            PropValue::Function(_) => {
                out.insert(
                    name.to_string(),
                    json!({ FUNCTION_MARKER: { "method": call_method, "name": name } }),
                );
            }
            PropValue::Window(window) => {
                tracing::debug!(prop = name, window = %window.id(), "window prop has no wire form, dropping");
            }
        }
    }

    Value::Object(out)
}

/// Decodes a parent-sent props object. Function markers become callbacks
/// that route through `caller`; everything else is taken as plain JSON.
pub fn decode_props_from_parent(value: &Value, caller: &RemoteCaller) -> PropBag {
    let mut bag = PropBag::new();
    let Some(map) = value.as_object() else {
        return bag;
    };

    for (name, value) in map {
        match decode_function_marker(value) {
            Some((method, remote_name)) => {
                let caller = caller.clone();
                bag.set(
                    name.clone(),
                    PropValue::Function(crate::function::PropFunction::new(move |payload| {
                        caller(method.clone(), remote_name.clone(), payload)
                    })),
                );
            }
            None => bag.set(name.clone(), PropValue::Json(value.clone())),
        }
    }

    bag
}

fn decode_function_marker(value: &Value) -> Option<(String, String)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let marker = map.get(FUNCTION_MARKER)?;
    let method = marker.get("method")?.as_str()?.to_string();
    let name = marker.get("name")?.as_str()?.to_string();
    Some((method, name))
}

/// Parent-side dispatch for an inbound prop-function call.
pub async fn dispatch_prop_call(props: &PropBag, name: &str, payload: Value) -> Result<Value> {
    match props.get(name).and_then(PropValue::as_function) {
        Some(function) => function.call(payload).await,
        None => Err(transom_core::TransomError::other(format!(
            "no invocable prop '{name}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::PropDefinition;
    use crate::function::PropFunction;
    use crate::value::PropKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bag(entries: &[(&str, PropValue)]) -> PropBag {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn withholds_parent_only_and_cross_origin_props() {
        let mut schema = PropSchema::new();
        schema.define(
            "local_only",
            PropDefinition {
                send_to_child: false,
                ..PropDefinition::optional(PropKind::String)
            },
        );
        schema.define(
            "secret",
            PropDefinition {
                same_domain: true,
                ..PropDefinition::optional(PropKind::String)
            },
        );
        schema.define("open", PropDefinition::optional(PropKind::String));

        let props = bag(&[
            ("local_only", PropValue::from("a")),
            ("secret", PropValue::from("b")),
            ("open", PropValue::from("c")),
        ]);

        let cross = encode_props_for_child(&schema, &props, false, "m");
        assert!(cross.get("local_only").is_none());
        assert!(cross.get("secret").is_none());
        assert_eq!(cross.get("open"), Some(&json!("c")));

        let same = encode_props_for_child(&schema, &props, true, "m");
        assert_eq!(same.get("secret"), Some(&json!("b")));
        assert!(same.get("local_only").is_none());
    }

    #[test]
    fn functions_encode_as_markers() {
        let schema = PropSchema::new();
        let props = bag(&[("on_login", PropValue::Function(PropFunction::noop()))]);
        let encoded = encode_props_for_child(&schema, &props, true, "transom_prop_call_u1");
        assert_eq!(
            encoded.get("on_login").unwrap(),
            &json!({ FUNCTION_MARKER: { "method": "transom_prop_call_u1", "name": "on_login" } })
        );
    }

    #[tokio::test]
    async fn decoded_markers_route_through_the_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let caller: RemoteCaller = Arc::new(move |method, name, payload| {
            let seen = seen.clone();
            Box::pin(async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "method": method, "name": name, "payload": payload }))
            })
        });

        let wire = json!({
            "plain": 5,
            "on_login": { FUNCTION_MARKER: { "method": "m1", "name": "on_login" } },
        });
        let bag = decode_props_from_parent(&wire, &caller);

        assert_eq!(bag.get("plain").unwrap().as_f64(), Some(5.0));
        let function = bag.get("on_login").unwrap().as_function().unwrap();
        let out = function.call(json!([1])).await.unwrap();
        assert_eq!(
            out,
            json!({ "method": "m1", "name": "on_login", "payload": [1] })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ordinary_objects_are_not_mistaken_for_markers() {
        let caller: RemoteCaller = Arc::new(|_, _, _| Box::pin(async { Ok(Value::Null) }));
        let wire = json!({
            "config": { "method": "x", "name": "y" },
            "both": { FUNCTION_MARKER: {}, "extra": 1 },
        });
        let bag = decode_props_from_parent(&wire, &caller);
        assert!(bag.get("config").unwrap().as_function().is_none());
        assert!(bag.get("both").unwrap().as_function().is_none());
    }

    #[tokio::test]
    async fn dispatch_reaches_the_live_function() {
        let props = bag(&[(
            "cb",
            PropValue::Function(PropFunction::from_sync(|payload| Ok(json!([payload])))),
        )]);
        let out = dispatch_prop_call(&props, "cb", json!(2)).await.unwrap();
        assert_eq!(out, json!([2]));

        assert!(dispatch_prop_call(&props, "missing", Value::Null)
            .await
            .is_err());
    }
}
