//! Props every component carries without declaring them. None are
//! required; only `on_error` crosses to the child. Lifecycle callbacks
//! default to no-ops so parent code can always invoke them, and the
//! at-most-once guarantees for `on_close` / `on_error` / `on_display`
//! live here as decorators rather than in call sites.

use std::sync::Arc;

use transom_props::{PropDefinition, PropFunction, PropKind, PropSchema, PropValue};

fn noop_default() -> Option<PropValue> {
    Some(PropValue::Function(PropFunction::noop()))
}

fn decorate_once(value: PropValue) -> PropValue {
    match value {
        PropValue::Function(function) => PropValue::Function(function.once()),
        other => other,
    }
}

pub fn builtin_props() -> PropSchema {
    let mut schema = PropSchema::new();

    schema.define(
        "window",
        PropDefinition {
            send_to_child: false,
            allow_delegate: true,
            validate: Some(Arc::new(|value, _| {
                if value.as_window().is_some() {
                    Ok(())
                } else {
                    Err("expected a window handle".to_string())
                }
            })),
            ..PropDefinition::optional(PropKind::Object)
        },
    );

    schema.define(
        "timeout",
        PropDefinition {
            send_to_child: false,
            ..PropDefinition::optional(PropKind::Number)
        },
    );

    schema.define(
        "on_display",
        PropDefinition {
            send_to_child: false,
            allow_delegate: true,
            default: Some(Arc::new(|_| noop_default())),
            decorate: Some(Arc::new(|value, _| match value {
                PropValue::Function(function) => PropValue::Function(function.memoized()),
                other => other,
            })),
            ..PropDefinition::optional(PropKind::Function)
        },
    );

    schema.define(
        "on_render",
        PropDefinition {
            send_to_child: false,
            default: Some(Arc::new(|_| noop_default())),
            ..PropDefinition::optional(PropKind::Function)
        },
    );

    schema.define(
        "on_rendered",
        PropDefinition {
            send_to_child: false,
            default: Some(Arc::new(|_| noop_default())),
            ..PropDefinition::optional(PropKind::Function)
        },
    );

    schema.define(
        "on_close",
        PropDefinition {
            send_to_child: false,
            allow_delegate: true,
            default: Some(Arc::new(|_| noop_default())),
            decorate: Some(Arc::new(|value, _| decorate_once(value))),
            ..PropDefinition::optional(PropKind::Function)
        },
    );

    // No default: with no handler, a failed render simply rejects.
    schema.define(
        "on_error",
        PropDefinition {
            decorate: Some(Arc::new(|value, _| decorate_once(value))),
            ..PropDefinition::optional(PropKind::Function)
        },
    );

    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transom_props::{normalize_props, PropBag};

    #[test]
    fn every_builtin_is_optional() {
        let schema = builtin_props();
        for (name, def) in schema.iter() {
            assert!(!def.required, "{name} should be optional");
        }
    }

    #[test]
    fn only_on_error_reaches_the_child() {
        let schema = builtin_props();
        for (name, def) in schema.iter() {
            assert_eq!(def.send_to_child, name == "on_error", "{name}");
        }
    }

    #[tokio::test]
    async fn lifecycle_callbacks_default_to_noops() {
        let schema = builtin_props();
        let out = normalize_props(&schema, &PropBag::new(), &Value::Null, None).unwrap();

        for name in ["on_display", "on_render", "on_rendered", "on_close"] {
            let function = out
                .get(name)
                .and_then(PropValue::as_function)
                .unwrap_or_else(|| panic!("{name} should default"));
            assert_eq!(function.call(Value::Null).await.unwrap(), Value::Null);
        }
        assert!(out.get("on_error").is_none());
        assert!(out.get("timeout").is_none());
    }

    #[tokio::test]
    async fn on_close_fires_at_most_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let raw: PropBag = [(
            "on_close".to_string(),
            PropValue::Function(PropFunction::new(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(true))
                }
            })),
        )]
        .into_iter()
        .collect();

        let out = normalize_props(&builtin_props(), &raw, &Value::Null, None).unwrap();
        let on_close = out.get("on_close").unwrap().as_function().unwrap();
        on_close.call(json!("parent_call")).await.unwrap();
        on_close.call(json!("parent_call")).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_display_is_memoized() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let raw: PropBag = [(
            "on_display".to_string(),
            PropValue::Function(PropFunction::new(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("shown"))
                }
            })),
        )]
        .into_iter()
        .collect();

        let out = normalize_props(&builtin_props(), &raw, &Value::Null, None).unwrap();
        let on_display = out.get("on_display").unwrap().as_function().unwrap();
        assert_eq!(on_display.call(Value::Null).await.unwrap(), json!("shown"));
        assert_eq!(on_display.call(Value::Null).await.unwrap(), json!("shown"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn window_prop_rejects_non_windows() {
        let raw: PropBag = [("window".to_string(), PropValue::from(json!({})))]
            .into_iter()
            .collect();
        assert!(normalize_props(&builtin_props(), &raw, &Value::Null, None).is_err());
    }
}
