//! The prop pipeline: a raw bag from the caller becomes the normalized
//! snapshot both sides of the window boundary agree on. Per prop, in
//! order: alias, value override, default, type check; then aliases are
//! stripped and each resolved prop is validated, decorated, and (for
//! functions) tied to its instance. `check_required` is deliberately a
//! separate pass, run on every parent-side set or update.

use transom_core::errors::PropError;

use crate::definition::{NormalizeContext, PropSchema};
use crate::function::InstanceGuard;
use crate::value::{PropBag, PropValue};

pub fn normalize_props(
    schema: &PropSchema,
    raw: &PropBag,
    state: &serde_json::Value,
    guard: Option<&InstanceGuard>,
) -> Result<PropBag, PropError> {
    let mut out = raw.clone();
    let mut alias_keys: Vec<String> = Vec::new();

    // Schema names first, then raw-only names. Unknown raw props pass
    // through untouched.
    let names: Vec<String> = schema
        .names()
        .map(str::to_string)
        .chain(
            raw.names()
                .filter(|name| schema.get(name).is_none())
                .map(str::to_string),
        )
        .collect();

    for name in &names {
        let Some(def) = schema.get(name) else {
            continue;
        };

        if let Some(alias) = &def.alias {
            if out.get(name).is_none() {
                if let Some(value) = raw.get(alias) {
                    out.set(name.clone(), value.clone());
                }
            }
            alias_keys.push(alias.clone());
        }

        if let Some(value_fn) = &def.value {
            let computed = value_fn(&NormalizeContext {
                props: &out,
                state,
            });
            match computed {
                Some(value) => out.set(name.clone(), value),
                None => {
                    out.remove(name);
                }
            }
        }

        if out.get(name).is_none() {
            if let Some(default_fn) = &def.default {
                let computed = default_fn(&NormalizeContext {
                    props: &out,
                    state,
                });
                if let Some(value) = computed {
                    out.set(name.clone(), value);
                }
            }
        }

        if let Some(value) = out.get(name) {
            if value.kind() != Some(def.kind) {
                return Err(PropError::TypeMismatch {
                    name: name.clone(),
                    expected: def.kind.as_str().to_string(),
                    found: value
                        .kind()
                        .map(|kind| kind.as_str().to_string())
                        .unwrap_or_else(|| "undefined".to_string()),
                });
            }
        }
    }

    for alias in &alias_keys {
        out.remove(alias);
    }

    let resolved: Vec<String> = out.names().map(str::to_string).collect();
    for name in &resolved {
        let Some(def) = schema.get(name) else {
            continue;
        };
        let Some(value) = out.get(name).cloned() else {
            continue;
        };

        if let Some(validate) = &def.validate {
            validate(
                &value,
                &NormalizeContext {
                    props: &out,
                    state,
                },
            )
            .map_err(|reason| PropError::Validation {
                name: name.clone(),
                reason,
            })?;
        }

        let mut value = value;
        if let Some(decorate) = &def.decorate {
            value = decorate(
                value,
                &NormalizeContext {
                    props: &out,
                    state,
                },
            );
        }

        if let (PropValue::Function(function), Some(guard)) = (&value, guard) {
            value = PropValue::Function(function.clone().guarded(name, guard.clone()));
        }

        out.set(name.clone(), value);
    }

    Ok(out)
}

/// Fails on the first schema prop that is required but unresolved.
pub fn check_required(schema: &PropSchema, props: &PropBag) -> Result<(), PropError> {
    for (name, def) in schema.iter() {
        if def.required && props.get(name).is_none() {
            return Err(PropError::Required(name.to_string()));
        }
    }
    Ok(())
}

/// Child-side normalization. Parent-sent values are taken as already
/// normalized; this pass gates `same_domain` props, applies
/// `child_decorate`, and fills alias names back in so callers can read
/// either spelling. When `is_update` is false, child decorators also run
/// for schema props the parent never sent, so they can synthesize values.
pub fn normalize_child_props(
    schema: &PropSchema,
    raw: &PropBag,
    state: &serde_json::Value,
    parent_origin: &str,
    own_origin: &str,
    is_update: bool,
) -> PropBag {
    let mut out = PropBag::new();
    let same_domain = parent_origin == own_origin;

    let names: Vec<String> = raw.names().map(str::to_string).collect();
    for name in &names {
        let def = schema.get(name);
        if let Some(def) = def {
            if def.same_domain && !same_domain {
                continue;
            }
        }

        let mut value = raw.get(name).cloned();
        if let Some(decorate) = def.and_then(|def| def.child_decorate.as_ref()) {
            value = decorate(
                value,
                &NormalizeContext {
                    props: &out,
                    state,
                },
            );
        }

        if let Some(value) = value {
            if let Some(alias) = def.and_then(|def| def.alias.clone()) {
                if out.get(&alias).is_none() {
                    out.set(alias, value.clone());
                }
            }
            out.set(name.clone(), value);
        }
    }

    if !is_update {
        for (name, def) in schema.iter() {
            if raw.get(name).is_some() || out.get(name).is_some() {
                continue;
            }
            if let Some(decorate) = &def.child_decorate {
                let value = decorate(
                    None,
                    &NormalizeContext {
                        props: &out,
                        state,
                    },
                );
                if let Some(value) = value {
                    out.set(name.to_string(), value);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{PropDefinition, PropSchema};
    use crate::function::PropFunction;
    use crate::value::PropKind;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn schema_with(name: &str, def: PropDefinition) -> PropSchema {
        let mut schema = PropSchema::new();
        schema.define(name, def);
        schema
    }

    fn raw(entries: &[(&str, PropValue)]) -> PropBag {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn passes_unknown_props_through() {
        let schema = PropSchema::new();
        let input = raw(&[("mystery", PropValue::from("kept"))]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert_eq!(out.get("mystery").unwrap().as_str(), Some("kept"));
    }

    #[test]
    fn alias_fills_the_canonical_name_and_is_stripped() {
        let schema = schema_with(
            "on_login",
            PropDefinition {
                alias: Some("onLogin".to_string()),
                ..PropDefinition::optional(PropKind::String)
            },
        );
        let input = raw(&[("onLogin", PropValue::from("cb"))]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert_eq!(out.get("on_login").unwrap().as_str(), Some("cb"));
        assert!(out.get("onLogin").is_none());
    }

    #[test]
    fn canonical_value_beats_its_alias() {
        let schema = schema_with(
            "email",
            PropDefinition {
                alias: Some("mail".to_string()),
                ..PropDefinition::optional(PropKind::String)
            },
        );
        let input = raw(&[
            ("email", PropValue::from("a@x")),
            ("mail", PropValue::from("b@x")),
        ]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert_eq!(out.get("email").unwrap().as_str(), Some("a@x"));
        assert!(out.get("mail").is_none());
    }

    #[test]
    fn value_override_beats_raw_input() {
        let schema = schema_with(
            "mode",
            PropDefinition {
                value: Some(Arc::new(|_| Some(PropValue::from("forced")))),
                ..PropDefinition::optional(PropKind::String)
            },
        );
        let input = raw(&[("mode", PropValue::from("caller"))]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert_eq!(out.get("mode").unwrap().as_str(), Some("forced"));
    }

    #[test]
    fn default_applies_only_when_undefined() {
        let schema = schema_with(
            "level",
            PropDefinition {
                default: Some(Arc::new(|_| Some(PropValue::from(3i64)))),
                ..PropDefinition::optional(PropKind::Number)
            },
        );

        let out = normalize_props(&schema, &PropBag::new(), &Value::Null, None).unwrap();
        assert_eq!(out.get("level").unwrap().as_f64(), Some(3.0));

        let input = raw(&[("level", PropValue::from(9i64))]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert_eq!(out.get("level").unwrap().as_f64(), Some(9.0));
    }

    #[test]
    fn default_sees_the_in_progress_bag() {
        let mut schema = PropSchema::new();
        schema.define(
            "base",
            PropDefinition {
                default: Some(Arc::new(|_| Some(PropValue::from(10i64)))),
                ..PropDefinition::optional(PropKind::Number)
            },
        );
        schema.define(
            "derived",
            PropDefinition {
                default: Some(Arc::new(|ctx: &NormalizeContext<'_>| {
                    let base = ctx.props.get("base")?.as_f64()?;
                    Some(PropValue::from(base * 2.0))
                })),
                ..PropDefinition::optional(PropKind::Number)
            },
        );

        let out = normalize_props(&schema, &PropBag::new(), &Value::Null, None).unwrap();
        assert_eq!(out.get("derived").unwrap().as_f64(), Some(20.0));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let mut schema = PropSchema::new();
        schema.define(
            "email",
            PropDefinition {
                alias: Some("mail".to_string()),
                ..PropDefinition::optional(PropKind::String)
            },
        );
        schema.define(
            "count",
            PropDefinition {
                default: Some(Arc::new(|_| Some(PropValue::from(1i64)))),
                ..PropDefinition::optional(PropKind::Number)
            },
        );

        let input = raw(&[("mail", PropValue::from("a@x"))]);
        let once = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        let twice = normalize_props(&schema, &once, &Value::Null, None).unwrap();

        let snapshot = |bag: &PropBag| {
            bag.iter()
                .map(|(name, value)| format!("{name}={value:?}"))
                .collect::<Vec<_>>()
        };
        assert_eq!(snapshot(&once), snapshot(&twice));
    }

    #[test]
    fn type_mismatch_names_the_prop() {
        let schema = schema_with("count", PropDefinition::optional(PropKind::Number));
        let input = raw(&[("count", PropValue::from("three"))]);
        let err = normalize_props(&schema, &input, &Value::Null, None).unwrap_err();
        match err {
            PropError::TypeMismatch {
                name,
                expected,
                found,
            } => {
                assert_eq!(name, "count");
                assert_eq!(expected, "number");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn window_values_type_check_as_objects() {
        use transom_transport::MemoryEnv;

        let env = MemoryEnv::new();
        let win = env.create_top_window("https://a.example.com");
        let handle = env.handle_for(&win, &win);

        let schema = schema_with("window", PropDefinition::optional(PropKind::Object));
        let input = raw(&[("window", PropValue::Window(handle))]);
        assert!(normalize_props(&schema, &input, &Value::Null, None).is_ok());
    }

    #[test]
    fn validation_failure_names_prop_and_reason() {
        let schema = schema_with(
            "email",
            PropDefinition {
                validate: Some(Arc::new(|value: &PropValue, _: &NormalizeContext<'_>| {
                    if value.as_str().is_some_and(|s| s.contains('@')) {
                        Ok(())
                    } else {
                        Err("missing @".to_string())
                    }
                })),
                ..PropDefinition::optional(PropKind::String)
            },
        );

        let ok = raw(&[("email", PropValue::from("a@x"))]);
        assert!(normalize_props(&schema, &ok, &Value::Null, None).is_ok());

        let bad = raw(&[("email", PropValue::from("nope"))]);
        let err = normalize_props(&schema, &bad, &Value::Null, None).unwrap_err();
        assert!(
            matches!(err, PropError::Validation { name, reason } if name == "email" && reason == "missing @")
        );
    }

    #[test]
    fn decorate_replaces_the_value() {
        let schema = schema_with(
            "name",
            PropDefinition {
                decorate: Some(Arc::new(|value: PropValue, _: &NormalizeContext<'_>| {
                    let s = value.as_str().unwrap_or_default().to_uppercase();
                    PropValue::from(s)
                })),
                ..PropDefinition::optional(PropKind::String)
            },
        );
        let input = raw(&[("name", PropValue::from("ada"))]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert_eq!(out.get("name").unwrap().as_str(), Some("ADA"));
    }

    #[tokio::test]
    async fn functions_are_bound_to_the_guard() {
        let schema = schema_with("on_login", PropDefinition::optional(PropKind::Function));
        let input = raw(&[(
            "on_login",
            PropValue::Function(PropFunction::from_sync(|_| Ok(json!("called")))),
        )]);

        let guard = InstanceGuard::new();
        let out = normalize_props(&schema, &input, &Value::Null, Some(&guard)).unwrap();
        let function = out.get("on_login").unwrap().as_function().unwrap().clone();

        assert_eq!(function.call(Value::Null).await.unwrap(), json!("called"));
        guard.revoke();
        assert!(function.call(Value::Null).await.is_err());
    }

    #[test]
    fn required_check_is_separate_and_names_the_prop() {
        let schema = schema_with("token", PropDefinition::new(PropKind::String));

        // Normalization itself does not enforce presence.
        let out = normalize_props(&schema, &PropBag::new(), &Value::Null, None).unwrap();
        let err = check_required(&schema, &out).unwrap_err();
        assert!(matches!(err, PropError::Required(name) if name == "token"));

        let input = raw(&[("token", PropValue::from("t"))]);
        let out = normalize_props(&schema, &input, &Value::Null, None).unwrap();
        assert!(check_required(&schema, &out).is_ok());
    }

    #[test]
    fn child_props_fill_aliases_back_in() {
        let schema = schema_with(
            "on_login",
            PropDefinition {
                alias: Some("onLogin".to_string()),
                ..PropDefinition::optional(PropKind::String)
            },
        );
        let sent = raw(&[("on_login", PropValue::from("cb"))]);
        let out = normalize_child_props(
            &schema,
            &sent,
            &Value::Null,
            "https://parent.example.com",
            "https://child.example.com",
            false,
        );
        assert_eq!(out.get("on_login").unwrap().as_str(), Some("cb"));
        assert_eq!(out.get("onLogin").unwrap().as_str(), Some("cb"));
    }

    #[test]
    fn same_domain_props_are_gated_on_origin() {
        let schema = schema_with(
            "secret",
            PropDefinition {
                same_domain: true,
                ..PropDefinition::optional(PropKind::String)
            },
        );
        let sent = raw(&[("secret", PropValue::from("s"))]);

        let cross = normalize_child_props(
            &schema,
            &sent,
            &Value::Null,
            "https://parent.example.com",
            "https://child.example.com",
            false,
        );
        assert!(cross.get("secret").is_none());

        let same = normalize_child_props(
            &schema,
            &sent,
            &Value::Null,
            "https://parent.example.com",
            "https://parent.example.com",
            false,
        );
        assert_eq!(same.get("secret").unwrap().as_str(), Some("s"));
    }

    #[test]
    fn child_decorate_can_synthesize_initial_values() {
        let schema = schema_with(
            "greeting",
            PropDefinition {
                child_decorate: Some(Arc::new(
                    |value: Option<PropValue>, _: &NormalizeContext<'_>| {
                        Some(value.unwrap_or_else(|| PropValue::from("hello")))
                    },
                )),
                ..PropDefinition::optional(PropKind::String)
            },
        );

        let initial =
            normalize_child_props(&schema, &PropBag::new(), &Value::Null, "a", "a", false);
        assert_eq!(initial.get("greeting").unwrap().as_str(), Some("hello"));

        // Updates are partial: nothing is synthesized.
        let update = normalize_child_props(&schema, &PropBag::new(), &Value::Null, "a", "a", true);
        assert!(update.get("greeting").is_none());
    }
}
