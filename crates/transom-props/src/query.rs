//! Turns a normalized prop bag into query parameters for the component
//! URL. Which props appear, under which name, and in which wire form is
//! all declared on the prop definition.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde_json::Value;

use transom_core::errors::RpcError;
use transom_core::{Result, TransomError};

use crate::definition::{PropSchema, QueryParam, Serialization};
use crate::value::{PropBag, PropValue};

pub fn props_to_query(schema: &PropSchema, props: &PropBag) -> Result<Vec<(String, String)>> {
    let mut params: Vec<(String, String)> = Vec::new();

    for (name, value) in props.iter() {
        let Some(def) = schema.get(name) else {
            continue;
        };
        let param = match &def.query_param {
            QueryParam::Off => continue,
            QueryParam::Name => name.to_string(),
            QueryParam::Renamed(renamed) => renamed.clone(),
            QueryParam::Computed(compute) => compute(name, value),
        };

        let wire = match &def.query_value {
            Some(query_value) => match query_value(value) {
                Some(wire) => wire,
                None => continue,
            },
            None => match value {
                PropValue::Json(json) => json.clone(),
                // Callbacks and window handles have no query form.
                PropValue::Function(_) | PropValue::Window(_) => continue,
            },
        };

        match &wire {
            Value::Null => {}
            Value::Bool(b) => params.push((param, b.to_string())),
            Value::Number(n) => params.push((param, n.to_string())),
            Value::String(s) => params.push((param, s.clone())),
            Value::Object(_) | Value::Array(_) => match def.serialization {
                Serialization::Json => {
                    let json = serde_json::to_string(&wire)
                        .map_err(|err| RpcError::Json(err.to_string()))?;
                    params.push((param, json));
                }
                Serialization::Base64 => {
                    let json = serde_json::to_string(&wire)
                        .map_err(|err| RpcError::Json(err.to_string()))?;
                    params.push((param, STANDARD_NO_PAD.encode(json)));
                }
                Serialization::Dotify => params.extend(dotify(&wire, &param)),
            },
        }
    }

    Ok(params)
}

/// Flattens an object into dotted keys: `{a: {b: 1}}` under prefix `p`
/// becomes `p.a.b=1`. Scalar arrays are comma-joined under `key[]`; arrays
/// holding objects recurse with index segments. Null and nested function
/// values are dropped.
pub fn dotify(value: &Value, prefix: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    dotify_into(value, prefix, &mut out);
    out
}

fn dotify_into(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                dotify_entry(value, &path, out);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                let path = if prefix.is_empty() {
                    index.to_string()
                } else {
                    format!("{prefix}.{index}")
                };
                dotify_entry(value, &path, out);
            }
        }
        other => dotify_entry(other, prefix, out),
    }
}

fn dotify_entry(value: &Value, path: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((path.to_string(), b.to_string())),
        Value::Number(n) => out.push((path.to_string(), n.to_string())),
        Value::String(s) => out.push((path.to_string(), s.clone())),
        Value::Array(items)
            if !items.is_empty() && items.iter().all(|item| !item.is_object() && !item.is_array()) =>
        {
            let joined = items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.push((format!("{path}[]"), joined));
        }
        Value::Array(_) | Value::Object(_) => dotify_into(value, path, out),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merges query parameters into a URL, replacing same-named existing
/// parameters. Works for both absolute URLs and bare paths; the fragment
/// is preserved.
pub fn extend_query(url: &str, params: &[(String, String)]) -> Result<String> {
    if params.is_empty() {
        return Ok(url.to_string());
    }

    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let keep: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(key, _)| !params.iter().any(|(new_key, _)| new_key == key))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            {
                let mut pairs = parsed.query_pairs_mut();
                pairs.clear();
                pairs.extend_pairs(keep.iter());
                pairs.extend_pairs(params.iter());
            }
            Ok(parsed.to_string())
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => extend_relative(url, params),
        Err(err) => Err(TransomError::other(format!("invalid url '{url}': {err}"))),
    }
}

fn extend_relative(url: &str, params: &[(String, String)]) -> Result<String> {
    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (path, existing) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let Some(existing) = existing {
        for (key, value) in url::form_urlencoded::parse(existing.as_bytes()) {
            if !params.iter().any(|(new_key, _)| *new_key == key) {
                serializer.append_pair(&key, &value);
            }
        }
    }
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    let query = serializer.finish();

    let mut out = format!("{path}?{query}");
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    Ok(out)
}
