/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Import of the protocol's JSON representation of Micheline.
//!
//! Shapes accepted: `{"int": "<decimal>"}`, `{"string": ".."}`,
//! `{"bytes": "<hex>"}`, `{"prim": "..", "args": [..], "annots": [..]}` (both
//! `args` and `annots` optional) and arrays for sequences. Anything else is a
//! [JsonParseError].

use serde_json::{Map, Value};

use super::syntax::Node;
use super::MAX_NESTING_DEPTH;
use crate::ast::annotations::Annotations;
use crate::lexer::try_ann_from_str;

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum JsonParseError {
    #[error("expected {expected}, but got {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: String,
    },
    #[error("unexpected key {key:?} in {node} node")]
    UnexpectedKey { key: String, node: &'static str },
    #[error("invalid integer literal {0:?}")]
    InvalidInt(String),
    #[error("invalid bytes literal {0:?}")]
    InvalidBytes(String),
    #[error("invalid annotation {0:?}")]
    InvalidAnnotation(String),
    #[error("expression nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

fn unexpected(expected: &'static str, found: &Value) -> JsonParseError {
    let mut found = found.to_string();
    if found.len() > 64 {
        found.truncate(61);
        found.push_str("...");
    }
    JsonParseError::UnexpectedValue { expected, found }
}

fn only_keys(
    obj: &Map<String, Value>,
    node: &'static str,
    allowed: &[&str],
) -> Result<(), JsonParseError> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(JsonParseError::UnexpectedKey {
            key: key.clone(),
            node,
        }),
        None => Ok(()),
    }
}

fn as_str<'v>(v: &'v Value, expected: &'static str) -> Result<&'v str, JsonParseError> {
    v.as_str().ok_or_else(|| unexpected(expected, v))
}

/// Convert a JSON value to a raw syntax node. Nodes get empty spans.
pub fn node_from_json(value: &Value) -> Result<Node<'_>, JsonParseError> {
    from_json(value, 0)
}

fn from_json(value: &Value, depth: usize) -> Result<Node<'_>, JsonParseError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(JsonParseError::NestingTooDeep(MAX_NESTING_DEPTH));
    }
    let obj = match value {
        Value::Array(xs) => {
            return Ok(Node::Seq(
                xs.iter()
                    .map(|x| from_json(x, depth + 1))
                    .collect::<Result<_, _>>()?,
                0..0,
            ))
        }
        Value::Object(obj) => obj,
        other => return Err(unexpected("a JSON object or array", other)),
    };
    if let Some(i) = obj.get("int") {
        only_keys(obj, "int", &["int"])?;
        let s = as_str(i, "a decimal string")?;
        return s
            .parse()
            .map(|n| Node::Int(n, 0..0))
            .map_err(|_| JsonParseError::InvalidInt(s.to_owned()));
    }
    if let Some(s) = obj.get("string") {
        only_keys(obj, "string", &["string"])?;
        return Ok(Node::String(as_str(s, "a string")?.to_owned(), 0..0));
    }
    if let Some(b) = obj.get("bytes") {
        only_keys(obj, "bytes", &["bytes"])?;
        let s = as_str(b, "a hex string")?;
        return hex::decode(s)
            .map(|b| Node::Bytes(b, 0..0))
            .map_err(|_| JsonParseError::InvalidBytes(s.to_owned()));
    }
    let Some(prim) = obj.get("prim") else {
        return Err(unexpected(
            "an object with one of the keys int, string, bytes or prim",
            value,
        ));
    };
    only_keys(obj, "prim", &["prim", "args", "annots"])?;
    let name = as_str(prim, "a primitive name")?;
    let args = match obj.get("args") {
        None => Vec::new(),
        Some(Value::Array(xs)) => xs
            .iter()
            .map(|x| from_json(x, depth + 1))
            .collect::<Result<_, _>>()?,
        Some(other) => return Err(unexpected("an array of arguments", other)),
    };
    let anns = match obj.get("annots") {
        None => Annotations::new(),
        Some(Value::Array(xs)) => xs
            .iter()
            .map(|x| {
                let s = as_str(x, "an annotation string")?;
                try_ann_from_str(s).ok_or_else(|| JsonParseError::InvalidAnnotation(s.to_owned()))
            })
            .collect::<Result<_, _>>()?,
        Some(other) => return Err(unexpected("an array of annotations", other)),
    };
    Ok(Node::App {
        name,
        args,
        anns,
        span: 0..0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shapes() {
        let v = json!({"prim": "PUSH", "args": [{"prim": "int"}, {"int": "-5"}], "annots": ["@x"]});
        let Node::App { name, args, anns, .. } = node_from_json(&v).unwrap() else {
            panic!("expected application")
        };
        assert_eq!(name, "PUSH");
        assert_eq!(args[1], Node::Int((-5).into(), 0..0));
        assert_eq!(anns.to_string(), "@x");
        assert_eq!(
            node_from_json(&json!([{"bytes": "00ff"}, {"string": "a"}])).unwrap(),
            Node::Seq(
                vec![
                    Node::Bytes(vec![0, 0xff], 0..0),
                    Node::String("a".to_owned(), 0..0)
                ],
                0..0
            )
        );
    }

    #[test]
    fn malformed() {
        assert_eq!(
            node_from_json(&json!({"int": "1x"})),
            Err(JsonParseError::InvalidInt("1x".to_owned()))
        );
        assert_eq!(
            node_from_json(&json!({"int": 1})),
            Err(JsonParseError::UnexpectedValue {
                expected: "a decimal string",
                found: "1".to_owned()
            })
        );
        assert_eq!(
            node_from_json(&json!({"bytes": "abc"})),
            Err(JsonParseError::InvalidBytes("abc".to_owned()))
        );
        assert_eq!(
            node_from_json(&json!({"prim": "UNIT", "extra": 1})),
            Err(JsonParseError::UnexpectedKey {
                key: "extra".to_owned(),
                node: "prim"
            })
        );
        assert_eq!(
            node_from_json(&json!({"prim": "DROP", "annots": ["x"]})),
            Err(JsonParseError::InvalidAnnotation("x".to_owned()))
        );
        assert!(matches!(
            node_from_json(&json!(42)),
            Err(JsonParseError::UnexpectedValue { .. })
        ));
        assert!(matches!(
            node_from_json(&json!({"args": []})),
            Err(JsonParseError::UnexpectedValue { .. })
        ));
    }
}
