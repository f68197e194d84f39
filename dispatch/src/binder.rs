//! Binding of an argument bundle to a procedure's declared parameter
//! signature.
//!
//! Named arguments bind to declared parameters by case-sensitive name; the
//! bundle's positional sequence fills positional parameters not addressed by
//! name, in declaration order. Extra arguments are absorbed by variadic
//! parameters where declared and otherwise ignored without error.

use crate::arguments::{ArgumentBundle, extend_or_append};
use crate::errors::{DispatchError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    PositionalOnly,
    PositionalOrNamed,
    VariadicPositional,
    VariadicNamed,
    NamedOnly,
}

/// Declares one parameter of a registered procedure. Required iff it has no
/// default; variadic parameters always bind (possibly empty) collections.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: ParameterKind,
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    pub fn required(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, kind: ParameterKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Some(default),
        }
    }
}

/// The outcome of binding: one value per declared parameter, in declaration
/// order. Variadic-positional parameters bind an array, variadic-named ones
/// an object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundArguments {
    values: Vec<(String, Value)>,
}

impl BoundArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<(String, Value)> {
        self.values
    }
}

/// Binds an argument bundle to a parameter signature.
///
/// Fails with a missing-arguments error naming every required parameter that
/// ends up unbound.
pub fn bind_arguments(
    params: &[ParameterDescriptor],
    bundle: &ArgumentBundle,
) -> Result<BoundArguments> {
    let mut positional: VecDeque<Value> = bundle.positional().iter().cloned().collect();
    let mut named: IndexMap<String, Value> = bundle.named().clone();

    let mut bound: Vec<(String, Option<Value>)> = Vec::with_capacity(params.len());

    for param in params {
        let supplied = named.shift_remove(&param.name);

        match param.kind {
            ParameterKind::PositionalOnly => {
                let value = positional
                    .pop_front()
                    .or(supplied)
                    .or_else(|| param.default.clone());
                bound.push((param.name.clone(), value));
            }
            ParameterKind::PositionalOrNamed => {
                // An explicitly named argument wins; the positional queue
                // fills parameters not addressed by name
                let value = supplied
                    .or_else(|| positional.pop_front())
                    .or_else(|| param.default.clone());
                bound.push((param.name.clone(), value));
            }
            ParameterKind::VariadicPositional => {
                // A value supplied under the parameter's own name is appended
                // to the remaining positional values
                if let Some(value) = supplied.or_else(|| param.default.clone()) {
                    let mut tail = Vec::new();
                    extend_or_append(&mut tail, value);
                    positional.extend(tail);
                }
                let rest: Vec<Value> = positional.drain(..).collect();
                bound.push((param.name.clone(), Some(Value::Array(rest))));
            }
            ParameterKind::VariadicNamed => {
                let mut variadic: serde_json::Map<String, Value> = named.drain(..).collect();

                // A mapping supplied under the parameter's own name merges in
                // without overwriting anything already present
                if let Some(Value::Object(supplied)) =
                    supplied.or_else(|| param.default.clone())
                {
                    for (key, value) in supplied {
                        if key.trim().is_empty() {
                            continue;
                        }
                        variadic.entry(key).or_insert(value);
                    }
                }
                bound.push((param.name.clone(), Some(Value::Object(variadic))));
            }
            ParameterKind::NamedOnly => {
                let value = supplied.or_else(|| param.default.clone());
                bound.push((param.name.clone(), value));
            }
        }
    }

    let missing: Vec<String> = bound
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(n, _)| n.clone())
        .collect();
    if !missing.is_empty() {
        return Err(DispatchError::MissingArguments { names: missing });
    }

    Ok(BoundArguments {
        values: bound
            .into_iter()
            .map(|(n, v)| (n, v.expect("missing values were reported above")))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(body: Value) -> ArgumentBundle {
        match body {
            Value::Object(map) => ArgumentBundle::from_object(&map),
            other => panic!("test bundle must be an object, got {other:?}"),
        }
    }

    fn positional_or_named(name: &str) -> ParameterDescriptor {
        ParameterDescriptor::required(name, ParameterKind::PositionalOrNamed)
    }

    #[test]
    fn test_named_values_and_positional_tail() {
        let params = [
            positional_or_named("x"),
            positional_or_named("y"),
            ParameterDescriptor::required("pos", ParameterKind::VariadicPositional),
        ];
        let args =
            bind_arguments(&params, &bundle(json!({"x": 1, "y": "hi", "": [10, 20]}))).unwrap();

        assert_eq!(args.get("x"), Some(&json!(1)));
        assert_eq!(args.get("y"), Some(&json!("hi")));
        assert_eq!(args.get("pos"), Some(&json!([10, 20])));
    }

    #[test]
    fn test_named_wins_over_positional_queue() {
        let params = [positional_or_named("x"), positional_or_named("y")];
        let args = bind_arguments(&params, &bundle(json!({"x": 5, "": [1]}))).unwrap();
        assert_eq!(args.get("x"), Some(&json!(5)));
        assert_eq!(args.get("y"), Some(&json!(1)));
    }

    #[test]
    fn test_positional_only_consumes_queue_first() {
        let params = [ParameterDescriptor::required(
            "x",
            ParameterKind::PositionalOnly,
        )];
        let args = bind_arguments(&params, &bundle(json!({"x": 5, "": [1]}))).unwrap();
        assert_eq!(args.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_bind_by_name_when_no_positional() {
        let params = [positional_or_named("x"), positional_or_named("y")];
        let args = bind_arguments(&params, &bundle(json!({"y": 2, "x": 1}))).unwrap();

        // Declaration order is preserved in the output
        let names: Vec<&str> = args.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(args.get("x"), Some(&json!(1)));
        assert_eq!(args.get("y"), Some(&json!(2)));
    }

    #[test]
    fn test_defaults_fill_unbound_parameters() {
        let params = [
            positional_or_named("x"),
            ParameterDescriptor::with_default("y", ParameterKind::PositionalOrNamed, json!(9)),
            ParameterDescriptor::with_default("z", ParameterKind::NamedOnly, json!("dz")),
        ];
        let args = bind_arguments(&params, &bundle(json!({"x": 1}))).unwrap();
        assert_eq!(args.get("y"), Some(&json!(9)));
        assert_eq!(args.get("z"), Some(&json!("dz")));
    }

    #[test]
    fn test_missing_arguments_lists_every_unbound_name() {
        let params = [
            positional_or_named("x"),
            positional_or_named("y"),
            ParameterDescriptor::required("z", ParameterKind::NamedOnly),
        ];
        let error = bind_arguments(&params, &bundle(json!({"y": 2}))).unwrap_err();
        match error {
            DispatchError::MissingArguments { names } => {
                assert_eq!(names, vec!["x".to_string(), "z".to_string()]);
            }
            other => panic!("expected missing-arguments, got {other:?}"),
        }
    }

    #[test]
    fn test_variadic_positional_collects_remaining() {
        let params = [
            positional_or_named("x"),
            ParameterDescriptor::required("rest", ParameterKind::VariadicPositional),
        ];
        let args = bind_arguments(&params, &bundle(json!({"": [1, 2, 3]}))).unwrap();
        assert_eq!(args.get("x"), Some(&json!(1)));
        assert_eq!(args.get("rest"), Some(&json!([2, 3])));
    }

    #[test]
    fn test_variadic_positional_appends_own_name_value() {
        let params = [ParameterDescriptor::required(
            "rest",
            ParameterKind::VariadicPositional,
        )];
        let args = bind_arguments(&params, &bundle(json!({"": [1], "rest": [2, 3]}))).unwrap();
        assert_eq!(args.get("rest"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_variadic_named_takes_remaining() {
        let params = [
            positional_or_named("x"),
            ParameterDescriptor::required("kwargs", ParameterKind::VariadicNamed),
        ];
        let args = bind_arguments(&params, &bundle(json!({"x": 1, "a": 2, "b": 3}))).unwrap();
        assert_eq!(args.get("kwargs"), Some(&json!({"a": 2, "b": 3})));
    }

    #[test]
    fn test_variadic_named_merges_own_name_mapping_without_overwrite() {
        let params = [
            positional_or_named("x"),
            ParameterDescriptor::required("kwargs", ParameterKind::VariadicNamed),
        ];
        let args = bind_arguments(
            &params,
            &bundle(json!({"x": 1, "a": 2, "kwargs": {"a": 99, "x": 8, "c": 4}})),
        )
        .unwrap();

        // x stays bound to its own value; "a" keeps the direct entry; "x" and
        // "c" surface in the variadic map
        assert_eq!(args.get("x"), Some(&json!(1)));
        assert_eq!(args.get("kwargs"), Some(&json!({"a": 2, "x": 8, "c": 4})));
    }

    #[test]
    fn test_extra_named_arguments_are_ignored_without_variadic() {
        let params = [positional_or_named("x")];
        let args = bind_arguments(&params, &bundle(json!({"x": 1, "extra": 2}))).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.get("extra"), None);
    }

    #[test]
    fn test_extra_positional_arguments_are_ignored_without_variadic() {
        let params = [positional_or_named("x")];
        let args = bind_arguments(&params, &bundle(json!({"": [1, 2, 3]}))).unwrap();
        assert_eq!(args.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_name_matching_is_case_sensitive() {
        let params = [positional_or_named("x")];
        let error = bind_arguments(&params, &bundle(json!({"X": 1}))).unwrap_err();
        assert!(matches!(error, DispatchError::MissingArguments { .. }));
    }
}
