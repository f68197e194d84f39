//! Merging of request-body JSON and URL query parameters into argument
//! bundles.
//!
//! Arguments from the request body are dominant, query-string arguments are
//! supplementary. Only the body shape decides whether the request is a single
//! call or a bulk loop over the same procedure.

use indexmap::IndexMap;
use serde_json::Value;

/// An ordered mapping from parameter name to value, plus a distinguished
/// positional sequence (the empty-string slot of the wire format).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgumentBundle {
    named: IndexMap<String, Value>,
    positional: Vec<Value>,
}

impl ArgumentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bundle from a JSON object. Keys that are empty or blank after
    /// trimming feed the positional sequence; all others are named.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        let mut bundle = Self::new();
        for (name, value) in object {
            if name.trim().is_empty() {
                extend_or_append(&mut bundle.positional, value.clone());
            } else {
                bundle.named.insert(name.clone(), value.clone());
            }
        }
        bundle
    }

    /// Builds a bundle whose positional slot receives the given value
    /// (an array extends the sequence, anything else is appended).
    pub fn from_positional(value: Value) -> Self {
        let mut bundle = Self::new();
        extend_or_append(&mut bundle.positional, value);
        bundle
    }

    pub fn named(&self) -> &IndexMap<String, Value> {
        &self.named
    }

    /// The positional sequence. Never `None`; absence is the empty sequence.
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Sets a named value unconditionally (override semantics).
    pub fn set(&mut self, name: &str, value: Value) {
        self.named.insert(name.to_string(), value);
    }

    /// Merges one query parameter into the bundle. Body values dominate:
    /// an existing list is extended, an existing falsy scalar is replaced by
    /// a truthy value, an existing `null` is replaced by a non-`null` value,
    /// anything else keeps the body value.
    fn fill_query_value(&mut self, name: &str, value: Value) {
        let key = name.trim();
        if key.is_empty() {
            extend_or_append(&mut self.positional, value);
            return;
        }

        if !self.named.contains_key(key) {
            self.named.insert(key.to_string(), value);
            return;
        }
        if let Some(existing) = self.named.get_mut(key) {
            match existing {
                Value::Array(sequence) => extend_or_append(sequence, value),
                _ if is_truthy(&value) && !is_truthy(existing) => *existing = value,
                _ if existing.is_null() && !value.is_null() => *existing = value,
                _ => {}
            }
        }
    }
}

/// One element of a bulk argument list.
#[derive(Clone, Debug, PartialEq)]
pub enum BulkItem {
    Bundle(ArgumentBundle),
    Null,
    /// A non-object, non-null element; trips bad-bulk-element on dispatch.
    Other(Value),
}

/// Either one bundle (single call) or an ordered sequence of bundles (bulk
/// loop over one procedure).
#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentForm {
    Single(ArgumentBundle),
    Bulk(Vec<BulkItem>),
}

/// Gathers the argument information of one request: the JSON body seeds one
/// or more bundles, query parameters supplement each of them, and an
/// authorization layer can inject overrides.
#[derive(Clone, Debug)]
pub struct RequestArguments {
    items: Vec<BulkItem>,
}

impl RequestArguments {
    pub fn new(body: Option<&Value>, query: Option<&str>) -> Self {
        let mut items = seed_items(body);

        if let Some(query) = query {
            let params = collect_query_params(query);
            for item in &mut items {
                if let BulkItem::Bundle(bundle) = item {
                    for (name, values) in &params {
                        bundle.fill_query_value(name, unwrap_single(values));
                    }
                }
            }
        }

        Self { items }
    }

    /// Applies an override map: every non-blank key is set in every bundle,
    /// unconditionally. The positional slot cannot be overridden this way.
    pub fn apply_overrides(&mut self, overrides: &IndexMap<String, Value>) {
        for (name, value) in overrides {
            let key = name.trim();
            if key.is_empty() {
                continue;
            }
            for item in &mut self.items {
                if let BulkItem::Bundle(bundle) = item {
                    bundle.set(key, value.clone());
                }
            }
        }
    }

    /// Sets one key in every bundle, unconditionally.
    pub fn override_value(&mut self, key: &str, value: Value) {
        for item in &mut self.items {
            if let BulkItem::Bundle(bundle) = item {
                bundle.set(key, value.clone());
            }
        }
    }

    /// Collapses to the final argument form: a singleton bundle list is the
    /// single form, anything longer is bulk.
    pub fn into_form(mut self) -> ArgumentForm {
        if self.items.len() == 1
            && let Some(BulkItem::Bundle(_)) = self.items.first()
        {
            match self.items.pop() {
                Some(BulkItem::Bundle(bundle)) => ArgumentForm::Single(bundle),
                _ => unreachable!(),
            }
        } else {
            ArgumentForm::Bulk(self.items)
        }
    }
}

fn seed_items(body: Option<&Value>) -> Vec<BulkItem> {
    match body {
        None | Some(Value::Null) => vec![BulkItem::Bundle(ArgumentBundle::new())],
        Some(Value::Object(map)) => vec![BulkItem::Bundle(ArgumentBundle::from_object(map))],
        Some(Value::Array(elements)) => {
            let all_objects_or_null = elements
                .iter()
                .all(|e| e.is_object() || e.is_null());
            let any_object = elements.iter().any(Value::is_object);

            if all_objects_or_null && any_object {
                elements
                    .iter()
                    .map(|e| match e {
                        Value::Object(map) => BulkItem::Bundle(ArgumentBundle::from_object(map)),
                        _ => BulkItem::Null,
                    })
                    .collect()
            } else {
                // The whole array feeds the positional sequence of one call
                vec![BulkItem::Bundle(ArgumentBundle::from_positional(
                    Value::Array(elements.clone()),
                ))]
            }
        }
        Some(scalar) => vec![BulkItem::Bundle(ArgumentBundle::from_positional(
            scalar.clone(),
        ))],
    }
}

/// Groups the raw query string into multi-valued parameters, preserving
/// first-seen key order.
fn collect_query_params(query: &str) -> IndexMap<String, Vec<Value>> {
    let mut params: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(name.into_owned())
            .or_default()
            .push(parse_query_value(&value));
    }
    params
}

/// A multi-valued parameter with exactly one member is unwrapped to a scalar.
fn unwrap_single(values: &[Value]) -> Value {
    match values {
        [single] => single.clone(),
        many => Value::Array(many.to_vec()),
    }
}

/// Query values are untyped text on the wire; lex them as JSON scalars where
/// possible so `x=1` can bind an integer parameter.
fn parse_query_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Appends an item to a sequence; an array item extends it element-wise.
pub(crate) fn extend_or_append(sequence: &mut Vec<Value>, item: Value) {
    match item {
        Value::Array(elements) => sequence.extend(elements),
        other => sequence.push(other),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
