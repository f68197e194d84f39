//! Handler sets and their registry.
//!
//! A handler set is a named collection of procedures registered with explicit
//! parameter descriptors (the binder consumes descriptors uniformly instead
//! of reflecting over callables). Sets are registered against the directory
//! they belong to under the script root and resolved by `(directory, name)`.

use crate::binder::{BoundArguments, ParameterDescriptor};
use crate::path::normalize_path;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// What a procedure call returns: a JSON-representable result or an opaque
/// handler failure.
pub type ProcedureResult = Result<Value, Box<dyn std::error::Error + Send + Sync>>;

pub type ProcedureFuture = Pin<Box<dyn Future<Output = ProcedureResult> + Send>>;

type ProcedureFn = Arc<dyn Fn(BoundArguments) -> ProcedureFuture + Send + Sync>;

/// A registered callable with its declared parameter signature.
#[derive(Clone)]
pub struct Procedure {
    params: Arc<[ParameterDescriptor]>,
    call: ProcedureFn,
}

impl Procedure {
    pub fn new<F, Fut>(params: Vec<ParameterDescriptor>, call: F) -> Self
    where
        F: Fn(BoundArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult> + Send + 'static,
    {
        Self {
            params: params.into(),
            call: Arc::new(move |args| Box::pin(call(args))),
        }
    }

    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    pub fn call(&self, args: BoundArguments) -> ProcedureFuture {
        (self.call)(args)
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// An entry of a handler set: a procedure, or a plain value (the counterpart
/// of a module-level constant). Invoking a plain value is not-a-procedure.
#[derive(Clone, Debug)]
pub enum HandlerEntry {
    Procedure(Procedure),
    Value(Value),
}

/// A named collection of procedures resolved by `(directory, name)`.
#[derive(Clone, Debug)]
pub struct HandlerSet {
    name: String,
    entries: HashMap<String, HandlerEntry>,
}

impl HandlerSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Registers a procedure with its parameter descriptors.
    pub fn procedure<F, Fut>(
        mut self,
        name: impl Into<String>,
        params: Vec<ParameterDescriptor>,
        call: F,
    ) -> Self
    where
        F: Fn(BoundArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult> + Send + 'static,
    {
        self.entries
            .insert(name.into(), HandlerEntry::Procedure(Procedure::new(params, call)));
        self
    }

    /// Registers a plain (non-callable) value.
    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.insert(name.into(), HandlerEntry::Value(value));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.get(name)
    }
}

/// Registry of handler sets, keyed by their normalized absolute directory and
/// set name.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    root: PathBuf,
    sets: HashMap<(PathBuf, String), Arc<HandlerSet>>,
}

impl HandlerRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = crate::path::absolutize(&root).unwrap_or_else(|_| normalize_path(&root));
        Self {
            root,
            sets: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers a handler set under a directory relative to the script root.
    pub fn register(&mut self, directory: impl AsRef<Path>, set: HandlerSet) {
        let directory = normalize_path(&self.root.join(directory.as_ref()));
        self.sets
            .insert((directory, set.name().to_string()), Arc::new(set));
    }

    /// Resolves a handler set registered under an exact absolute directory.
    pub fn resolve(&self, directory: &Path, name: &str) -> Option<Arc<HandlerSet>> {
        self.sets
            .get(&(normalize_path(directory), name.to_string()))
            .cloned()
    }
}
