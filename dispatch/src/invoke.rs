//! Single and bulk invocation of resolved procedures.

use crate::arguments::{ArgumentBundle, ArgumentForm, BulkItem};
use crate::binder::bind_arguments;
use crate::errors::{DispatchError, Result};
use crate::handlers::{HandlerEntry, HandlerSet, Procedure};
use serde_json::Value;

/// Invokes a procedure of a handler set with the given argument form.
///
/// A single bundle yields the procedure's result verbatim. A bulk form calls
/// the procedure once per element in order and wraps the results in a list;
/// a `null` element yields `null`, any other non-object element aborts with
/// bad-bulk-element, and the first call failure aborts the remaining calls.
pub async fn invoke(set: &HandlerSet, procedure: &str, form: ArgumentForm) -> Result<Value> {
    let procedure = resolve_procedure(set, procedure)?;

    match form {
        ArgumentForm::Single(bundle) => one_call(procedure, &bundle).await,
        ArgumentForm::Bulk(items) => {
            let mut results = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    BulkItem::Bundle(bundle) => {
                        results.push(one_call(procedure, &bundle).await?);
                    }
                    BulkItem::Null => results.push(Value::Null),
                    BulkItem::Other(value) => {
                        return Err(DispatchError::BadBulkElement {
                            index,
                            value: value.to_string(),
                        });
                    }
                }
            }
            Ok(Value::Array(results))
        }
    }
}

fn resolve_procedure<'a>(set: &'a HandlerSet, name: &str) -> Result<&'a Procedure> {
    match set.get(name) {
        Some(HandlerEntry::Procedure(procedure)) => Ok(procedure),
        Some(HandlerEntry::Value(_)) | None => {
            Err(DispatchError::NotAProcedure(name.to_string()))
        }
    }
}

async fn one_call(procedure: &Procedure, bundle: &ArgumentBundle) -> Result<Value> {
    let bound = bind_arguments(procedure.params(), bundle)?;
    procedure.call(bound).await.map_err(DispatchError::Handler)
}
