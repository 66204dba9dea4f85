//! Query execution: compile, run against the store, unwrap and shape the rows.

use super::BucketContext;
use super::cursor::Cursor;
use crate::errors::N1qlError;
use crate::n1ql::{CompiledQuery, DOCUMENT_KEY_COLUMN, QueryModel, RESULT_COLUMN, ResultShape, compile};
use crate::serializer::from_stored;
use crate::tracking::TrackedDocument;
use crate::utils::logger::QUERY_TARGET;
use serde::de::DeserializeOwned;
use serde_json::Value;

impl BucketContext {
    /// Proxies are only worth building when tracking is on and each row is a whole root
    /// document.
    #[must_use]
    pub fn wants_proxies(&self, model: &QueryModel) -> bool {
        self.registry.is_enabled() && model.projects_root_item()
    }

    /// Compile `model` as `execute` would send it.
    ///
    /// # Errors
    /// See `n1ql::compile`.
    pub fn compile(&self, model: &QueryModel) -> Result<CompiledQuery, N1qlError> {
        compile(model, &self.generation_context(false))
    }

    /// Run `model` and deserialize each row as `T`.
    ///
    /// First/Single operators are checked for cardinality here; Any/All/aggregates yield
    /// their single value.
    ///
    /// # Errors
    /// Compilation failure, `Store` when the store itself fails, `StoreQueryFailed` when
    /// it reports errors, `UnexpectedResult` on a cardinality violation.
    pub fn execute<T: DeserializeOwned>(&self, model: &QueryModel) -> Result<Cursor<T>, N1qlError> {
        let compiled = self.compile(model)?;
        let rows = self.run(&compiled)?;
        let rows = shape_rows(&compiled, rows)?;
        Ok(Cursor::new(rows, self.serializer.clone()))
    }

    /// Run a query expected to produce at most one value (Any, All, Count, First...).
    ///
    /// # Errors
    /// As `execute`, plus `UnexpectedResult` when the query isn't scalar-shaped.
    pub fn execute_scalar<T: DeserializeOwned>(&self, model: &QueryModel) -> Result<Option<T>, N1qlError> {
        let compiled = self.compile(model)?;
        if !compiled.shape.is_scalar() {
            return Err(N1qlError::UnexpectedResult(format!(
                "query produces a sequence ({:?}), not a single value",
                compiled.shape
            )));
        }
        let rows = self.run(&compiled)?;
        shape_rows(&compiled, rows)?
            .into_iter()
            .next()
            .map(|v| from_stored(self.serializer.as_ref(), v))
            .transpose()
    }

    /// Run a root-document query and return proxies. While tracking, every proxy is
    /// registered under its key and a proxy already tracked for that key is reused.
    ///
    /// # Errors
    /// `CompilationUnsupported` when rows aren't whole root documents, otherwise as
    /// `execute`.
    pub fn execute_tracked(&self, model: &QueryModel) -> Result<Vec<TrackedDocument>, N1qlError> {
        if !model.projects_root_item() {
            return Err(N1qlError::unsupported("projected rows have no stored document to track"));
        }
        let tracking = self.wants_proxies(model);
        let compiled = compile(model, &self.generation_context(true))?;
        let rows = shape_rows(&compiled, self.run(&compiled)?)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.materialize_row(row, tracking)?);
        }
        Ok(out)
    }

    fn materialize_row(&self, row: Value, tracking: bool) -> Result<TrackedDocument, N1qlError> {
        let Value::Object(mut map) = row else {
            return Err(N1qlError::UnexpectedResult(format!("expected a document row, got {row}")));
        };
        let key = match map.remove(DOCUMENT_KEY_COLUMN) {
            Some(Value::String(k)) => Some(k),
            _ => None,
        };
        if tracking
            && let Some(k) = &key
            && let Some(existing) = self.registry.tracked(k)
        {
            return Ok(existing);
        }
        let doc = TrackedDocument::from_json(self.serializer.from_document(Value::Object(map))?)?;
        if let Some(k) = key {
            doc.node().set_key(k.clone());
            if tracking {
                self.registry.track(&k, &doc);
            }
        }
        Ok(doc)
    }

    fn run(&self, compiled: &CompiledQuery) -> Result<Vec<Value>, N1qlError> {
        if self.config.log_queries {
            match self.config.query_timeout_ms {
                Some(ms) => log::debug!(target: QUERY_TARGET, "{} [timeout={ms}ms]", compiled.statement),
                None => log::debug!(target: QUERY_TARGET, "{}", compiled.statement),
            }
        }
        crate::dev6!(
            "{{\"op\":\"query\",\"statement\":{},\"extract\":{}}}",
            serde_json::to_string(&compiled.statement)?,
            compiled.result_extraction_required
        );
        let response = self.store.query(&compiled.statement)?;
        if response.is_success() {
            return Ok(response.rows);
        }
        if response.errors.is_empty() {
            return Err(N1qlError::StoreQueryFailed(format!("query status {:?}", response.status)));
        }
        let joined: Vec<String> = response.errors.iter().map(|e| format!("{}: {}", e.code, e.message)).collect();
        log::warn!(target: QUERY_TARGET, "query failed: {}", joined.join("; "));
        Err(N1qlError::StoreQueryFailed(joined.join("; ")))
    }
}

/// Unwrap the result column and apply the cardinality rules of the result shape.
pub(crate) fn shape_rows(compiled: &CompiledQuery, rows: Vec<Value>) -> Result<Vec<Value>, N1qlError> {
    let rows: Vec<Value> = if compiled.result_extraction_required {
        rows.into_iter().map(extract).collect()
    } else {
        rows
    };
    match compiled.shape {
        ResultShape::Sequence | ResultShape::Explain => Ok(rows),
        ResultShape::Any => Ok(vec![Value::Bool(!rows.is_empty())]),
        ResultShape::All => Ok(vec![Value::Bool(rows.is_empty())]),
        ResultShape::Aggregate => Ok(rows.into_iter().take(1).collect()),
        ResultShape::First { or_default } => {
            if rows.is_empty() && !or_default {
                return Err(N1qlError::UnexpectedResult("sequence contains no elements".into()));
            }
            Ok(rows.into_iter().take(1).collect())
        }
        ResultShape::Single { or_default } => match rows.len() {
            0 if or_default => Ok(rows),
            0 => Err(N1qlError::UnexpectedResult("sequence contains no elements".into())),
            1 => Ok(rows),
            _ => Err(N1qlError::UnexpectedResult("sequence contains more than one element".into())),
        },
    }
}

fn extract(row: Value) -> Value {
    match row {
        Value::Object(mut map) => map.remove(RESULT_COLUMN).unwrap_or(Value::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(shape: ResultShape, extract: bool) -> CompiledQuery {
        CompiledQuery {
            statement: String::new(),
            result_extraction_required: extract,
            shape,
            includes_document_key: false,
        }
    }

    #[test]
    fn vacuous_truth_for_any_and_all() {
        assert_eq!(shape_rows(&compiled(ResultShape::Any, true), vec![]).unwrap(), vec![Value::Bool(false)]);
        assert_eq!(shape_rows(&compiled(ResultShape::All, true), vec![]).unwrap(), vec![Value::Bool(true)]);
        let row = serde_json::json!({"result": false});
        assert_eq!(shape_rows(&compiled(ResultShape::All, true), vec![row]).unwrap(), vec![Value::Bool(false)]);
    }

    #[test]
    fn single_cardinality() {
        let one = serde_json::json!({"a": 1});
        let s = compiled(ResultShape::Single { or_default: false }, false);
        assert!(shape_rows(&s, vec![]).is_err());
        assert!(shape_rows(&s, vec![one.clone(), one.clone()]).is_err());
        assert_eq!(shape_rows(&s, vec![one.clone()]).unwrap().len(), 1);
        let d = compiled(ResultShape::Single { or_default: true }, false);
        assert!(shape_rows(&d, vec![]).unwrap().is_empty());
    }

    #[test]
    fn extraction_defaults_missing_to_null() {
        let rows = vec![serde_json::json!({"result": 3}), serde_json::json!({"other": 1})];
        assert_eq!(
            shape_rows(&compiled(ResultShape::Sequence, true), rows).unwrap(),
            vec![serde_json::json!(3), Value::Null]
        );
    }
}
