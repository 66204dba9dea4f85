use crate::config::ContextConfig;
use crate::context::BucketContext;
use crate::errors::N1qlError;
use crate::n1ql::{QueryModel, ResultOperator};
use crate::store::{MemoryStore, QueryResponse};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::command::Command;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Plain,
    Json,
}

/// Read a JSON query model from disk.
///
/// # Errors
/// I/O or JSON failure.
pub fn load_model(path: &Path) -> Result<QueryModel, N1qlError> {
    let s = std::fs::read_to_string(path)?;
    Ok(QueryModel::from_json(&s)?)
}

/// # Errors
/// Whatever the command fails with.
pub fn run(cfg: &ContextConfig, cmd: Command) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_format(cfg, cmd, OutputMode::Human, &mut out)
}

/// # Errors
/// Whatever the command fails with, or a write failure on `out`.
pub fn run_with_format(
    cfg: &ContextConfig,
    cmd: Command,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Compile { model } => {
            let model = load_model(&model)?;
            print_compiled(cfg, &model, mode, out)
        }
        Command::Explain { model } => {
            let mut model = load_model(&model)?;
            if !model.result_operators.contains(&ResultOperator::Explain) {
                model.result_operators.push(ResultOperator::Explain);
            }
            print_compiled(cfg, &model, mode, out)
        }
        Command::Run { model, response, tracked } => {
            let model = load_model(&model)?;
            let response: QueryResponse = serde_json::from_str(&std::fs::read_to_string(&response)?)?;
            let store = Arc::new(MemoryStore::new());
            store.push_response(Ok(response));
            let ctx = BucketContext::new(store, cfg.clone());
            let rows: Vec<Value> = if tracked {
                ctx.begin_change_tracking();
                let docs = ctx.execute_tracked(&model)?;
                let mut rows = Vec::with_capacity(docs.len());
                for d in &docs {
                    let mut v = d.to_json()?;
                    if let (Some(k), Value::Object(map)) = (d.key(), &mut v) {
                        map.insert(crate::n1ql::DOCUMENT_KEY_COLUMN.to_string(), Value::String(k));
                    }
                    rows.push(v);
                }
                ctx.end_change_tracking();
                rows
            } else {
                ctx.execute::<Value>(&model)?.to_vec()?
            };
            match mode {
                OutputMode::Json => writeln!(out, "{}", Value::Array(rows))?,
                OutputMode::Plain | OutputMode::Human => {
                    for r in rows {
                        writeln!(out, "{r}")?;
                    }
                }
            }
            Ok(())
        }
        Command::Config => {
            match mode {
                OutputMode::Json => writeln!(out, "{}", serde_json::to_string_pretty(cfg)?)?,
                OutputMode::Plain => writeln!(
                    out,
                    "bucket={} naming={:?} change_tracking={} log_queries={}",
                    cfg.bucket, cfg.naming, cfg.change_tracking, cfg.log_queries
                )?,
                OutputMode::Human => write!(out, "{}", cfg.to_toml()?)?,
            }
            Ok(())
        }
    }
}

fn print_compiled(
    cfg: &ContextConfig,
    model: &QueryModel,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = BucketContext::new(Arc::new(MemoryStore::new()), cfg.clone());
    let compiled = ctx.compile(model)?;
    match mode {
        OutputMode::Json => {
            let json = serde_json::json!({
                "statement": compiled.statement,
                "result_extraction_required": compiled.result_extraction_required,
            });
            writeln!(out, "{json}")?;
        }
        OutputMode::Plain | OutputMode::Human => writeln!(out, "{}", compiled.statement)?,
    }
    Ok(())
}
