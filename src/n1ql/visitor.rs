//! Query model -> N1QL statement.
//!
//! Compilation is a single pass over the model: main source, body clauses in declaration
//! order, projection, then result operators. Aliases are assigned up front in the order
//! sources are declared, so compiling the same model twice yields identical text.

use super::ast::{
    BodyClause, Direction, Expr, FromSource, JoinCondition, JoinKind, QueryModel, ResultOperator,
};
use super::context::QueryGenerationContext;
use super::expr::{ExprRenderer, Scope};
use super::format::{escape_identifier, quote_string, wrap};
use crate::errors::N1qlError;
use serde::Serialize;

/// Single-field wrapper column used for scalar results.
pub const RESULT_COLUMN: &str = "result";
/// Column carrying the document key when metadata is selected.
pub const DOCUMENT_KEY_COLUMN: &str = "__id";

/// How the coordinator turns the returned rows into the caller's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    Sequence,
    First { or_default: bool },
    Single { or_default: bool },
    /// Zero rows means false.
    Any,
    /// Zero rows means true.
    All,
    Aggregate,
    Explain,
}

impl ResultShape {
    /// At most one value comes back to the caller.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        !matches!(self, Self::Sequence | Self::Explain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub statement: String,
    /// Rows are wrapped as `{"result": value}` and must be unwrapped.
    pub result_extraction_required: bool,
    pub shape: ResultShape,
    /// Rows carry `__id` next to the document fields.
    pub includes_document_key: bool,
}

/// Compile `model` against `ctx`.
///
/// # Errors
/// `CompilationUnsupported` naming the clause, operator or method that has no translation,
/// `IdentifierInvalid` for empty bucket or member names.
pub fn compile(model: &QueryModel, ctx: &QueryGenerationContext) -> Result<CompiledQuery, N1qlError> {
    let scope = declare_sources(model);
    let mut visitor = QueryModelVisitor { ctx, renderer: ExprRenderer::new(ctx, &scope), parts: Parts::default() };
    visitor.visit(model)?;
    Ok(visitor.parts.finish())
}

fn declare_sources(model: &QueryModel) -> Scope {
    let mut scope = Scope::default();
    scope.add(&model.main_from.item_name, &model.main_from.item_type);
    for clause in &model.body {
        match clause {
            BodyClause::Join(j) => {
                scope.add(&j.item_name, &j.item_type);
            }
            BodyClause::Unnest { item_name, item_type, .. } => {
                scope.add(item_name, item_type);
            }
            _ => {}
        }
    }
    scope
}

#[derive(Debug, Default)]
struct Parts {
    explain: bool,
    distinct: bool,
    projection: String,
    from: String,
    joins: Vec<String>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    limit: Option<usize>,
    offset: Option<usize>,
    extraction: bool,
    document_key: bool,
    shape: Option<ResultShape>,
}

impl Parts {
    fn cap_limit(&mut self, n: usize) {
        self.limit = Some(self.limit.map_or(n, |l| l.min(n)));
    }

    // Skipping inside an already limited window shrinks the window.
    fn skip(&mut self, n: usize) {
        self.offset = Some(self.offset.unwrap_or(0) + n);
        if let Some(l) = self.limit {
            self.limit = Some(l.saturating_sub(n));
        }
    }

    const fn is_paged(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    fn finish(self) -> CompiledQuery {
        let mut s = String::new();
        if self.explain {
            s.push_str("EXPLAIN ");
        }
        s.push_str("SELECT ");
        if self.distinct {
            s.push_str("DISTINCT ");
        }
        s.push_str(&self.projection);
        s.push_str(" FROM ");
        s.push_str(&self.from);
        for j in &self.joins {
            s.push(' ');
            s.push_str(j);
        }
        if !self.wheres.is_empty() {
            s.push_str(" WHERE ");
            s.push_str(&self.wheres.join(" AND "));
        }
        if !self.group_by.is_empty() {
            s.push_str(" GROUP BY ");
            s.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            s.push_str(" HAVING ");
            s.push_str(&self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            s.push_str(" ORDER BY ");
            s.push_str(&self.order_by.join(", "));
        }
        if let Some(n) = self.limit {
            s.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(n) = self.offset {
            s.push_str(&format!(" OFFSET {n}"));
        }
        let shape = if self.explain { ResultShape::Explain } else { self.shape.unwrap_or(ResultShape::Sequence) };
        CompiledQuery {
            statement: s,
            result_extraction_required: self.extraction && shape != ResultShape::Explain,
            shape,
            includes_document_key: self.document_key && shape != ResultShape::Explain,
        }
    }
}

struct QueryModelVisitor<'a> {
    ctx: &'a QueryGenerationContext,
    renderer: ExprRenderer<'a>,
    parts: Parts,
}

impl QueryModelVisitor<'_> {
    fn visit(&mut self, model: &QueryModel) -> Result<(), N1qlError> {
        self.visit_main_from(model)?;
        let mut grouped = false;
        for clause in &model.body {
            self.visit_body_clause(clause, &mut grouped)?;
        }
        self.visit_select(model)?;
        for op in &model.result_operators {
            self.visit_result_operator(op, model)?;
        }
        Ok(())
    }

    fn alias(&self, item_name: &str) -> Result<String, N1qlError> {
        self.renderer.render_source(item_name)
    }

    fn visit_main_from(&mut self, model: &QueryModel) -> Result<(), N1qlError> {
        let from = &model.main_from;
        let bucket = match &from.source {
            FromSource::Default => self.ctx.default_bucket.as_str(),
            FromSource::Bucket(b) => b.as_str(),
        };
        let mut s = format!("{} as {}", escape_identifier(bucket)?, self.alias(&from.item_name)?);
        if let Some(keys) = &from.use_keys {
            let keys: Vec<String> = keys.iter().map(|k| quote_string(k)).collect();
            s.push_str(&format!(" USE KEYS [{}]", keys.join(", ")));
        }
        self.parts.from = s;
        Ok(())
    }

    fn visit_body_clause(&mut self, clause: &BodyClause, grouped: &mut bool) -> Result<(), N1qlError> {
        match clause {
            BodyClause::Where(predicate) => {
                let p = self.renderer.render(predicate)?;
                if *grouped {
                    self.parts.having.push(p);
                } else {
                    self.parts.wheres.push(p);
                }
            }
            BodyClause::OrderBy(orderings) => {
                for o in orderings {
                    let dir = match o.direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    let e = self.renderer.render(&o.expr)?;
                    self.parts.order_by.push(format!("{e} {dir}"));
                }
            }
            BodyClause::Join(j) => {
                let keyword = match j.kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::LeftOuter => "LEFT OUTER JOIN",
                    JoinKind::Nest => "INNER NEST",
                    JoinKind::LeftOuterNest => "LEFT OUTER NEST",
                };
                let on = match &j.condition {
                    JoinCondition::OnKeys(keys) => format!("ON KEYS {}", self.renderer.render(keys)?),
                    JoinCondition::On { left, right } => {
                        if matches!(j.kind, JoinKind::Nest | JoinKind::LeftOuterNest) {
                            return Err(N1qlError::unsupported("Nest requires an ON KEYS condition"));
                        }
                        let l = self.renderer.render(left)?;
                        let r = self.renderer.render(right)?;
                        format!("ON ({l} = {r})")
                    }
                };
                self.parts.joins.push(format!(
                    "{keyword} {} as {} {on}",
                    escape_identifier(&j.bucket)?,
                    self.alias(&j.item_name)?
                ));
            }
            BodyClause::Unnest { item_name, array, outer, .. } => {
                let keyword = if *outer { "LEFT OUTER UNNEST" } else { "UNNEST" };
                let a = self.renderer.render(array)?;
                self.parts.joins.push(format!("{keyword} {a} as {}", self.alias(item_name)?));
            }
            BodyClause::GroupBy(keys) => {
                for k in keys {
                    let g = self.renderer.render(k)?;
                    self.parts.group_by.push(g);
                }
                *grouped = true;
            }
        }
        Ok(())
    }

    fn visit_select(&mut self, model: &QueryModel) -> Result<(), N1qlError> {
        let (projection, extraction) = match &model.select {
            Expr::Source(name) if selects_root(model) => {
                let alias = self.alias(name)?;
                if self.ctx.select_document_metadata {
                    self.parts.document_key = true;
                    (format!("{alias}.*, META({alias}).id as {}", escape_identifier(DOCUMENT_KEY_COLUMN)?), false)
                } else {
                    (format!("{alias}.*"), false)
                }
            }
            Expr::New(members) if !members.is_empty() => {
                let mut cols = Vec::with_capacity(members.len());
                for m in members {
                    cols.push(format!("{} as {}", self.renderer.render(&m.expr)?, escape_identifier(&m.name)?));
                }
                (cols.join(", "), false)
            }
            other => (format!("{} as {}", self.renderer.render(other)?, escape_identifier(RESULT_COLUMN)?), true),
        };
        self.parts.projection = projection;
        self.parts.extraction = extraction;
        Ok(())
    }

    fn visit_result_operator(&mut self, op: &ResultOperator, model: &QueryModel) -> Result<(), N1qlError> {
        let result = escape_identifier(RESULT_COLUMN)?;
        // LIMIT/OFFSET apply last in N1QL, so set operators can't follow a page.
        if self.parts.is_paged()
            && matches!(
                op,
                ResultOperator::Distinct
                    | ResultOperator::All(_)
                    | ResultOperator::Count
                    | ResultOperator::LongCount
                    | ResultOperator::Sum
                    | ResultOperator::Average
                    | ResultOperator::Min
                    | ResultOperator::Max
            )
        {
            return Err(N1qlError::unsupported(format!("result operator {} after Take/Skip", op.name())));
        }
        match op {
            ResultOperator::Take(n) => self.parts.cap_limit(*n),
            ResultOperator::Skip(n) => self.parts.skip(*n),
            ResultOperator::Distinct => self.parts.distinct = true,
            ResultOperator::Explain => self.parts.explain = true,
            ResultOperator::First { or_default } => {
                self.parts.cap_limit(1);
                self.set_shape(ResultShape::First { or_default: *or_default });
            }
            ResultOperator::Single { or_default } => {
                self.parts.cap_limit(2);
                self.set_shape(ResultShape::Single { or_default: *or_default });
            }
            ResultOperator::Any => {
                self.scalar_projection(format!("true as {result}"));
                self.parts.distinct = false;
                self.parts.cap_limit(1);
                self.set_shape(ResultShape::Any);
            }
            ResultOperator::All(predicate) => {
                let p = self.renderer.render(predicate)?;
                self.parts.wheres.push(format!("NOT {}", wrap(p)));
                self.scalar_projection(format!("false as {result}"));
                self.parts.distinct = false;
                self.parts.cap_limit(1);
                self.set_shape(ResultShape::All);
            }
            ResultOperator::Count | ResultOperator::LongCount => {
                let distinct = std::mem::take(&mut self.parts.distinct);
                let agg = if distinct && !selects_root(model) {
                    format!("COUNT(DISTINCT {})", self.renderer.render(&model.select)?)
                } else {
                    "COUNT(*)".to_string()
                };
                self.scalar_projection(format!("{agg} as {result}"));
                self.set_shape(ResultShape::Aggregate);
            }
            ResultOperator::Sum | ResultOperator::Average | ResultOperator::Min | ResultOperator::Max => {
                let func = match op {
                    ResultOperator::Sum => "SUM",
                    ResultOperator::Average => "AVG",
                    ResultOperator::Min => "MIN",
                    _ => "MAX",
                };
                let d = if self.parts.distinct { "DISTINCT " } else { "" };
                let arg = self.renderer.render(&model.select)?;
                self.scalar_projection(format!("{func}({d}{arg}) as {result}"));
                self.parts.distinct = false;
                self.set_shape(ResultShape::Aggregate);
            }
            ResultOperator::Last { .. } | ResultOperator::Reverse => {
                return Err(N1qlError::unsupported(format!("result operator {}", op.name())));
            }
        }
        Ok(())
    }

    fn scalar_projection(&mut self, projection: String) {
        self.parts.projection = projection;
        self.parts.extraction = true;
        self.parts.document_key = false;
    }

    fn set_shape(&mut self, shape: ResultShape) {
        // aggregate-style shapes win over row-limiting ones
        let keep = matches!(
            self.parts.shape,
            Some(ResultShape::Any | ResultShape::All | ResultShape::Aggregate)
        );
        if !keep {
            self.parts.shape = Some(shape);
        }
    }
}

fn selects_root(model: &QueryModel) -> bool {
    matches!(&model.select, Expr::Source(name) if *name == model.main_from.item_name)
}
