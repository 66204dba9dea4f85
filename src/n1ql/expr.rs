//! Expression -> N1QL fragment.

use super::ast::{BinaryOp, Expr, Literal, MemberRef, MethodRef, ValueKind};
use super::context::QueryGenerationContext;
use super::format::{canonicalize_datetime, escape_identifier, format_literal, wrap};
use super::methods::{DATETIME, NULLABLE};
use crate::errors::N1qlError;

/// One query source visible to expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub item_name: String,
    pub item_type: String,
    pub alias: String,
}

/// Item name -> generated alias, in first-seen order (`Extent1`, `Extent2`, ...).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: Vec<SourceEntry>,
}

impl Scope {
    /// Register a source and return its (unescaped) alias. Re-registering a name returns
    /// the alias it already has.
    pub fn add(&mut self, item_name: &str, item_type: &str) -> String {
        if let Some(e) = self.get(item_name) {
            return e.alias.clone();
        }
        let alias = format!("Extent{}", self.entries.len() + 1);
        self.entries.push(SourceEntry {
            item_name: item_name.to_string(),
            item_type: item_type.to_string(),
            alias: alias.clone(),
        });
        alias
    }

    #[must_use]
    pub fn get(&self, item_name: &str) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| e.item_name == item_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A method call as handed to a translator.
#[derive(Debug, Clone, Copy)]
pub struct CallNode<'a> {
    pub target: Option<&'a Expr>,
    pub method: &'a MethodRef,
    pub args: &'a [Expr],
}

impl<'a> CallNode<'a> {
    /// # Errors
    /// `CompilationUnsupported` when the call has no instance target.
    pub fn target(&self) -> Result<&'a Expr, N1qlError> {
        self.target.ok_or_else(|| N1qlError::unsupported(format!("{} requires a target", self.describe())))
    }

    /// # Errors
    /// `CompilationUnsupported` when argument `i` is absent.
    pub fn arg(&self, i: usize) -> Result<&'a Expr, N1qlError> {
        self.args
            .get(i)
            .ok_or_else(|| N1qlError::unsupported(format!("{} is missing argument {i}", self.describe())))
    }

    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}.{}/{}", self.method.declaring_type, self.method.name, self.args.len())
    }
}

pub struct ExprRenderer<'a> {
    ctx: &'a QueryGenerationContext,
    scope: &'a Scope,
    params: Vec<String>,
}

impl<'a> ExprRenderer<'a> {
    #[must_use]
    pub const fn new(ctx: &'a QueryGenerationContext, scope: &'a Scope) -> Self {
        Self { ctx, scope, params: Vec::new() }
    }

    #[must_use]
    pub const fn context(&self) -> &QueryGenerationContext {
        self.ctx
    }

    /// Render a lambda as `(escaped parameter, body)`.
    ///
    /// # Errors
    /// `CompilationUnsupported` if `e` isn't a lambda or its body can't be rendered.
    pub fn render_lambda(&mut self, e: &Expr) -> Result<(String, String), N1qlError> {
        let Expr::Lambda { param, body } = e else {
            return Err(N1qlError::unsupported("expected a lambda argument"));
        };
        let p = escape_identifier(param)?;
        self.params.push(param.clone());
        let body = self.render(body);
        self.params.pop();
        Ok((p, body?))
    }

    /// Escaped alias of a declared source.
    ///
    /// # Errors
    /// `CompilationUnsupported` if `item_name` was never declared.
    pub fn render_source(&self, item_name: &str) -> Result<String, N1qlError> {
        match self.scope.get(item_name) {
            Some(entry) => escape_identifier(&entry.alias),
            None => Err(N1qlError::unsupported(format!("unknown query source '{item_name}'"))),
        }
    }

    /// # Errors
    /// `CompilationUnsupported` for constructs without a translation, `IdentifierInvalid`
    /// for empty names.
    pub fn render(&mut self, e: &Expr) -> Result<String, N1qlError> {
        match e {
            Expr::Constant(l) => Ok(format_literal(l)),
            Expr::Source(name) => self.render_source(name),
            Expr::Param(name) => {
                if self.params.iter().any(|p| p == name) {
                    escape_identifier(name)
                } else {
                    Err(N1qlError::unsupported(format!("parameter '{name}' used outside its lambda")))
                }
            }
            Expr::Member { target, member, .. } => self.render_member(target, member),
            Expr::Binary { op, left, right } => self.render_binary(*op, left, right),
            Expr::Not(inner) => Ok(format!("NOT {}", wrap(self.render(inner)?))),
            Expr::Negate(inner) => Ok(format!("-{}", wrap(self.render(inner)?))),
            Expr::Call { target, method, args } => {
                let node = CallNode { target: target.as_deref(), method, args };
                let ctx = self.ctx;
                let translator = ctx
                    .method_call_translators
                    .get_translator(&node)
                    .ok_or_else(|| N1qlError::unsupported(format!("method {}", node.describe())))?;
                translator(&node, self)
            }
            Expr::Lambda { .. } => Err(N1qlError::unsupported("lambda outside of a method call")),
            Expr::Conditional { test, if_true, if_false } => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.render(test)?,
                self.render(if_true)?,
                self.render(if_false)?
            )),
            Expr::New(members) => {
                let mut parts = Vec::with_capacity(members.len());
                for p in members {
                    parts.push(format!("{}: {}", serde_json::to_string(&p.name)?, self.render(&p.expr)?));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            Expr::Aggregate { func, arg, distinct } => match arg {
                None => Ok(format!("{}(*)", func.keyword())),
                Some(a) => {
                    let d = if *distinct { "DISTINCT " } else { "" };
                    Ok(format!("{}({d}{})", func.keyword(), self.render(a)?))
                }
            },
        }
    }

    fn render_member(&mut self, target: &Expr, member: &MemberRef) -> Result<String, N1qlError> {
        let declaring_type = if member.declaring_type.is_empty() {
            match target {
                Expr::Source(n) => self.scope.get(n).map(|s| s.item_type.clone()).unwrap_or_default(),
                _ => String::new(),
            }
        } else {
            member.declaring_type.clone()
        };
        let resolved = self
            .ctx
            .member_name_resolver
            .resolve_name(&MemberRef { declaring_type, name: member.name.clone() });
        Ok(format!("{}.{}", self.render(target)?, escape_identifier(&resolved)?))
    }

    fn render_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<String, N1qlError> {
        let is_null = |e: &Expr| matches!(e, Expr::Constant(Literal::Null));
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) && (is_null(left) || is_null(right)) {
            let other = if is_null(right) { left } else { right };
            let not = if op == BinaryOp::Ne { "NOT " } else { "" };
            return Ok(format!("({} IS {not}NULL)", self.render(other)?));
        }
        let l = self.render(left)?;
        let r = self.render(right)?;
        if op == BinaryOp::Coalesce {
            return Ok(format!("IFMISSINGORNULL({l}, {r})"));
        }
        if op.is_comparison() && (self.kind_of(left) == ValueKind::DateTime || self.kind_of(right) == ValueKind::DateTime) {
            return Ok(format!("({} {} {})", canonicalize_datetime(&l), op.symbol(), canonicalize_datetime(&r)));
        }
        Ok(format!("({l} {} {r})", op.symbol()))
    }

    /// Best-effort static type of an expression.
    #[must_use]
    pub fn kind_of(&self, e: &Expr) -> ValueKind {
        match e {
            Expr::Constant(l) => l.kind(),
            Expr::Member { kind, .. } => *kind,
            Expr::Call { target, method, .. } => {
                if method.declaring_type == NULLABLE
                    && matches!(method.name.as_str(), "Value" | "GetValueOrDefault")
                {
                    return target.as_deref().map_or(ValueKind::Any, |t| self.kind_of(t));
                }
                if method.declaring_type == DATETIME
                    && (method.name.starts_with("Add") || matches!(method.name.as_str(), "Now" | "UtcNow"))
                {
                    return ValueKind::DateTime;
                }
                ValueKind::Any
            }
            Expr::Conditional { if_true, if_false, .. } => match self.kind_of(if_true) {
                ValueKind::Any => self.kind_of(if_false),
                k => k,
            },
            Expr::Binary { op: BinaryOp::Coalesce, left, right } => match self.kind_of(left) {
                ValueKind::Any => self.kind_of(right),
                k => k,
            },
            _ => ValueKind::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::n1ql::ast::AggregateFn;

    fn scope() -> Scope {
        let mut s = Scope::default();
        s.add("e", "Beer");
        s
    }

    fn field(name: &str) -> Expr {
        Expr::Member {
            target: Box::new(Expr::Source("e".into())),
            member: MemberRef { declaring_type: String::new(), name: name.into() },
            kind: ValueKind::Any,
        }
    }

    #[test]
    fn aliases_in_first_seen_order() {
        let mut s = Scope::default();
        assert_eq!(s.add("b", "Beer"), "Extent1");
        assert_eq!(s.add("w", "Brewery"), "Extent2");
        assert_eq!(s.add("b", "Beer"), "Extent1");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn null_comparisons_become_is_null() {
        let ctx = QueryGenerationContext::default();
        let s = scope();
        let mut r = ExprRenderer::new(&ctx, &s);
        let eq = Expr::Binary { op: BinaryOp::Eq, left: Box::new(field("name")), right: Box::new(Expr::Constant(Literal::Null)) };
        assert_eq!(r.render(&eq).unwrap(), "(`Extent1`.`name` IS NULL)");
        let ne = Expr::Binary { op: BinaryOp::Ne, left: Box::new(Expr::Constant(Literal::Null)), right: Box::new(field("name")) };
        assert_eq!(r.render(&ne).unwrap(), "(`Extent1`.`name` IS NOT NULL)");
    }

    #[test]
    fn unknown_source_and_stray_param_fail() {
        let ctx = QueryGenerationContext::default();
        let s = scope();
        let mut r = ExprRenderer::new(&ctx, &s);
        assert!(matches!(r.render(&Expr::Source("x".into())), Err(N1qlError::CompilationUnsupported(_))));
        assert!(matches!(r.render(&Expr::Param("p".into())), Err(N1qlError::CompilationUnsupported(_))));
    }

    #[test]
    fn object_and_aggregate_rendering() {
        let ctx = QueryGenerationContext::default();
        let s = scope();
        let mut r = ExprRenderer::new(&ctx, &s);
        let obj = Expr::New(vec![crate::n1ql::ast::Projection { name: "n".into(), expr: field("name") }]);
        assert_eq!(r.render(&obj).unwrap(), "{\"n\": `Extent1`.`name`}");
        let cnt = Expr::Aggregate { func: AggregateFn::Count, arg: None, distinct: false };
        assert_eq!(r.render(&cnt).unwrap(), "COUNT(*)");
        let avg = Expr::Aggregate { func: AggregateFn::Avg, arg: Some(Box::new(field("abv"))), distinct: true };
        assert_eq!(r.render(&avg).unwrap(), "AVG(DISTINCT `Extent1`.`abv`)");
    }

    #[test]
    fn not_wraps_without_inverting() {
        let ctx = QueryGenerationContext::default();
        let s = scope();
        let mut r = ExprRenderer::new(&ctx, &s);
        let gt = Expr::Binary { op: BinaryOp::Gt, left: Box::new(field("abv")), right: Box::new(Expr::Constant(Literal::Int(5))) };
        assert_eq!(r.render(&Expr::Not(Box::new(gt))).unwrap(), "NOT (`Extent1`.`abv` > 5)");
        let cond = Expr::Conditional {
            test: Box::new(field("flag")),
            if_true: Box::new(Expr::Constant(Literal::Int(1))),
            if_false: Box::new(Expr::Constant(Literal::Int(0))),
        };
        assert_eq!(r.render(&cond).unwrap(), "CASE WHEN `Extent1`.`flag` THEN 1 ELSE 0 END");
    }
}
