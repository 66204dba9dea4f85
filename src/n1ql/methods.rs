//! Method-call translator registry.
//!
//! Calls are looked up by declaring type, method name and argument count. Instance calls
//! carry their receiver in `CallNode::target`; the receiver doesn't count as an argument.

use super::ast::{Expr, Literal};
use super::expr::{CallNode, ExprRenderer};
use super::format::like_pattern;
use crate::errors::N1qlError;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

pub const STRING: &str = "String";
pub const MATH: &str = "Math";
pub const DATETIME: &str = "DateTime";
pub const NULLABLE: &str = "Nullable";
pub const ENUMERABLE: &str = "Enumerable";
pub const N1QL: &str = "N1ql";
pub const REGEX: &str = "Regex";

pub type Translator =
    Arc<dyn Fn(&CallNode<'_>, &mut ExprRenderer<'_>) -> Result<String, N1qlError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub declaring_type: String,
    pub name: String,
    pub arity: usize,
}

impl MethodKey {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>, arity: usize) -> Self {
        Self { declaring_type: declaring_type.into(), name: name.into(), arity }
    }
}

#[derive(Clone, Default)]
pub struct MethodCallTranslatorRegistry {
    translators: HashMap<MethodKey, Translator>,
}

static DEFAULT_REGISTRY: LazyLock<Arc<MethodCallTranslatorRegistry>> =
    LazyLock::new(|| Arc::new(MethodCallTranslatorRegistry::with_defaults()));

impl MethodCallTranslatorRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Process-wide read-only registry with the built-in translations.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        DEFAULT_REGISTRY.clone()
    }

    pub fn register<F>(&mut self, key: MethodKey, f: F)
    where
        F: Fn(&CallNode<'_>, &mut ExprRenderer<'_>) -> Result<String, N1qlError> + Send + Sync + 'static,
    {
        self.translators.insert(key, Arc::new(f));
    }

    #[must_use]
    pub fn get_translator(&self, call: &CallNode<'_>) -> Option<&Translator> {
        let key = MethodKey::new(call.method.declaring_type.as_str(), call.method.name.as_str(), call.args.len());
        self.translators.get(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.translators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        let mut r = Self::default();
        r.register_nullable();
        r.register_string();
        r.register_math();
        r.register_datetime();
        r.register_enumerable();
        r.register_n1ql();
        #[cfg(feature = "regex")]
        r.register_regex();
        r
    }

    fn register_nullable(&mut self) {
        // Negation is left to the caller so `!x.HasValue` stays `NOT (x IS NOT NULL)`.
        self.register(MethodKey::new(NULLABLE, "HasValue", 0), |c, r| {
            Ok(format!("({} IS NOT NULL)", r.render(c.target()?)?))
        });
        self.register(MethodKey::new(NULLABLE, "Value", 0), |c, r| r.render(c.target()?));
        self.register(MethodKey::new(NULLABLE, "GetValueOrDefault", 1), |c, r| {
            Ok(format!("IFMISSINGORNULL({}, {})", r.render(c.target()?)?, r.render(c.arg(0)?)?))
        });
    }

    fn register_string(&mut self) {
        self.register(MethodKey::new(STRING, "Contains", 1), |c, r| {
            let t = r.render(c.target()?)?;
            match c.arg(0)? {
                Expr::Constant(Literal::String(s)) => Ok(format!("({t} LIKE {})", like_pattern("%", s, "%"))),
                a => Ok(format!("CONTAINS({t}, {})", r.render(a)?)),
            }
        });
        self.register(MethodKey::new(STRING, "StartsWith", 1), |c, r| {
            let t = r.render(c.target()?)?;
            match c.arg(0)? {
                Expr::Constant(Literal::String(s)) => Ok(format!("({t} LIKE {})", like_pattern("", s, "%"))),
                a => Ok(format!("(POSITION({t}, {}) = 0)", r.render(a)?)),
            }
        });
        self.register(MethodKey::new(STRING, "EndsWith", 1), |c, r| {
            let t = r.render(c.target()?)?;
            match c.arg(0)? {
                Expr::Constant(Literal::String(s)) => Ok(format!("({t} LIKE {})", like_pattern("%", s, ""))),
                a => {
                    let a = r.render(a)?;
                    Ok(format!("(SUBSTR({t}, LENGTH({t}) - LENGTH({a})) = {a})"))
                }
            }
        });
        for (name, func) in [
            ("ToUpper", "UPPER"),
            ("ToLower", "LOWER"),
            ("Trim", "TRIM"),
            ("TrimStart", "LTRIM"),
            ("TrimEnd", "RTRIM"),
            ("Length", "LENGTH"),
        ] {
            self.register(MethodKey::new(STRING, name, 0), instance_function(func));
        }
        self.register(MethodKey::new(STRING, "Trim", 1), instance_function("TRIM"));
        self.register(MethodKey::new(STRING, "Substring", 1), instance_function("SUBSTR"));
        self.register(MethodKey::new(STRING, "Substring", 2), instance_function("SUBSTR"));
        self.register(MethodKey::new(STRING, "IndexOf", 1), instance_function("POSITION"));
        self.register(MethodKey::new(STRING, "Replace", 2), instance_function("REPLACE"));
        self.register(MethodKey::new(STRING, "Split", 1), instance_function("SPLIT"));
        self.register(MethodKey::new(STRING, "Concat", 2), |c, r| {
            Ok(format!("({} || {})", r.render(c.arg(0)?)?, r.render(c.arg(1)?)?))
        });
        self.register(MethodKey::new(STRING, "IsNullOrEmpty", 1), |c, r| {
            let a = r.render(c.arg(0)?)?;
            Ok(format!("(({a} IS NULL) OR ({a} = ''))"))
        });
    }

    fn register_math(&mut self) {
        for (name, func, arity) in [
            ("Abs", "ABS", 1),
            ("Ceiling", "CEIL", 1),
            ("Floor", "FLOOR", 1),
            ("Round", "ROUND", 1),
            ("Round", "ROUND", 2),
            ("Sqrt", "SQRT", 1),
            ("Pow", "POWER", 2),
            ("Exp", "EXP", 1),
            ("Log", "LN", 1),
            ("Log10", "LOG", 1),
            ("Sign", "SIGN", 1),
            ("Truncate", "TRUNC", 1),
            ("Sin", "SIN", 1),
            ("Cos", "COS", 1),
            ("Tan", "TAN", 1),
        ] {
            self.register(MethodKey::new(MATH, name, arity), static_function(func));
        }
    }

    fn register_datetime(&mut self) {
        for (name, part) in [
            ("AddYears", "year"),
            ("AddMonths", "month"),
            ("AddDays", "day"),
            ("AddHours", "hour"),
            ("AddMinutes", "minute"),
            ("AddSeconds", "second"),
            ("AddMilliseconds", "millisecond"),
        ] {
            self.register(MethodKey::new(DATETIME, name, 1), move |c, r| {
                Ok(format!("DATE_ADD_STR({}, {}, '{part}')", r.render(c.target()?)?, r.render(c.arg(0)?)?))
            });
        }
        for (name, part) in [
            ("Year", "year"),
            ("Month", "month"),
            ("Day", "day"),
            ("Hour", "hour"),
            ("Minute", "minute"),
            ("Second", "second"),
            ("Millisecond", "millisecond"),
        ] {
            self.register(MethodKey::new(DATETIME, name, 0), move |c, r| {
                Ok(format!("DATE_PART_STR({}, '{part}')", r.render(c.target()?)?))
            });
        }
        self.register(MethodKey::new(DATETIME, "Now", 0), |_, _| Ok("NOW_STR()".to_string()));
        self.register(MethodKey::new(DATETIME, "UtcNow", 0), |_, _| Ok("NOW_UTC()".to_string()));
    }

    fn register_enumerable(&mut self) {
        self.register(MethodKey::new(ENUMERABLE, "Contains", 2), |c, r| {
            Ok(format!("({} IN {})", r.render(c.arg(1)?)?, r.render(c.arg(0)?)?))
        });
        self.register(MethodKey::new(ENUMERABLE, "Count", 1), static_function("ARRAY_LENGTH"));
        self.register(MethodKey::new(ENUMERABLE, "Any", 1), |c, r| {
            Ok(format!("(ARRAY_LENGTH({}) > 0)", r.render(c.arg(0)?)?))
        });
        self.register(MethodKey::new(ENUMERABLE, "Any", 2), |c, r| collection_predicate("ANY", c, r));
        self.register(MethodKey::new(ENUMERABLE, "All", 2), |c, r| collection_predicate("EVERY", c, r));
    }

    fn register_n1ql(&mut self) {
        self.register(MethodKey::new(N1QL, "Key", 1), |c, r| Ok(format!("META({}).id", r.render(c.arg(0)?)?)));
        self.register(MethodKey::new(N1QL, "Meta", 1), static_function("META"));
        for (name, test) in [
            ("IsMissing", "IS MISSING"),
            ("IsNotMissing", "IS NOT MISSING"),
            ("IsValued", "IS VALUED"),
            ("IsNotValued", "IS NOT VALUED"),
        ] {
            self.register(MethodKey::new(N1QL, name, 1), move |c, r| {
                Ok(format!("({} {test})", r.render(c.arg(0)?)?))
            });
        }
    }

    #[cfg(feature = "regex")]
    fn register_regex(&mut self) {
        self.register(MethodKey::new(REGEX, "IsMatch", 2), |c, r| {
            if let Expr::Constant(Literal::String(p)) = c.arg(1)? {
                regex::Regex::new(p)
                    .map_err(|e| N1qlError::unsupported(format!("invalid pattern for {}: {e}", c.describe())))?;
            }
            Ok(format!("REGEXP_CONTAINS({}, {})", r.render(c.arg(0)?)?, r.render(c.arg(1)?)?))
        });
    }
}

/// `FUNC(target, args..)`
fn instance_function(func: &'static str) -> impl Fn(&CallNode<'_>, &mut ExprRenderer<'_>) -> Result<String, N1qlError> + Send + Sync + 'static {
    move |c, r| {
        let mut parts = vec![r.render(c.target()?)?];
        for a in c.args {
            parts.push(r.render(a)?);
        }
        Ok(format!("{func}({})", parts.join(", ")))
    }
}

/// `FUNC(args..)`
fn static_function(func: &'static str) -> impl Fn(&CallNode<'_>, &mut ExprRenderer<'_>) -> Result<String, N1qlError> + Send + Sync + 'static {
    move |c, r| {
        let mut parts = Vec::with_capacity(c.args.len());
        for a in c.args {
            parts.push(r.render(a)?);
        }
        Ok(format!("{func}({})", parts.join(", ")))
    }
}

/// `ANY|EVERY p IN arr SATISFIES body END`
fn collection_predicate(keyword: &str, c: &CallNode<'_>, r: &mut ExprRenderer<'_>) -> Result<String, N1qlError> {
    let arr = r.render(c.arg(0)?)?;
    let (p, body) = r.render_lambda(c.arg(1)?)?;
    Ok(format!("{keyword} {p} IN {arr} SATISFIES {body} END"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::n1ql::ast::{MemberRef, MethodRef, ValueKind};
    use crate::n1ql::context::QueryGenerationContext;
    use crate::n1ql::expr::Scope;

    fn field(name: &str) -> Expr {
        Expr::Member {
            target: Box::new(Expr::Source("e".into())),
            member: MemberRef { declaring_type: String::new(), name: name.into() },
            kind: ValueKind::Any,
        }
    }

    fn call(ty: &str, name: &str, target: Option<Expr>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            target: target.map(Box::new),
            method: MethodRef { declaring_type: ty.into(), name: name.into() },
            args,
        }
    }

    fn render(e: &Expr) -> Result<String, N1qlError> {
        let ctx = QueryGenerationContext::default();
        let mut s = Scope::default();
        s.add("e", "Beer");
        ExprRenderer::new(&ctx, &s).render(e)
    }

    fn s(v: &str) -> Expr {
        Expr::Constant(Literal::String(v.into()))
    }

    #[test]
    fn has_value_and_its_negation() {
        let hv = call(NULLABLE, "HasValue", Some(field("Updated")), vec![]);
        assert_eq!(render(&hv).unwrap(), "(`Extent1`.`Updated` IS NOT NULL)");
        let neg = Expr::Not(Box::new(hv));
        assert_eq!(render(&neg).unwrap(), "NOT (`Extent1`.`Updated` IS NOT NULL)");
    }

    #[test]
    fn string_functions() {
        assert_eq!(
            render(&call(STRING, "Contains", Some(field("name")), vec![s("ale")])).unwrap(),
            "(`Extent1`.`name` LIKE '%ale%')"
        );
        assert_eq!(
            render(&call(STRING, "StartsWith", Some(field("name")), vec![s("A")])).unwrap(),
            "(`Extent1`.`name` LIKE 'A%')"
        );
        assert_eq!(
            render(&call(STRING, "Contains", Some(field("name")), vec![field("style")])).unwrap(),
            "CONTAINS(`Extent1`.`name`, `Extent1`.`style`)"
        );
        assert_eq!(render(&call(STRING, "ToUpper", Some(field("name")), vec![])).unwrap(), "UPPER(`Extent1`.`name`)");
        assert_eq!(
            render(&call(STRING, "Substring", Some(field("name")), vec![Expr::Constant(Literal::Int(1)), Expr::Constant(Literal::Int(3))])).unwrap(),
            "SUBSTR(`Extent1`.`name`, 1, 3)"
        );
    }

    #[test]
    fn math_and_dates() {
        assert_eq!(render(&call(MATH, "Abs", None, vec![field("abv")])).unwrap(), "ABS(`Extent1`.`abv`)");
        assert_eq!(
            render(&call(DATETIME, "AddDays", Some(field("Updated")), vec![Expr::Constant(Literal::Int(-1))])).unwrap(),
            "DATE_ADD_STR(`Extent1`.`Updated`, -1, 'day')"
        );
        assert_eq!(render(&call(DATETIME, "Year", Some(field("Updated")), vec![])).unwrap(), "DATE_PART_STR(`Extent1`.`Updated`, 'year')");
    }

    #[test]
    fn array_predicates() {
        let lambda = Expr::Lambda {
            param: "c".into(),
            body: Box::new(Expr::Binary {
                op: crate::n1ql::ast::BinaryOp::Eq,
                left: Box::new(Expr::Param("c".into())),
                right: Box::new(s("stout")),
            }),
        };
        assert_eq!(
            render(&call(ENUMERABLE, "Any", None, vec![field("categories"), lambda])).unwrap(),
            "ANY `c` IN `Extent1`.`categories` SATISFIES (`c` = 'stout') END"
        );
        assert_eq!(
            render(&call(ENUMERABLE, "Contains", None, vec![field("tags"), s("ipa")])).unwrap(),
            "('ipa' IN `Extent1`.`tags`)"
        );
    }

    #[test]
    fn n1ql_helpers() {
        assert_eq!(render(&call(N1QL, "Key", None, vec![Expr::Source("e".into())])).unwrap(), "META(`Extent1`).id");
        assert_eq!(render(&call(N1QL, "IsMissing", None, vec![field("x")])).unwrap(), "(`Extent1`.`x` IS MISSING)");
    }

    #[test]
    fn unregistered_call_names_the_method() {
        let err = render(&call(STRING, "PadLeft", Some(field("name")), vec![Expr::Constant(Literal::Int(3))])).unwrap_err();
        match err {
            N1qlError::CompilationUnsupported(m) => assert!(m.contains("String.PadLeft/1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn custom_registration() {
        let mut reg = MethodCallTranslatorRegistry::with_defaults();
        let before = reg.len();
        reg.register(MethodKey::new(STRING, "PadLeft", 1), |c, r| {
            Ok(format!("LPAD({}, {})", r.render(c.target()?)?, r.render(c.arg(0)?)?))
        });
        assert_eq!(reg.len(), before + 1);
        let mut ctx = QueryGenerationContext::default();
        ctx.method_call_translators = Arc::new(reg);
        let mut sc = Scope::default();
        sc.add("e", "Beer");
        let e = call(STRING, "PadLeft", Some(field("name")), vec![Expr::Constant(Literal::Int(3))]);
        assert_eq!(ExprRenderer::new(&ctx, &sc).render(&e).unwrap(), "LPAD(`Extent1`.`name`, 3)");
    }
}
