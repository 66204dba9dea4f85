//! Fluent construction of `QueryModel`s and expressions.
//!
//! ```
//! use n1qlite::n1ql::{Query, Expr, compile, QueryGenerationContext};
//! let e = Expr::source("e");
//! let model = Query::from_bucket("default", "e", "Beer")
//!     .filter(e.field("Updated").has_value())
//!     .select(Expr::object([("Updated", e.field("Updated"))]))
//!     .build();
//! let q = compile(&model, &QueryGenerationContext::default()).unwrap();
//! assert_eq!(
//!     q.statement,
//!     "SELECT `Extent1`.`Updated` as `Updated` FROM `default` as `Extent1` WHERE (`Extent1`.`Updated` IS NOT NULL)"
//! );
//! ```

use super::ast::{
    AggregateFn, BinaryOp, BodyClause, Direction, Expr, FromSource, JoinClause, JoinCondition,
    JoinKind, Literal, MainFromClause, MemberRef, MethodRef, Ordering, Projection, QueryModel,
    ResultOperator, ValueKind,
};
use super::methods::{DATETIME, ENUMERABLE, N1QL, NULLABLE, STRING};
use chrono::{DateTime, Utc};

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}
impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}
impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
impl From<DateTime<Utc>> for Literal {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

/// Constant expression.
pub fn lit(v: impl Into<Literal>) -> Expr {
    Expr::Constant(v.into())
}

#[must_use]
pub const fn null() -> Expr {
    Expr::Constant(Literal::Null)
}

impl Expr {
    pub fn source(item_name: impl Into<String>) -> Self {
        Self::Source(item_name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    /// Member whose declaring type is taken from the source it hangs off.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        self.member_of_kind("", name, ValueKind::Any)
    }

    /// Date-time member; comparisons against it are canonicalized.
    #[must_use]
    pub fn date_field(&self, name: &str) -> Self {
        self.member_of_kind("", name, ValueKind::DateTime)
    }

    #[must_use]
    pub fn member(&self, declaring_type: &str, name: &str) -> Self {
        self.member_of_kind(declaring_type, name, ValueKind::Any)
    }

    #[must_use]
    pub fn member_of_kind(&self, declaring_type: &str, name: &str, kind: ValueKind) -> Self {
        Self::Member {
            target: Box::new(self.clone()),
            member: MemberRef { declaring_type: declaring_type.to_string(), name: name.to_string() },
            kind,
        }
    }

    fn binary(self, op: BinaryOp, rhs: Self) -> Self {
        Self::Binary { op, left: Box::new(self), right: Box::new(rhs) }
    }

    #[must_use]
    pub fn eq(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }
    #[must_use]
    pub fn ne(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }
    #[must_use]
    pub fn lt(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }
    #[must_use]
    pub fn le(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }
    #[must_use]
    pub fn gt(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }
    #[must_use]
    pub fn ge(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }
    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        self.binary(BinaryOp::And, rhs)
    }
    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }
    #[must_use]
    pub fn add(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }
    #[must_use]
    pub fn sub(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }
    #[must_use]
    pub fn mul(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }
    #[must_use]
    pub fn div(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }
    #[must_use]
    pub fn concat(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Concat, rhs)
    }
    #[must_use]
    pub fn coalesce(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Coalesce, rhs)
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Negate(Box::new(self))
    }

    /// Instance call on `self`.
    #[must_use]
    pub fn call(self, declaring_type: &str, name: &str, args: Vec<Self>) -> Self {
        Self::Call {
            target: Some(Box::new(self)),
            method: MethodRef { declaring_type: declaring_type.to_string(), name: name.to_string() },
            args,
        }
    }

    /// Static call.
    #[must_use]
    pub fn call_static(declaring_type: &str, name: &str, args: Vec<Self>) -> Self {
        Self::Call {
            target: None,
            method: MethodRef { declaring_type: declaring_type.to_string(), name: name.to_string() },
            args,
        }
    }

    #[must_use]
    pub fn has_value(self) -> Self {
        self.call(NULLABLE, "HasValue", Vec::new())
    }

    #[must_use]
    pub fn value(self) -> Self {
        self.call(NULLABLE, "Value", Vec::new())
    }

    #[must_use]
    pub fn get_value_or_default(self, fallback: Self) -> Self {
        self.call(NULLABLE, "GetValueOrDefault", vec![fallback])
    }

    #[must_use]
    pub fn contains(self, needle: Self) -> Self {
        self.call(STRING, "Contains", vec![needle])
    }

    #[must_use]
    pub fn starts_with(self, prefix: Self) -> Self {
        self.call(STRING, "StartsWith", vec![prefix])
    }

    #[must_use]
    pub fn ends_with(self, suffix: Self) -> Self {
        self.call(STRING, "EndsWith", vec![suffix])
    }

    #[must_use]
    pub fn to_upper(self) -> Self {
        self.call(STRING, "ToUpper", Vec::new())
    }

    #[must_use]
    pub fn to_lower(self) -> Self {
        self.call(STRING, "ToLower", Vec::new())
    }

    #[must_use]
    pub fn add_days(self, days: Self) -> Self {
        self.call(DATETIME, "AddDays", vec![days])
    }

    /// `ANY param IN self SATISFIES body END`
    #[must_use]
    pub fn any_satisfies(self, param: &str, body: Self) -> Self {
        Self::call_static(ENUMERABLE, "Any", vec![self, Self::lambda(param, body)])
    }

    /// `EVERY param IN self SATISFIES body END`
    #[must_use]
    pub fn all_satisfy(self, param: &str, body: Self) -> Self {
        Self::call_static(ENUMERABLE, "All", vec![self, Self::lambda(param, body)])
    }

    /// `value IN self`
    #[must_use]
    pub fn includes(self, value: Self) -> Self {
        Self::call_static(ENUMERABLE, "Contains", vec![self, value])
    }

    /// `META(self).id`
    #[must_use]
    pub fn key(self) -> Self {
        Self::call_static(N1QL, "Key", vec![self])
    }

    #[must_use]
    pub fn is_missing(self) -> Self {
        Self::call_static(N1QL, "IsMissing", vec![self])
    }

    #[must_use]
    pub fn lambda(param: &str, body: Self) -> Self {
        Self::Lambda { param: param.to_string(), body: Box::new(body) }
    }

    #[must_use]
    pub fn conditional(test: Self, if_true: Self, if_false: Self) -> Self {
        Self::Conditional { test: Box::new(test), if_true: Box::new(if_true), if_false: Box::new(if_false) }
    }

    pub fn object<'a>(members: impl IntoIterator<Item = (&'a str, Self)>) -> Self {
        Self::New(
            members
                .into_iter()
                .map(|(name, expr)| Projection { name: name.to_string(), expr })
                .collect(),
        )
    }

    #[must_use]
    pub fn aggregate(func: AggregateFn, arg: Option<Self>) -> Self {
        Self::Aggregate { func, arg: arg.map(Box::new), distinct: false }
    }
}

/// Builder for a `QueryModel`. Clauses are recorded in call order; the select defaults to
/// the main item itself.
#[derive(Debug, Clone)]
pub struct Query {
    main_from: MainFromClause,
    body: Vec<BodyClause>,
    select: Option<Expr>,
    ops: Vec<ResultOperator>,
}

impl Query {
    /// Query over the bucket the executing context is configured with.
    #[must_use]
    pub fn from_default(item_name: &str, item_type: &str) -> Self {
        Self::with_source(FromSource::Default, item_name, item_type)
    }

    /// Query over the default bucket with `T` as the item type.
    #[must_use]
    pub fn of<T: crate::document::Document>(item_name: &str) -> Self {
        Self::from_default(item_name, T::type_name())
    }

    #[must_use]
    pub fn from_bucket(bucket: &str, item_name: &str, item_type: &str) -> Self {
        Self::with_source(FromSource::Bucket(bucket.to_string()), item_name, item_type)
    }

    fn with_source(source: FromSource, item_name: &str, item_type: &str) -> Self {
        Self {
            main_from: MainFromClause {
                item_name: item_name.to_string(),
                item_type: item_type.to_string(),
                source,
                use_keys: None,
            },
            body: Vec::new(),
            select: None,
            ops: Vec::new(),
        }
    }

    /// Expression referring to the main item.
    #[must_use]
    pub fn item(&self) -> Expr {
        Expr::Source(self.main_from.item_name.clone())
    }

    #[must_use]
    pub fn use_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.main_from.use_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.body.push(BodyClause::Where(predicate));
        self
    }

    #[must_use]
    pub fn order_by(mut self, expr: Expr, direction: Direction) -> Self {
        self.body.push(BodyClause::OrderBy(vec![Ordering { expr, direction }]));
        self
    }

    /// Secondary ordering appended to the most recent order-by clause.
    #[must_use]
    pub fn then_by(mut self, expr: Expr, direction: Direction) -> Self {
        match self.body.last_mut() {
            Some(BodyClause::OrderBy(list)) => list.push(Ordering { expr, direction }),
            _ => self.body.push(BodyClause::OrderBy(vec![Ordering { expr, direction }])),
        }
        self
    }

    #[must_use]
    pub fn join_on_keys(mut self, kind: JoinKind, bucket: &str, item_name: &str, item_type: &str, keys: Expr) -> Self {
        self.body.push(BodyClause::Join(JoinClause {
            item_name: item_name.to_string(),
            item_type: item_type.to_string(),
            bucket: bucket.to_string(),
            kind,
            condition: JoinCondition::OnKeys(keys),
        }));
        self
    }

    #[must_use]
    pub fn join_on(mut self, kind: JoinKind, bucket: &str, item_name: &str, item_type: &str, left: Expr, right: Expr) -> Self {
        self.body.push(BodyClause::Join(JoinClause {
            item_name: item_name.to_string(),
            item_type: item_type.to_string(),
            bucket: bucket.to_string(),
            kind,
            condition: JoinCondition::On { left, right },
        }));
        self
    }

    #[must_use]
    pub fn unnest(mut self, array: Expr, item_name: &str, outer: bool) -> Self {
        self.body.push(BodyClause::Unnest { item_name: item_name.to_string(), item_type: String::new(), array, outer });
        self
    }

    #[must_use]
    pub fn group_by(mut self, keys: Vec<Expr>) -> Self {
        self.body.push(BodyClause::GroupBy(keys));
        self
    }

    #[must_use]
    pub fn select(mut self, projection: Expr) -> Self {
        self.select = Some(projection);
        self
    }

    #[must_use]
    pub fn result_operator(mut self, op: ResultOperator) -> Self {
        self.ops.push(op);
        self
    }

    #[must_use]
    pub fn take(self, n: usize) -> Self {
        self.result_operator(ResultOperator::Take(n))
    }
    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        self.result_operator(ResultOperator::Skip(n))
    }
    #[must_use]
    pub fn distinct(self) -> Self {
        self.result_operator(ResultOperator::Distinct)
    }
    #[must_use]
    pub fn any(self) -> Self {
        self.result_operator(ResultOperator::Any)
    }
    #[must_use]
    pub fn all(self, predicate: Expr) -> Self {
        self.result_operator(ResultOperator::All(predicate))
    }
    #[must_use]
    pub fn count(self) -> Self {
        self.result_operator(ResultOperator::Count)
    }
    #[must_use]
    pub fn first(self) -> Self {
        self.result_operator(ResultOperator::First { or_default: false })
    }
    #[must_use]
    pub fn first_or_default(self) -> Self {
        self.result_operator(ResultOperator::First { or_default: true })
    }
    #[must_use]
    pub fn single(self) -> Self {
        self.result_operator(ResultOperator::Single { or_default: false })
    }
    #[must_use]
    pub fn explain(self) -> Self {
        self.result_operator(ResultOperator::Explain)
    }

    #[must_use]
    pub fn build(self) -> QueryModel {
        let select = self.select.unwrap_or_else(|| Expr::Source(self.main_from.item_name.clone()));
        QueryModel { main_from: self.main_from, body: self.body, select, result_operators: self.ops }
    }
}
