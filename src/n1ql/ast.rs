//! Generic intermediate query representation.
//!
//! A `QueryModel` is built once by the caller (usually through `builder::Query`) and is
//! only read by the compiler. Everything derives serde so models can also be loaded from
//! JSON files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static type hint carried by members. Only `DateTime` changes code generation today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Any,
    String,
    Number,
    Bool,
    DateTime,
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Vec<Literal>),
}

impl Literal {
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Any,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) | Self::Float(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Array(_) => ValueKind::Array,
        }
    }
}

/// A field or property, named the way the host model names it.
/// An empty `declaring_type` is filled in from the query source the member hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    #[serde(default)]
    pub declaring_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub declaring_type: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Coalesce,
}

impl BinaryOp {
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Concat => "||",
            Self::Coalesce => "IFMISSINGORNULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Constant(Literal),
    /// Reference to a query source (main from, join, unnest) by item name.
    Source(String),
    /// Lambda parameter, only meaningful inside the body of a `Lambda`.
    Param(String),
    Member {
        target: Box<Expr>,
        member: MemberRef,
        #[serde(default)]
        kind: ValueKind,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Call {
        #[serde(default)]
        target: Option<Box<Expr>>,
        method: MethodRef,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Lambda {
        param: String,
        body: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Object construction; in a select clause each member becomes a named column.
    New(Vec<Projection>),
    Aggregate {
        func: AggregateFn,
        #[serde(default)]
        arg: Option<Box<Expr>>,
        #[serde(default)]
        distinct: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromSource {
    /// The bucket configured on the context.
    Default,
    Bucket(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainFromClause {
    pub item_name: String,
    pub item_type: String,
    pub source: FromSource,
    #[serde(default)]
    pub use_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub expr: Expr,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Nest,
    LeftOuterNest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinCondition {
    /// Right side looked up by document key.
    OnKeys(Expr),
    On { left: Expr, right: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub item_name: String,
    pub item_type: String,
    pub bucket: String,
    pub kind: JoinKind,
    pub condition: JoinCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyClause {
    Where(Expr),
    OrderBy(Vec<Ordering>),
    Join(JoinClause),
    Unnest {
        item_name: String,
        #[serde(default)]
        item_type: String,
        array: Expr,
        #[serde(default)]
        outer: bool,
    },
    GroupBy(Vec<Expr>),
}

impl BodyClause {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Where(_) => "Where",
            Self::OrderBy(_) => "OrderBy",
            Self::Join(_) => "Join",
            Self::Unnest { .. } => "Unnest",
            Self::GroupBy(_) => "GroupBy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOperator {
    Take(usize),
    Skip(usize),
    Distinct,
    Any,
    All(Expr),
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
    First {
        #[serde(default)]
        or_default: bool,
    },
    Single {
        #[serde(default)]
        or_default: bool,
    },
    Last {
        #[serde(default)]
        or_default: bool,
    },
    Reverse,
    Explain,
}

impl ResultOperator {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Take(_) => "Take",
            Self::Skip(_) => "Skip",
            Self::Distinct => "Distinct",
            Self::Any => "Any",
            Self::All(_) => "All",
            Self::Count => "Count",
            Self::LongCount => "LongCount",
            Self::Sum => "Sum",
            Self::Average => "Average",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::First { .. } => "First",
            Self::Single { .. } => "Single",
            Self::Last { .. } => "Last",
            Self::Reverse => "Reverse",
            Self::Explain => "Explain",
        }
    }

    /// Operators after which rows no longer have the shape of the selected item.
    #[must_use]
    pub const fn changes_row_shape(&self) -> bool {
        matches!(
            self,
            Self::Any
                | Self::All(_)
                | Self::Count
                | Self::LongCount
                | Self::Sum
                | Self::Average
                | Self::Min
                | Self::Max
                | Self::Explain
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryModel {
    pub main_from: MainFromClause,
    #[serde(default)]
    pub body: Vec<BodyClause>,
    pub select: Expr,
    #[serde(default)]
    pub result_operators: Vec<ResultOperator>,
}

impl QueryModel {
    #[must_use]
    pub fn root_item_type(&self) -> &str {
        &self.main_from.item_type
    }

    /// True when each returned row is a whole root document (possibly wrapped by
    /// First/Single), so it can be written back to the store.
    #[must_use]
    pub fn projects_root_item(&self) -> bool {
        matches!(&self.select, Expr::Source(name) if *name == self.main_from.item_name)
            && !self.result_operators.iter().any(ResultOperator::changes_row_shape)
            && !self.body.iter().any(|c| matches!(c, BodyClause::GroupBy(_)))
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
