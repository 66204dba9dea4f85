//! Query translation: AST, builder, formatting, name resolution, method translators and
//! the model visitor producing N1QL text.

pub mod ast;
pub mod builder;
pub mod context;
pub mod expr;
pub mod format;
pub mod methods;
pub mod naming;
pub mod visitor;

pub use ast::{
    AggregateFn, BinaryOp, BodyClause, Direction, Expr, FromSource, JoinClause, JoinCondition,
    JoinKind, Literal, MainFromClause, MemberRef, MethodRef, Ordering, Projection, QueryModel,
    ResultOperator, ValueKind,
};
pub use builder::{Query, lit, null};
pub use context::QueryGenerationContext;
pub use methods::{MethodCallTranslatorRegistry, MethodKey, Translator};
pub use naming::{MemberNameResolver, NamingConvention};
pub use visitor::{CompiledQuery, DOCUMENT_KEY_COLUMN, RESULT_COLUMN, ResultShape, compile};
