use n1qlite::n1ql::format::{escape_identifier, quote_string};
use n1qlite::n1ql::{JoinKind, QueryGenerationContext, lit};
use n1qlite::{Expr, Query, compile};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_escaped_identifier_round_trips(s in "[a-zA-Z0-9_`-]{1,16}") {
        let e = escape_identifier(&s).unwrap();
        prop_assert!(e.starts_with('`') && e.ends_with('`'));
        let inner = &e[1..e.len() - 1];
        prop_assert_eq!(inner.replace("``", "`"), s.clone());
        prop_assert_eq!(inner.matches('`').count(), 2 * s.matches('`').count());
    }

    #[test]
    fn prop_quoted_strings_double_single_quotes(s in "[a-z' ]{0,16}") {
        let q = quote_string(&s);
        prop_assert!(q.starts_with('\'') && q.ends_with('\''));
        prop_assert_eq!(q[1..q.len() - 1].replace("''", "'"), s);
    }

    #[test]
    fn prop_joins_get_aliases_in_declaration_order(n in 1usize..6, limit in 1usize..100) {
        let root = Expr::source("r");
        let mut q = Query::from_bucket("b", "r", "Root");
        for i in 0..n {
            q = q.join_on_keys(JoinKind::Inner, "b", &format!("j{i}"), "Child", root.field(&format!("k{i}")));
        }
        let last = Expr::source(format!("j{}", n - 1));
        let model = q.filter(last.field("x").eq(lit(1))).take(limit).build();
        let ctx = QueryGenerationContext::default();
        let stmt = compile(&model, &ctx).unwrap().statement;
        prop_assert_eq!(&stmt, &compile(&model, &ctx).unwrap().statement);
        for i in 0..n {
            let expected = format!("INNER JOIN `b` as `Extent{}` ON KEYS `Extent1`.`k{i}`", i + 2);
            prop_assert!(stmt.contains(&expected));
        }
        let expected_where = format!("WHERE (`Extent{}`.`x` = 1)", n + 1);
        prop_assert!(stmt.contains(&expected_where));
        let expected_limit = format!("LIMIT {limit}");
        prop_assert!(stmt.ends_with(&expected_limit));
    }
}
