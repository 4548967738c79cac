//! Selector extraction from PromQL expression trees.

use std::collections::HashSet;

use promql_parser::parser::Expr;

use crate::domain::Selector;

/// Distinct vector selectors referenced by `expr`, in first-seen order.
///
/// Offsets and `@` modifiers are dropped; selectors that only differ by
/// them, or by matcher order, are returned once.
pub fn extract_selectors(expr: &Expr) -> Vec<Selector> {
    let mut seen = HashSet::new();
    let mut selectors = Vec::new();
    walk(expr, &mut |selector| {
        if seen.insert(selector.to_string()) {
            selectors.push(selector);
        }
    });
    selectors
}

fn walk(expr: &Expr, visit: &mut dyn FnMut(Selector)) {
    match expr {
        Expr::VectorSelector(vs) => {
            for selector in Selector::from_vector_selector(vs) {
                visit(selector);
            }
        }
        Expr::MatrixSelector(ms) => {
            for selector in Selector::from_vector_selector(&ms.vs) {
                visit(selector);
            }
        }
        Expr::Aggregate(agg) => {
            walk(&agg.expr, visit);
            if let Some(param) = &agg.param {
                walk(param, visit);
            }
        }
        Expr::Binary(b) => {
            walk(&b.lhs, visit);
            walk(&b.rhs, visit);
        }
        Expr::Unary(u) => walk(&u.expr, visit),
        Expr::Paren(p) => walk(&p.expr, visit),
        Expr::Subquery(sq) => walk(&sq.expr, visit),
        Expr::Call(call) => {
            for arg in &call.args.args {
                walk(arg, visit);
            }
        }
        Expr::NumberLiteral(_) | Expr::StringLiteral(_) | Expr::Extension(_) => {}
    }
}
