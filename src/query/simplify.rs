//! 把“库所 ⋈ 常量”比较组成的合取/析取折叠成 [`CompareConjunction`](crate::query::CompareConjunction)。
use std::collections::BTreeMap;

use crate::net::{PlaceId, Weight};
use crate::query::{CompareOp, Condition, ConditionKind, Constraint, Expr, ExprKind};

/// 自底向上改写：
/// * `And` 的子条件全部可表示为单库所区间时，折叠为一个合取；
/// * `Or` 的子条件取反后全部可表示时，折叠为取反的合取。
///
/// 同一库所的多个区间取交集；交集为空时保留原节点。需要在 `bind` 之后调用。
pub fn fold_conjunctions(cond: Condition) -> Condition {
    let kind = match cond.kind {
        ConditionKind::Not(c) => ConditionKind::Not(Box::new(fold_conjunctions(*c))),
        ConditionKind::And(cs) => {
            let cs: Vec<_> = cs.into_iter().map(fold_conjunctions).collect();
            match merge(&cs, false) {
                Some(constraints) => return Condition::conjunction(constraints, false),
                None => ConditionKind::And(cs),
            }
        }
        ConditionKind::Or(cs) => {
            let cs: Vec<_> = cs.into_iter().map(fold_conjunctions).collect();
            match merge(&cs, true) {
                Some(constraints) => return Condition::conjunction(constraints, true),
                None => ConditionKind::Or(cs),
            }
        }
        ConditionKind::Temporal(q, c) => ConditionKind::Temporal(q, Box::new(fold_conjunctions(*c))),
        ConditionKind::Until(a, b) => ConditionKind::Until(
            Box::new(fold_conjunctions(*a)),
            Box::new(fold_conjunctions(*b)),
        ),
        other => other,
    };
    kind.into()
}

fn merge(conds: &[Condition], negate: bool) -> Option<Vec<Constraint>> {
    if conds.len() < 2 {
        return None;
    }
    let mut bounds: BTreeMap<PlaceId, (Weight, Weight)> = BTreeMap::new();
    for cond in conds {
        let ConditionKind::Compare(compare) = &cond.kind else {
            return None;
        };
        let (place, op, value) = atom(compare.op, &compare.lhs, &compare.rhs)?;
        let op = if negate { negate_op(op) } else { op };
        let (lower, upper) = interval(op, value)?;
        let entry = bounds.entry(place).or_insert((0, Weight::MAX));
        entry.0 = entry.0.max(lower);
        entry.1 = entry.1.min(upper);
        if entry.0 > entry.1 {
            return None;
        }
    }
    Some(
        bounds
            .into_iter()
            .map(|(place, (lower, upper))| Constraint {
                place,
                lower,
                upper,
            })
            .collect(),
    )
}

/// 规范化为 `place op value`。
fn atom(op: CompareOp, lhs: &Expr, rhs: &Expr) -> Option<(PlaceId, CompareOp, i64)> {
    match (&lhs.kind, &rhs.kind) {
        (ExprKind::Place(place), ExprKind::Literal(value)) => Some((*place, op, *value)),
        (ExprKind::Literal(value), ExprKind::Place(place)) => Some((*place, mirror(op), *value)),
        _ => None,
    }
}

fn mirror(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        CompareOp::Eq | CompareOp::Ne => op,
    }
}

fn negate_op(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Ge,
        CompareOp::Le => CompareOp::Gt,
        CompareOp::Gt => CompareOp::Le,
        CompareOp::Ge => CompareOp::Lt,
        CompareOp::Eq => CompareOp::Ne,
        CompareOp::Ne => CompareOp::Eq,
    }
}

fn interval(op: CompareOp, value: i64) -> Option<(Weight, Weight)> {
    let clamp = |v: i64| Weight::try_from(v.max(0)).ok();
    match op {
        CompareOp::Lt if value > 0 => Some((0, clamp(value - 1)?)),
        CompareOp::Le if value >= 0 => Some((0, clamp(value)?)),
        CompareOp::Gt => Some((clamp(value.saturating_add(1))?, Weight::MAX)),
        CompareOp::Ge => Some((clamp(value)?, Weight::MAX)),
        CompareOp::Eq if value >= 0 => {
            let v = clamp(value)?;
            Some((v, v))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Marking;
    use crate::query::{EvalContext, EvalResult};

    fn cmp(op: CompareOp, place: u32, value: i64) -> Condition {
        Condition::compare(op, Expr::place(PlaceId(place)), Expr::literal(value))
    }

    #[test]
    fn conjunction_of_bounds_is_folded() {
        let cond = Condition::and(vec![
            cmp(CompareOp::Ge, 0, 2),
            cmp(CompareOp::Lt, 1, 4),
            Condition::compare(CompareOp::Gt, Expr::literal(5), Expr::place(PlaceId(0))),
        ]);
        let folded = fold_conjunctions(cond);
        assert_eq!(
            folded,
            Condition::conjunction(
                vec![
                    Constraint {
                        place: PlaceId(0),
                        lower: 2,
                        upper: 4
                    },
                    Constraint {
                        place: PlaceId(1),
                        lower: 0,
                        upper: 3
                    },
                ],
                false
            )
        );
    }

    #[test]
    fn disjunction_becomes_negated_conjunction() {
        let cond = Condition::or(vec![cmp(CompareOp::Lt, 0, 1), cmp(CompareOp::Ne, 1, 2)]);
        let folded = fold_conjunctions(cond.clone());
        let ConditionKind::Conjunction(c) = &folded.kind else {
            panic!("expected conjunction, got {folded:?}");
        };
        assert!(c.negated);
        for tokens in [vec![0, 2], vec![1, 2], vec![1, 3], vec![0, 0]] {
            let marking = Marking::from(tokens);
            let ctx = EvalContext::marking_only(&marking);
            assert_eq!(cond.evaluate_and_set(&ctx), folded.evaluate_and_set(&ctx));
        }
    }

    #[test]
    fn non_atomic_children_are_left_alone() {
        let cond = Condition::and(vec![
            cmp(CompareOp::Ge, 0, 1),
            Condition::compare(
                CompareOp::Ge,
                Expr::plus(vec![Expr::place(PlaceId(0)), Expr::place(PlaceId(1))]),
                Expr::literal(1),
            ),
        ]);
        let folded = fold_conjunctions(cond.clone());
        assert_eq!(folded, cond);
        let empty = Condition::and(vec![cmp(CompareOp::Ge, 0, 3), cmp(CompareOp::Lt, 0, 2)]);
        assert!(matches!(fold_conjunctions(empty).kind, ConditionKind::And(_)));
        let marking = Marking::from(vec![0, 0]);
        let ctx = EvalContext::marking_only(&marking);
        assert_eq!(cond.evaluate_and_set(&ctx), EvalResult::False);
    }
}
