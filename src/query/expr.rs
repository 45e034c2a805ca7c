//! 整数表达式：常量、库所引用与加减乘、取负。
use std::cell::Cell;
use std::fmt;

use itertools::Itertools;

use crate::net::{Net, PlaceId};
use crate::query::{EvalContext, QueryError};

/// 加法与乘法共用的可交换形式：常量部分、直接引用的库所、其余子表达式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commutative {
    pub constant: i64,
    pub places: Vec<PlaceId>,
    pub exprs: Vec<Expr>,
}

impl Commutative {
    fn collect(operands: Vec<Expr>, neutral: i64, fold: fn(i64, i64) -> i64) -> Self {
        let mut constant = neutral;
        let mut places = Vec::new();
        let mut exprs = Vec::new();
        for operand in operands {
            match operand.kind {
                ExprKind::Literal(value) => constant = fold(constant, value),
                ExprKind::Place(place) => places.push(place),
                _ => exprs.push(operand),
            }
        }
        Self {
            constant,
            places,
            exprs,
        }
    }

    /// 非常量操作数个数。
    pub fn operands(&self) -> usize {
        self.places.len() + self.exprs.len()
    }

    fn bind(&mut self, net: &Net) -> Result<(), QueryError> {
        for place in &self.places {
            check_place(*place, net)?;
        }
        let mut remaining = Vec::with_capacity(self.exprs.len());
        for mut expr in self.exprs.drain(..) {
            expr.bind(net)?;
            match expr.kind {
                ExprKind::Place(place) => self.places.push(place),
                _ => remaining.push(expr),
            }
        }
        self.exprs = remaining;
        Ok(())
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, op: &str, neutral: i64) -> fmt::Result {
        let mut parts = Vec::new();
        if self.constant != neutral || self.operands() == 0 {
            parts.push(self.constant.to_string());
        }
        parts.extend(self.places.iter().map(|p| p.to_string()));
        parts.extend(self.exprs.iter().map(|e| e.to_string()));
        write!(f, "({})", parts.iter().join(op))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Literal(i64),
    /// 尚未解析的库所名。
    Named(String),
    Place(PlaceId),
    Plus(Commutative),
    Multiply(Commutative),
    Subtract(Vec<Expr>),
    Minus(Box<Expr>),
}

/// 表达式节点；`value` 缓存最近一次 [`Expr::evaluate_and_set`] 的结果。
#[derive(Clone)]
pub struct Expr {
    pub kind: ExprKind,
    value: Cell<i64>,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Expr {}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Self {
            kind,
            value: Cell::new(0),
        }
    }
}

impl Expr {
    pub fn literal(value: i64) -> Self {
        ExprKind::Literal(value).into()
    }

    pub fn named(name: impl Into<String>) -> Self {
        ExprKind::Named(name.into()).into()
    }

    pub fn place(place: PlaceId) -> Self {
        ExprKind::Place(place).into()
    }

    pub fn plus(operands: Vec<Expr>) -> Self {
        ExprKind::Plus(Commutative::collect(operands, 0, i64::saturating_add)).into()
    }

    pub fn multiply(operands: Vec<Expr>) -> Self {
        ExprKind::Multiply(Commutative::collect(operands, 1, i64::saturating_mul)).into()
    }

    pub fn subtract(operands: Vec<Expr>) -> Self {
        ExprKind::Subtract(operands).into()
    }

    pub fn minus(operand: Expr) -> Self {
        ExprKind::Minus(Box::new(operand)).into()
    }

    /// 最近一次求值缓存的值。
    #[inline]
    pub fn value(&self) -> i64 {
        self.value.get()
    }

    pub fn is_bound(&self) -> bool {
        match &self.kind {
            ExprKind::Named(_) => false,
            ExprKind::Literal(_) | ExprKind::Place(_) => true,
            ExprKind::Plus(c) | ExprKind::Multiply(c) => c.exprs.iter().all(Expr::is_bound),
            ExprKind::Subtract(exprs) => exprs.iter().all(Expr::is_bound),
            ExprKind::Minus(e) => e.is_bound(),
        }
    }

    /// 将库所名解析为编号；已是编号的库所检查是否越界。
    pub fn bind(&mut self, net: &Net) -> Result<(), QueryError> {
        match &mut self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Named(name) => {
                let place = net
                    .place_by_name(name)
                    .ok_or_else(|| QueryError::UnknownPlace(name.clone()))?;
                self.kind = ExprKind::Place(place);
            }
            ExprKind::Place(place) => check_place(*place, net)?,
            ExprKind::Plus(c) | ExprKind::Multiply(c) => c.bind(net)?,
            ExprKind::Subtract(exprs) => {
                for expr in exprs {
                    expr.bind(net)?;
                }
            }
            ExprKind::Minus(e) => e.bind(net)?,
        }
        Ok(())
    }

    /// 求值并把结果写入本节点及所有子节点的缓存。
    pub fn evaluate_and_set(&self, ctx: &EvalContext<'_>) -> i64 {
        let value = match &self.kind {
            ExprKind::Literal(value) => *value,
            ExprKind::Named(name) => {
                panic!("unbound identifier `{name}` reached evaluation")
            }
            ExprKind::Place(place) => tokens(ctx, *place),
            ExprKind::Plus(c) => c
                .places
                .iter()
                .map(|&p| tokens(ctx, p))
                .chain(c.exprs.iter().map(|e| e.evaluate_and_set(ctx)))
                .fold(c.constant, i64::saturating_add),
            ExprKind::Multiply(c) => c
                .places
                .iter()
                .map(|&p| tokens(ctx, p))
                .chain(c.exprs.iter().map(|e| e.evaluate_and_set(ctx)))
                .fold(c.constant, i64::saturating_mul),
            ExprKind::Subtract(exprs) => {
                let mut values = exprs.iter().map(|e| e.evaluate_and_set(ctx));
                let first = values.next().unwrap_or(0);
                values.fold(first, i64::saturating_sub)
            }
            ExprKind::Minus(e) => e.evaluate_and_set(ctx).saturating_neg(),
        };
        self.value.set(value);
        value
    }

    /// 对表达式中出现的每个库所调用 `f`。
    pub fn for_each_place<F: FnMut(PlaceId)>(&self, f: &mut F) {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Named(_) => {}
            ExprKind::Place(place) => f(*place),
            ExprKind::Plus(c) | ExprKind::Multiply(c) => {
                c.places.iter().copied().for_each(&mut *f);
                for e in &c.exprs {
                    e.for_each_place(f);
                }
            }
            ExprKind::Subtract(exprs) => {
                for e in exprs {
                    e.for_each_place(f);
                }
            }
            ExprKind::Minus(e) => e.for_each_place(f),
        }
    }
}

fn tokens(ctx: &EvalContext<'_>, place: PlaceId) -> i64 {
    i64::try_from(ctx.tokens(place)).unwrap_or(i64::MAX)
}

fn check_place(place: PlaceId, net: &Net) -> Result<(), QueryError> {
    if place.raw() as usize >= net.places_len() {
        return Err(QueryError::PlaceOutOfRange {
            place,
            places: net.places_len(),
        });
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(value) => write!(f, "{value}"),
            ExprKind::Named(name) => write!(f, "{name}"),
            ExprKind::Place(place) => write!(f, "{place}"),
            ExprKind::Plus(c) => c.fmt_with(f, " + ", 0),
            ExprKind::Multiply(c) => c.fmt_with(f, " * ", 1),
            ExprKind::Subtract(exprs) => write!(f, "({})", exprs.iter().join(" - ")),
            ExprKind::Minus(e) => write!(f, "-{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Marking, Place};

    fn net() -> Net {
        let mut net = Net::empty();
        net.add_place(Place::new("a", 3));
        net.add_place(Place::new("b", 5));
        net
    }

    #[test]
    fn literals_fold_into_constant() {
        let e = Expr::plus(vec![
            Expr::literal(2),
            Expr::place(PlaceId(0)),
            Expr::literal(3),
        ]);
        let ExprKind::Plus(c) = &e.kind else {
            panic!("expected plus");
        };
        assert_eq!(c.constant, 5);
        assert_eq!(c.places, vec![PlaceId(0)]);
        assert!(c.exprs.is_empty());
        assert_eq!(c.operands(), 1);
    }

    #[test]
    fn bind_moves_resolved_names_into_places() {
        let mut e = Expr::multiply(vec![Expr::named("a"), Expr::named("b"), Expr::literal(2)]);
        assert!(!e.is_bound());
        e.bind(&net()).unwrap();
        assert!(e.is_bound());
        let ExprKind::Multiply(c) = &e.kind else {
            panic!("expected multiply");
        };
        assert_eq!(c.places, vec![PlaceId(0), PlaceId(1)]);
        assert_eq!(c.constant, 2);
    }

    #[test]
    fn unknown_name_fails_to_bind() {
        let mut e = Expr::plus(vec![Expr::named("ghost")]);
        assert_eq!(
            e.bind(&net()),
            Err(QueryError::UnknownPlace("ghost".into()))
        );
        let mut e = Expr::place(PlaceId(7));
        assert!(matches!(
            e.bind(&net()),
            Err(QueryError::PlaceOutOfRange { .. })
        ));
    }

    #[test]
    fn evaluation_caches_every_node() {
        let marking = Marking::from(vec![3, 5]);
        let ctx = EvalContext::marking_only(&marking);
        let inner = Expr::minus(Expr::place(PlaceId(0)));
        let e = Expr::subtract(vec![Expr::place(PlaceId(1)), inner, Expr::literal(1)]);
        assert_eq!(e.evaluate_and_set(&ctx), 5 + 3 - 1);
        assert_eq!(e.value(), 7);
        let ExprKind::Subtract(exprs) = &e.kind else {
            panic!("expected subtract");
        };
        assert_eq!(exprs[1].value(), -3);
    }

    #[test]
    fn display_is_readable() {
        let e = Expr::plus(vec![Expr::named("a"), Expr::literal(1)]);
        assert_eq!(e.to_string(), "(1 + a)");
        let e = Expr::multiply(vec![Expr::place(PlaceId(2)), Expr::place(PlaceId(3))]);
        assert_eq!(e.to_string(), "(p2 * p3)");
    }
}
