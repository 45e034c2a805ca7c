//! 条件节点与三值求值。
//!
//! 每个节点缓存最近一次 [`Condition::evaluate_and_set`] 的结果；
//! 兴趣迁移分析只读取缓存，不重新求值。
use std::cell::Cell;
use std::fmt;

use itertools::Itertools;

use crate::net::{Net, PlaceId, TransitionId, Weight};
use crate::query::expr::Expr;
use crate::query::{EvalContext, QueryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalResult {
    True,
    False,
    #[default]
    Unknown,
}

impl EvalResult {
    pub fn negate(self) -> Self {
        match self {
            EvalResult::True => EvalResult::False,
            EvalResult::False => EvalResult::True,
            EvalResult::Unknown => EvalResult::Unknown,
        }
    }
}

impl From<bool> for EvalResult {
    fn from(value: bool) -> Self {
        if value {
            EvalResult::True
        } else {
            EvalResult::False
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compare {
    pub op: CompareOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

/// `lower <= M[place] <= upper`；`lower == 0` 表示无下界，`upper == Weight::MAX` 表示无上界。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub place: PlaceId,
    pub lower: Weight,
    pub upper: Weight,
}

impl Constraint {
    pub fn holds(&self, tokens: Weight) -> bool {
        self.lower <= tokens && tokens <= self.upper
    }
}

/// 单库所区间约束的合取，可整体取反。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareConjunction {
    pub constraints: Vec<Constraint>,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceRef {
    Named(String),
    Id(PlaceId),
}

impl PlaceRef {
    pub fn id(&self) -> Option<PlaceId> {
        match self {
            PlaceRef::Id(place) => Some(*place),
            PlaceRef::Named(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundedPlace {
    pub place: PlaceRef,
    pub max: Weight,
    maxed_out: Cell<bool>,
}

impl BoundedPlace {
    pub fn new(place: PlaceRef, max: Weight) -> Self {
        Self {
            place,
            max,
            maxed_out: Cell::new(false),
        }
    }

    /// 最近一次求值时该库所是否已达到上限。
    pub fn maxed_out(&self) -> bool {
        self.maxed_out.get()
    }
}

impl PartialEq for BoundedPlace {
    fn eq(&self, other: &Self) -> bool {
        self.place == other.place && self.max == other.max
    }
}

impl Eq for BoundedPlace {}

/// 若干库所 token 总数的上界查询；`bound` 记录迄今观察到的最大和。
#[derive(Debug, Clone)]
pub struct UpperBounds {
    pub places: Vec<BoundedPlace>,
    bound: Cell<Weight>,
}

impl UpperBounds {
    pub fn new(places: Vec<BoundedPlace>) -> Self {
        Self {
            places,
            bound: Cell::new(0),
        }
    }

    pub fn max(&self) -> Weight {
        self.places
            .iter()
            .fold(0, |acc: Weight, p| acc.saturating_add(p.max))
    }

    pub fn bound(&self) -> Weight {
        self.bound.get()
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> EvalResult {
        let mut total: Weight = 0;
        for p in &self.places {
            let tokens = p.place.id().map_or(0, |id| ctx.tokens(id));
            p.maxed_out.set(p.max <= tokens);
            total = total.saturating_add(tokens);
        }
        self.bound.set(self.bound.get().max(total));
        if self.max() <= self.bound.get() {
            EvalResult::True
        } else {
            EvalResult::Unknown
        }
    }
}

impl PartialEq for UpperBounds {
    fn eq(&self, other: &Self) -> bool {
        self.places == other.places
    }
}

impl Eq for UpperBounds {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    A,
    E,
    F,
    G,
    X,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKind {
    Bool(bool),
    Deadlock,
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Compare(Compare),
    Conjunction(CompareConjunction),
    UpperBounds(UpperBounds),
    Temporal(Quantifier, Box<Condition>),
    Until(Box<Condition>, Box<Condition>),
}

#[derive(Clone)]
pub struct Condition {
    pub kind: ConditionKind,
    result: Cell<EvalResult>,
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Condition {}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl From<ConditionKind> for Condition {
    fn from(kind: ConditionKind) -> Self {
        Self {
            kind,
            result: Cell::new(EvalResult::Unknown),
        }
    }
}

impl Condition {
    pub fn boolean(value: bool) -> Self {
        ConditionKind::Bool(value).into()
    }

    pub fn deadlock() -> Self {
        ConditionKind::Deadlock.into()
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(cond: Condition) -> Self {
        ConditionKind::Not(Box::new(cond)).into()
    }

    pub fn and(conds: Vec<Condition>) -> Self {
        ConditionKind::And(conds).into()
    }

    pub fn or(conds: Vec<Condition>) -> Self {
        ConditionKind::Or(conds).into()
    }

    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        ConditionKind::Compare(Compare { op, lhs, rhs }).into()
    }

    pub fn conjunction(constraints: Vec<Constraint>, negated: bool) -> Self {
        ConditionKind::Conjunction(CompareConjunction {
            constraints,
            negated,
        })
        .into()
    }

    pub fn upper_bounds(places: Vec<BoundedPlace>) -> Self {
        ConditionKind::UpperBounds(UpperBounds::new(places)).into()
    }

    pub fn quantified(quantifier: Quantifier, cond: Condition) -> Self {
        ConditionKind::Temporal(quantifier, Box::new(cond)).into()
    }

    pub fn until(hold: Condition, goal: Condition) -> Self {
        ConditionKind::Until(Box::new(hold), Box::new(goal)).into()
    }

    pub fn ef(cond: Condition) -> Self {
        Self::quantified(Quantifier::E, Self::quantified(Quantifier::F, cond))
    }

    pub fn ag(cond: Condition) -> Self {
        Self::quantified(Quantifier::A, Self::quantified(Quantifier::G, cond))
    }

    /// 最近一次求值的缓存结果。
    #[inline]
    pub fn result(&self) -> EvalResult {
        self.result.get()
    }

    /// 仅当缓存结果为 `True`。
    #[inline]
    pub fn is_satisfied(&self) -> bool {
        self.result.get() == EvalResult::True
    }

    pub fn is_temporal(&self) -> bool {
        match &self.kind {
            ConditionKind::Temporal(..) | ConditionKind::Until(..) => true,
            ConditionKind::Not(c) => c.is_temporal(),
            ConditionKind::And(cs) | ConditionKind::Or(cs) => cs.iter().any(Condition::is_temporal),
            _ => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        match &self.kind {
            ConditionKind::Bool(_) | ConditionKind::Deadlock | ConditionKind::Conjunction(_) => true,
            ConditionKind::Not(c) | ConditionKind::Temporal(_, c) => c.is_bound(),
            ConditionKind::And(cs) | ConditionKind::Or(cs) => cs.iter().all(Condition::is_bound),
            ConditionKind::Compare(c) => c.lhs.is_bound() && c.rhs.is_bound(),
            ConditionKind::UpperBounds(u) => u.places.iter().all(|p| p.place.id().is_some()),
            ConditionKind::Until(a, b) => a.is_bound() && b.is_bound(),
        }
    }

    /// 解析所有库所名；失败时条件树可能已部分绑定。
    pub fn bind(&mut self, net: &Net) -> Result<(), QueryError> {
        match &mut self.kind {
            ConditionKind::Bool(_) | ConditionKind::Deadlock => {}
            ConditionKind::Not(c) | ConditionKind::Temporal(_, c) => c.bind(net)?,
            ConditionKind::And(cs) | ConditionKind::Or(cs) => {
                for c in cs {
                    c.bind(net)?;
                }
            }
            ConditionKind::Compare(c) => {
                c.lhs.bind(net)?;
                c.rhs.bind(net)?;
            }
            ConditionKind::Conjunction(c) => {
                for constraint in &c.constraints {
                    if constraint.place.raw() as usize >= net.places_len() {
                        return Err(QueryError::PlaceOutOfRange {
                            place: constraint.place,
                            places: net.places_len(),
                        });
                    }
                }
            }
            ConditionKind::UpperBounds(u) => {
                for p in &mut u.places {
                    let id = match &p.place {
                        PlaceRef::Named(name) => net
                            .place_by_name(name)
                            .ok_or_else(|| QueryError::UnknownPlace(name.clone()))?,
                        PlaceRef::Id(id) => *id,
                    };
                    if id.raw() as usize >= net.places_len() {
                        return Err(QueryError::PlaceOutOfRange {
                            place: id,
                            places: net.places_len(),
                        });
                    }
                    p.place = PlaceRef::Id(id);
                }
            }
            ConditionKind::Until(a, b) => {
                a.bind(net)?;
                b.bind(net)?;
            }
        }
        Ok(())
    }

    /// 在 `ctx` 下求值，并把结果缓存在本节点与全部子节点上。
    ///
    /// `And`/`Or` 不短路：兄弟节点的缓存始终对应当前标识，
    /// 负极性或 `Ltl` 模式的分析会访问它们。
    pub fn evaluate_and_set(&self, ctx: &EvalContext<'_>) -> EvalResult {
        let result = match &self.kind {
            ConditionKind::Bool(value) => EvalResult::from(*value),
            ConditionKind::Deadlock => EvalResult::from(ctx.index().is_some_and(|index| {
                TransitionId::range(index.transitions_len())
                    .all(|t| !index.is_enabled(t, ctx.marking()))
            })),
            ConditionKind::Not(c) => c.evaluate_and_set(ctx).negate(),
            ConditionKind::And(cs) => cs.iter().fold(EvalResult::True, |acc, c| {
                match (acc, c.evaluate_and_set(ctx)) {
                    (EvalResult::False, _) | (_, EvalResult::False) => EvalResult::False,
                    (EvalResult::Unknown, _) | (_, EvalResult::Unknown) => EvalResult::Unknown,
                    _ => EvalResult::True,
                }
            }),
            ConditionKind::Or(cs) => cs.iter().fold(EvalResult::False, |acc, c| {
                match (acc, c.evaluate_and_set(ctx)) {
                    (EvalResult::True, _) | (_, EvalResult::True) => EvalResult::True,
                    (EvalResult::Unknown, _) | (_, EvalResult::Unknown) => EvalResult::Unknown,
                    _ => EvalResult::False,
                }
            }),
            ConditionKind::Compare(c) => {
                let lhs = c.lhs.evaluate_and_set(ctx);
                let rhs = c.rhs.evaluate_and_set(ctx);
                EvalResult::from(c.op.apply(lhs, rhs))
            }
            ConditionKind::Conjunction(c) => {
                let holds = c
                    .constraints
                    .iter()
                    .all(|constraint| constraint.holds(ctx.tokens(constraint.place)));
                EvalResult::from(holds != c.negated)
            }
            ConditionKind::UpperBounds(u) => u.evaluate(ctx),
            ConditionKind::Temporal(quantifier, c) => {
                let inner = c.evaluate_and_set(ctx);
                match quantifier {
                    Quantifier::G if inner == EvalResult::False => EvalResult::False,
                    Quantifier::F if inner == EvalResult::True => EvalResult::True,
                    _ => EvalResult::Unknown,
                }
            }
            ConditionKind::Until(hold, goal) => {
                let goal = goal.evaluate_and_set(ctx);
                let hold = hold.evaluate_and_set(ctx);
                if goal != EvalResult::False {
                    goal
                } else if hold == EvalResult::False {
                    EvalResult::False
                } else {
                    EvalResult::Unknown
                }
            }
        };
        self.result.set(result);
        result
    }

    /// 对条件中出现的每个库所调用 `f`（死锁与上界节点不计入）。
    pub fn for_each_place<F: FnMut(PlaceId)>(&self, f: &mut F) {
        match &self.kind {
            ConditionKind::Bool(_) | ConditionKind::Deadlock | ConditionKind::UpperBounds(_) => {}
            ConditionKind::Not(c) | ConditionKind::Temporal(_, c) => c.for_each_place(f),
            ConditionKind::And(cs) | ConditionKind::Or(cs) => {
                for c in cs {
                    c.for_each_place(f);
                }
            }
            ConditionKind::Compare(c) => {
                c.lhs.for_each_place(f);
                c.rhs.for_each_place(f);
            }
            ConditionKind::Conjunction(c) => {
                for constraint in &c.constraints {
                    f(constraint.place);
                }
            }
            ConditionKind::Until(a, b) => {
                a.for_each_place(f);
                b.for_each_place(f);
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConditionKind::Bool(value) => write!(f, "{value}"),
            ConditionKind::Deadlock => write!(f, "deadlock"),
            ConditionKind::Not(c) => write!(f, "!{c}"),
            ConditionKind::And(cs) => write!(f, "({})", cs.iter().join(" && ")),
            ConditionKind::Or(cs) => write!(f, "({})", cs.iter().join(" || ")),
            ConditionKind::Compare(c) => write!(f, "({} {} {})", c.lhs, c.op.symbol(), c.rhs),
            ConditionKind::Conjunction(c) => {
                let body = c
                    .constraints
                    .iter()
                    .map(|k| match (k.lower, k.upper) {
                        (lower, upper) if lower == upper => format!("{} == {}", k.place, lower),
                        (0, upper) => format!("{} <= {}", k.place, upper),
                        (lower, upper) if upper == Weight::MAX => {
                            format!("{} >= {}", k.place, lower)
                        }
                        (lower, upper) => format!("{} in [{}, {}]", k.place, lower, upper),
                    })
                    .join(" && ");
                if c.negated {
                    write!(f, "!({body})")
                } else {
                    write!(f, "({body})")
                }
            }
            ConditionKind::UpperBounds(u) => {
                let places = u.places.iter().map(|p| match &p.place {
                    PlaceRef::Named(name) => name.clone(),
                    PlaceRef::Id(id) => id.to_string(),
                });
                write!(f, "bounds({})", places.format(", "))
            }
            ConditionKind::Temporal(q, c) => write!(f, "{q:?} {c}"),
            ConditionKind::Until(a, b) => write!(f, "({a} U {b})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Marking, Place, Transition};
    use crate::stubborn::IncidenceIndex;

    fn lt(place: u32, value: i64) -> Condition {
        Condition::compare(
            CompareOp::Lt,
            Expr::place(PlaceId(place)),
            Expr::literal(value),
        )
    }

    #[test]
    fn and_refreshes_every_child() {
        let marking = Marking::from(vec![5, 0]);
        let ctx = EvalContext::marking_only(&marking);
        let cond = Condition::and(vec![lt(1, 1), lt(0, 1), lt(1, 1)]);
        assert_eq!(cond.evaluate_and_set(&ctx), EvalResult::False);
        let ConditionKind::And(cs) = &cond.kind else {
            panic!("expected and");
        };
        assert!(cs[0].is_satisfied());
        assert_eq!(cs[1].result(), EvalResult::False);
        assert!(cs[2].is_satisfied());
    }

    #[test]
    fn or_with_unknown_child() {
        let marking = Marking::from(vec![5, 0]);
        let ctx = EvalContext::marking_only(&marking);
        let cond = Condition::or(vec![
            lt(0, 1),
            Condition::quantified(Quantifier::X, lt(1, 1)),
        ]);
        assert_eq!(cond.evaluate_and_set(&ctx), EvalResult::Unknown);
        assert!(!cond.is_satisfied());
    }

    #[test]
    fn temporal_results() {
        let marking = Marking::from(vec![0, 0]);
        let ctx = EvalContext::marking_only(&marking);
        let f = Condition::quantified(Quantifier::F, lt(0, 1));
        assert_eq!(f.evaluate_and_set(&ctx), EvalResult::True);
        let g = Condition::quantified(Quantifier::G, Condition::not(lt(0, 1)));
        assert_eq!(g.evaluate_and_set(&ctx), EvalResult::False);
        let g = Condition::quantified(Quantifier::G, lt(0, 1));
        assert_eq!(g.evaluate_and_set(&ctx), EvalResult::Unknown);
        let u = Condition::until(Condition::boolean(false), Condition::boolean(false));
        assert_eq!(u.evaluate_and_set(&ctx), EvalResult::False);
        let u = Condition::until(Condition::boolean(true), Condition::boolean(false));
        assert_eq!(u.evaluate_and_set(&ctx), EvalResult::Unknown);
    }

    #[test]
    fn conjunction_respects_bounds_and_negation() {
        let marking = Marking::from(vec![2, 7]);
        let ctx = EvalContext::marking_only(&marking);
        let constraints = vec![
            Constraint {
                place: PlaceId(0),
                lower: 2,
                upper: 2,
            },
            Constraint {
                place: PlaceId(1),
                lower: 0,
                upper: 7,
            },
        ];
        let cond = Condition::conjunction(constraints.clone(), false);
        assert_eq!(cond.evaluate_and_set(&ctx), EvalResult::True);
        let cond = Condition::conjunction(constraints, true);
        assert_eq!(cond.evaluate_and_set(&ctx), EvalResult::False);
    }

    #[test]
    fn deadlock_needs_the_net() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 0));
        let t = net.add_transition(Transition::new("t"));
        net.add_input_arc(p, t, 1);
        let index = IncidenceIndex::build(&net).unwrap();
        let marking = net.initial_marking();
        let dead = Condition::deadlock();
        assert_eq!(
            dead.evaluate_and_set(&EvalContext::new(&marking, &index)),
            EvalResult::True
        );
        assert_eq!(
            dead.evaluate_and_set(&EvalContext::marking_only(&marking)),
            EvalResult::False
        );
    }

    #[test]
    fn upper_bounds_tracks_maxed_out_places() {
        let mut net = Net::empty();
        net.add_place(Place::new("a", 0));
        net.add_place(Place::new("b", 0));
        let mut cond = Condition::upper_bounds(vec![
            BoundedPlace::new(PlaceRef::Named("a".into()), 1),
            BoundedPlace::new(PlaceRef::Named("b".into()), 3),
        ]);
        assert!(!cond.is_bound());
        cond.bind(&net).unwrap();
        assert!(cond.is_bound());
        let marking = Marking::from(vec![1, 2]);
        assert_eq!(
            cond.evaluate_and_set(&EvalContext::marking_only(&marking)),
            EvalResult::Unknown
        );
        let ConditionKind::UpperBounds(u) = &cond.kind else {
            panic!("expected bounds");
        };
        assert!(u.places[0].maxed_out());
        assert!(!u.places[1].maxed_out());
        assert_eq!(u.bound(), 3);
        let marking = Marking::from(vec![1, 3]);
        assert_eq!(
            cond.evaluate_and_set(&EvalContext::marking_only(&marking)),
            EvalResult::True
        );
    }

    #[test]
    fn bind_reports_unknown_place() {
        let net = Net::empty();
        let mut cond = Condition::ef(Condition::compare(
            CompareOp::Ge,
            Expr::named("ghost"),
            Expr::literal(1),
        ));
        assert_eq!(
            cond.bind(&net),
            Err(QueryError::UnknownPlace("ghost".into()))
        );
    }
}
