//! 兴趣迁移分析：沿条件树决定哪些库所的前集/后集必须进入 stubborn 集合。
//!
//! 分析只读取 [`Condition::evaluate_and_set`] 留下的缓存，调用方须先在
//! 当前父标识下求值。表达式按方向（增/减）递归：要让值增大，取库所的
//! 生产者；要让值减小，取其消费者。
use crate::net::{PlaceId, Weight};
use crate::query::{
    Compare, CompareConjunction, CompareOp, Condition, ConditionKind, Expr, ExprKind, Quantifier,
    UpperBounds,
};
use crate::stubborn::set::StubbornSet;

/// 分析模式。
///
/// `Ltl` 下合取/析取的全部子条件都会被访问，原子命题总是按“打破当前值”
/// 的方向取迁移，使所有能改变命题真值的迁移都算作兴趣迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Reachability,
    Ltl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    fn flip(self) -> Self {
        match self {
            Direction::Increase => Direction::Decrease,
            Direction::Decrease => Direction::Increase,
        }
    }
}

pub struct Interesting<'s, 'a> {
    set: &'s mut StubbornSet<'a>,
    mode: Mode,
    negated: bool,
    /// 每次前集/后集请求后立即求闭包。
    close: bool,
}

impl<'s, 'a> Interesting<'s, 'a> {
    pub fn new(set: &'s mut StubbornSet<'a>, mode: Mode, close: bool) -> Self {
        Self {
            set,
            mode,
            negated: false,
            close,
        }
    }

    pub fn negate(&mut self) {
        self.negated = !self.negated;
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn visit(&mut self, cond: &Condition) {
        match &cond.kind {
            ConditionKind::Bool(_) => {}
            ConditionKind::Deadlock => {
                if !cond.is_satisfied() {
                    if let Some(t) = self.set.least_dependent_enabled() {
                        self.set.post_preset_of(t, self.close);
                    }
                }
            }
            ConditionKind::Not(c) => self.visit_negated(c),
            ConditionKind::And(cs) => self.visit_junction(cs, false),
            ConditionKind::Or(cs) => self.visit_junction(cs, true),
            ConditionKind::Compare(c) => {
                let negated = match self.mode {
                    Mode::Reachability => self.negated,
                    Mode::Ltl => cond.is_satisfied(),
                };
                self.compare(c, negated);
            }
            ConditionKind::Conjunction(c) => {
                let neg = match self.mode {
                    Mode::Reachability => self.negated != c.negated,
                    Mode::Ltl => cond.is_satisfied() != c.negated,
                };
                self.conjunction(c, neg);
            }
            ConditionKind::UpperBounds(u) => self.upper_bounds(u),
            ConditionKind::Temporal(Quantifier::G, c) => self.visit_negated(c),
            ConditionKind::Temporal(_, c) => self.visit(c),
            ConditionKind::Until(hold, goal) => {
                self.visit(hold);
                self.visit_negated(hold);
                self.visit(goal);
            }
        }
    }

    fn visit_negated(&mut self, cond: &Condition) {
        self.negate();
        self.visit(cond);
        self.negate();
    }

    /// 正极性的 `And`（或负极性的 `Or`）只需处理一个阻塞子条件。
    fn visit_junction(&mut self, conds: &[Condition], disjunction: bool) {
        if self.mode == Mode::Ltl || self.negated != disjunction {
            for c in conds {
                self.visit(c);
            }
            return;
        }
        // disjunction 为真时处于负极性：找第一个成立的子条件
        if let Some(c) = conds.iter().find(|c| c.is_satisfied() == disjunction) {
            self.visit(c);
        }
    }

    fn compare(&mut self, c: &Compare, negated: bool) {
        let op = if negated { negate(c.op) } else { c.op };
        let (lhs, rhs) = (c.lhs.value(), c.rhs.value());
        if op.apply(lhs, rhs) {
            return;
        }
        match op {
            CompareOp::Lt | CompareOp::Le => {
                self.expr(&c.lhs, Direction::Decrease);
                self.expr(&c.rhs, Direction::Increase);
            }
            CompareOp::Gt | CompareOp::Ge => {
                self.expr(&c.lhs, Direction::Increase);
                self.expr(&c.rhs, Direction::Decrease);
            }
            CompareOp::Eq if lhs > rhs => {
                self.expr(&c.lhs, Direction::Decrease);
                self.expr(&c.rhs, Direction::Increase);
            }
            CompareOp::Eq => {
                self.expr(&c.lhs, Direction::Increase);
                self.expr(&c.rhs, Direction::Decrease);
            }
            CompareOp::Ne => {
                self.expr(&c.lhs, Direction::Increase);
                self.expr(&c.lhs, Direction::Decrease);
                self.expr(&c.rhs, Direction::Increase);
                self.expr(&c.rhs, Direction::Decrease);
            }
        }
    }

    /// `neg` 为假时要让合取成立：只挑一个不满足的约束作为候选，最后统一加入；
    /// 若某轮结束时候选库所的对应集合已经处理过，整个节点直接结束。
    /// `neg` 为真时要让合取不成立：任何当前满足的约束都可能被打破。
    fn conjunction(&mut self, c: &CompareConjunction, neg: bool) {
        let mut candidate: Option<(PlaceId, bool)> = None;
        for k in &c.constraints {
            let tokens = self.set.parent()[k.place];
            if k.lower == k.upper {
                if neg {
                    if tokens != k.lower {
                        continue;
                    }
                    self.set.postset_of(k.place, self.close);
                    self.set.preset_of(k.place, self.close);
                } else {
                    if tokens == k.lower {
                        continue;
                    }
                    candidate = Some((k.place, tokens < k.lower));
                }
            } else if !neg {
                if tokens < k.lower && k.lower != 0 {
                    candidate = Some((k.place, true));
                }
                if tokens > k.upper && k.upper != Weight::MAX {
                    candidate = Some((k.place, false));
                }
            } else {
                if tokens >= k.lower && k.lower != 0 {
                    self.set.postset_of(k.place, self.close);
                }
                if tokens <= k.upper && k.upper != Weight::MAX {
                    self.set.preset_of(k.place, self.close);
                }
            }
            if let Some((place, pre)) = candidate {
                let seen = if pre {
                    self.set.seen_pre(place)
                } else {
                    self.set.seen_post(place)
                };
                if seen {
                    return;
                }
            }
        }
        match candidate {
            Some((place, true)) => self.set.preset_of(place, self.close),
            Some((place, false)) => self.set.postset_of(place, self.close),
            None => {}
        }
    }

    fn upper_bounds(&mut self, u: &UpperBounds) {
        for p in &u.places {
            if p.maxed_out() {
                continue;
            }
            let Some(place) = p.place.id() else {
                panic!("unbound place {:?} reached the interesting-transition analysis", p.place);
            };
            self.set.preset_of(place, false);
        }
    }

    fn touch(&mut self, place: PlaceId, direction: Direction) {
        match direction {
            Direction::Increase => self.set.preset_of(place, self.close),
            Direction::Decrease => self.set.postset_of(place, self.close),
        }
    }

    fn expr(&mut self, expr: &Expr, direction: Direction) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Named(name) => {
                panic!("unbound identifier `{name}` reached the interesting-transition analysis")
            }
            ExprKind::Place(place) => self.touch(*place, direction),
            ExprKind::Plus(c) => {
                for &place in &c.places {
                    self.touch(place, direction);
                }
                for e in &c.exprs {
                    self.expr(e, direction);
                }
            }
            ExprKind::Multiply(c) if c.operands() == 1 => {
                for &place in &c.places {
                    self.touch(place, direction);
                }
                for e in &c.exprs {
                    self.expr(e, direction);
                }
            }
            // 乘积的符号未知，两个方向都要
            ExprKind::Multiply(c) => {
                for &place in &c.places {
                    self.touch(place, Direction::Increase);
                    self.touch(place, Direction::Decrease);
                }
                for e in &c.exprs {
                    self.expr(e, Direction::Increase);
                    self.expr(e, Direction::Decrease);
                }
            }
            ExprKind::Subtract(exprs) => {
                let mut exprs = exprs.iter();
                if let Some(first) = exprs.next() {
                    self.expr(first, direction);
                }
                for e in exprs {
                    self.expr(e, direction.flip());
                }
            }
            ExprKind::Minus(e) => self.expr(e, direction.flip()),
        }
    }
}

fn negate(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Ge,
        CompareOp::Le => CompareOp::Gt,
        CompareOp::Gt => CompareOp::Le,
        CompareOp::Ge => CompareOp::Lt,
        CompareOp::Eq => CompareOp::Ne,
        CompareOp::Ne => CompareOp::Eq,
    }
}
