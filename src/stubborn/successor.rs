//! 后继迭代器：`prepare` 一个父标识，然后反复 `next` 取出后继标识。
//!
//! ```text
//! Idle ──prepare──▶ Prepared ──next──▶ Iterating ──next = false──▶ Exhausted
//!                      ▲                                              │
//!                      └──────────────────prepare─────────────────────┘
//! ```
//! `reset` 在任何位置都直接进入 `Exhausted`。
use crate::net::{IndexVec, Marking, Net, TransitionId};
use crate::query::{Condition, EvalContext};
use crate::stubborn::index::IncidenceIndex;
use crate::stubborn::interesting::{Interesting, Mode};
use crate::stubborn::set::{Polarity, StubbornSet};
use crate::stubborn::strategy::{ReductionError, ReductionKind, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Prepared,
    Iterating,
    Exhausted,
}

/// 搜索驱动使用的后继生成接口。
pub trait Successors {
    fn prepare(&mut self, marking: &Marking);

    /// 把下一个后继写入 `out`（长度须为库所数），没有更多后继时返回 `false`。
    fn next(&mut self, out: &mut Marking) -> bool;

    fn fired(&self) -> Option<TransitionId>;

    fn reset(&mut self);
}

pub struct ReducedSuccessors<'a> {
    net: &'a Net,
    index: &'a IncidenceIndex,
    set: StubbornSet<'a>,
    strategy: Strategy,
    queries: Vec<Condition>,
    close_each: bool,
    accepting: bool,
    phase: Phase,
    fired: Option<TransitionId>,
    /// 本次 `prepare` 以来已经产出过的迁移。
    yielded: IndexVec<TransitionId, bool>,
}

impl<'a> ReducedSuccessors<'a> {
    /// 绑定查询中的库所名并检查约简变体是否适用于该网。
    pub fn new(
        net: &'a Net,
        index: &'a IncidenceIndex,
        kind: ReductionKind,
        mut queries: Vec<Condition>,
    ) -> Result<Self, ReductionError> {
        for query in &mut queries {
            query.bind(net)?;
        }
        let strategy = Strategy::new(kind, index, &queries)?;
        Ok(Self {
            net,
            index,
            set: StubbornSet::new(index, strategy.polarity()),
            strategy,
            queries,
            close_each: true,
            accepting: false,
            phase: Phase::Idle,
            fired: None,
            yielded: IndexVec::from_elem(false, index.transitions_len()),
        })
    }

    /// 兴趣迁移分析每次前集/后集请求后是否立即求闭包。
    pub fn with_closure_each(mut self, close_each: bool) -> Self {
        self.close_each = close_each;
        self
    }

    pub fn set_query(&mut self, query: Condition) -> Result<(), ReductionError> {
        self.set_queries(vec![query])
    }

    /// 替换查询；之前准备好的迭代作废。
    pub fn set_queries(&mut self, mut queries: Vec<Condition>) -> Result<(), ReductionError> {
        for query in &mut queries {
            query.bind(self.net)?;
        }
        self.strategy = Strategy::new(self.strategy.kind(), self.index, &queries)?;
        self.queries = queries;
        self.phase = Phase::Idle;
        self.fired = None;
        Ok(())
    }

    pub fn queries(&self) -> &[Condition] {
        &self.queries
    }

    pub fn kind(&self) -> ReductionKind {
        self.strategy.kind()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 乘积状态上的准备；`accepting` 表示自动机状态为接受态。
    pub fn prepare_product(&mut self, marking: &Marking, accepting: bool) {
        self.fired = None;
        self.yielded.fill(false);
        self.accepting = accepting;
        self.compute(marking);
    }

    fn compute(&mut self, marking: &Marking) {
        let enabled = self.set.begin(marking);
        match enabled {
            0 => {}
            1 => {
                if self.set.polarity() == Polarity::Positive {
                    if let Some(t) = self.set.first_enabled() {
                        self.set.set_only_stubborn(t);
                    }
                }
            }
            _ => {
                self.strategy.seed(
                    &mut self.set,
                    marking,
                    &self.queries,
                    self.close_each,
                    self.accepting,
                );
                self.strategy.fallback(&mut self.set);
            }
        }
        self.phase = Phase::Prepared;
        log::trace!(
            "prepared {:?}: {} enabled, {} stubborn",
            marking,
            enabled,
            self.set.stubborn_count()
        );
    }

    /// 闭环时调用：加入全部可见迁移并重新求闭包，只重新排入尚未产出的迁移。
    ///
    /// 没有可见迁移概念的变体直接取全集。
    pub fn generate_all(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }
        let parent = self.set.parent().clone();
        self.compute(&parent);
        match self.strategy.visible() {
            Some(visible) => {
                for (t, is_visible) in visible.iter_enumerated() {
                    if *is_visible {
                        self.set.add_to_stub(t);
                    }
                }
                self.set.closure();
                self.strategy.fallback(&mut self.set);
            }
            None => self.set.set_all_stubborn(),
        }
        let yielded = &self.yielded;
        self.set.reseed_ordering(|t| !yielded[t]);
        self.phase = if self.fired.is_some() {
            Phase::Iterating
        } else {
            Phase::Prepared
        };
    }

    /// 在当前父标识上追加一条查询的义务，不另求闭包。
    pub fn extend(&mut self, query: &Condition) -> Result<(), ReductionError> {
        if !query.is_bound() {
            return Err(ReductionError::Unbound(query.to_string()));
        }
        query.evaluate_and_set(&EvalContext::new(self.set.parent(), self.index));
        let mut interesting = Interesting::new(&mut self.set, Mode::Reachability, self.close_each);
        if self.strategy.polarity() == Polarity::Negated {
            interesting.negate();
        }
        interesting.visit(query);
        Ok(())
    }

    /// `out[t] |= is_stubborn(t)`
    pub fn copy_stubborn_into(&self, out: &mut IndexVec<TransitionId, bool>) {
        self.set.copy_stubborn_into(out);
    }

    pub fn is_stubborn(&self, transition: TransitionId) -> bool {
        self.set.is_stubborn(transition)
    }

    pub fn is_enabled(&self, transition: TransitionId) -> bool {
        self.set.is_enabled(transition)
    }

    pub fn stubborn_enabled(&self) -> Vec<TransitionId> {
        self.set.stubborn_enabled()
    }

    pub fn enabled_count(&self) -> usize {
        self.set.enabled_count()
    }
}

impl Successors for ReducedSuccessors<'_> {
    fn prepare(&mut self, marking: &Marking) {
        self.prepare_product(marking, false);
    }

    fn next(&mut self, out: &mut Marking) -> bool {
        if !matches!(self.phase, Phase::Prepared | Phase::Iterating) {
            return false;
        }
        while let Some(t) = self.set.next_stubborn_enabled() {
            self.yielded[t] = true;
            if let Err(err) = self.index.fire_into(t, self.set.parent(), out) {
                log::warn!("skipping successor: {}", err);
                continue;
            }
            self.fired = Some(t);
            self.phase = Phase::Iterating;
            return true;
        }
        self.phase = Phase::Exhausted;
        false
    }

    fn fired(&self) -> Option<TransitionId> {
        self.fired
    }

    fn reset(&mut self) {
        self.phase = Phase::Exhausted;
    }
}

/// 不做约简：按编号顺序产出全部可发生迁移。
pub struct FullSuccessors<'a> {
    index: &'a IncidenceIndex,
    parent: Marking,
    cursor: usize,
    phase: Phase,
    fired: Option<TransitionId>,
}

impl<'a> FullSuccessors<'a> {
    pub fn new(index: &'a IncidenceIndex) -> Self {
        Self {
            index,
            parent: Marking::zeroed(index.places_len()),
            cursor: 0,
            phase: Phase::Idle,
            fired: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Successors for FullSuccessors<'_> {
    fn prepare(&mut self, marking: &Marking) {
        self.parent.copy_from(marking);
        self.cursor = 0;
        self.fired = None;
        self.phase = Phase::Prepared;
    }

    fn next(&mut self, out: &mut Marking) -> bool {
        if !matches!(self.phase, Phase::Prepared | Phase::Iterating) {
            return false;
        }
        while self.cursor < self.index.transitions_len() {
            let t = TransitionId::new(self.cursor as u32);
            self.cursor += 1;
            if self.index.is_enabled(t, &self.parent) {
                if let Err(err) = self.index.fire_into(t, &self.parent, out) {
                    log::warn!("skipping successor: {}", err);
                    continue;
                }
                self.fired = Some(t);
                self.phase = Phase::Iterating;
                return true;
            }
        }
        self.phase = Phase::Exhausted;
        false
    }

    fn fired(&self) -> Option<TransitionId> {
        self.fired
    }

    fn reset(&mut self) {
        self.phase = Phase::Exhausted;
    }
}
