//! 依赖闭包引擎：stubborn 集合成员、逐库所访问标记与工作队列。
//!
//! 所有逐标识临时状态在构造时按 `|P|`/`|T|` 一次性分配，之后每次
//! [`StubbornSet::begin`] 只做原地清零，热路径上不再分配内存。
use std::collections::VecDeque;

use bitflags::bitflags;

use crate::net::{IndexVec, Marking, PlaceId, TransitionId};
use crate::stubborn::index::IncidenceIndex;

bitflags! {
    /// 每个库所在一次闭包计算中已处理过的关系。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlaceSeen: u8 {
        const PRESET = 1;
        const POSTSET = 1 << 1;
        const INHIBITOR_POSTSET = 1 << 2;
    }
}

/// 成员标记的极性。
///
/// `Negated` 时所有迁移初始为 stubborn，`add_to_stub` 反而将其移出；
/// 供自动机引导的 LTL 约简取补集使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Positive,
    Negated,
}

pub struct StubbornSet<'a> {
    index: &'a IncidenceIndex,
    polarity: Polarity,
    parent: Marking,
    enabled: IndexVec<TransitionId, bool>,
    stubborn: IndexVec<TransitionId, bool>,
    places_seen: IndexVec<PlaceId, PlaceSeen>,
    unprocessed: VecDeque<TransitionId>,
    ordering: VecDeque<TransitionId>,
    enabled_count: usize,
    /// 否决掩码：可发生且被否决的迁移不加入集合，只置 `bad`。
    veto: Option<IndexVec<TransitionId, bool>>,
    bad: bool,
    has_enabled_stubborn: bool,
}

impl<'a> StubbornSet<'a> {
    pub fn new(index: &'a IncidenceIndex, polarity: Polarity) -> Self {
        let transitions = index.transitions_len();
        let places = index.places_len();
        Self {
            index,
            polarity,
            parent: Marking::zeroed(places),
            enabled: IndexVec::from_elem(false, transitions),
            stubborn: IndexVec::from_elem(polarity == Polarity::Negated, transitions),
            places_seen: IndexVec::from_elem(PlaceSeen::empty(), places),
            unprocessed: VecDeque::with_capacity(transitions),
            ordering: VecDeque::with_capacity(transitions),
            enabled_count: 0,
            veto: None,
            bad: false,
            has_enabled_stubborn: false,
        }
    }

    pub fn index(&self) -> &'a IncidenceIndex {
        self.index
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn parent(&self) -> &Marking {
        &self.parent
    }

    /// 清空全部逐标识状态（否决掩码一并移除）。
    pub fn reset(&mut self) {
        self.enabled.fill(false);
        self.stubborn.fill(self.polarity == Polarity::Negated);
        self.places_seen.fill(PlaceSeen::empty());
        self.unprocessed.clear();
        self.ordering.clear();
        self.enabled_count = 0;
        self.veto = None;
        self.bad = false;
        self.has_enabled_stubborn = false;
    }

    /// 载入新的父标识并计算可发生集，返回可发生迁移个数。
    pub fn begin(&mut self, marking: &Marking) -> usize {
        self.reset();
        self.parent.copy_from(marking);
        self.construct_enabled();
        self.enabled_count
    }

    /// 按迁移编号顺序检查前集，置 `enabled` 并填充 `ordering`。
    pub fn construct_enabled(&mut self) {
        self.ordering.clear();
        self.enabled_count = 0;
        for transition in TransitionId::range(self.index.transitions_len()) {
            let enabled = self.index.is_enabled(transition, &self.parent);
            self.enabled[transition] = enabled;
            if enabled {
                self.ordering.push_back(transition);
                self.enabled_count += 1;
            }
        }
    }

    #[inline]
    pub fn is_enabled(&self, transition: TransitionId) -> bool {
        self.enabled[transition]
    }

    #[inline]
    pub fn is_stubborn(&self, transition: TransitionId) -> bool {
        self.stubborn[transition]
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled_count
    }

    pub fn first_enabled(&self) -> Option<TransitionId> {
        self.ordering.front().copied()
    }

    pub fn enabled_transitions(&self) -> impl Iterator<Item = TransitionId> + '_ {
        self.enabled
            .iter_enumerated()
            .filter(|(_, enabled)| **enabled)
            .map(|(t, _)| t)
    }

    pub fn is_bad(&self) -> bool {
        self.bad
    }

    pub fn has_enabled_stubborn(&self) -> bool {
        self.has_enabled_stubborn
    }

    pub fn any_enabled_stubborn(&self) -> bool {
        self.enabled_transitions().any(|t| self.stubborn[t])
    }

    /// 唯一的成员修改入口。
    pub fn add_to_stub(&mut self, transition: TransitionId) {
        if self.enabled[transition] {
            if self.veto.as_ref().is_some_and(|veto| veto[transition]) {
                self.bad = true;
                return;
            }
            self.has_enabled_stubborn = true;
        }
        let member = self.polarity == Polarity::Positive;
        if self.stubborn[transition] != member {
            self.stubborn[transition] = member;
            self.unprocessed.push_back(transition);
        }
    }

    /// 加入所有能使 `place` token 数增加的迁移。
    pub fn preset_of(&mut self, place: PlaceId, close: bool) {
        if !self.mark_seen(place, PlaceSeen::PRESET) {
            return;
        }
        let index = self.index;
        for effect in index.producers(place) {
            self.add_to_stub(effect.transition);
        }
        if close {
            self.closure();
        }
    }

    /// 加入所有会使 `place` token 数减少的消费者。
    pub fn postset_of(&mut self, place: PlaceId, close: bool) {
        if !self.mark_seen(place, PlaceSeen::POSTSET) {
            return;
        }
        let index = self.index;
        for effect in index.consumers(place) {
            if effect.direction < 0 {
                self.add_to_stub(effect.transition);
            }
        }
        if close {
            self.closure();
        }
    }

    pub fn inhibitor_postset_of(&mut self, place: PlaceId) {
        if !self.mark_seen(place, PlaceSeen::INHIBITOR_POSTSET) {
            return;
        }
        let index = self.index;
        for &transition in index.inhibited_by(place) {
            self.add_to_stub(transition);
        }
    }

    /// 对 `transition` 前集中的每个库所：抑制弧取其前集，普通弧取其后集。
    pub fn post_preset_of(&mut self, transition: TransitionId, close: bool) {
        let index = self.index;
        for arc in index.preset(transition) {
            if arc.inhibitor {
                self.preset_of(arc.place, close);
            } else {
                self.postset_of(arc.place, close);
            }
        }
    }

    #[inline]
    pub fn seen_pre(&self, place: PlaceId) -> bool {
        self.places_seen[place].contains(PlaceSeen::PRESET)
    }

    #[inline]
    pub fn seen_post(&self, place: PlaceId) -> bool {
        self.places_seen[place].contains(PlaceSeen::POSTSET)
    }

    pub fn place_seen(&self, place: PlaceId) -> PlaceSeen {
        self.places_seen[place]
    }

    pub fn clear_places_seen(&mut self) {
        self.places_seen.fill(PlaceSeen::empty());
    }

    fn mark_seen(&mut self, place: PlaceId, flag: PlaceSeen) -> bool {
        let seen = &mut self.places_seen[place];
        if seen.contains(flag) {
            return false;
        }
        seen.insert(flag);
        true
    }

    pub fn closure(&mut self) {
        self.closure_while(|_| true);
    }

    /// 清空工作队列直至不动点；`keep_going` 返回 `false` 时提前停止。
    pub fn closure_while<F>(&mut self, mut keep_going: F)
    where
        F: FnMut(&Self) -> bool,
    {
        while keep_going(self) {
            let Some(transition) = self.unprocessed.pop_front() else {
                break;
            };
            if self.enabled[transition] {
                self.close_enabled(transition);
            } else {
                self.close_disabled(transition);
            }
        }
    }

    /// 可发生迁移：与之竞争 token 的消费者都必须加入。
    fn close_enabled(&mut self, transition: TransitionId) {
        let index = self.index;
        for arc in index.preset(transition) {
            if arc.direction < 0 {
                for effect in index.consumers(arc.place) {
                    self.add_to_stub(effect.transition);
                }
            }
        }
        if index.has_inhibitor_arcs() {
            for arc in index.postset(transition) {
                if arc.direction > 0 {
                    self.inhibitor_postset_of(arc.place);
                }
            }
        }
    }

    /// 不可发生迁移：选一个阻塞它的库所，加入能解除阻塞的迁移。
    fn close_disabled(&mut self, transition: TransitionId) {
        let mut candidate = None;
        let mut inhibitor = false;
        let mut satisfied = false;
        for arc in self.index.preset(transition) {
            let tokens = self.parent[arc.place];
            if tokens < arc.tokens && !arc.inhibitor {
                inhibitor = false;
                satisfied = self.seen_pre(arc.place);
                candidate = Some(arc.place);
            } else if tokens >= arc.tokens && arc.inhibitor {
                inhibitor = true;
                satisfied = self.seen_post(arc.place);
                candidate = Some(arc.place);
            }
            if satisfied {
                break;
            }
        }
        debug_assert!(
            candidate.is_some(),
            "disabled transition {transition:?} has no blocking place"
        );
        if let (false, Some(place)) = (satisfied, candidate) {
            if inhibitor {
                self.postset_of(place, false);
            } else {
                self.preset_of(place, false);
            }
        }
    }

    /// 依赖度最小的可发生迁移，平局取编号最小者。
    pub fn least_dependent_enabled(&self) -> Option<TransitionId> {
        self.enabled_transitions()
            .min_by_key(|&t| (self.index.dependency(t), t))
    }

    pub fn set_all_stubborn(&mut self) {
        self.stubborn.fill(true);
    }

    /// 只保留 `transition` 一个 stubborn 迁移。
    pub fn set_only_stubborn(&mut self, transition: TransitionId) {
        self.stubborn.fill(false);
        self.stubborn[transition] = true;
    }

    /// 取出当前集合作为否决掩码，并为第二轮分析清空集合、标记与队列。
    pub fn promote_to_veto(&mut self) {
        let mut veto = IndexVec::from_elem(self.polarity == Polarity::Negated, self.stubborn.len());
        std::mem::swap(&mut veto, &mut self.stubborn);
        if self.polarity == Polarity::Negated {
            veto.iter_mut().for_each(|flag| *flag = !*flag);
        }
        self.veto = Some(veto);
        self.has_enabled_stubborn = false;
        self.unprocessed.clear();
        self.clear_places_seen();
    }

    /// `out[t] |= stubborn[t]`
    pub fn copy_stubborn_into(&self, out: &mut IndexVec<TransitionId, bool>) {
        for (flag, stubborn) in out.iter_mut().zip(self.stubborn.iter()) {
            *flag |= *stubborn;
        }
    }

    pub fn pop_ordering(&mut self) -> Option<TransitionId> {
        self.ordering.pop_front()
    }

    /// 以可发生集重新填充 `ordering`，只保留 `keep` 接受的迁移。
    pub fn reseed_ordering<F>(&mut self, mut keep: F)
    where
        F: FnMut(TransitionId) -> bool,
    {
        self.ordering.clear();
        for transition in TransitionId::range(self.index.transitions_len()) {
            if self.enabled[transition] && keep(transition) {
                self.ordering.push_back(transition);
            }
        }
    }

    /// 在 `ordering` 中找下一个既 stubborn 又可发生的迁移。
    pub fn next_stubborn_enabled(&mut self) -> Option<TransitionId> {
        while let Some(transition) = self.ordering.pop_front() {
            if self.stubborn[transition] && self.enabled[transition] {
                return Some(transition);
            }
        }
        None
    }

    pub fn stubborn_enabled(&self) -> Vec<TransitionId> {
        self.enabled_transitions()
            .filter(|&t| self.stubborn[t])
            .collect()
    }

    pub fn stubborn_count(&self) -> usize {
        self.stubborn.iter().filter(|flag| **flag).count()
    }
}
