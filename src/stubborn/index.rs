//! 关联索引：按迁移与按库所两个方向展开的稀疏弧表。
//!
//! 每个迁移 `t` 拥有一段连续弧记录：`[inputs(t), outputs(t))` 为前集（含抑制弧），
//! `[outputs(t), inputs(t+1))` 为后集，段内按库所编号排序。
//! 每个库所 `p` 拥有两段迁移记录：生产者（后集弧且净效应为正）与消费者（普通前集弧）。
//! 抑制弧单独记入 `inhibited_by`。索引构造后只读，可在多个搜索线程间共享。
use smallvec::SmallVec;
use thiserror::Error;

use crate::net::{FireError, Idx, IndexVec, Marking, Net, PlaceId, TransitionId, Weight};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("{matrix} matrix is not {places}x{transitions}")]
    ShapeMismatch {
        matrix: &'static str,
        places: usize,
        transitions: usize,
    },
    #[error("net has {0} arcs, more than the index can address")]
    TooManyArcs(usize),
}

/// 迁移一侧的弧记录。
///
/// `direction` 表示迁移发生对该库所 token 数的净效应符号：
/// `-1` 减少，`0` 不变（含仅有抑制弧的情形），`+1` 增加。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcRecord {
    pub place: PlaceId,
    pub tokens: Weight,
    pub inhibitor: bool,
    pub direction: i8,
}

/// 库所一侧的迁移记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlaceEffect {
    pub transition: TransitionId,
    pub direction: i8,
}

#[derive(Debug, Clone, Copy, Default)]
struct TransitionSpan {
    inputs: u32,
    outputs: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct PlaceSpan {
    producers: u32,
    consumers: u32,
}

#[derive(Debug, Clone)]
pub struct IncidenceIndex {
    places: usize,
    transitions: usize,
    arcs: Vec<ArcRecord>,
    /// 长度 `|T| + 1`，末尾为哨兵。
    spans: Vec<TransitionSpan>,
    effects: Vec<PlaceEffect>,
    /// 长度 `|P| + 1`，末尾为哨兵。
    place_spans: Vec<PlaceSpan>,
    inhibited_by: IndexVec<PlaceId, SmallVec<[TransitionId; 2]>>,
    dependency: IndexVec<TransitionId, u32>,
    has_inhibitor_arcs: bool,
}

impl IncidenceIndex {
    pub fn build(net: &Net) -> Result<Self, IndexError> {
        let places = net.places_len();
        let transitions = net.transitions_len();
        for (matrix, ok) in [
            ("pre", net.pre.has_shape(places, transitions)),
            ("post", net.post.has_shape(places, transitions)),
            (
                "inhibitor",
                net.inhibitor
                    .as_ref()
                    .is_none_or(|m| m.has_shape(places, transitions)),
            ),
        ] {
            if !ok {
                return Err(IndexError::ShapeMismatch {
                    matrix,
                    places,
                    transitions,
                });
            }
        }

        let mut arcs = Vec::new();
        let mut spans = Vec::with_capacity(transitions + 1);
        for transition in TransitionId::range(transitions) {
            let inputs = arc_offset(arcs.len())?;
            for (place, &input) in net.pre.column(transition) {
                if input == 0 {
                    continue;
                }
                let inhibitor = net.is_inhibitor_arc(place, transition);
                let output = *net.post.get(place, transition);
                arcs.push(ArcRecord {
                    place,
                    tokens: input,
                    inhibitor,
                    direction: input_direction(input, output, inhibitor),
                });
            }
            let outputs = arc_offset(arcs.len())?;
            for (place, &output) in net.post.column(transition) {
                if output == 0 {
                    continue;
                }
                let input = *net.pre.get(place, transition);
                let inhibitor = input > 0 && net.is_inhibitor_arc(place, transition);
                arcs.push(ArcRecord {
                    place,
                    tokens: output,
                    inhibitor: false,
                    direction: output_direction(input, output, inhibitor),
                });
            }
            spans.push(TransitionSpan { inputs, outputs });
        }
        let end = arc_offset(arcs.len())?;
        spans.push(TransitionSpan {
            inputs: end,
            outputs: end,
        });

        let mut producers: Vec<Vec<PlaceEffect>> = vec![Vec::new(); places];
        let mut consumers: Vec<Vec<PlaceEffect>> = vec![Vec::new(); places];
        let mut inhibited_by: IndexVec<PlaceId, SmallVec<[TransitionId; 2]>> =
            IndexVec::from_elem(SmallVec::new(), places);
        let mut has_inhibitor_arcs = false;
        for transition in TransitionId::range(transitions) {
            let span = spans[transition.index()];
            let next = spans[transition.index() + 1];
            for arc in &arcs[span.inputs as usize..span.outputs as usize] {
                if arc.inhibitor {
                    inhibited_by[arc.place].push(transition);
                    has_inhibitor_arcs = true;
                } else {
                    consumers[arc.place.index()].push(PlaceEffect {
                        transition,
                        direction: arc.direction,
                    });
                }
            }
            for arc in &arcs[span.outputs as usize..next.inputs as usize] {
                if arc.direction > 0 {
                    producers[arc.place.index()].push(PlaceEffect {
                        transition,
                        direction: arc.direction,
                    });
                }
            }
        }

        let mut effects = Vec::new();
        let mut place_spans = Vec::with_capacity(places + 1);
        for (mut pre, mut post) in producers.into_iter().zip(consumers) {
            pre.sort();
            post.sort();
            let producers = arc_offset(effects.len())?;
            effects.extend(pre);
            let consumers = arc_offset(effects.len())?;
            effects.extend(post);
            place_spans.push(PlaceSpan {
                producers,
                consumers,
            });
        }
        let end = arc_offset(effects.len())?;
        place_spans.push(PlaceSpan {
            producers: end,
            consumers: end,
        });

        let mut index = Self {
            places,
            transitions,
            arcs,
            spans,
            effects,
            place_spans,
            inhibited_by,
            dependency: IndexVec::from_elem(0, transitions),
            has_inhibitor_arcs,
        };
        for transition in TransitionId::range(transitions) {
            index.dependency[transition] = index
                .preset(transition)
                .iter()
                .map(|arc| index.consumers(arc.place).len() as u32)
                .sum();
        }

        log::debug!(
            "incidence index: {} places, {} transitions, {} arcs, {} place effects, inhibitor arcs: {}",
            places,
            transitions,
            index.arcs.len(),
            index.effects.len(),
            has_inhibitor_arcs
        );
        Ok(index)
    }

    #[inline]
    pub fn places_len(&self) -> usize {
        self.places
    }

    #[inline]
    pub fn transitions_len(&self) -> usize {
        self.transitions
    }

    #[inline]
    pub fn has_inhibitor_arcs(&self) -> bool {
        self.has_inhibitor_arcs
    }

    /// 迁移前集（含抑制弧），按库所排序。
    #[inline]
    pub fn preset(&self, transition: TransitionId) -> &[ArcRecord] {
        let span = self.spans[transition.index()];
        &self.arcs[span.inputs as usize..span.outputs as usize]
    }

    /// 迁移后集，按库所排序。
    #[inline]
    pub fn postset(&self, transition: TransitionId) -> &[ArcRecord] {
        let span = self.spans[transition.index()];
        let next = self.spans[transition.index() + 1];
        &self.arcs[span.outputs as usize..next.inputs as usize]
    }

    /// 库所前集：发生后使该库所 token 数增加的迁移。
    #[inline]
    pub fn producers(&self, place: PlaceId) -> &[PlaceEffect] {
        let span = self.place_spans[place.index()];
        &self.effects[span.producers as usize..span.consumers as usize]
    }

    /// 库所后集：以普通弧从该库所取 token 的迁移，附带各自的净效应。
    #[inline]
    pub fn consumers(&self, place: PlaceId) -> &[PlaceEffect] {
        let span = self.place_spans[place.index()];
        let next = self.place_spans[place.index() + 1];
        &self.effects[span.consumers as usize..next.producers as usize]
    }

    #[inline]
    pub fn inhibited_by(&self, place: PlaceId) -> &[TransitionId] {
        &self.inhibited_by[place]
    }

    #[inline]
    pub fn dependency(&self, transition: TransitionId) -> u32 {
        self.dependency[transition]
    }

    pub fn is_enabled(&self, transition: TransitionId, marking: &Marking) -> bool {
        self.preset(transition).iter().all(|arc| {
            if arc.inhibitor {
                marking[arc.place] < arc.tokens
            } else {
                marking[arc.place] >= arc.tokens
            }
        })
    }

    /// `out = parent - pre(t) + post(t)`；调用方保证 `t` 在 `parent` 下可发生。
    ///
    /// 与 [`Net::fire_transition`] 一样，库所 token 溢出时报 [`FireError::TokenOverflow`]，
    /// 此时 `out` 的内容无意义。
    pub fn fire_into(
        &self,
        transition: TransitionId,
        parent: &Marking,
        out: &mut Marking,
    ) -> Result<(), FireError> {
        out.copy_from(parent);
        for arc in self.preset(transition) {
            if !arc.inhibitor {
                out[arc.place] -= arc.tokens;
            }
        }
        for arc in self.postset(transition) {
            let place = arc.place;
            out[place] = out[place]
                .checked_add(arc.tokens)
                .ok_or(FireError::TokenOverflow { transition, place })?;
        }
        Ok(())
    }
}

fn arc_offset(len: usize) -> Result<u32, IndexError> {
    u32::try_from(len).map_err(|_| IndexError::TooManyArcs(len))
}

fn input_direction(input: Weight, output: Weight, inhibitor: bool) -> i8 {
    if output == 0 {
        return if inhibitor { 0 } else { -1 };
    }
    if inhibitor {
        return 1;
    }
    match input.cmp(&output) {
        std::cmp::Ordering::Less => 1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => -1,
    }
}

fn output_direction(input: Weight, output: Weight, inhibitor: bool) -> i8 {
    if input == 0 || inhibitor {
        return 1;
    }
    match output.cmp(&input) {
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Less => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Place, Transition};

    /// p0 -t0-> p1 -t1-> p0，t2 从 p0 取 2 放回 1，t3 被 p1 抑制并向 p1 放 token。
    fn sample() -> Net {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::new("p0", 2));
        let p1 = net.add_place(Place::new("p1", 0));
        let t0 = net.add_transition(Transition::new("t0"));
        let t1 = net.add_transition(Transition::new("t1"));
        let t2 = net.add_transition(Transition::new("t2"));
        let t3 = net.add_transition(Transition::new("t3"));
        net.add_input_arc(p0, t0, 1);
        net.add_output_arc(p1, t0, 1);
        net.add_input_arc(p1, t1, 1);
        net.add_output_arc(p0, t1, 1);
        net.add_input_arc(p0, t2, 2);
        net.add_output_arc(p0, t2, 1);
        net.set_inhibitor_arc(p1, t3, 1);
        net.add_output_arc(p1, t3, 1);
        net
    }

    #[test]
    fn directions_follow_net_effect() {
        let index = IncidenceIndex::build(&sample()).unwrap();
        let t2 = TransitionId(2);
        assert_eq!(index.preset(t2)[0].direction, -1);
        assert_eq!(index.postset(t2)[0].direction, -1);

        let t3 = TransitionId(3);
        let pre = index.preset(t3);
        assert_eq!(pre.len(), 1);
        assert!(pre[0].inhibitor);
        assert_eq!(pre[0].direction, 1);
        assert_eq!(index.postset(t3)[0].direction, 1);
        assert!(index.has_inhibitor_arcs());
    }

    #[test]
    fn place_ranges_split_producers_and_consumers() {
        let index = IncidenceIndex::build(&sample()).unwrap();
        let p0 = PlaceId(0);
        let p1 = PlaceId(1);

        let producers = |p| {
            index
                .producers(p)
                .iter()
                .map(|e| e.transition.index())
                .collect::<Vec<_>>()
        };
        let consumers = |p| {
            index
                .consumers(p)
                .iter()
                .map(|e| e.transition.index())
                .collect::<Vec<_>>()
        };
        // t2 只是净减少 p0，不算生产者
        assert_eq!(producers(p0), vec![1]);
        assert_eq!(consumers(p0), vec![0, 2]);
        assert_eq!(producers(p1), vec![0, 3]);
        assert_eq!(consumers(p1), vec![1]);
        assert_eq!(index.inhibited_by(p1), &[TransitionId(3)]);
        assert!(index.inhibited_by(p0).is_empty());
    }

    #[test]
    fn dependency_counts_consumers_of_preset_places() {
        let index = IncidenceIndex::build(&sample()).unwrap();
        assert_eq!(index.dependency(TransitionId(0)), 2);
        assert_eq!(index.dependency(TransitionId(1)), 1);
        assert_eq!(index.dependency(TransitionId(2)), 2);
        // 抑制弧也计入
        assert_eq!(index.dependency(TransitionId(3)), 1);
    }

    #[test]
    fn firing_touches_only_own_arcs() {
        let net = sample();
        let index = IncidenceIndex::build(&net).unwrap();
        let m0 = net.initial_marking();
        let mut out = Marking::zeroed(2);
        assert!(index.is_enabled(TransitionId(3), &m0));
        index.fire_into(TransitionId(3), &m0, &mut out).unwrap();
        assert_eq!(out, Marking::from(vec![2, 1]));
        assert!(!index.is_enabled(TransitionId(3), &out));
        for t in TransitionId::range(4) {
            assert_eq!(
                index.is_enabled(t, &out),
                net.is_transition_enabled(t, &out)
            );
        }
    }

    #[test]
    fn firing_reports_token_overflow() {
        let mut net = Net::empty();
        let full = net.add_place(Place::new("full", Weight::MAX));
        let t = net.add_transition(Transition::new("pump"));
        net.add_output_arc(full, t, 1);
        let index = IncidenceIndex::build(&net).unwrap();
        let m0 = net.initial_marking();
        let mut out = Marking::zeroed(1);
        assert!(matches!(
            index.fire_into(t, &m0, &mut out),
            Err(FireError::TokenOverflow { place, .. }) if place == full
        ));
        assert!(matches!(
            net.fire_transition(&m0, t),
            Err(FireError::TokenOverflow { .. })
        ));
    }

    #[test]
    fn malformed_matrix_is_rejected() {
        let mut net = sample();
        net.places.push(Place::new("dangling", 0));
        let err = IncidenceIndex::build(&net).unwrap_err();
        assert!(matches!(err, IndexError::ShapeMismatch { matrix: "pre", .. }));
    }
}
