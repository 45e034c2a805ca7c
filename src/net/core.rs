//! 运行时: 可发生集与发生语义定义.
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::{Incidence, IncidenceBool};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Arc, ArcKind, Marking, Place, Transition, Weight};

#[derive(Debug, Error)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
    #[error("token count of place {place:?} overflows when firing {transition:?}")]
    TokenOverflow {
        transition: TransitionId,
        place: PlaceId,
    },
}

/// Petri 网连通性诊断报告
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// 孤立库所（无任何连接的弧）
    pub isolated_places: Vec<(PlaceId, String)>,
    /// 孤立变迁（无任何连接的弧）
    pub isolated_transitions: Vec<(TransitionId, String)>,
    pub warnings: Vec<String>,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

/// P/T 网。
///
/// 抑制弧 `(p, t)` 的阈值存放在 `pre[p, t]`，并在 `inhibitor` 中置位；
/// 此时 `t` 可发生要求 `M[p] < pre[p, t]`，发生时不从 `p` 消耗 token。
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Net {
    pub places: IndexVec<PlaceId, Place>,
    pub transitions: IndexVec<TransitionId, Transition>,
    pub pre: Incidence<Weight>,
    pub post: Incidence<Weight>,
    #[serde(default)]
    pub inhibitor: Option<IncidenceBool>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("arcs", &self.arcs().collect::<Vec<_>>())
            .finish()
    }
}

impl Net {
    pub fn empty() -> Self {
        Self {
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            pre: Incidence::new(0, 0, 0),
            post: Incidence::new(0, 0, 0),
            inhibitor: None,
        }
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        let place_id = self.places.push(place);
        self.pre.push_place_with_default(0);
        self.post.push_place_with_default(0);
        if let Some(inhibitor) = self.inhibitor.as_mut() {
            inhibitor.push_place();
        }
        place_id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let transition_id = self.transitions.push(transition);
        self.pre.push_transition_with_default(0);
        self.post.push_transition_with_default(0);
        if let Some(inhibitor) = self.inhibitor.as_mut() {
            inhibitor.push_transition();
        }
        transition_id
    }

    /// 输入弧: place -> transition
    pub fn add_input_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        if weight == 0 {
            return;
        }
        *self.pre.get_mut(place, transition) += weight;
    }

    /// 输出弧: transition -> place
    pub fn add_output_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        if weight == 0 {
            return;
        }
        *self.post.get_mut(place, transition) += weight;
    }

    /// 抑制弧: place -o transition，覆盖同位置已有的输入弧。
    pub fn set_inhibitor_arc(
        &mut self,
        place: PlaceId,
        transition: TransitionId,
        threshold: Weight,
    ) {
        let places = self.places_len();
        let transitions = self.transitions_len();
        let matrix = self
            .inhibitor
            .get_or_insert_with(|| IncidenceBool::new(places, transitions));
        matrix.set(place, transition, true);
        self.pre.set(place, transition, threshold);
    }

    pub fn is_inhibitor_arc(&self, place: PlaceId, transition: TransitionId) -> bool {
        self.inhibitor
            .as_ref()
            .is_some_and(|matrix| matrix.get(place, transition))
    }

    pub fn has_inhibitor_arcs(&self) -> bool {
        self.inhibitor.as_ref().is_some_and(IncidenceBool::any)
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn place_by_name(&self, name: &str) -> Option<PlaceId> {
        self.places
            .iter_enumerated()
            .find(|(_, place)| place.name == name)
            .map(|(id, _)| id)
    }

    pub fn transition_by_name(&self, name: &str) -> Option<TransitionId> {
        self.transitions
            .iter_enumerated()
            .find(|(_, transition)| transition.name == name)
            .map(|(id, _)| id)
    }

    pub fn initial_marking(&self) -> Marking {
        Marking(self.places.iter().map(|p| p.tokens).collect())
    }

    /// 全部弧，按迁移编号、再按库所编号排列；输入/抑制弧先于输出弧。
    pub fn arcs(&self) -> impl Iterator<Item = Arc> + '_ {
        self.transitions.indices().flat_map(move |transition| {
            let inputs = self.pre.column(transition).filter_map(move |(place, w)| {
                (*w > 0).then(|| {
                    let kind = if self.is_inhibitor_arc(place, transition) {
                        ArcKind::Inhibitor
                    } else {
                        ArcKind::Input
                    };
                    Arc::new(place, transition, *w, kind)
                })
            });
            let outputs = self.post.column(transition).filter_map(move |(place, w)| {
                (*w > 0).then(|| Arc::new(place, transition, *w, ArcKind::Output))
            });
            inputs.chain(outputs)
        })
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph PetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (place_id, place) in self.places.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\\n{}\", shape=circle];",
                place_id.index(),
                escape_label(&place.name),
                place.tokens
            );
        }
        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\", shape=box];",
                transition_id.index(),
                escape_label(&transition.name)
            );
        }
        for arc in self.arcs() {
            let place = format!("place_{}", arc.place.index());
            let transition = format!("trans_{}", arc.transition.index());
            let (from, to) = match arc.kind {
                ArcKind::Output => (transition, place),
                ArcKind::Input | ArcKind::Inhibitor => (place, transition),
            };
            let mut attrs = Vec::new();
            if arc.weight != 1 {
                attrs.push(format!("label=\"{}\"", arc.weight));
            }
            if arc.kind == ArcKind::Inhibitor {
                attrs.push("arrowhead=odot".to_string());
            }
            if attrs.is_empty() {
                let _ = writeln!(&mut dot, "    {} -> {};", from, to);
            } else {
                let _ = writeln!(&mut dot, "    {} -> {} [{}];", from, to, attrs.join(", "));
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }

    /// 诊断信息：检测 Petri 网中的孤立节点和永远无法触发的变迁
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();

        for (place_id, place) in self.places.iter_enumerated() {
            let consumed = self.pre.rows()[place_id].iter().any(|w| *w > 0);
            let produced = self.post.rows()[place_id].iter().any(|w| *w > 0);
            if !consumed && !produced {
                report.isolated_places.push((place_id, place.name.clone()));
            }
        }

        for (trans_id, trans) in self.transitions.iter_enumerated() {
            let has_preset = self.pre.column(trans_id).any(|(_, w)| *w > 0);
            let has_postset = self.post.column(trans_id).any(|(_, w)| *w > 0);
            if !has_preset && !has_postset {
                report
                    .isolated_transitions
                    .push((trans_id, trans.name.clone()));
            } else if !has_preset {
                report.warnings.push(format!(
                    "变迁 '{}' (id={}) 无前置库所，在任意标识下恒可发生",
                    trans.name,
                    trans_id.index()
                ));
            }
        }

        report
    }

    /// 打印诊断报告到日志
    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();
        if !report.has_issues() {
            log::debug!(
                "net with {} places / {} transitions passed connectivity check",
                self.places_len(),
                self.transitions_len()
            );
            return;
        }
        for (id, name) in &report.isolated_places {
            log::warn!("孤立库所 [{}] {}", id.index(), name);
        }
        for (id, name) in &report.isolated_transitions {
            log::warn!("孤立变迁 [{}] {}", id.index(), name);
        }
        for warning in &report.warnings {
            log::warn!("{}", warning);
        }
    }

    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        self.transitions
            .indices()
            .filter(|&transition| self.is_transition_enabled(transition, marking))
            .collect()
    }

    pub fn deadlocked(&self, marking: &Marking) -> bool {
        self.transitions
            .indices()
            .all(|transition| !self.is_transition_enabled(transition, marking))
    }

    pub fn fire_transition(
        &self,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<Marking, FireError> {
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if !self.is_transition_enabled(transition, marking) {
            return Err(FireError::NotEnabled(transition));
        }

        let mut next = marking.clone();
        for (place, weight) in self.pre.column(transition) {
            if *weight > 0 && !self.is_inhibitor_arc(place, transition) {
                next[place] -= *weight;
            }
        }
        for (place, weight) in self.post.column(transition) {
            if *weight > 0 {
                next[place] = next[place]
                    .checked_add(*weight)
                    .ok_or(FireError::TokenOverflow { transition, place })?;
            }
        }
        Ok(next)
    }

    pub fn is_transition_enabled(&self, transition: TransitionId, marking: &Marking) -> bool {
        if transition.index() >= self.transitions_len() {
            return false;
        }
        self.pre.column(transition).all(|(place, weight)| {
            if *weight == 0 {
                true
            } else if self.is_inhibitor_arc(place, transition) {
                marking[place] < *weight
            } else {
                marking[place] >= *weight
            }
        })
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::empty()
    }
}

fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
