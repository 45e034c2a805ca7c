//! P/T 网静态结构元素：库所、迁移、弧与标识。
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::IndexVec;

pub type Weight = u64;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
    /// 初始 token 数。
    pub tokens: Weight,
}

impl Place {
    pub fn new(name: impl Into<String>, tokens: Weight) -> Self {
        Self {
            name: name.into(),
            tokens,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: String,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    /// place -> transition，发生时消耗 `weight` 个 token。
    Input,
    /// transition -> place，发生时产生 `weight` 个 token。
    Output,
    /// place -o transition，要求 `M[p] < weight`，不消耗 token。
    Inhibitor,
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Arc {
    pub place: PlaceId,
    pub transition: TransitionId,
    pub weight: Weight,
    pub kind: ArcKind,
}

impl Arc {
    pub fn new(place: PlaceId, transition: TransitionId, weight: Weight, kind: ArcKind) -> Self {
        Self {
            place,
            transition,
            weight,
            kind,
        }
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to): (&dyn fmt::Debug, &dyn fmt::Debug) = match self.kind {
            ArcKind::Output => (&self.transition, &self.place),
            ArcKind::Input | ArcKind::Inhibitor => (&self.place, &self.transition),
        };
        let arrow = if self.kind == ArcKind::Inhibitor {
            "-o"
        } else {
            "->"
        };
        write!(f, "{from:?} {arrow} {to:?} ({})", self.weight)
    }
}

/// 标识：每个库所的 token 数。
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marking(pub IndexVec<PlaceId, Weight>);

impl Marking {
    pub fn new(initial: IndexVec<PlaceId, Weight>) -> Self {
        Self(initial)
    }

    pub fn zeroed(places: usize) -> Self {
        Self(IndexVec::from_elem(0, places))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &Weight)> {
        self.0.iter_enumerated()
    }

    #[inline]
    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0[place]
    }

    /// 覆写为 `other`，复用已有缓冲区。
    pub fn copy_from(&mut self, other: &Marking) {
        self.0.copy_from(&other.0);
    }

    pub fn total_tokens(&self) -> Weight {
        self.0.iter().sum()
    }
}

impl Index<PlaceId> for Marking {
    type Output = Weight;

    #[inline]
    fn index(&self, place: PlaceId) -> &Weight {
        &self.0[place]
    }
}

impl IndexMut<PlaceId> for Marking {
    #[inline]
    fn index_mut(&mut self, place: PlaceId) -> &mut Weight {
        &mut self.0[place]
    }
}

impl From<Vec<Weight>> for Marking {
    fn from(tokens: Vec<Weight>) -> Self {
        Self(IndexVec::from(tokens))
    }
}

impl Hash for Marking {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_slice().hash(state);
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter().filter(|(_, tokens)| **tokens > 0) {
            map.entry(&place, tokens);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_debug_lists_only_marked_places() {
        let marking = Marking::from(vec![0, 2, 0, 1]);
        assert_eq!(format!("{marking:?}"), "{p1: 2, p3: 1}");
        assert_eq!(marking.total_tokens(), 3);
    }

    #[test]
    fn arc_debug_shows_direction() {
        let inhibitor = Arc::new(PlaceId(0), TransitionId(1), 2, ArcKind::Inhibitor);
        let output = Arc::new(PlaceId(4), TransitionId(1), 1, ArcKind::Output);
        assert_eq!(format!("{inhibitor:?}"), "p0 -o t1 (2)");
        assert_eq!(format!("{output:?}"), "t1 -> p4 (1)");
    }
}
