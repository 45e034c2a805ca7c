//! 输入、输出及抑制弧关系的稠密邻接矩阵封装.
//!
//! 矩阵按库所分行、按迁移分列；构造网时逐行逐列增长，
//! 建立 [`crate::stubborn::IncidenceIndex`] 时一次性扫描成稀疏形式。
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};

type SmallRow<T> = SmallVec<[T; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incidence<T> {
    rows: IndexVec<PlaceId, SmallRow<T>>,
    cols: usize,
}

impl<T> Incidence<T>
where
    T: Clone,
{
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(default.clone(), transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn push_place_with_default(&mut self, default: T) -> PlaceId {
        self.rows.push(SmallRow::from_elem(default, self.cols))
    }

    pub fn push_transition_with_default(&mut self, default: T) -> TransitionId {
        let next = self.cols;
        for row in self.rows.iter_mut() {
            row.push(default.clone());
        }
        self.cols += 1;
        TransitionId::from_usize(next)
    }

    /// 行列数是否与给定的网维度一致（反序列化后的网可能不一致）。
    pub fn has_shape(&self, places: usize, transitions: usize) -> bool {
        self.rows.len() == places && self.rows.iter().all(|row| row.len() == transitions)
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, value: T) {
        self.rows[place][transition.index()] = value;
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> &T {
        &self.rows[place][transition.index()]
    }

    pub fn get_mut(&mut self, place: PlaceId, transition: TransitionId) -> &mut T {
        &mut self.rows[place][transition.index()]
    }

    pub fn rows(&self) -> &IndexVec<PlaceId, SmallRow<T>> {
        &self.rows
    }

    /// 迁移 `transition` 所在列，按库所编号顺序给出。
    pub fn column(&self, transition: TransitionId) -> impl Iterator<Item = (PlaceId, &T)> {
        self.rows
            .iter_enumerated()
            .map(move |(place, row)| (place, &row[transition.index()]))
    }
}

/// 抑制弧标记矩阵；阈值本身存放在输入矩阵的同一位置。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidenceBool(Incidence<bool>);

impl IncidenceBool {
    pub fn new(places: usize, transitions: usize) -> Self {
        Self(Incidence::new(places, transitions, false))
    }

    pub fn push_place(&mut self) -> PlaceId {
        self.0.push_place_with_default(false)
    }

    pub fn push_transition(&mut self) -> TransitionId {
        self.0.push_transition_with_default(false)
    }

    pub fn has_shape(&self, places: usize, transitions: usize) -> bool {
        self.0.has_shape(places, transitions)
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> bool {
        *self.0.get(place, transition)
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, value: bool) {
        self.0.set(place, transition, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growing_keeps_matrix_rectangular() {
        let mut matrix = Incidence::new(1, 1, 0u64);
        let p = matrix.push_place_with_default(0);
        let t = matrix.push_transition_with_default(0);
        matrix.set(p, t, 5);
        assert!(matrix.has_shape(2, 2));
        assert_eq!(*matrix.get(p, t), 5);
        let column = matrix.column(t).map(|(_, w)| *w).collect::<Vec<_>>();
        assert_eq!(column, vec![0, 5]);
    }

    #[test]
    fn inhibitor_flags_grow_with_the_net() {
        let mut flags = IncidenceBool::new(2, 1);
        let t = flags.push_transition();
        flags.set(PlaceId(1), t, true);
        assert!(flags.get(PlaceId(1), TransitionId(1)));
        assert!(!flags.get(PlaceId(0), t));
        flags.push_place();
        assert!(flags.has_shape(3, 2));
    }
}
