//! 查询的可见库所与可见迁移。
use std::collections::BTreeSet;

use crate::net::{IndexVec, PlaceId, TransitionId};
use crate::query::Condition;
use crate::stubborn::IncidenceIndex;

/// 条件中出现的全部库所，按编号升序。
pub fn collect_places(cond: &Condition) -> BTreeSet<PlaceId> {
    let mut places = BTreeSet::new();
    cond.for_each_place(&mut |place| {
        places.insert(place);
    });
    places
}

/// 能改变任一可见库所 token 数的迁移：生产者，以及净效应为减少的消费者。
pub fn visible_transitions<'c, I>(index: &IncidenceIndex, conds: I) -> IndexVec<TransitionId, bool>
where
    I: IntoIterator<Item = &'c Condition>,
{
    let mut visible = IndexVec::from_elem(false, index.transitions_len());
    let mut places = BTreeSet::new();
    for cond in conds {
        places.append(&mut collect_places(cond));
    }
    for place in places {
        for effect in index.producers(place) {
            visible[effect.transition] = true;
        }
        for effect in index.consumers(place) {
            if effect.direction < 0 {
                visible[effect.transition] = true;
            }
        }
    }
    log::debug!(
        "{} of {} transitions are visible",
        visible.iter().filter(|v| **v).count(),
        index.transitions_len()
    );
    visible
}
