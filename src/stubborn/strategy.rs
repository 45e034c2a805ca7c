//! 约简变体：同一个闭包引擎，不同的播种方式。
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::{IndexVec, Marking, TransitionId};
use crate::query::visible::visible_transitions;
use crate::query::{Condition, EvalContext, QueryError};
use crate::stubborn::index::IncidenceIndex;
use crate::stubborn::interesting::{Interesting, Mode};
use crate::stubborn::set::{Polarity, StubbornSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReductionKind {
    /// 不约简，全部可发生迁移都是后继。
    None,
    #[default]
    Reachability,
    /// 取补集的可达性约简，供自动机引导的 LTL 约简组合使用。
    Negated,
    VisibleLtl,
    InterestingLtl,
    /// 乘积状态上的安全自动机约简，条件依次为进展条件与汇条件。
    SafeAutomaton,
}

impl ReductionKind {
    pub const NAMES: [&'static str; 6] = [
        "none",
        "reachability",
        "negated",
        "visible-ltl",
        "interesting-ltl",
        "safe-automaton",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReductionKind::None => "none",
            ReductionKind::Reachability => "reachability",
            ReductionKind::Negated => "negated",
            ReductionKind::VisibleLtl => "visible-ltl",
            ReductionKind::InterestingLtl => "interesting-ltl",
            ReductionKind::SafeAutomaton => "safe-automaton",
        }
    }

    pub fn supports_inhibitor_arcs(self) -> bool {
        !matches!(
            self,
            ReductionKind::VisibleLtl | ReductionKind::InterestingLtl | ReductionKind::SafeAutomaton
        )
    }

    pub fn required_conditions(self) -> usize {
        match self {
            ReductionKind::SafeAutomaton => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for ReductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReductionKind {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ReductionKind::None),
            "reachability" => Ok(ReductionKind::Reachability),
            "negated" => Ok(ReductionKind::Negated),
            "visible-ltl" => Ok(ReductionKind::VisibleLtl),
            "interesting-ltl" => Ok(ReductionKind::InterestingLtl),
            "safe-automaton" => Ok(ReductionKind::SafeAutomaton),
            other => Err(ReductionError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReductionError {
    #[error("{0} reduction does not support nets with inhibitor arcs")]
    InhibitorArcsUnsupported(ReductionKind),
    #[error("{kind} reduction needs {expected} conditions, got {found}")]
    MissingConditions {
        kind: ReductionKind,
        expected: usize,
        found: usize,
    },
    #[error("condition `{0}` still refers to places by name")]
    Unbound(String),
    #[error("unknown reduction `{0}`")]
    UnknownKind(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// 约简变体。可见迁移表在构造时按查询一次算好。
#[derive(Debug, Clone)]
pub enum Strategy {
    Full,
    Reachability,
    Negated,
    VisibleLtl { visible: IndexVec<TransitionId, bool> },
    InterestingLtl { visible: IndexVec<TransitionId, bool> },
    SafeAutomaton,
}

impl Strategy {
    /// 检查网与查询是否适用于 `kind`；查询必须已绑定。
    pub fn new(
        kind: ReductionKind,
        index: &IncidenceIndex,
        queries: &[Condition],
    ) -> Result<Self, ReductionError> {
        if index.has_inhibitor_arcs() && !kind.supports_inhibitor_arcs() {
            return Err(ReductionError::InhibitorArcsUnsupported(kind));
        }
        if queries.len() < kind.required_conditions() {
            return Err(ReductionError::MissingConditions {
                kind,
                expected: kind.required_conditions(),
                found: queries.len(),
            });
        }
        if let Some(query) = queries.iter().find(|q| !q.is_bound()) {
            return Err(ReductionError::Unbound(query.to_string()));
        }
        let strategy = match kind {
            ReductionKind::None => Strategy::Full,
            ReductionKind::Reachability => Strategy::Reachability,
            ReductionKind::Negated => Strategy::Negated,
            ReductionKind::VisibleLtl => Strategy::VisibleLtl {
                visible: visible_transitions(index, queries),
            },
            ReductionKind::InterestingLtl => Strategy::InterestingLtl {
                visible: visible_transitions(index, queries),
            },
            ReductionKind::SafeAutomaton => Strategy::SafeAutomaton,
        };
        log::debug!("using {} reduction over {} queries", kind, queries.len());
        Ok(strategy)
    }

    pub fn kind(&self) -> ReductionKind {
        match self {
            Strategy::Full => ReductionKind::None,
            Strategy::Reachability => ReductionKind::Reachability,
            Strategy::Negated => ReductionKind::Negated,
            Strategy::VisibleLtl { .. } => ReductionKind::VisibleLtl,
            Strategy::InterestingLtl { .. } => ReductionKind::InterestingLtl,
            Strategy::SafeAutomaton => ReductionKind::SafeAutomaton,
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Strategy::Negated => Polarity::Negated,
            _ => Polarity::Positive,
        }
    }

    pub fn visible(&self) -> Option<&IndexVec<TransitionId, bool>> {
        match self {
            Strategy::VisibleLtl { visible } | Strategy::InterestingLtl { visible } => Some(visible),
            _ => None,
        }
    }

    /// 在至少两个迁移可发生的标识上播种并求闭包。
    ///
    /// `marking` 须与 `set` 当前的父标识一致；`accepting` 只对安全自动机约简有意义。
    pub fn seed(
        &self,
        set: &mut StubbornSet<'_>,
        marking: &Marking,
        queries: &[Condition],
        close_each: bool,
        accepting: bool,
    ) {
        let index = set.index();
        let ctx = EvalContext::new(marking, index);
        match self {
            Strategy::Full => set.set_all_stubborn(),
            Strategy::Reachability => {
                for query in queries {
                    query.evaluate_and_set(&ctx);
                    Interesting::new(set, Mode::Reachability, close_each).visit(query);
                }
                set.closure();
            }
            Strategy::Negated => {
                if queries.is_empty() {
                    return;
                }
                for query in queries {
                    query.evaluate_and_set(&ctx);
                    let mut interesting = Interesting::new(set, Mode::Reachability, close_each);
                    interesting.negate();
                    interesting.visit(query);
                }
                set.closure();
            }
            Strategy::VisibleLtl { visible } => {
                for query in queries {
                    query.evaluate_and_set(&ctx);
                }
                let Some(first) = set.first_enabled() else {
                    return;
                };
                let key = if visible[first] {
                    set.enabled_transitions()
                        .find(|&t| !visible[t])
                        .unwrap_or(first)
                } else {
                    first
                };
                log::trace!("key transition {key}");
                set.add_to_stub(key);
                for arc in index.preset(key) {
                    set.postset_of(arc.place, true);
                }
                ensure_rule_v(set, visible);
            }
            Strategy::InterestingLtl { visible } => {
                for query in queries {
                    query.evaluate_and_set(&ctx);
                    Interesting::new(set, Mode::Ltl, true).visit(query);
                }
                set.closure();
                ensure_rule_v(set, visible);
            }
            Strategy::SafeAutomaton => {
                let [progress, sink, ..] = queries else {
                    set.set_all_stubborn();
                    return;
                };
                progress.evaluate_and_set(&ctx);
                sink.evaluate_and_set(&ctx);
                {
                    let mut unsafe_changes = Interesting::new(set, Mode::Ltl, false);
                    unsafe_changes.visit(progress);
                    unsafe_changes.visit(sink);
                }
                debug_assert!(!set.is_bad());
                set.promote_to_veto();

                // 汇条件只需保持安全，不需要推进
                Interesting::new(set, Mode::Reachability, false).visit(progress);
                set.closure_while(|s| !s.is_bad());
                if set.is_bad() {
                    set.set_all_stubborn();
                    return;
                }
                if accepting && !set.has_enabled_stubborn() {
                    if let Some(key) = set.first_enabled() {
                        set.add_to_stub(key);
                        set.closure_while(|s| !s.is_bad());
                        if set.is_bad() {
                            set.set_all_stubborn();
                        }
                    }
                }
            }
        }
    }

    /// 没有任何可发生迁移进入集合时，全部迁移都成为 stubborn。
    ///
    /// 取补集的变体没有回退。
    pub fn fallback(&self, set: &mut StubbornSet<'_>) {
        if matches!(self, Strategy::Negated) {
            return;
        }
        if !set.has_enabled_stubborn() {
            log::trace!("no enabled transition was added, falling back to the full set");
            set.set_all_stubborn();
        }
    }
}

/// V′：可发生的可见迁移一旦进入集合，全部迁移都成为 stubborn。
fn ensure_rule_v(set: &mut StubbornSet<'_>, visible: &IndexVec<TransitionId, bool>) {
    if set
        .enabled_transitions()
        .any(|t| visible[t] && set.is_stubborn(t))
    {
        set.set_all_stubborn();
    }
}
