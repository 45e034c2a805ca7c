//! 可达性搜索：在约简或完整后继上检查 `EF φ` / `AG φ`。
//!
//! `AG φ` 按 `¬EF ¬φ` 处理。标识按插入顺序存放在 `IndexMap` 中，
//! 每个标识记录父状态与触发迁移，用于还原见证路径。
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::{EdgeReference, StableGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::net::{Marking, Net, TransitionId};
use crate::query::simplify::fold_conjunctions;
use crate::query::{Condition, ConditionKind, EvalContext, EvalResult, Quantifier, QueryError};
use crate::stubborn::{
    FullSuccessors, IncidenceIndex, ReducedSuccessors, ReductionError, ReductionKind, Successors,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    #[default]
    Dfs,
    Bfs,
}

impl SearchOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchOrder::Dfs => "dfs",
            SearchOrder::Bfs => "bfs",
        }
    }
}

impl fmt::Display for SearchOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dfs" => Ok(SearchOrder::Dfs),
            "bfs" => Ok(SearchOrder::Bfs),
            other => Err(format!("unknown search order `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub order: SearchOrder,
    pub reduction: ReductionKind,
    /// 最多存储的状态数量，None 表示不设上限。
    pub state_limit: Option<usize>,
    pub closure_each: bool,
    /// 是否保留状态图用于 DOT 输出。
    pub record_graph: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            order: SearchOrder::Dfs,
            reduction: ReductionKind::Reachability,
            state_limit: None,
            closure_each: true,
            record_graph: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Satisfied,
    NotSatisfied,
    /// 达到状态上限，结论未知。
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Satisfied => "satisfied",
            Verdict::NotSatisfied => "not satisfied",
            Verdict::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub explored: usize,
    pub stored: usize,
    pub fired: usize,
    pub truncated: bool,
}

/// 搜索中实际存下的状态空间（约简后的子图）。
#[derive(Debug, Clone, Default)]
pub struct StateSpace {
    pub graph: StableGraph<Marking, TransitionId>,
}

impl StateSpace {
    pub fn dot(&self, net: &Net) -> String {
        fn escape(s: &str) -> String {
            s.replace('\\', "\\\\").replace('"', "\\\"")
        }

        let edge_attr = |_, edge: EdgeReference<'_, TransitionId>| -> String {
            let name = net
                .transitions
                .get(*edge.weight())
                .map_or_else(|| edge.weight().to_string(), |t| t.name.clone());
            format!("label=\"{}\"", escape(&name))
        };

        let node_attr = |_, (idx, marking): (NodeIndex, &Marking)| -> String {
            let tokens: Vec<String> = marking
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(p, n)| match net.places.get(p) {
                    Some(place) => format!("{}:{}", place.name, n),
                    None => format!("{p}:{n}"),
                })
                .collect();
            format!(
                "label=\"s{}\\n{}\"",
                idx.index(),
                escape(&tokens.join(", "))
            )
        };

        format!(
            "{:?}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &edge_attr,
                &node_attr
            )
        )
    }

    pub fn write_dot<P: AsRef<Path>>(&self, net: &Net, path: P) -> std::io::Result<()> {
        let dot = self.dot(net);
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, dot)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub query: String,
    pub reduction: ReductionKind,
    pub verdict: Verdict,
    /// 见证（`EF`）或反例（`AG`）路径上的迁移名。
    pub trace: Option<Vec<String>>,
    pub stats: SearchStats,
    #[serde(skip)]
    pub state_space: Option<StateSpace>,
}

struct Run {
    found: Option<usize>,
    states: IndexMap<Marking, Option<(usize, TransitionId)>>,
    stats: SearchStats,
    state_space: Option<StateSpace>,
}

/// 把 `EF φ` 拆成 `(φ, false)`，`AG φ` 拆成 `(¬φ, true)`。
pub fn reachability_goal(query: Condition) -> Result<(Condition, bool), QueryError> {
    let text = query.to_string();
    let ConditionKind::Temporal(outer, inner) = query.kind else {
        return Err(QueryError::NotReachability(text));
    };
    let ConditionKind::Temporal(path, body) = inner.kind else {
        return Err(QueryError::NotReachability(text));
    };
    if body.is_temporal() {
        return Err(QueryError::NotReachability(text));
    }
    match (outer, path) {
        (Quantifier::E, Quantifier::F) => Ok((*body, false)),
        (Quantifier::A, Quantifier::G) => Ok((Condition::not(*body), true)),
        _ => Err(QueryError::NotReachability(text)),
    }
}

pub struct ReachabilityChecker<'a> {
    net: &'a Net,
    index: &'a IncidenceIndex,
    config: SearchConfig,
}

impl<'a> ReachabilityChecker<'a> {
    pub fn new(net: &'a Net, index: &'a IncidenceIndex, config: SearchConfig) -> Self {
        Self { net, index, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn check(&self, query: Condition) -> Result<Outcome, ReductionError> {
        let text = query.to_string();
        let (mut goal, invert) = reachability_goal(query)?;
        goal.bind(self.net)?;
        let goal = fold_conjunctions(goal);
        log::debug!("checking `{}` via goal `{}`", text, goal);

        let run = match self.config.reduction {
            ReductionKind::None => self.search(FullSuccessors::new(self.index), &goal),
            kind => {
                let succ = ReducedSuccessors::new(self.net, self.index, kind, vec![goal.clone()])?
                    .with_closure_each(self.config.closure_each);
                self.search(succ, &goal)
            }
        };

        let verdict = match (run.found, run.stats.truncated, invert) {
            (Some(_), _, false) => Verdict::Satisfied,
            (Some(_), _, true) => Verdict::NotSatisfied,
            (None, true, _) => Verdict::Unknown,
            (None, false, false) => Verdict::NotSatisfied,
            (None, false, true) => Verdict::Satisfied,
        };
        let trace = run.found.map(|state| self.trace(&run.states, state));
        log::info!(
            "`{}`: {} ({} states explored, {} stored)",
            text,
            verdict,
            run.stats.explored,
            run.stats.stored
        );
        Ok(Outcome {
            query: text,
            reduction: self.config.reduction,
            verdict,
            trace,
            stats: run.stats,
            state_space: run.state_space,
        })
    }

    /// 并行检查多个查询，每个线程各自持有后继迭代器，共享关联索引。
    pub fn check_all(&self, queries: Vec<Condition>) -> Vec<Result<Outcome, ReductionError>> {
        queries.into_par_iter().map(|q| self.check(q)).collect()
    }

    fn holds(&self, goal: &Condition, marking: &Marking) -> bool {
        goal.evaluate_and_set(&EvalContext::new(marking, self.index)) == EvalResult::True
    }

    fn search<S: Successors>(&self, mut succ: S, goal: &Condition) -> Run {
        let initial = self.net.initial_marking();
        let mut states: IndexMap<Marking, Option<(usize, TransitionId)>> = IndexMap::new();
        let mut stats = SearchStats::default();
        let mut graph = self.config.record_graph.then(StableGraph::new);
        if let Some(graph) = graph.as_mut() {
            graph.add_node(initial.clone());
        }
        states.insert(initial.clone(), None);

        let mut found = self.holds(goal, &initial).then_some(0);
        let mut frontier = VecDeque::from([0usize]);
        let mut out = Marking::zeroed(self.net.places_len());

        while found.is_none() {
            let next = match self.config.order {
                SearchOrder::Dfs => frontier.pop_back(),
                SearchOrder::Bfs => frontier.pop_front(),
            };
            let Some(current) = next else {
                break;
            };
            let Some((parent, _)) = states.get_index(current) else {
                continue;
            };
            let parent = parent.clone();
            stats.explored += 1;
            succ.prepare(&parent);
            while succ.next(&mut out) {
                stats.fired += 1;
                let Some(fired) = succ.fired() else {
                    continue;
                };
                let (target, inserted) = match states.get_index_of(&out) {
                    Some(target) => (target, false),
                    None => {
                        if self.config.state_limit.is_some_and(|limit| states.len() >= limit) {
                            stats.truncated = true;
                            continue;
                        }
                        let (target, _) = states.insert_full(out.clone(), Some((current, fired)));
                        if let Some(graph) = graph.as_mut() {
                            graph.add_node(out.clone());
                        }
                        (target, true)
                    }
                };
                if let Some(graph) = graph.as_mut() {
                    graph.add_edge(NodeIndex::new(current), NodeIndex::new(target), fired);
                }
                if inserted {
                    if self.holds(goal, &out) {
                        found = Some(target);
                        succ.reset();
                        break;
                    }
                    frontier.push_back(target);
                }
            }
        }

        stats.stored = states.len();
        if stats.truncated {
            log::warn!("state limit reached after storing {} states", stats.stored);
        }
        Run {
            found,
            states,
            stats,
            state_space: graph.map(|graph| StateSpace { graph }),
        }
    }

    fn trace(
        &self,
        states: &IndexMap<Marking, Option<(usize, TransitionId)>>,
        mut state: usize,
    ) -> Vec<String> {
        let mut path = Vec::new();
        while let Some((_, Some((parent, fired)))) = states.get_index(state) {
            path.push(self.net.transitions[*fired].name.clone());
            state = *parent;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Place, Transition};
    use crate::query::parse_query;

    fn build_simple_net() -> Net {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::new("p0", 1));
        let p1 = net.add_place(Place::new("p1", 0));
        let t0 = net.add_transition(Transition::new("t0"));
        let t1 = net.add_transition(Transition::new("t1"));
        net.add_input_arc(p0, t0, 1);
        net.add_output_arc(p1, t0, 1);
        net.add_input_arc(p1, t1, 1);
        net.add_output_arc(p0, t1, 1);
        net
    }

    /// `n` 个互不相关的一次性迁移；完整状态空间有 `2^n` 个标识。
    fn independent(n: usize) -> Net {
        let mut net = Net::empty();
        for i in 0..n {
            let a = net.add_place(Place::new(format!("a{i}"), 1));
            let b = net.add_place(Place::new(format!("b{i}"), 0));
            let t = net.add_transition(Transition::new(format!("t{i}")));
            net.add_input_arc(a, t, 1);
            net.add_output_arc(b, t, 1);
        }
        net
    }

    fn check(net: &Net, query: &str, config: SearchConfig) -> Outcome {
        let index = IncidenceIndex::build(net).unwrap();
        let checker = ReachabilityChecker::new(net, &index, config);
        checker.check(parse_query(query).unwrap()).unwrap()
    }

    #[test]
    fn ef_reports_witness_trace() {
        let net = build_simple_net();
        let outcome = check(&net, "EF p1 >= 1", SearchConfig::default());
        assert_eq!(outcome.verdict, Verdict::Satisfied);
        assert_eq!(outcome.trace, Some(vec!["t0".to_string()]));
        let outcome = check(&net, "EF p1 >= 2", SearchConfig::default());
        assert_eq!(outcome.verdict, Verdict::NotSatisfied);
        assert_eq!(outcome.trace, None);
    }

    #[test]
    fn ag_is_checked_through_its_negation() {
        let net = build_simple_net();
        let outcome = check(&net, "AG p0 + p1 == 1", SearchConfig::default());
        assert_eq!(outcome.verdict, Verdict::Satisfied);
        let outcome = check(&net, "AG p0 >= 1", SearchConfig::default());
        assert_eq!(outcome.verdict, Verdict::NotSatisfied);
        assert_eq!(outcome.trace, Some(vec!["t0".to_string()]));
    }

    #[test]
    fn state_limit_gives_unknown() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 0));
        let t = net.add_transition(Transition::new("grow"));
        net.add_output_arc(p, t, 1);
        let config = SearchConfig {
            state_limit: Some(5),
            ..SearchConfig::default()
        };
        let outcome = check(&net, "EF p >= 100", config);
        assert_eq!(outcome.verdict, Verdict::Unknown);
        assert!(outcome.stats.truncated);
        assert_eq!(outcome.stats.stored, 5);
    }

    #[test]
    fn reduction_stores_fewer_states() {
        let net = independent(4);
        for order in [SearchOrder::Dfs, SearchOrder::Bfs] {
            let full = check(
                &net,
                "EF deadlock",
                SearchConfig {
                    order,
                    reduction: ReductionKind::None,
                    ..SearchConfig::default()
                },
            );
            let reduced = check(
                &net,
                "EF deadlock",
                SearchConfig {
                    order,
                    ..SearchConfig::default()
                },
            );
            assert_eq!(full.verdict, Verdict::Satisfied);
            assert_eq!(reduced.verdict, full.verdict);
            assert!(reduced.stats.stored < full.stats.stored);
            assert_eq!(reduced.trace.as_ref().map(Vec::len), Some(4));
        }
    }

    #[test]
    fn non_reachability_queries_are_rejected() {
        let net = build_simple_net();
        let index = IncidenceIndex::build(&net).unwrap();
        let checker = ReachabilityChecker::new(&net, &index, SearchConfig::default());
        for text in ["p0 >= 1", "EG p0 >= 1", "A (p0 >= 1 U p1 >= 1)", "EF EF p0 >= 1"] {
            let err = checker.check(parse_query(text).unwrap()).unwrap_err();
            assert!(
                matches!(err, ReductionError::Query(QueryError::NotReachability(_))),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn recorded_graph_renders_as_dot() {
        let net = build_simple_net();
        let config = SearchConfig {
            reduction: ReductionKind::None,
            record_graph: true,
            ..SearchConfig::default()
        };
        let outcome = check(&net, "AG !deadlock", config);
        assert_eq!(outcome.verdict, Verdict::Satisfied);
        let space = outcome.state_space.unwrap();
        assert_eq!(space.graph.node_count(), 2);
        assert_eq!(space.graph.edge_count(), 2);
        let dot = space.dot(&net);
        assert!(dot.contains("digraph"));
        assert!(dot.contains("label=\"t1\""));
        assert!(dot.contains("p1:1"));
    }

    #[test]
    fn check_all_keeps_query_order() {
        let net = build_simple_net();
        let index = IncidenceIndex::build(&net).unwrap();
        let checker = ReachabilityChecker::new(&net, &index, SearchConfig::default());
        let queries = ["EF p1 >= 1", "EF p1 >= 3", "AG p0 <= 1"]
            .into_iter()
            .map(|q| parse_query(q).unwrap())
            .collect();
        let verdicts: Vec<_> = checker
            .check_all(queries)
            .into_iter()
            .map(|r| r.unwrap().verdict)
            .collect();
        assert_eq!(
            verdicts,
            vec![Verdict::Satisfied, Verdict::NotSatisfied, Verdict::Satisfied]
        );
    }
}
