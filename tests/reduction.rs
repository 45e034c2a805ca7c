//! 约简搜索与完整搜索的结论一致性测试
//! 完整探索的查询上，约简搜索存下的状态不多于完整搜索

use pn_stubborn::analysis::{Outcome, ReachabilityChecker, SearchConfig, SearchOrder, Verdict};
use pn_stubborn::net::io::{NetDocument, from_json_str};
use pn_stubborn::net::{Net, Place, PlaceId, Transition, TransitionId};
use pn_stubborn::query::{QueryError, parse_query};
use pn_stubborn::stubborn::{IncidenceIndex, ReductionError, ReductionKind};

fn check(net: &Net, query: &str, reduction: ReductionKind, order: SearchOrder) -> Outcome {
    let index = IncidenceIndex::build(net).unwrap();
    let config = SearchConfig {
        order,
        reduction,
        ..SearchConfig::default()
    };
    ReachabilityChecker::new(net, &index, config)
        .check(parse_query(query).unwrap())
        .unwrap()
}

fn assert_agree(net: &Net, cases: &[(&str, Verdict)], kinds: &[ReductionKind]) {
    for order in [SearchOrder::Dfs, SearchOrder::Bfs] {
        for &(query, expected) in cases {
            let full = check(net, query, ReductionKind::None, order);
            assert_eq!(full.verdict, expected, "{query} without reduction ({order})");
            for &kind in kinds {
                let reduced = check(net, query, kind, order);
                assert_eq!(reduced.verdict, expected, "{query} with {kind} ({order})");
                if full.trace.is_none() {
                    assert!(
                        reduced.stats.stored <= full.stats.stored,
                        "{query} with {kind} ({order}): {} > {}",
                        reduced.stats.stored,
                        full.stats.stored
                    );
                }
            }
        }
    }
}

const MUTEX: &str = r#"{
    "places": [
        { "name": "idle", "tokens": 2 },
        { "name": "busy" },
        { "name": "lock", "tokens": 1 }
    ],
    "transitions": [
        { "name": "enter", "inputs": [["idle", 1], ["lock", 1]], "outputs": [["busy", 1]] },
        { "name": "leave", "inputs": [["busy", 1]], "outputs": [["idle", 1], ["lock", 1]] }
    ]
}"#;

/// 先取左叉再取右叉的哲学家，`n >= 2` 时存在死锁。
fn philosophers(n: usize) -> Net {
    let mut net = Net::empty();
    let forks: Vec<_> = (0..n)
        .map(|i| net.add_place(Place::new(format!("fork{i}"), 1)))
        .collect();
    for i in 0..n {
        let think = net.add_place(Place::new(format!("think{i}"), 1));
        let left = net.add_place(Place::new(format!("left{i}"), 0));
        let eat = net.add_place(Place::new(format!("eat{i}"), 0));
        let take_left = net.add_transition(Transition::new(format!("take_left{i}")));
        let take_right = net.add_transition(Transition::new(format!("take_right{i}")));
        let release = net.add_transition(Transition::new(format!("release{i}")));
        let (l, r) = (forks[i], forks[(i + 1) % n]);
        net.add_input_arc(think, take_left, 1);
        net.add_input_arc(l, take_left, 1);
        net.add_output_arc(left, take_left, 1);
        net.add_input_arc(left, take_right, 1);
        net.add_input_arc(r, take_right, 1);
        net.add_output_arc(eat, take_right, 1);
        net.add_input_arc(eat, release, 1);
        net.add_output_arc(think, release, 1);
        net.add_output_arc(l, release, 1);
        net.add_output_arc(r, release, 1);
    }
    net
}

/// `n` 个互不相关的一次性迁移。
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

/// 生产者只在缓冲区不足 2 时生产（抑制弧），消费者取走一个。
fn bounded_buffer() -> Net {
    let mut net = Net::empty();
    let raw = net.add_place(Place::new("raw", 3));
    let buffer = net.add_place(Place::new("buffer", 0));
    let done = net.add_place(Place::new("done", 0));
    let produce = net.add_transition(Transition::new("produce"));
    let consume = net.add_transition(Transition::new("consume"));
    net.add_input_arc(raw, produce, 1);
    net.set_inhibitor_arc(buffer, produce, 2);
    net.add_output_arc(buffer, produce, 1);
    net.add_input_arc(buffer, consume, 1);
    net.add_output_arc(done, consume, 1);
    net
}

const LTL_KINDS: [ReductionKind; 2] = [ReductionKind::Reachability, ReductionKind::InterestingLtl];

#[test]
fn mutex_verdicts_agree() {
    let net = from_json_str::<NetDocument>(MUTEX).unwrap().into_net().unwrap();
    assert_agree(
        &net,
        &[
            ("EF busy >= 2", Verdict::NotSatisfied),
            ("EF busy == 1", Verdict::Satisfied),
            ("AG busy <= 1", Verdict::Satisfied),
            ("AG lock + busy == 1", Verdict::Satisfied),
            ("EF deadlock", Verdict::NotSatisfied),
            ("EF idle == 1 && lock == 1", Verdict::NotSatisfied),
        ],
        &LTL_KINDS,
    );
}

#[test]
fn philosophers_verdicts_agree() {
    let net = philosophers(3);
    assert_agree(
        &net,
        &[
            ("EF deadlock", Verdict::Satisfied),
            ("AG !(eat0 >= 1 && eat1 >= 1)", Verdict::Satisfied),
            ("EF eat0 >= 1 && eat2 >= 1", Verdict::NotSatisfied),
            ("EF eat1 == 1", Verdict::Satisfied),
            ("AG fork0 + left0 + eat0 + eat2 <= 1", Verdict::Satisfied),
            ("AG think0 >= 1 || left0 >= 1", Verdict::NotSatisfied),
        ],
        &LTL_KINDS,
    );
}

#[test]
fn independent_transitions_agree_and_shrink() {
    let net = independent(5);
    assert_agree(
        &net,
        &[
            ("EF deadlock", Verdict::Satisfied),
            ("AG a0 + b0 == 1", Verdict::Satisfied),
            ("EF b0 >= 1 && b4 >= 1", Verdict::Satisfied),
            ("EF b1 + b2 >= 3", Verdict::NotSatisfied),
        ],
        &LTL_KINDS,
    );

    // 完整状态空间 2^5 个标识；只关心 b1 时只需展开 t1
    let full = check(&net, "AG b1 <= 1", ReductionKind::None, SearchOrder::Bfs);
    let reduced = check(&net, "AG b1 <= 1", ReductionKind::Reachability, SearchOrder::Bfs);
    assert_eq!(full.stats.stored, 32);
    assert!(reduced.stats.stored < full.stats.stored);
}

#[test]
fn inhibitor_arcs_only_with_reachability_reduction() {
    let net = bounded_buffer();
    assert_agree(
        &net,
        &[
            ("EF buffer >= 3", Verdict::NotSatisfied),
            ("EF buffer == 2", Verdict::Satisfied),
            ("AG buffer <= 2", Verdict::Satisfied),
            ("EF done == 3", Verdict::Satisfied),
            ("EF done == 2 && raw == 0 && buffer == 0", Verdict::NotSatisfied),
        ],
        &[ReductionKind::Reachability],
    );

    let index = IncidenceIndex::build(&net).unwrap();
    for kind in [ReductionKind::VisibleLtl, ReductionKind::InterestingLtl] {
        let config = SearchConfig {
            reduction: kind,
            ..SearchConfig::default()
        };
        let err = ReachabilityChecker::new(&net, &index, config)
            .check(parse_query("EF buffer == 2").unwrap())
            .unwrap_err();
        assert_eq!(err, ReductionError::InhibitorArcsUnsupported(kind));
    }
}

#[test]
fn unknown_place_is_reported() {
    let net = independent(2);
    let index = IncidenceIndex::build(&net).unwrap();
    let checker = ReachabilityChecker::new(&net, &index, SearchConfig::default());
    let err = checker.check(parse_query("EF ghost >= 1").unwrap()).unwrap_err();
    assert_eq!(err, ReductionError::Query(QueryError::UnknownPlace("ghost".to_string())));
    assert_eq!(net.place_by_name("b1"), Some(PlaceId(3)));
    assert_eq!(net.transition_by_name("t1"), Some(TransitionId(1)));
}
