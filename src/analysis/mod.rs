//! 驱动后继迭代器的外层搜索。
pub mod reachability;

pub use reachability::{
    reachability_goal, Outcome, ReachabilityChecker, SearchConfig, SearchOrder, SearchStats,
    StateSpace, Verdict,
};
