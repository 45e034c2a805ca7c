//! Stubborn set 偏序约简。
//!
//! 一次 `prepare` 的流水线：
//! 1. [`StubbornSet::begin`] 载入父标识，按编号顺序构造可发生集；
//! 2. 可发生迁移不超过一个时直接返回；
//! 3. 由 [`Strategy`] 选择的约简变体播种（兴趣迁移分析、关键迁移等）；
//! 4. 依赖闭包直至不动点；
//! 5. 没有任何可发生迁移进入集合时退化为全部迁移。
//!
//! [`IncidenceIndex`] 构造后只读，可在多个搜索线程间共享；每个线程各自持有
//! 一个 [`ReducedSuccessors`]。

pub mod index;
pub mod interesting;
pub mod set;
pub mod strategy;
pub mod successor;

pub use index::{ArcRecord, IncidenceIndex, IndexError, PlaceEffect};
pub use interesting::{Interesting, Mode};
pub use set::{PlaceSeen, Polarity, StubbornSet};
pub use strategy::{ReductionError, ReductionKind, Strategy};
pub use successor::{FullSuccessors, Phase, ReducedSuccessors, Successors};
