//! # Petri 网核心定义（Place/Transition Net）
//!
//! 设离散库所集合 `P` 与迁移集合 `T`，基数分别为 `|P|` 与 `|T|`。
//! 定义输入/输出映射 `Pre, Post ∈ ℕ^{|P|×|T|}`。对任意标识 `M ∈ ℕ^{|P|}`：
//!
//! * 迁移 `t ∈ T` **可激发** 当且仅当满足：
//!   1. 对所有普通输入弧 `(p, t)` 有 `M[p] ≥ Pre[p, t]`；
//!   2. 对所有抑制弧 `(p, t)` 有 `M[p] < θ[p, t]`，其中 `θ[p, t]` 由 `Pre[p, t]` 给出；
//! * 迁移 **发射** 后标识满足 `M' = M - Pre[:, t] + Post[:, t]`，抑制弧不参与消耗。
//!
//! 网在构造完成后只读，由 [`crate::stubborn::IncidenceIndex`] 转换为按库所排序的稀疏索引。
//!
//! ## 示例
//!
//! ```rust
//! use pn_stubborn::net::*;
//!
//! let mut net = Net::empty();
//! let p0 = net.add_place(Place::new("p0", 1));
//! let p1 = net.add_place(Place::new("p1", 0));
//! let t0 = net.add_transition(Transition::new("t0"));
//!
//! net.add_input_arc(p0, t0, 1);
//! net.add_output_arc(p1, t0, 1);
//!
//! let marking = net.initial_marking();
//! assert_eq!(net.enabled_transitions(&marking), vec![t0]);
//! let next = net.fire_transition(&marking, t0).unwrap();
//! assert_eq!(next.tokens(p0), 0);
//! assert_eq!(next.tokens(p1), 1);
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod structure;

pub use core::{DiagnosticReport, FireError, Net};
pub use ids::{PlaceId, TransitionId};
pub use incidence::{Incidence, IncidenceBool};
pub use index_vec::{Idx, IndexVec};
pub use structure::{Arc, ArcKind, Marking, Place, Transition, Weight};
