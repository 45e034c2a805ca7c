//! 查询条件树：表达式、条件、三值求值缓存与文本解析。
//!
//! 求值分两步：先由 [`Condition::bind`] 把库所名解析成 [`PlaceId`]，
//! 之后每个标识下调用一次 [`Condition::evaluate_and_set`]，把各节点的
//! 结果缓存在节点内部，供兴趣迁移分析读取。
use thiserror::Error;

use crate::net::{Marking, PlaceId};
use crate::stubborn::IncidenceIndex;

pub mod condition;
pub mod expr;
pub mod parser;
pub mod simplify;
pub mod visible;

pub use condition::{
    BoundedPlace, Compare, CompareConjunction, CompareOp, Condition, ConditionKind, Constraint,
    EvalResult, PlaceRef, Quantifier, UpperBounds,
};
pub use expr::{Commutative, Expr, ExprKind};
pub use parser::parse_query;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
    #[error("unknown place `{0}`")]
    UnknownPlace(String),
    #[error("place {place} is out of range for a net with {places} places")]
    PlaceOutOfRange { place: PlaceId, places: usize },
    #[error("`{0}` is not a reachability query (expected EF or AG)")]
    NotReachability(String),
}

/// 求值上下文：当前标识，以及判断死锁所需的关联索引。
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    marking: &'a Marking,
    index: Option<&'a IncidenceIndex>,
}

impl<'a> EvalContext<'a> {
    pub fn new(marking: &'a Marking, index: &'a IncidenceIndex) -> Self {
        Self {
            marking,
            index: Some(index),
        }
    }

    /// 没有网结构时 `deadlock` 一律求值为假。
    pub fn marking_only(marking: &'a Marking) -> Self {
        Self {
            marking,
            index: None,
        }
    }

    pub fn marking(&self) -> &'a Marking {
        self.marking
    }

    pub fn index(&self) -> Option<&'a IncidenceIndex> {
        self.index
    }

    pub fn tokens(&self, place: PlaceId) -> u64 {
        self.marking[place]
    }
}
