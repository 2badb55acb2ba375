//! 記述論理テーブルロー推論エンジン
//!
//! このクレートはテーブルロー推論の中核を提供します:
//! - ABox / TBox / RBox と遅延展開 (lazy unfolding)
//! - ノードのマージと依存関係の追跡
//! - ブロッキングによる停止性の保証
//! - 分岐木と依存関係指向バックトラッキング (DDB)
//! - 充足可能性・包含・定義域・値域・排他性の問い合わせ

pub mod abox;
pub mod blocking;
pub mod branch;
pub mod completer;
pub mod config;
pub mod consistency;
pub mod cow;
pub mod dependency;
pub mod kb;
pub mod merge;
pub mod node;
pub mod rbox;
pub mod reasoner;
pub mod tbox;

pub use abox::ABox;
pub use blocking::BlockingStrategy;
pub use branch::{Branch, BranchState, BranchTree};
pub use completer::{CompleterKind, ContinuationState};
pub use config::ReasonerOptions;
pub use consistency::{ConsistencyInfo, NodeConsistencyChecker};
pub use dependency::{DependencyMap, TermEntry};
pub use kb::{Axiom, KnowledgeBase};
pub use merge::NodeMergeInfo;
pub use node::{Node, NodeId};
pub use rbox::{RBox, RoleKind};
pub use reasoner::{Reasoner, ReasonerResult};
pub use tbox::TBox;

use fukurow_term::{Role, TermError};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReasonerError {
    #[error("Cannot merge node {merged} into {target}")]
    NodeMerge {
        target: NodeId,
        merged: NodeId,
        culprits: BTreeSet<TermEntry>,
    },

    #[error("Inconsistent ABox: {0}")]
    InconsistentABox(String),

    #[error("Inconsistent node {node}: {reason}")]
    InconsistentNode {
        node: NodeId,
        reason: String,
        clashes: BTreeSet<TermEntry>,
    },

    #[error("Term clash at node {node}")]
    TermClash {
        node: NodeId,
        clashes: BTreeSet<TermEntry>,
    },

    #[error("Too many {role} links at node {node}")]
    RoleCardinality {
        node: NodeId,
        role: Role,
        clashes: BTreeSet<TermEntry>,
    },

    #[error("Inconsistent RBox: {0}")]
    InconsistentRBox(String),

    #[error("Term error: {0}")]
    Term(#[from] TermError),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReasonerError {
    /// Errors that make the current branch inconsistent rather than abort
    /// reasoning
    pub fn is_clash(&self) -> bool {
        matches!(
            self,
            ReasonerError::NodeMerge { .. }
                | ReasonerError::InconsistentABox(_)
                | ReasonerError::InconsistentNode { .. }
                | ReasonerError::TermClash { .. }
                | ReasonerError::RoleCardinality { .. }
        )
    }

    /// Entries taking part in a clash
    pub fn clash_entries(&self) -> BTreeSet<TermEntry> {
        match self {
            ReasonerError::NodeMerge { culprits, .. } => culprits.clone(),
            ReasonerError::InconsistentNode { clashes, .. }
            | ReasonerError::TermClash { clashes, .. }
            | ReasonerError::RoleCardinality { clashes, .. } => clashes.clone(),
            _ => BTreeSet::new(),
        }
    }
}
