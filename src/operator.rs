use serde::{Deserialize, Serialize};

use crate::index::{Index, Labeling};

#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum OpKind {
    Creation,
    Annihilation,
}

/// A single creation or annihilation operator `a†_p` / `a_p`.
#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ElementaryOperator {
    pub kind: OpKind,
    pub index: Index,
}

impl ElementaryOperator {
    pub fn creation(index: Index) -> Self {
        ElementaryOperator {
            kind: OpKind::Creation,
            index,
        }
    }

    pub fn annihilation(index: Index) -> Self {
        ElementaryOperator {
            kind: OpKind::Annihilation,
            index,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.kind == OpKind::Creation
    }

    /// `p*` for a creator, `p` for an annihilator.
    pub fn render(&self, labels: &Labeling) -> String {
        match self.kind {
            OpKind::Creation => format!("{}*", labels.name(&self.index)),
            OpKind::Annihilation => labels.name(&self.index).to_string(),
        }
    }
}
