use std::fmt::Display;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{
    coefficient::Sign,
    index::{Index, Labeling},
    permutation::Permutation,
};

#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AmplitudeFamily {
    /// Cluster amplitudes `t`.
    T,
    /// Left-hand (de-excitation) amplitudes `l`.
    L,
    /// Right-hand EOM amplitudes `r`.
    R,
}

/// The named tensors a term can carry.
///
/// The derived order is the order tensors appear in canonical terms: Kronecker
/// deltas, then integrals, then amplitudes.
#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TensorKind {
    Delta,
    CoreHamiltonian,
    Fock,
    TwoBody,
    Amplitude { family: AmplitudeFamily, rank: u8 },
}

/// Particle rank of an integral tensor.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Body {
    One,
    Two,
}

/// A block of index positions whose permutations relate equal tensors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexGroup {
    /// Odd permutations flip the sign.
    Antisymmetric(Range<usize>),
    Symmetric(Range<usize>),
}

impl IndexGroup {
    fn range(&self) -> Range<usize> {
        match self {
            IndexGroup::Antisymmetric(r) | IndexGroup::Symmetric(r) => r.clone(),
        }
    }
}

impl TensorKind {
    pub fn arity(&self) -> usize {
        match self {
            TensorKind::Delta | TensorKind::CoreHamiltonian | TensorKind::Fock => 2,
            TensorKind::TwoBody => 4,
            TensorKind::Amplitude { rank, .. } => 2 * *rank as usize,
        }
    }

    pub fn body(&self) -> Option<Body> {
        match self {
            TensorKind::CoreHamiltonian | TensorKind::Fock => Some(Body::One),
            TensorKind::TwoBody => Some(Body::Two),
            _ => None,
        }
    }

    pub fn symmetry(&self) -> Vec<IndexGroup> {
        match self {
            TensorKind::Delta => vec![IndexGroup::Symmetric(0..2)],
            TensorKind::CoreHamiltonian | TensorKind::Fock => vec![],
            TensorKind::TwoBody => vec![
                IndexGroup::Antisymmetric(0..2),
                IndexGroup::Antisymmetric(2..4),
            ],
            TensorKind::Amplitude { rank, .. } => {
                let n = *rank as usize;
                if n < 2 {
                    vec![]
                } else {
                    vec![
                        IndexGroup::Antisymmetric(0..n),
                        IndexGroup::Antisymmetric(n..2 * n),
                    ]
                }
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            TensorKind::Delta => "d".into(),
            TensorKind::CoreHamiltonian => "h".into(),
            TensorKind::Fock => "f".into(),
            TensorKind::TwoBody => "v".into(),
            TensorKind::Amplitude { family, rank } => {
                let prefix = match family {
                    AmplitudeFamily::T => "t",
                    AmplitudeFamily::L => "l",
                    AmplitudeFamily::R => "r",
                };
                format!("{prefix}{rank}")
            }
        }
    }
}

/// A named tensor with its ordered index tuple.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorFactor {
    pub kind: TensorKind,
    pub indices: Vec<Index>,
}

impl TensorFactor {
    pub fn new(kind: TensorKind, indices: Vec<Index>) -> Self {
        debug_assert_eq!(kind.arity(), indices.len());
        TensorFactor { kind, indices }
    }

    pub fn delta(a: Index, b: Index) -> Self {
        TensorFactor::new(TensorKind::Delta, vec![a, b])
    }

    /// Every index arrangement equal to this tensor under its symmetry class,
    /// with the sign relating it to the original. The identity comes first.
    pub fn symmetry_variants(&self) -> Vec<(Vec<Index>, Sign)> {
        let mut variants = vec![(self.indices.clone(), Sign::Plus)];
        for group in self.kind.symmetry() {
            let range = group.range();
            let antisymmetric = matches!(group, IndexGroup::Antisymmetric(_));
            let mut next = Vec::with_capacity(variants.len() * 2);
            for (indices, sign) in &variants {
                for perm in Permutation::all(range.len()) {
                    let block = perm.apply_slice(&indices[range.clone()]);
                    let mut permuted = indices.clone();
                    permuted[range.clone()].copy_from_slice(&block);
                    let flip = antisymmetric && perm.is_odd();
                    next.push((permuted, if flip { -*sign } else { *sign }));
                }
            }
            variants = next;
        }
        variants
    }

    pub fn substitute(&mut self, map: impl Fn(&Index) -> Index) {
        for index in &mut self.indices {
            *index = map(index);
        }
    }

    pub fn render(&self, labels: &Labeling) -> String {
        let names: Vec<&str> = self.indices.iter().map(|i| labels.name(i)).collect();
        match self.kind {
            TensorKind::TwoBody => {
                format!("<{},{}||{},{}>", names[0], names[1], names[2], names[3])
            }
            _ if names.is_empty() => self.kind.name(),
            _ => format!("{}({})", self.kind.name(), names.join(",")),
        }
    }
}

impl Display for TensorFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(&Labeling::new(&self.indices)))
    }
}
