//! The fixed registry of operators a derivation can be built from.
//!
//! Names are resolved into [`OperatorName`] once, at the API boundary; after that
//! every lookup is a match on the closed enum.

use std::{fmt::Display, str::FromStr};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    coefficient::Coefficient,
    index::{IndexRegistry, Space},
    operator::{ElementaryOperator, OpKind},
    tensor::{AmplitudeFamily, TensorFactor, TensorKind},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Unknown operator {name:?}, expected one of: {known}")]
    UnknownOperator { name: String, known: String },
    #[error("Operator {0} is defined inconsistently: {1}")]
    InvalidDefinition(OperatorName, String),
}

#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum OperatorName {
    Unit,
    CoreHamiltonian,
    Fock,
    TwoBody,
    T1,
    T2,
    T3,
    L1,
    L2,
    R0,
    R1,
    R2,
}

impl OperatorName {
    pub const ALL: [OperatorName; 12] = [
        OperatorName::Unit,
        OperatorName::CoreHamiltonian,
        OperatorName::Fock,
        OperatorName::TwoBody,
        OperatorName::T1,
        OperatorName::T2,
        OperatorName::T3,
        OperatorName::L1,
        OperatorName::L2,
        OperatorName::R0,
        OperatorName::R1,
        OperatorName::R2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorName::Unit => "1",
            OperatorName::CoreHamiltonian => "h",
            OperatorName::Fock => "f",
            OperatorName::TwoBody => "v",
            OperatorName::T1 => "t1",
            OperatorName::T2 => "t2",
            OperatorName::T3 => "t3",
            OperatorName::L1 => "l1",
            OperatorName::L2 => "l2",
            OperatorName::R0 => "r0",
            OperatorName::R1 => "r1",
            OperatorName::R2 => "r2",
        }
    }
}

impl Display for OperatorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperatorName {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperatorName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownOperator {
                name: s.to_string(),
                known: OperatorName::ALL
                    .iter()
                    .map(|n| n.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// A product of catalog operators, in order.
pub type OperatorProduct = Vec<OperatorName>;

/// Resolve a list of names into an [`OperatorProduct`].
pub fn parse_product<S: AsRef<str>>(names: &[S]) -> Result<OperatorProduct, CatalogError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// One product `prefactor · X(…) ops` of a catalog definition.
///
/// `slots` lists the index space of every summation index. The tensor names the
/// slot behind each of its positions; `operators` reference slots the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionTerm {
    pub prefactor: Coefficient,
    pub slots: Vec<Space>,
    pub tensor: Option<(TensorKind, Vec<usize>)>,
    pub operators: Vec<(OpKind, usize)>,
}

/// Second-quantized definition of a catalog operator, a sum of [`DefinitionTerm`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDefinition {
    pub name: OperatorName,
    pub terms: Vec<DefinitionTerm>,
}

/// A definition term with fresh dummy indices.
#[derive(Debug, Clone)]
pub struct Instance {
    pub prefactor: Coefficient,
    pub tensor: Option<TensorFactor>,
    pub operators: Vec<ElementaryOperator>,
}

impl DefinitionTerm {
    fn instantiate(&self, registry: &mut IndexRegistry) -> Instance {
        let indices: Vec<_> = self.slots.iter().map(|s| registry.allocate(*s)).collect();
        Instance {
            prefactor: self.prefactor.clone(),
            tensor: self.tensor.as_ref().map(|(kind, slots)| {
                TensorFactor::new(*kind, slots.iter().map(|&s| indices[s]).collect())
            }),
            operators: self
                .operators
                .iter()
                .map(|&(kind, slot)| ElementaryOperator {
                    kind,
                    index: indices[slot],
                })
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        let mut used = vec![false; self.slots.len()];
        match &self.tensor {
            Some((kind, slots)) => {
                if kind.arity() != slots.len() {
                    return Err(format!(
                        "tensor {} takes {} indices but {} are given",
                        kind.name(),
                        kind.arity(),
                        slots.len()
                    ));
                }
                for &slot in slots {
                    match used.get_mut(slot) {
                        Some(u) => *u = true,
                        None => return Err(format!("tensor references missing slot {slot}")),
                    }
                }
            }
            None if !self.slots.is_empty() => {
                return Err("summation indices without a tensor".into());
            }
            None => {}
        }
        let mut carried = vec![false; self.slots.len()];
        for &(_, slot) in &self.operators {
            match carried.get_mut(slot) {
                Some(true) => return Err(format!("slot {slot} carries two operators")),
                Some(c) => *c = true,
                None => return Err(format!("operator references missing slot {slot}")),
            }
        }
        if used.iter().zip(&carried).any(|(u, c)| !u && !c) {
            return Err("a summation index appears nowhere".into());
        }
        if self.operators.len() % 2 != 0 {
            return Err("odd number of elementary operators".into());
        }
        Ok(())
    }
}

impl OperatorDefinition {
    /// Longest operator string among the terms.
    pub fn operator_count(&self) -> usize {
        self.terms
            .iter()
            .map(|t| t.operators.len())
            .max()
            .unwrap_or(0)
    }

    /// Every elementary operator creates a quasi-particle relative to the Fermi
    /// vacuum: a particle creator or a hole creator (occupied annihilator).
    pub fn is_excitation(&self) -> bool {
        self.terms.iter().all(|term| {
            term.operators.iter().all(|&(kind, slot)| {
                matches!(
                    (kind, term.slots[slot]),
                    (OpKind::Creation, Space::Virtual) | (OpKind::Annihilation, Space::Occupied)
                )
            })
        })
    }

    /// One instance per term, each with its own fresh dummies.
    pub fn instantiate(&self, registry: &mut IndexRegistry) -> Vec<Instance> {
        self.terms
            .iter()
            .map(|t| t.instantiate(registry))
            .collect()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.terms.is_empty() {
            return Err(CatalogError::InvalidDefinition(
                self.name,
                "no terms".into(),
            ));
        }
        for term in &self.terms {
            term.validate()
                .map_err(|msg| CatalogError::InvalidDefinition(self.name, msg))?;
        }
        Ok(())
    }
}

/// Validated, immutable map from [`OperatorName`] to its definition.
#[derive(Debug, Clone)]
pub struct OperatorCatalog {
    definitions: IndexMap<OperatorName, OperatorDefinition>,
}

static STANDARD: Lazy<OperatorCatalog> = Lazy::new(|| {
    OperatorCatalog::new(standard_definitions())
        .unwrap_or_else(|e| panic!("built-in operator catalog is inconsistent: {e}"))
});

impl OperatorCatalog {
    pub fn new(
        definitions: impl IntoIterator<Item = OperatorDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut map = IndexMap::new();
        for def in definitions {
            def.validate()?;
            map.insert(def.name, def);
        }
        Ok(OperatorCatalog { definitions: map })
    }

    /// The spin-orbital catalog shared by every session.
    pub fn standard() -> &'static OperatorCatalog {
        &STANDARD
    }

    pub fn get(&self, name: OperatorName) -> Result<&OperatorDefinition, CatalogError> {
        self.definitions
            .get(&name)
            .ok_or_else(|| CatalogError::UnknownOperator {
                name: name.to_string(),
                known: self.known(),
            })
    }

    /// Resolve by string.
    pub fn lookup(&self, name: &str) -> Result<&OperatorDefinition, CatalogError> {
        let name: OperatorName = name.parse()?;
        self.get(name)
    }

    pub fn known(&self) -> String {
        self.definitions
            .keys()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn amplitude(family: AmplitudeFamily, rank: u8) -> TensorKind {
    TensorKind::Amplitude { family, rank }
}

/// `prefactor · X(slots) c†_0 … c†_{n-1} a_{2n-1} … a_n`: creators on the first
/// half of the slots, annihilators on the second half in reverse.
fn excitation_like(
    tensor: TensorKind,
    creators: Space,
    annihilators: Space,
    rank: usize,
) -> DefinitionTerm {
    let factorial: i64 = (1..=rank as i64).product();
    let mut slots = vec![creators; rank];
    slots.extend(std::iter::repeat(annihilators).take(rank));
    let mut operators: Vec<(OpKind, usize)> = (0..rank).map(|s| (OpKind::Creation, s)).collect();
    operators.extend((rank..2 * rank).rev().map(|s| (OpKind::Annihilation, s)));
    DefinitionTerm {
        prefactor: Coefficient::new(1, factorial * factorial),
        slots,
        tensor: Some((tensor, (0..2 * rank).collect())),
        operators,
    }
}

fn single(name: OperatorName, term: DefinitionTerm) -> OperatorDefinition {
    OperatorDefinition {
        name,
        terms: vec![term],
    }
}

/// Fluctuation potential `1/4 <pq||rs> p† q† s r - <pj||qj> p† q`.
///
/// The second term removes the mean field already carried by `f`, so `f + v`
/// is the full Hamiltonian normal-ordered to the Fermi vacuum plus the
/// reference energy.
fn fluctuation_potential() -> OperatorDefinition {
    use Space::{General, Occupied};
    OperatorDefinition {
        name: OperatorName::TwoBody,
        terms: vec![
            excitation_like(TensorKind::TwoBody, General, General, 2),
            DefinitionTerm {
                prefactor: Coefficient::integer(-1),
                slots: vec![General, General, Occupied],
                tensor: Some((TensorKind::TwoBody, vec![0, 2, 1, 2])),
                operators: vec![(OpKind::Creation, 0), (OpKind::Annihilation, 1)],
            },
        ],
    }
}

fn standard_definitions() -> Vec<OperatorDefinition> {
    use AmplitudeFamily::{L, R, T};
    use Space::{General, Occupied, Virtual};
    vec![
        single(
            OperatorName::Unit,
            DefinitionTerm {
                prefactor: Coefficient::one(),
                slots: vec![],
                tensor: None,
                operators: vec![],
            },
        ),
        single(
            OperatorName::CoreHamiltonian,
            excitation_like(TensorKind::CoreHamiltonian, General, General, 1),
        ),
        single(
            OperatorName::Fock,
            excitation_like(TensorKind::Fock, General, General, 1),
        ),
        fluctuation_potential(),
        single(OperatorName::T1, excitation_like(amplitude(T, 1), Virtual, Occupied, 1)),
        single(OperatorName::T2, excitation_like(amplitude(T, 2), Virtual, Occupied, 2)),
        single(OperatorName::T3, excitation_like(amplitude(T, 3), Virtual, Occupied, 3)),
        single(OperatorName::L1, excitation_like(amplitude(L, 1), Occupied, Virtual, 1)),
        single(OperatorName::L2, excitation_like(amplitude(L, 2), Occupied, Virtual, 2)),
        single(
            OperatorName::R0,
            DefinitionTerm {
                prefactor: Coefficient::one(),
                slots: vec![],
                tensor: Some((amplitude(R, 0), vec![])),
                operators: vec![],
            },
        ),
        single(OperatorName::R1, excitation_like(amplitude(R, 1), Virtual, Occupied, 1)),
        single(OperatorName::R2, excitation_like(amplitude(R, 2), Virtual, Occupied, 2)),
    ]
}
