//! Wick's theorem for fermionic operator strings.
//!
//! Contractions are enumerated on integer positions into the operator string;
//! a [`BitVec`] marks the positions already paired. Only admissible pairs are
//! ever generated, so branches that would vanish are never explored.

use std::{fmt::Display, str::FromStr};

use ahash::AHashMap;
use bitvec::prelude::*;
use log::trace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    coefficient::Sign,
    config::{ContractionMode, EngineConfig},
    index::{Index, Space, Spin},
    operator::{ElementaryOperator, OpKind},
    tensor::TensorFactor,
    term::{Expression, Term},
    utils::inversion_parity,
};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown vacuum {0:?}, expected \"fermi\" or \"true\"")]
pub struct UnknownVacuum(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractionError {
    #[error("Operator string of odd length {0} cannot be fully contracted")]
    OddOperatorCount(usize),
    #[error("Term {0} is already normal ordered")]
    AlreadyNormalOrdered(String),
}

/// Reference state expectation values are taken in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vacuum {
    /// The empty state: every annihilator kills it.
    True,
    /// The Hartree–Fock determinant: occupied annihilators and virtual
    /// creators are quasi-particle creators.
    Fermi,
}

impl FromStr for Vacuum {
    type Err = UnknownVacuum;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(Vacuum::True),
            "fermi" => Ok(Vacuum::Fermi),
            _ => Err(UnknownVacuum(s.to_string())),
        }
    }
}

impl Display for Vacuum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vacuum::True => write!(f, "true"),
            Vacuum::Fermi => write!(f, "fermi"),
        }
    }
}

impl Vacuum {
    /// Space the pair `(left, right)` collapses to, `None` if its contraction vanishes.
    ///
    /// `left` must stand to the left of `right` in the string.
    pub fn contraction_space(
        &self,
        left: &ElementaryOperator,
        right: &ElementaryOperator,
    ) -> Option<Space> {
        let line = match (self, left.kind, right.kind) {
            (Vacuum::True, OpKind::Annihilation, OpKind::Creation) => Space::General,
            // hole line
            (Vacuum::Fermi, OpKind::Creation, OpKind::Annihilation) => Space::Occupied,
            // particle line
            (Vacuum::Fermi, OpKind::Annihilation, OpKind::Creation) => Space::Virtual,
            _ => return None,
        };
        Spin::merge(left.index.spin, right.index.spin)?;
        line.intersect(left.index.space)?
            .intersect(right.index.space)
    }
}

/// One pair of contracted positions `left < right`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Contraction {
    pub left: usize,
    pub right: usize,
    pub space: Space,
}

/// Every complete pairing of `operators`.
///
/// The leftmost unpaired operator is paired with each admissible partner to its
/// right; a leftmost operator without partner ends the branch.
pub fn perfect_matchings(
    vacuum: Vacuum,
    operators: &[ElementaryOperator],
) -> Vec<Vec<Contraction>> {
    let creators = operators.iter().filter(|o| o.is_creation()).count();
    if 2 * creators != operators.len() {
        return vec![];
    }
    let mut used = bitvec![0; operators.len()];
    let mut out = Vec::new();
    pair_all(vacuum, operators, &mut used, &mut Vec::new(), &mut out);
    out
}

fn pair_all(
    vacuum: Vacuum,
    operators: &[ElementaryOperator],
    used: &mut BitVec,
    current: &mut Vec<Contraction>,
    out: &mut Vec<Vec<Contraction>>,
) {
    let Some(left) = used.first_zero() else {
        out.push(current.clone());
        return;
    };
    used.set(left, true);
    for right in left + 1..operators.len() {
        if used[right] {
            continue;
        }
        if let Some(space) = vacuum.contraction_space(&operators[left], &operators[right]) {
            used.set(right, true);
            current.push(Contraction { left, right, space });
            pair_all(vacuum, operators, used, current, out);
            current.pop();
            used.set(right, false);
        }
    }
    used.set(left, false);
}

/// Every partial pairing of `operators`, the empty one included.
pub fn partial_matchings(
    vacuum: Vacuum,
    operators: &[ElementaryOperator],
) -> Vec<Vec<Contraction>> {
    let mut used = bitvec![0; operators.len()];
    let mut out = Vec::new();
    pair_some(vacuum, operators, 0, &mut used, &mut Vec::new(), &mut out);
    out
}

fn pair_some(
    vacuum: Vacuum,
    operators: &[ElementaryOperator],
    from: usize,
    used: &mut BitVec,
    current: &mut Vec<Contraction>,
    out: &mut Vec<Vec<Contraction>>,
) {
    let Some(left) = (from..operators.len()).find(|&p| !used[p]) else {
        out.push(current.clone());
        return;
    };
    // left stays free
    pair_some(vacuum, operators, left + 1, used, current, out);

    used.set(left, true);
    for right in left + 1..operators.len() {
        if used[right] {
            continue;
        }
        if let Some(space) = vacuum.contraction_space(&operators[left], &operators[right]) {
            used.set(right, true);
            current.push(Contraction { left, right, space });
            pair_some(vacuum, operators, left + 1, used, current, out);
            current.pop();
            used.set(right, false);
        }
    }
    used.set(left, false);
}

/// `(-1)^crossings`: parity of moving the string to `l1 r1 l2 r2 … free…`.
pub fn contraction_sign(contractions: &[Contraction], free: &[usize]) -> Sign {
    let order: Vec<usize> = contractions
        .iter()
        .flat_map(|c| [c.left, c.right])
        .chain(free.iter().copied())
        .collect();
    Sign::from_parity(inversion_parity(&order))
}

/// Union-find over the distinct indices of one term.
struct IndexClasses {
    indices: Vec<Index>,
    position: AHashMap<Index, usize>,
    parent: Vec<usize>,
    space: Vec<Option<Space>>,
}

impl IndexClasses {
    fn new<'a>(all: impl IntoIterator<Item = &'a Index>) -> Self {
        let mut classes = IndexClasses {
            indices: Vec::new(),
            position: AHashMap::new(),
            parent: Vec::new(),
            space: Vec::new(),
        };
        for index in all {
            classes.insert(*index);
        }
        classes
    }

    fn insert(&mut self, index: Index) -> usize {
        if let Some(&p) = self.position.get(&index) {
            return p;
        }
        let p = self.indices.len();
        self.indices.push(index);
        self.position.insert(index, p);
        self.parent.push(p);
        self.space.push(Some(index.space));
        p
    }

    fn find(&mut self, mut p: usize) -> usize {
        while self.parent[p] != p {
            self.parent[p] = self.parent[self.parent[p]];
            p = self.parent[p];
        }
        p
    }

    fn union(&mut self, a: Index, b: Index, line: Space) {
        let a = self.insert(a);
        let b = self.insert(b);
        let (ra, rb) = (self.find(a), self.find(b));
        let merged = self.space[ra]
            .zip(self.space[rb])
            .and_then(|(x, y)| x.intersect(y))
            .and_then(|s| s.intersect(line));
        self.parent[rb] = ra;
        self.space[ra] = merged;
    }

    /// Representative substitution for every index plus the deltas between
    /// externals, `None` if some class has no common space or spin.
    fn resolve(mut self) -> Option<(AHashMap<Index, Index>, Vec<TensorFactor>)> {
        let mut members: AHashMap<usize, Vec<Index>> = AHashMap::new();
        for p in 0..self.indices.len() {
            let root = self.find(p);
            members.entry(root).or_default().push(self.indices[p]);
        }

        let mut substitution = AHashMap::new();
        let mut deltas = Vec::new();
        let mut roots: Vec<usize> = members.keys().copied().collect();
        roots.sort_unstable();
        for root in roots {
            let mut class = members.remove(&root).unwrap_or_default();
            class.sort();
            let space = self.space[root]?;
            let spin = class
                .iter()
                .try_fold(None, |acc, i| Spin::merge(acc, i.spin))?;

            let externals: Vec<Index> =
                class.iter().filter(|i| i.is_external()).copied().collect();
            let representative = match externals.split_first() {
                Some((first, rest)) => {
                    deltas.extend(rest.iter().map(|other| TensorFactor::delta(*first, *other)));
                    *first
                }
                None => Index {
                    space,
                    spin,
                    ..class[0]
                },
            };
            for index in class {
                substitution.insert(index, representative);
            }
        }
        Some((substitution, deltas))
    }
}

/// Expands operator strings into contracted terms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WickEngine {
    pub vacuum: Vacuum,
    pub mode: ContractionMode,
    pub parallel: bool,
}

impl WickEngine {
    pub fn new(vacuum: Vacuum, config: &EngineConfig) -> Self {
        WickEngine {
            vacuum,
            mode: config.contraction,
            parallel: config.parallel,
        }
    }

    /// All contractions of one term's operator string.
    pub fn contract_term(&self, term: &Term) -> Result<Vec<Term>, ContractionError> {
        if term.normal_ordered {
            return Err(ContractionError::AlreadyNormalOrdered(term.to_string()));
        }
        let matchings = match self.mode {
            ContractionMode::FullyContracted => {
                if term.operators.len() % 2 != 0 {
                    return Err(ContractionError::OddOperatorCount(term.operators.len()));
                }
                perfect_matchings(self.vacuum, &term.operators)
            }
            ContractionMode::NormalOrdered => partial_matchings(self.vacuum, &term.operators),
        };
        trace!("{} matchings for {}", matchings.len(), term);

        Ok(matchings
            .iter()
            .filter_map(|m| self.apply(term, m))
            .collect())
    }

    /// The term produced by one matching, `None` if the deltas it implies vanish.
    fn apply(&self, term: &Term, contractions: &[Contraction]) -> Option<Term> {
        let mut paired = bitvec![0; term.operators.len()];
        for c in contractions {
            paired.set(c.left, true);
            paired.set(c.right, true);
        }
        let free: Vec<usize> = paired.iter_zeros().collect();

        let mut classes = IndexClasses::new(term.indices());
        for c in contractions {
            classes.union(
                term.operators[c.left].index,
                term.operators[c.right].index,
                c.space,
            );
        }
        let (substitution, deltas) = classes.resolve()?;
        let rename = |i: &Index| substitution.get(i).copied().unwrap_or(*i);

        let mut tensors = deltas;
        for tensor in &term.tensors {
            let mut t = tensor.clone();
            t.substitute(rename);
            tensors.push(t);
        }
        let operators: Vec<ElementaryOperator> = free
            .iter()
            .map(|&p| {
                let op = term.operators[p];
                ElementaryOperator {
                    index: rename(&op.index),
                    ..op
                }
            })
            .collect();

        Some(Term {
            coefficient: term.coefficient.clone(),
            sign: term.sign * contraction_sign(contractions, &free),
            normal_ordered: !operators.is_empty(),
            operators,
            tensors,
        })
    }

    pub fn contract(&self, expression: Expression) -> Result<Expression, ContractionError> {
        let terms = expression.into_terms();
        let contracted: Vec<Vec<Term>> = if self.parallel {
            terms
                .par_iter()
                .map(|t| self.contract_term(t))
                .collect::<Result<_, _>>()?
        } else {
            terms
                .iter()
                .map(|t| self.contract_term(t))
                .collect::<Result<_, _>>()?
        };
        Ok(contracted.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coefficient::Coefficient, index::Label, tensor::TensorKind};

    fn engine(vacuum: Vacuum) -> WickEngine {
        WickEngine {
            vacuum,
            mode: ContractionMode::FullyContracted,
            parallel: false,
        }
    }

    fn string(operators: Vec<ElementaryOperator>) -> Term {
        Term {
            operators,
            ..Term::scalar(Coefficient::one())
        }
    }

    #[test]
    fn true_vacuum_kills_creator_first() {
        let p = Index::dummy(0, Space::General);
        let q = Index::dummy(1, Space::General);
        let term = string(vec![
            ElementaryOperator::creation(p),
            ElementaryOperator::annihilation(q),
        ]);
        assert!(engine(Vacuum::True).contract_term(&term).unwrap().is_empty());

        let term = string(vec![
            ElementaryOperator::annihilation(p),
            ElementaryOperator::creation(q),
        ]);
        let out = engine(Vacuum::True).contract_term(&term).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tensors, vec![]);
        assert_eq!(out[0].sign, Sign::Plus);
    }

    #[test]
    fn fermi_vacuum_lines() {
        let i = Index::dummy(0, Space::Occupied);
        let a = Index::dummy(1, Space::Virtual);
        let dead = string(vec![
            ElementaryOperator::annihilation(i),
            ElementaryOperator::creation(a),
        ]);
        assert!(engine(Vacuum::Fermi).contract_term(&dead).unwrap().is_empty());

        let hole = string(vec![
            ElementaryOperator::creation(i),
            ElementaryOperator::annihilation(i),
        ]);
        let out = engine(Vacuum::Fermi).contract_term(&hole).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value(), Coefficient::one());
        assert!(out[0].is_fully_contracted());
    }

    #[test]
    fn unbalanced_and_odd_strings() {
        let i = Index::dummy(0, Space::Occupied);
        let j = Index::dummy(1, Space::Occupied);
        let unbalanced = string(vec![
            ElementaryOperator::creation(i),
            ElementaryOperator::creation(j),
        ]);
        assert!(engine(Vacuum::Fermi).contract_term(&unbalanced).unwrap().is_empty());

        let odd = string(vec![ElementaryOperator::creation(i)]);
        assert_eq!(
            engine(Vacuum::Fermi).contract_term(&odd),
            Err(ContractionError::OddOperatorCount(1))
        );
    }

    #[test]
    fn crossing_lines_flip_sign() {
        let order = [
            Contraction {
                left: 0,
                right: 2,
                space: Space::Occupied,
            },
            Contraction {
                left: 1,
                right: 3,
                space: Space::Occupied,
            },
        ];
        assert_eq!(contraction_sign(&order, &[]), Sign::Minus);
        assert_eq!(contraction_sign(&order[..1], &[1, 3]), Sign::Minus);
        assert_eq!(contraction_sign(&[], &[0, 1]), Sign::Plus);
    }

    #[test]
    fn fock_diagonal_in_reference() {
        // <0| f(p,q) p* q |0>
        let p = Index::dummy(0, Space::General);
        let q = Index::dummy(1, Space::General);
        let term = Term {
            tensors: vec![TensorFactor::new(TensorKind::Fock, vec![p, q])],
            ..string(vec![
                ElementaryOperator::creation(p),
                ElementaryOperator::annihilation(q),
            ])
        };
        let out = engine(Vacuum::Fermi).contract_term(&term).unwrap();
        assert_eq!(out.len(), 1);
        let f = &out[0].tensors[0];
        assert_eq!(f.indices[0], f.indices[1]);
        assert_eq!(f.indices[0].space, Space::Occupied);
        assert_eq!(f.indices[0].label, Label::Dummy(0));
        assert_eq!(out[0].to_string(), "+1 f(i,i)");
    }

    #[test]
    fn externals_in_one_class_become_deltas() {
        // <0| m* e a* i |0> with a, i ket indices
        let m = Index::bra(0, Space::Occupied);
        let e = Index::bra(0, Space::Virtual);
        let a = Index::ket(0, Space::Virtual);
        let i = Index::ket(0, Space::Occupied);
        let term = string(vec![
            ElementaryOperator::creation(m),
            ElementaryOperator::annihilation(e),
            ElementaryOperator::creation(a),
            ElementaryOperator::annihilation(i),
        ]);
        let out = engine(Vacuum::Fermi).contract_term(&term).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_string(), "+1 d(m,i) d(e,a)");
    }

    #[test]
    fn spin_mismatch_prunes() {
        let i = Index::dummy(0, Space::Occupied).with_spin(Spin::Alpha);
        let j = Index::dummy(1, Space::Occupied).with_spin(Spin::Beta);
        let term = string(vec![
            ElementaryOperator::creation(i),
            ElementaryOperator::annihilation(j),
        ]);
        assert!(engine(Vacuum::Fermi).contract_term(&term).unwrap().is_empty());
    }

    #[test]
    fn normal_ordered_mode_keeps_free_operators() {
        let p = Index::dummy(0, Space::General);
        let q = Index::dummy(1, Space::General);
        let term = Term {
            tensors: vec![TensorFactor::new(TensorKind::CoreHamiltonian, vec![p, q])],
            ..string(vec![
                ElementaryOperator::creation(p),
                ElementaryOperator::annihilation(q),
            ])
        };
        let engine = WickEngine {
            mode: ContractionMode::NormalOrdered,
            ..engine(Vacuum::Fermi)
        };
        let out = engine.contract_term(&term).unwrap();
        let rendered: Vec<String> = out.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, ["+1 h(p,q) {p* q}", "+1 h(i,i)"]);
        assert!(engine.contract_term(&out[0]).is_err());
    }

    #[test]
    fn vacuum_names() {
        assert_eq!("fermi".parse::<Vacuum>(), Ok(Vacuum::Fermi));
        assert_eq!("true".parse::<Vacuum>(), Ok(Vacuum::True));
        assert!(matches!(
            "physical".parse::<Vacuum>(),
            Err(UnknownVacuum(_))
        ));
    }
}
