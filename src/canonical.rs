//! Canonical forms of contracted terms and the merge of equal ones.
//!
//! A term's canonical form is the smallest key over every equivalent rendering:
//! orderings of tensors of equal kind, index permutations allowed by each
//! tensor's symmetry, and the dummy renumbering that follows from both.

use std::cmp::Ordering;

use ahash::AHashMap;
use log::trace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    coefficient::{Coefficient, Sign},
    index::{Index, Label},
    operator::ElementaryOperator,
    permutation::Permutation,
    tensor::TensorFactor,
    term::{Expression, Term},
};

/// Everything about a term except its coefficient, with dummies renumbered by
/// first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey {
    pub tensors: Vec<TensorFactor>,
    pub operators: Vec<ElementaryOperator>,
    pub normal_ordered: bool,
}

impl CanonicalKey {
    fn into_term(self, coefficient: Coefficient) -> Term {
        Term {
            coefficient,
            sign: Sign::Plus,
            operators: self.operators,
            normal_ordered: self.normal_ordered,
            tensors: self.tensors,
        }
    }
}

fn renumber(
    tensors: Vec<TensorFactor>,
    operators: &[ElementaryOperator],
) -> (Vec<TensorFactor>, Vec<ElementaryOperator>) {
    let mut seen: Vec<Index> = Vec::new();
    let mut rename = |i: &Index| -> Index {
        if i.is_external() {
            return *i;
        }
        let n = match seen.iter().position(|s| s == i) {
            Some(n) => n,
            None => {
                seen.push(*i);
                seen.len() - 1
            }
        };
        Index {
            label: Label::Dummy(n as u32),
            ..*i
        }
    };
    let tensors = tensors
        .into_iter()
        .map(|t| TensorFactor {
            indices: t.indices.iter().map(&mut rename).collect(),
            kind: t.kind,
        })
        .collect();
    let operators = operators
        .iter()
        .map(|o| ElementaryOperator {
            index: rename(&o.index),
            kind: o.kind,
        })
        .collect();
    (tensors, operators)
}

/// Orderings of the kind-sorted tensors that only reorder runs of equal kind.
fn run_orderings(tensors: &[TensorFactor]) -> Vec<Vec<TensorFactor>> {
    let mut orderings: Vec<Vec<TensorFactor>> = vec![vec![]];
    for run in tensors.chunk_by(|a, b| a.kind == b.kind) {
        let arrangements: Vec<Vec<TensorFactor>> = Permutation::all(run.len())
            .map(|p| p.apply_slice(run))
            .collect();
        orderings = orderings
            .into_iter()
            .flat_map(|prefix| {
                arrangements.iter().map(move |a| {
                    let mut o = prefix.clone();
                    o.extend_from_slice(a);
                    o
                })
            })
            .collect();
    }
    orderings
}

struct Best {
    key: CanonicalKey,
    sign: Sign,
    vanishes: bool,
}

impl Best {
    fn offer(best: &mut Option<Best>, key: CanonicalKey, sign: Sign) {
        if let Some(b) = best {
            match key.cmp(&b.key) {
                Ordering::Greater => return,
                Ordering::Equal => {
                    b.vanishes |= sign != b.sign;
                    return;
                }
                Ordering::Less => {}
            }
        }
        *best = Some(Best {
            key,
            sign,
            vanishes: false,
        });
    }
}

/// Canonical key and the sign relating the term to it; `None` if the term
/// equals its own negative.
pub fn canonical_key(term: &Term) -> Option<(CanonicalKey, Sign)> {
    let mut sorted = term.tensors.clone();
    sorted.sort_by_key(|t| t.kind);

    let mut best: Option<Best> = None;
    for ordering in run_orderings(&sorted) {
        let variants: Vec<Vec<(Vec<Index>, Sign)>> =
            ordering.iter().map(|t| t.symmetry_variants()).collect();
        let mut choice = vec![0usize; variants.len()];
        loop {
            let mut sign = Sign::Plus;
            let tensors: Vec<TensorFactor> = ordering
                .iter()
                .zip(&choice)
                .zip(&variants)
                .map(|((t, &c), v)| {
                    sign = sign * v[c].1;
                    TensorFactor {
                        kind: t.kind,
                        indices: v[c].0.clone(),
                    }
                })
                .collect();
            let (tensors, mut operators) = renumber(tensors, &term.operators);
            if term.normal_ordered {
                let perm = Permutation::sort(&operators);
                if perm.is_odd() {
                    sign = -sign;
                }
                operators = perm.apply_slice(&operators);
            }
            let key = CanonicalKey {
                tensors,
                operators,
                normal_ordered: term.normal_ordered,
            };
            Best::offer(&mut best, key, sign);

            // odometer over the symmetry variants of every tensor
            let mut slot = 0;
            loop {
                if slot == choice.len() {
                    break;
                }
                choice[slot] += 1;
                if choice[slot] < variants[slot].len() {
                    break;
                }
                choice[slot] = 0;
                slot += 1;
            }
            if slot == choice.len() {
                break;
            }
        }
    }

    let best = best?;
    if best.vanishes {
        trace!("{term} vanishes by symmetry");
        return None;
    }
    Some((best.key, best.sign))
}

/// The term in canonical form with its sign folded into the coefficient.
pub fn canonicalize(term: &Term) -> Option<Term> {
    let (key, sign) = canonical_key(term)?;
    Some(key.into_term(term.value() * sign))
}

/// Canonicalize every term, sum those with equal keys and drop exact zeros.
///
/// The result is sorted by key, so it does not depend on the input order.
pub fn merge(expression: Expression, parallel: bool) -> Expression {
    let terms = expression.into_terms();
    let keyed: Vec<(CanonicalKey, Coefficient)> = if parallel {
        terms
            .par_iter()
            .filter_map(|t| canonical_key(t).map(|(k, s)| (k, t.value() * s)))
            .collect()
    } else {
        terms
            .iter()
            .filter_map(|t| canonical_key(t).map(|(k, s)| (k, t.value() * s)))
            .collect()
    };

    let mut sums: AHashMap<CanonicalKey, Coefficient> = AHashMap::new();
    for (key, coefficient) in keyed {
        *sums.entry(key).or_insert_with(Coefficient::zero) += coefficient;
    }
    let mut merged: Vec<(CanonicalKey, Coefficient)> =
        sums.into_iter().filter(|(_, c)| !c.is_zero()).collect();
    merged.sort_by(|a, b| a.0.cmp(&b.0));
    trace!("{} terms merged into {}", terms.len(), merged.len());
    merged
        .into_iter()
        .map(|(key, coefficient)| key.into_term(coefficient))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Space,
        tensor::{AmplitudeFamily, TensorKind},
    };

    fn t(rank: u8) -> TensorKind {
        TensorKind::Amplitude {
            family: AmplitudeFamily::T,
            rank,
        }
    }

    #[test]
    fn dummy_names_do_not_matter() {
        let m = Index::bra(0, Space::Occupied);
        let e = Index::bra(0, Space::Virtual);
        let term = |i: u32| Term {
            tensors: vec![
                TensorFactor::new(t(1), vec![e, Index::dummy(i, Space::Occupied)]),
                TensorFactor::new(TensorKind::Fock, vec![Index::dummy(i, Space::Occupied), m]),
            ],
            ..Term::scalar(Coefficient::integer(-1))
        };
        let a = canonicalize(&term(3)).unwrap();
        let b = canonicalize(&term(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "-1 f(i,m) t1(e,i)");
    }

    #[test]
    fn antisymmetry_picks_smallest_and_tracks_sign() {
        let i = Index::dummy(0, Space::Occupied);
        let j = Index::dummy(1, Space::Occupied);
        let term = Term {
            tensors: vec![TensorFactor::new(TensorKind::TwoBody, vec![j, i, i, j])],
            ..Term::scalar(Coefficient::new(1, 2))
        };
        let c = canonicalize(&term).unwrap();
        assert_eq!(c.to_string(), "-1/2 <i,j||i,j>");
    }

    #[test]
    fn symmetric_self_contraction_vanishes() {
        // <i,i||a,b> = -<i,i||a,b>
        let i = Index::dummy(0, Space::Occupied);
        let a = Index::dummy(1, Space::Virtual);
        let b = Index::dummy(2, Space::Virtual);
        let term = Term {
            tensors: vec![TensorFactor::new(TensorKind::TwoBody, vec![i, i, a, b])],
            ..Term::scalar(Coefficient::one())
        };
        assert_eq!(canonicalize(&term), None);
    }

    #[test]
    fn merge_sums_and_cancels() {
        let i = Index::dummy(0, Space::Occupied);
        let j = Index::dummy(5, Space::Occupied);
        let f = |x: Index| TensorFactor::new(TensorKind::Fock, vec![x, x]);
        let terms: Expression = [
            Term {
                tensors: vec![f(i)],
                ..Term::scalar(Coefficient::one())
            },
            Term {
                tensors: vec![f(j)],
                ..Term::scalar(Coefficient::new(1, 2))
            },
            Term {
                tensors: vec![TensorFactor::new(TensorKind::TwoBody, vec![i, j, i, j])],
                ..Term::scalar(Coefficient::one())
            },
            Term {
                tensors: vec![TensorFactor::new(TensorKind::TwoBody, vec![j, i, i, j])],
                ..Term::scalar(Coefficient::one())
            },
        ]
        .into_iter()
        .collect();
        let merged = merge(terms, false);
        assert_eq!(merged.to_string(), "+3/2 f(i,i)");
    }

    #[test]
    fn equal_kind_tensors_are_reordered() {
        let a = Index::dummy(0, Space::Virtual);
        let i = Index::dummy(1, Space::Occupied);
        let m = Index::bra(0, Space::Occupied);
        let e = Index::bra(0, Space::Virtual);
        let one = Term {
            tensors: vec![
                TensorFactor::new(t(1), vec![a, m]),
                TensorFactor::new(t(1), vec![e, i]),
            ],
            ..Term::scalar(Coefficient::one())
        };
        let other = Term {
            tensors: vec![
                TensorFactor::new(t(1), vec![e, i]),
                TensorFactor::new(t(1), vec![a, m]),
            ],
            ..Term::scalar(Coefficient::one())
        };
        assert_eq!(canonicalize(&one), canonicalize(&other));
        assert_eq!(merge([one, other].into_iter().collect(), true).len(), 1);
    }

    #[test]
    fn normal_ordered_operators_are_sorted_with_sign() {
        let p = Index::dummy(0, Space::General);
        let q = Index::dummy(1, Space::General);
        let term = Term {
            coefficient: Coefficient::one(),
            sign: Sign::Plus,
            operators: vec![
                ElementaryOperator::annihilation(q),
                ElementaryOperator::creation(p),
            ],
            normal_ordered: true,
            tensors: vec![TensorFactor::new(TensorKind::CoreHamiltonian, vec![p, q])],
        };
        assert_eq!(canonicalize(&term).unwrap().to_string(), "-1 h(p,q) {p* q}");
    }
}
