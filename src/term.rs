use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    coefficient::{Coefficient, Sign},
    index::{Index, Labeling},
    operator::ElementaryOperator,
    tensor::{Body, TensorFactor},
};

/// A signed product of elementary operators and tensor factors.
///
/// Before contraction `operators` is a plain operator product. Terms coming out
/// of a partial contraction carry the uncontracted rest as a normal-ordered
/// product `{…}` instead, flagged by `normal_ordered`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub coefficient: Coefficient,
    pub sign: Sign,
    pub operators: Vec<ElementaryOperator>,
    pub normal_ordered: bool,
    pub tensors: Vec<TensorFactor>,
}

impl Term {
    pub fn scalar(coefficient: Coefficient) -> Self {
        Term {
            coefficient,
            sign: Sign::Plus,
            operators: Vec::new(),
            normal_ordered: false,
            tensors: Vec::new(),
        }
    }

    /// Signed coefficient.
    pub fn value(&self) -> Coefficient {
        self.coefficient.clone() * self.sign
    }

    pub fn is_fully_contracted(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = &Index> {
        self.tensors
            .iter()
            .flat_map(|t| t.indices.iter())
            .chain(self.operators.iter().map(|o| &o.index))
    }

    /// Sorted, deduplicated bra/ket indices of the term.
    pub fn externals(&self) -> Vec<Index> {
        let mut ext: Vec<Index> = self.indices().filter(|i| i.is_external()).copied().collect();
        ext.sort();
        ext.dedup();
        ext
    }

    /// Highest particle rank among the term's integral tensors.
    pub fn body(&self) -> Option<Body> {
        self.tensors.iter().filter_map(|t| t.kind.body()).max()
    }

    pub fn labeling(&self) -> Labeling {
        Labeling::new(self.indices())
    }

    /// Coefficient first, then tensors, then operators: `["+1/2", "<i,j||i,j>"]`.
    pub fn to_strings(&self) -> Vec<String> {
        let labels = self.labeling();
        let mut out = vec![self.value().to_string()];
        out.extend(self.tensors.iter().map(|t| t.render(&labels)));
        if !self.operators.is_empty() {
            let ops: Vec<String> = self.operators.iter().map(|o| o.render(&labels)).collect();
            if self.normal_ordered {
                out.push(format!("{{{}}}", ops.join(" ")));
            } else {
                out.extend(ops);
            }
        }
        out
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_strings().join(" "))
    }
}

/// An ordered sum of terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    terms: Vec<Term>,
}

impl Expression {
    pub fn new() -> Self {
        Expression { terms: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.terms.iter()
    }

    pub fn into_terms(self) -> Vec<Term> {
        self.terms
    }

    pub fn push(&mut self, term: Term) {
        self.terms.push(term);
    }

    /// Concatenation, `self` first.
    #[must_use]
    pub fn append(mut self, other: Expression) -> Expression {
        self.terms.extend(other.terms);
        self
    }
}

impl FromIterator<Term> for Expression {
    fn from_iter<I: IntoIterator<Item = Term>>(iter: I) -> Self {
        Expression {
            terms: iter.into_iter().collect(),
        }
    }
}

impl Extend<Term> for Expression {
    fn extend<I: IntoIterator<Item = Term>>(&mut self, iter: I) {
        self.terms.extend(iter);
    }
}

impl IntoIterator for Expression {
    type Item = Term;
    type IntoIter = std::vec::IntoIter<Term>;
    fn into_iter(self) -> Self::IntoIter {
        self.terms.into_iter()
    }
}

impl<'a> IntoIterator for &'a Expression {
    type Item = &'a Term;
    type IntoIter = std::slice::Iter<'a, Term>;
    fn into_iter(self) -> Self::IntoIter {
        self.terms.iter()
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}
