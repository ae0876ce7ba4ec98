use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    index::{Index, Space},
    operator::ElementaryOperator,
    tensor::Body,
    term::{Expression, Term},
};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown projection {0:?}, expected one of: vacuum, reference, singles, doubles, triples")]
pub struct UnknownProjection(pub String);

/// Excitation level of a bra or ket determinant.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum BraKet {
    #[default]
    Reference,
    Singles,
    Doubles,
    Triples,
}

impl BraKet {
    pub fn rank(&self) -> u8 {
        match self {
            BraKet::Reference => 0,
            BraKet::Singles => 1,
            BraKet::Doubles => 2,
            BraKet::Triples => 3,
        }
    }

    /// `⟨0| m† n† … f e`: occupied creators, then virtual annihilators reversed.
    pub fn bra_operators(&self) -> Vec<ElementaryOperator> {
        let n = self.rank();
        (0..n)
            .map(|k| ElementaryOperator::creation(Index::bra(k, Space::Occupied)))
            .chain(
                (0..n)
                    .rev()
                    .map(|k| ElementaryOperator::annihilation(Index::bra(k, Space::Virtual))),
            )
            .collect()
    }

    /// `a† b† … j i |0⟩`: virtual creators, then occupied annihilators reversed.
    pub fn ket_operators(&self) -> Vec<ElementaryOperator> {
        let n = self.rank();
        (0..n)
            .map(|k| ElementaryOperator::creation(Index::ket(k, Space::Virtual)))
            .chain(
                (0..n)
                    .rev()
                    .map(|k| ElementaryOperator::annihilation(Index::ket(k, Space::Occupied))),
            )
            .collect()
    }
}

impl FromStr for BraKet {
    type Err = UnknownProjection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vacuum" | "reference" => Ok(BraKet::Reference),
            "singles" => Ok(BraKet::Singles),
            "doubles" => Ok(BraKet::Doubles),
            "triples" => Ok(BraKet::Triples),
            _ => Err(UnknownProjection(s.to_string())),
        }
    }
}

impl Display for BraKet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BraKet::Reference => write!(f, "reference"),
            BraKet::Singles => write!(f, "singles"),
            BraKet::Doubles => write!(f, "doubles"),
            BraKet::Triples => write!(f, "triples"),
        }
    }
}

/// The determinants an expression is sandwiched between.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub bra: BraKet,
    pub ket: BraKet,
}

impl Projection {
    pub fn new(bra: BraKet, ket: BraKet) -> Self {
        Projection { bra, ket }
    }

    /// Bra operators prepended and ket operators appended to the term's string.
    pub fn attach(&self, mut term: Term) -> Term {
        let mut operators = self.bra.bra_operators();
        operators.append(&mut term.operators);
        operators.extend(self.ket.ket_operators());
        term.operators = operators;
        term
    }

    /// Sorted external indices every surviving term carries.
    pub fn externals(&self) -> Vec<Index> {
        let mut ext: Vec<Index> = self
            .bra
            .bra_operators()
            .into_iter()
            .chain(self.ket.ket_operators())
            .map(|o| o.index)
            .collect();
        ext.sort();
        ext
    }

    pub fn is_fully_contracted(&self, term: &Term) -> bool {
        term.is_fully_contracted() && term.externals() == self.externals()
    }

    pub fn fully_contracted(&self, expression: &Expression) -> Expression {
        expression
            .iter()
            .filter(|t| self.is_fully_contracted(t))
            .cloned()
            .collect()
    }

    /// Fully contracted terms whose integrals are all of the given particle rank.
    pub fn with_body(&self, expression: &Expression, body: Body) -> Expression {
        expression
            .iter()
            .filter(|t| self.is_fully_contracted(t) && t.body() == Some(body))
            .cloned()
            .collect()
    }
}

impl Display for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}| … |{}>", self.bra, self.ket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Labeling;

    fn render(ops: &[ElementaryOperator]) -> String {
        let labels = Labeling::new(ops.iter().map(|o| &o.index));
        ops.iter()
            .map(|o| o.render(&labels))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn determinant_strings() {
        assert_eq!(render(&BraKet::Doubles.bra_operators()), "m* n* f e");
        assert_eq!(render(&BraKet::Doubles.ket_operators()), "a* b* j i");
        assert_eq!(render(&BraKet::Singles.bra_operators()), "m* e");
        assert!(BraKet::Reference.ket_operators().is_empty());
    }

    #[test]
    fn names() {
        assert_eq!("vacuum".parse::<BraKet>(), Ok(BraKet::Reference));
        assert_eq!("triples".parse::<BraKet>(), Ok(BraKet::Triples));
        assert_eq!(
            "quadruples".parse::<BraKet>(),
            Err(UnknownProjection("quadruples".into()))
        );
    }

    #[test]
    fn externals_are_sorted() {
        let p = Projection::new(BraKet::Singles, BraKet::Singles);
        assert_eq!(
            p.externals(),
            vec![
                Index::bra(0, Space::Occupied),
                Index::bra(0, Space::Virtual),
                Index::ket(0, Space::Occupied),
                Index::ket(0, Space::Virtual),
            ]
        );
    }
}
