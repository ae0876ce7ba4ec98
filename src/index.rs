use std::fmt::Display;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::utils::to_subscript;

/// Orbital space of an index.
///
/// [`Space::General`] runs over both occupied and virtual orbitals and is only
/// narrowed down once a contraction fixes it.
#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Space {
    Occupied,
    Virtual,
    General,
}

impl Space {
    /// Common subspace, `None` if the spaces are disjoint.
    pub fn intersect(self, other: Space) -> Option<Space> {
        match (self, other) {
            (Space::General, s) | (s, Space::General) => Some(s),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }

    /// Space of a hand-written index name, from its first letter: `i`–`o`
    /// occupied, `a`–`h` virtual, `p`–`w` general.
    pub fn of_name(name: &str) -> Option<Space> {
        let first = name.chars().next()?;
        [Space::Occupied, Space::Virtual, Space::General]
            .into_iter()
            .find(|s| s.alphabet().iter().any(|l| l.starts_with(first)))
    }

    fn alphabet(self) -> &'static [&'static str] {
        match self {
            Space::Occupied => &["i", "j", "k", "l", "m", "n", "o"],
            Space::Virtual => &["a", "b", "c", "d", "e", "f", "g", "h"],
            Space::General => &["p", "q", "r", "s", "t", "u", "v", "w"],
        }
    }
}

#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Spin {
    Alpha,
    Beta,
}

impl Spin {
    /// Spin of two identified indices, `None` when both are fixed and differ.
    pub fn merge(a: Option<Spin>, b: Option<Spin>) -> Option<Option<Spin>> {
        match (a, b) {
            (Some(x), Some(y)) if x != y => None,
            (Some(x), _) | (_, Some(x)) => Some(Some(x)),
            (None, None) => Some(None),
        }
    }
}

/// Whether an index is pinned by the bra, pinned by the ket, or summed over.
///
/// External labels sort before dummies, which keeps them leftmost in canonical keys.
#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Label {
    Bra(u8),
    Ket(u8),
    Dummy(u32),
}

#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Index {
    pub label: Label,
    pub space: Space,
    pub spin: Option<Spin>,
}

impl Index {
    pub fn dummy(id: u32, space: Space) -> Self {
        Index {
            label: Label::Dummy(id),
            space,
            spin: None,
        }
    }

    pub fn bra(position: u8, space: Space) -> Self {
        Index {
            label: Label::Bra(position),
            space,
            spin: None,
        }
    }

    pub fn ket(position: u8, space: Space) -> Self {
        Index {
            label: Label::Ket(position),
            space,
            spin: None,
        }
    }

    #[must_use]
    pub fn with_spin(mut self, spin: Spin) -> Self {
        self.spin = Some(spin);
        self
    }

    pub fn is_external(&self) -> bool {
        !matches!(self.label, Label::Dummy(_))
    }

    /// Fixed name of an external index, `None` for dummies.
    pub fn external_name(&self) -> Option<String> {
        let (letters, position): (&[&str], u8) = match (self.label, self.space) {
            (Label::Bra(p), Space::Occupied) => (&["m", "n", "o"], p),
            (Label::Bra(p), Space::Virtual) => (&["e", "f", "g"], p),
            (Label::Ket(p), Space::Occupied) => (&["i", "j", "k"], p),
            (Label::Ket(p), Space::Virtual) => (&["a", "b", "c"], p),
            (Label::Bra(p), Space::General) => (&["x", "y", "z"], p),
            (Label::Ket(p), Space::General) => (&["u", "v", "w"], p),
            (Label::Dummy(_), _) => return None,
        };
        let name = match letters.get(position as usize) {
            Some(l) => l.to_string(),
            None => format!("{}{}", letters[0], to_subscript(position as usize)),
        };
        Some(name)
    }
}

/// Hands out fresh dummy indices for one term.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    next: u32,
}

impl IndexRegistry {
    pub fn new() -> Self {
        IndexRegistry { next: 0 }
    }

    pub fn allocate(&mut self, space: Space) -> Index {
        let index = Index::dummy(self.next, space);
        self.next += 1;
        index
    }

    pub fn allocated(&self) -> u32 {
        self.next
    }
}

/// Display names for the indices of a single term.
///
/// Externals keep their fixed letters. Dummies are named per space in order of
/// their id, skipping letters the externals already took.
#[derive(Debug, Clone, Default)]
pub struct Labeling {
    names: Vec<(Index, String)>,
}

impl Labeling {
    pub fn new<'a>(indices: impl IntoIterator<Item = &'a Index>) -> Self {
        let mut unique: Vec<Index> = Vec::new();
        for index in indices {
            if !unique.contains(index) {
                unique.push(*index);
            }
        }
        unique.sort();

        let mut taken = AHashSet::new();
        let mut names = Vec::with_capacity(unique.len());
        for index in unique.iter().filter(|i| i.is_external()) {
            if let Some(name) = index.external_name() {
                taken.insert(name.clone());
                names.push((*index, name));
            }
        }

        let mut cursor = [0usize; 3];
        for index in unique.iter().filter(|i| !i.is_external()) {
            let slot = index.space as usize;
            let letters = index.space.alphabet();
            let name = loop {
                let n = cursor[slot];
                cursor[slot] += 1;
                let candidate = if n < letters.len() {
                    letters[n].to_string()
                } else {
                    let round = n / letters.len();
                    format!("{}{}", letters[n % letters.len()], to_subscript(round))
                };
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(name.clone());
            names.push((*index, name));
        }
        Labeling { names }
    }

    pub fn name(&self, index: &Index) -> &str {
        self.names
            .iter()
            .find(|(i, _)| i == index)
            .map(|(_, n)| n.as_str())
            .unwrap_or("?")
    }
}

impl Display for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Space::Occupied => write!(f, "occ"),
            Space::Virtual => write!(f, "vir"),
            Space::General => write!(f, "gen"),
        }
    }
}
