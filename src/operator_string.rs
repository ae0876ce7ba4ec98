//! Hand-written operator strings such as `p* q` with the tensor `h(p,q)`.
//!
//! Index names pick their space by first letter (see [`Space::of_name`]); equal
//! names are the same summation index. Creators carry a trailing `*`, the way
//! terms are rendered.

use ahash::AHashMap;
use thiserror::Error;

use crate::{
    coefficient::Coefficient,
    index::{Index, IndexRegistry, Space},
    operator::ElementaryOperator,
    tensor::{AmplitudeFamily, TensorFactor, TensorKind},
    term::Term,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StringError {
    #[error("Index {0:?} must start with an occupied (i-o), virtual (a-h) or general (p-w) letter")]
    UnknownIndex(String),
    #[error("Malformed tensor {0:?}, expected e.g. \"h(p,q)\", \"t2(a,b,i,j)\" or \"<p,q||r,s>\"")]
    MalformedTensor(String),
    #[error("Tensor {tensor:?} takes {expected} indices, got {found}")]
    Arity {
        tensor: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Default)]
struct Names {
    registry: IndexRegistry,
    indices: AHashMap<String, Index>,
}

impl Names {
    fn resolve(&mut self, name: &str) -> Result<Index, StringError> {
        let name = name.trim();
        if let Some(index) = self.indices.get(name) {
            return Ok(*index);
        }
        let space = Space::of_name(name).ok_or_else(|| StringError::UnknownIndex(name.into()))?;
        let index = self.registry.allocate(space);
        self.indices.insert(name.to_string(), index);
        Ok(index)
    }
}

fn tensor_kind(name: &str) -> Option<TensorKind> {
    let kind = match name {
        "d" => TensorKind::Delta,
        "h" => TensorKind::CoreHamiltonian,
        "f" => TensorKind::Fock,
        "v" => TensorKind::TwoBody,
        _ => {
            let mut chars = name.chars();
            let family = match chars.next()? {
                't' => AmplitudeFamily::T,
                'l' => AmplitudeFamily::L,
                'r' => AmplitudeFamily::R,
                _ => return None,
            };
            TensorKind::Amplitude {
                family,
                rank: chars.as_str().parse().ok()?,
            }
        }
    };
    Some(kind)
}

fn parse_tensor(text: &str, names: &mut Names) -> Result<TensorFactor, StringError> {
    let text = text.trim();
    let malformed = || StringError::MalformedTensor(text.to_string());

    let (kind, arguments): (TensorKind, Vec<&str>) =
        if let Some(inner) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            let (bra, ket) = inner.split_once("||").ok_or_else(malformed)?;
            let arguments = bra.split(',').chain(ket.split(',')).collect();
            (TensorKind::TwoBody, arguments)
        } else if let Some((name, rest)) = text.split_once('(') {
            let inner = rest.strip_suffix(')').ok_or_else(malformed)?;
            let kind = tensor_kind(name.trim()).ok_or_else(malformed)?;
            (kind, inner.split(',').collect())
        } else {
            (tensor_kind(text).ok_or_else(malformed)?, vec![])
        };

    if arguments.len() != kind.arity() {
        return Err(StringError::Arity {
            tensor: text.to_string(),
            expected: kind.arity(),
            found: arguments.len(),
        });
    }
    let indices = arguments
        .into_iter()
        .map(|a| names.resolve(a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TensorFactor::new(kind, indices))
}

/// One term from an operator string and its tensors.
///
/// ```
/// # use wickenso::{operator_string::parse_term, Coefficient};
/// let term = parse_term(Coefficient::one(), &["p*", "q"], &["h(p,q)"]).unwrap();
/// assert_eq!(term.to_string(), "+1 h(p,q) p* q");
/// ```
pub fn parse_term<S: AsRef<str>>(
    coefficient: Coefficient,
    operators: &[S],
    tensors: &[S],
) -> Result<Term, StringError> {
    let mut names = Names::default();
    let tensors = tensors
        .iter()
        .map(|t| parse_tensor(t.as_ref(), &mut names))
        .collect::<Result<Vec<_>, _>>()?;
    let operators = operators
        .iter()
        .map(|o| {
            let o = o.as_ref().trim();
            Ok(match o.strip_suffix('*') {
                Some(name) => ElementaryOperator::creation(names.resolve(name)?),
                None => ElementaryOperator::annihilation(names.resolve(o)?),
            })
        })
        .collect::<Result<Vec<_>, StringError>>()?;
    Ok(Term {
        operators,
        tensors,
        ..Term::scalar(coefficient)
    })
}
