/*!

Symbolic second-quantization algebra for deriving many-body equations.

Operator expressions are assembled from a fixed catalog of fermionic operators
(`f`, `v`, `t1`, `t2`, …) as products, nested commutators and truncated
similarity transformations. [`Session::simplify`] sandwiches them between a bra
and a ket determinant, applies Wick's theorem relative to the true or the Fermi
vacuum, brings every surviving term into canonical form and merges equal terms.
The fully contracted result can be read back as an [`Expression`], split by
particle rank into one-body and two-body parts.

```no_run
use wickenso::session::Session;

let mut pq = Session::new("fermi")?;
pq.set_bra("singles")?;
pq.add_operator_product(1.0, &["f"])?;
pq.add_commutator(1.0, &["f"], &["t1"])?;
pq.simplify()?;
pq.print_fully_contracted()?;
# Ok::<(), wickenso::session::SessionError>(())
```

*/

/// Orbital spaces, spins and index labels
pub mod index;

/// Exact rational prefactors
pub mod coefficient;

/// Creation and annihilation operators
pub mod operator;

/// Named tensors and their index symmetries
pub mod tensor;

/// Terms and sums of terms
pub mod term;

/// The operator catalog
pub mod catalog;

/// Engine limits
pub mod config;

/// Products, nested commutators and similarity transformations
pub mod builder;

/// Wick contraction
pub mod wick;

/// Canonical forms and merging
pub mod canonical;

/// Hand-written operator strings
pub mod operator_string;

/// Bra and ket determinants
pub mod projection;

pub mod printer;

pub mod session;

/// Permutation
pub mod permutation;

pub mod utils;

pub use coefficient::{Coefficient, Sign};
pub use session::{Session, SessionError};
pub use term::{Expression, Term};

#[cfg(test)]
mod tests;
