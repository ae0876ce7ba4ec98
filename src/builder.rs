use log::debug;
use thiserror::Error;

use crate::{
    catalog::{CatalogError, OperatorCatalog, OperatorName, OperatorProduct},
    coefficient::{Coefficient, Sign},
    config::EngineConfig,
    index::IndexRegistry,
    term::{Expression, Term},
};

/// Order at which the similarity transformation `e^{-T} H e^{T}` is truncated.
///
/// For a two-body `H` and excitation-only `T` the series terminates here
/// exactly: every `T` in a surviving term contracts with a distinct operator
/// of `H`, and a two-body `H` has four.
pub const BCH_TRUNCATION_ORDER: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuilderError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{call} of depth {depth} needs {expected} non-empty operand sets, got {found}")]
    MalformedNesting {
        call: String,
        depth: usize,
        expected: usize,
        found: usize,
    },
    #[error("{what} {found} exceeds the configured limit of {limit}")]
    DepthLimitExceeded {
        what: &'static str,
        found: usize,
        limit: usize,
    },
    #[error("{0} is not an excitation operator and cannot enter a similarity transformation")]
    NotAnExcitation(OperatorName),
}

/// Human name of the depth-n commutator call, used in error reports.
pub fn nesting_name(depth: usize) -> String {
    match depth {
        0 => "operator product".into(),
        1 => "commutator".into(),
        2 => "double commutator".into(),
        3 => "triple commutator".into(),
        4 => "quadruple commutator".into(),
        n => format!("depth-{n} nested commutator"),
    }
}

/// Expand `[[…[X0, X1], X2]…, Xn]` into its `2^n` signed operator products.
///
/// Each level is one commutator expansion `[P, X] = P X - X P` of every product
/// built so far.
pub fn expand_nested(operands: &[OperatorProduct]) -> Vec<(Sign, OperatorProduct)> {
    let Some((first, rest)) = operands.split_first() else {
        return vec![];
    };
    let mut products = vec![(Sign::Plus, first.clone())];
    for x in rest {
        products = products
            .into_iter()
            .flat_map(|(sign, p)| {
                let mut px = p.clone();
                px.extend_from_slice(x);
                let mut xp = x.clone();
                xp.extend(p);
                [(sign, px), (-sign, xp)]
            })
            .collect();
    }
    products
}

fn sequences(cluster: &[OperatorName], length: usize) -> Vec<OperatorProduct> {
    let mut out: Vec<OperatorProduct> = vec![vec![]];
    for _ in 0..length {
        out = out
            .into_iter()
            .flat_map(|seq| {
                cluster.iter().map(move |c| {
                    let mut s = seq.clone();
                    s.push(*c);
                    s
                })
            })
            .collect();
    }
    out
}

/// Composes operator expressions from catalog operators.
///
/// Every method consumes an [`Expression`] and returns a new one with the
/// requested terms appended; nothing is shared with the input.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder<'a> {
    catalog: &'a OperatorCatalog,
    config: &'a EngineConfig,
    left: &'a [OperatorProduct],
    right: &'a [OperatorProduct],
}

const IDENTITY: &[OperatorProduct] = &[OperatorProduct::new()];

impl<'a> ExpressionBuilder<'a> {
    pub fn new(catalog: &'a OperatorCatalog, config: &'a EngineConfig) -> Self {
        ExpressionBuilder {
            catalog,
            config,
            left: IDENTITY,
            right: IDENTITY,
        }
    }

    /// Sum of products multiplied onto the left of everything added.
    #[must_use]
    pub fn with_left(mut self, left: &'a [OperatorProduct]) -> Self {
        self.left = if left.is_empty() { IDENTITY } else { left };
        self
    }

    /// Sum of products multiplied onto the right of everything added.
    #[must_use]
    pub fn with_right(mut self, right: &'a [OperatorProduct]) -> Self {
        self.right = if right.is_empty() { IDENTITY } else { right };
        self
    }

    /// Every term of the bare product, expanding operators defined as sums.
    /// Each operator instance gets fresh dummies.
    pub fn product_terms(
        &self,
        coefficient: Coefficient,
        product: &[OperatorName],
    ) -> Result<Vec<Term>, BuilderError> {
        let mut registry = IndexRegistry::new();
        let mut terms = vec![Term::scalar(coefficient)];
        for name in product {
            let instances = self.catalog.get(*name)?.instantiate(&mut registry);
            terms = terms
                .into_iter()
                .flat_map(|term| {
                    instances.iter().map(move |instance| {
                        let mut term = term.clone();
                        term.coefficient = term.coefficient * instance.prefactor.clone();
                        term.tensors.extend(instance.tensor.clone());
                        term.operators.extend_from_slice(&instance.operators);
                        term
                    })
                })
                .collect();
        }
        let limit = self.config.max_operators_per_term;
        if let Some(term) = terms.iter().find(|t| t.operators.len() > limit) {
            return Err(BuilderError::DepthLimitExceeded {
                what: "operator string length",
                found: term.operators.len(),
                limit,
            });
        }
        Ok(terms)
    }

    pub fn operator_product(
        &self,
        mut expression: Expression,
        coefficient: Coefficient,
        product: &[OperatorName],
    ) -> Result<Expression, BuilderError> {
        for left in self.left {
            for right in self.right {
                let mut full = left.clone();
                full.extend_from_slice(product);
                full.extend_from_slice(right);
                expression.extend(self.product_terms(coefficient.clone(), &full)?);
            }
        }
        Ok(expression)
    }

    /// Generic nested commutator `[[…[X0, X1], …], Xdepth]` scaled by `coefficient`.
    pub fn nested_commutator(
        &self,
        expression: Expression,
        coefficient: Coefficient,
        depth: usize,
        operands: &[OperatorProduct],
    ) -> Result<Expression, BuilderError> {
        let found = operands.iter().filter(|o| !o.is_empty()).count();
        if operands.len() != depth + 1 || found != depth + 1 {
            return Err(BuilderError::MalformedNesting {
                call: nesting_name(depth),
                depth,
                expected: depth + 1,
                found,
            });
        }
        if depth > self.config.max_commutator_depth {
            return Err(BuilderError::DepthLimitExceeded {
                what: "commutator depth",
                found: depth,
                limit: self.config.max_commutator_depth,
            });
        }

        let before = expression.len();
        let mut expression = expression;
        for (sign, product) in expand_nested(operands) {
            expression =
                self.operator_product(expression, coefficient.clone() * sign, &product)?;
        }
        debug!(
            "{} added {} products",
            nesting_name(depth),
            expression.len() - before
        );
        Ok(expression)
    }

    pub fn commutator(
        &self,
        expression: Expression,
        coefficient: Coefficient,
        a: &[OperatorName],
        b: &[OperatorName],
    ) -> Result<Expression, BuilderError> {
        self.nested_commutator(expression, coefficient, 1, &[a.to_vec(), b.to_vec()])
    }

    pub fn double_commutator(
        &self,
        expression: Expression,
        coefficient: Coefficient,
        operands: [&[OperatorName]; 3],
    ) -> Result<Expression, BuilderError> {
        let operands: Vec<_> = operands.iter().map(|o| o.to_vec()).collect();
        self.nested_commutator(expression, coefficient, 2, &operands)
    }

    pub fn triple_commutator(
        &self,
        expression: Expression,
        coefficient: Coefficient,
        operands: [&[OperatorName]; 4],
    ) -> Result<Expression, BuilderError> {
        let operands: Vec<_> = operands.iter().map(|o| o.to_vec()).collect();
        self.nested_commutator(expression, coefficient, 3, &operands)
    }

    pub fn quadruple_commutator(
        &self,
        expression: Expression,
        coefficient: Coefficient,
        operands: [&[OperatorName]; 5],
    ) -> Result<Expression, BuilderError> {
        let operands: Vec<_> = operands.iter().map(|o| o.to_vec()).collect();
        self.nested_commutator(expression, coefficient, 4, &operands)
    }

    /// Truncated Baker–Campbell–Hausdorff series of `e^{-T} H e^{T}`, summed over
    /// `targets` for `H` and with `T` the sum of `cluster`.
    ///
    /// The n-th order is `1/n!` times every ordered n-sequence of cluster
    /// operators nested around `H`. The series stops at
    /// `min(BCH_TRUNCATION_ORDER, #operators of H)`, which loses nothing since
    /// each excitation operator must attach to its own operator of `H`.
    pub fn similarity_transformed(
        &self,
        mut expression: Expression,
        coefficient: Coefficient,
        targets: &[OperatorName],
        cluster: &[OperatorName],
    ) -> Result<Expression, BuilderError> {
        if targets.is_empty() {
            return Err(BuilderError::MalformedNesting {
                call: "similarity transformation".into(),
                depth: 0,
                expected: 1,
                found: 0,
            });
        }
        for name in cluster {
            if !self.catalog.get(*name)?.is_excitation() {
                return Err(BuilderError::NotAnExcitation(*name));
            }
        }

        for target in targets {
            let order = self
                .catalog
                .get(*target)?
                .operator_count()
                .min(BCH_TRUNCATION_ORDER);
            if order > self.config.max_commutator_depth {
                return Err(BuilderError::DepthLimitExceeded {
                    what: "commutator depth",
                    found: order,
                    limit: self.config.max_commutator_depth,
                });
            }
            for n in 0..=order {
                let weight = coefficient.clone() * Coefficient::inverse_factorial(n);
                for seq in sequences(cluster, n) {
                    let mut operands = vec![vec![*target]];
                    operands.extend(seq.into_iter().map(|c| vec![c]));
                    expression =
                        self.nested_commutator(expression, weight.clone(), n, &operands)?;
                }
            }
        }
        Ok(expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_product;

    fn names(s: &[&str]) -> OperatorProduct {
        parse_product(s).unwrap()
    }

    #[test]
    fn nested_expansion_signs() {
        let out = expand_nested(&[names(&["f"]), names(&["t1"]), names(&["t2"])]);
        let rendered: Vec<String> = out
            .iter()
            .map(|(s, p)| {
                let ops: Vec<_> = p.iter().map(|n| n.as_str()).collect();
                format!("{s}{}", ops.join(" "))
            })
            .collect();
        assert_eq!(
            rendered,
            ["+f t1 t2", "-t2 f t1", "-t1 f t2", "+t2 t1 f"]
        );
    }

    #[test]
    fn product_coefficients_include_prefactors() {
        let config = EngineConfig::default();
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config);
        let terms = builder
            .product_terms(Coefficient::new(1, 2), &names(&["v", "t2"]))
            .unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].coefficient, Coefficient::new(1, 32));
        assert_eq!(terms[0].operators.len(), 8);
        assert_eq!(terms[0].tensors.len(), 2);
        // mean-field part of v
        assert_eq!(terms[1].coefficient, Coefficient::new(-1, 8));
        assert_eq!(terms[1].operators.len(), 6);
    }

    #[test]
    fn commutator_appends_two_terms() {
        let config = EngineConfig::default();
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config);
        let expr = builder
            .commutator(
                Expression::new(),
                Coefficient::one(),
                &names(&["f"]),
                &names(&["t1"]),
            )
            .unwrap();
        assert_eq!(expr.len(), 2);
        assert_eq!(expr.terms()[0].sign, Sign::Plus);
        assert_eq!(expr.terms()[1].value(), Coefficient::integer(-1));
    }

    #[test]
    fn depth_and_operand_checks() {
        let config = EngineConfig::default();
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config);
        let err = builder
            .nested_commutator(
                Expression::new(),
                Coefficient::one(),
                2,
                &[names(&["v"]), names(&["t1"])],
            )
            .unwrap_err();
        assert_eq!(
            err,
            BuilderError::MalformedNesting {
                call: "double commutator".into(),
                depth: 2,
                expected: 3,
                found: 2
            }
        );

        let operands: Vec<_> = std::iter::once(names(&["v"]))
            .chain(std::iter::repeat(names(&["t1"])).take(5))
            .collect();
        let err = builder
            .nested_commutator(Expression::new(), Coefficient::one(), 5, &operands)
            .unwrap_err();
        assert!(matches!(
            err,
            BuilderError::DepthLimitExceeded {
                found: 5,
                limit: 4,
                ..
            }
        ));
    }

    #[test]
    fn empty_operand_is_malformed() {
        let config = EngineConfig::default();
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config);
        let err = builder
            .commutator(Expression::new(), Coefficient::one(), &names(&["f"]), &[])
            .unwrap_err();
        assert!(matches!(err, BuilderError::MalformedNesting { found: 1, .. }));
    }

    #[test]
    fn left_and_right_operators_multiply_out() {
        let config = EngineConfig::default();
        let left = vec![names(&["1"]), names(&["l1"])];
        let right = vec![names(&["r1"])];
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config)
            .with_left(&left)
            .with_right(&right);
        let expr = builder
            .operator_product(Expression::new(), Coefficient::one(), &names(&["f"]))
            .unwrap();
        assert_eq!(expr.len(), 2);
        assert_eq!(expr.terms()[1].tensors.len(), 3);
        assert_eq!(expr.terms()[1].operators.len(), 6);
    }

    #[test]
    fn bch_term_counts() {
        let config = EngineConfig::default();
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config);
        let expr = builder
            .similarity_transformed(
                Expression::new(),
                Coefficient::one(),
                &names(&["f"]),
                &names(&["t1", "t2"]),
            )
            .unwrap();
        // f: 1, [f,T]: 2 x 2, [[f,T],T]: 4 x 4
        assert_eq!(expr.len(), 1 + 4 + 16);

        let err = builder
            .similarity_transformed(
                Expression::new(),
                Coefficient::one(),
                &names(&["f"]),
                &names(&["l1"]),
            )
            .unwrap_err();
        assert_eq!(err, BuilderError::NotAnExcitation(OperatorName::L1));
    }

    #[test]
    fn too_long_product_is_rejected() {
        let config = EngineConfig {
            max_operators_per_term: 6,
            ..Default::default()
        };
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &config);
        let err = builder
            .product_terms(Coefficient::one(), &names(&["v", "t2"]))
            .unwrap_err();
        assert!(matches!(
            err,
            BuilderError::DepthLimitExceeded {
                what: "operator string length",
                found: 8,
                limit: 6
            }
        ));
    }
}
