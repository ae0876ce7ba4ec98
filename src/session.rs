//! The stateful front end: accumulate operator expressions, simplify them
//! against a bra/ket projection, read the resulting equations back.

use log::{debug, error, info};
use thiserror::Error;

use crate::{
    builder::{BuilderError, ExpressionBuilder},
    canonical,
    catalog::{parse_product, CatalogError, OperatorCatalog, OperatorProduct},
    coefficient::{Coefficient, CoefficientError},
    config::{ContractionMode, EngineConfig},
    operator_string::{parse_term, StringError},
    printer::{self, Summary},
    projection::{BraKet, Projection, UnknownProjection},
    tensor::Body,
    term::Expression,
    wick::{ContractionError, UnknownVacuum, Vacuum, WickEngine},
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    NonFiniteCoefficient(#[from] CoefficientError),
    #[error(transparent)]
    OperatorString(#[from] StringError),
    #[error("Operator string of odd length {0} has no full contraction")]
    OddOperatorString(usize),
    #[error(transparent)]
    UnknownProjection(#[from] UnknownProjection),
    #[error(transparent)]
    UnknownVacuum(#[from] UnknownVacuum),
    #[error("Neither bra nor ket is set: call set_bra or set_ket first")]
    UnconfiguredProjection,
    #[error("Term with {found} operators after bra/ket attachment exceeds the limit of {limit}")]
    DepthLimitExceeded { found: usize, limit: usize },
    #[error("Engine invariant violated, session aborted: {0}")]
    EngineInvariant(#[source] ContractionError),
    #[error("Session was aborted by an earlier engine failure")]
    Aborted,
    #[error("Invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// A derivation in progress.
///
/// Products added since the last [`Session::simplify`] are kept apart from the
/// simplified result, so simplifying twice changes nothing.
#[derive(Debug, Clone)]
pub struct Session {
    vacuum: Vacuum,
    config: EngineConfig,
    bra: Option<BraKet>,
    ket: Option<BraKet>,
    print_level: usize,
    left: Vec<OperatorProduct>,
    right: Vec<OperatorProduct>,
    pending: Expression,
    simplified: Expression,
    poisoned: bool,
}

fn parse_products<S: AsRef<str>>(
    products: &[Vec<S>],
) -> Result<Vec<OperatorProduct>, CatalogError> {
    products.iter().map(|p| parse_product(p)).collect()
}

impl Session {
    /// `vacuum` is `"fermi"` or `"true"`.
    pub fn new(vacuum: &str) -> Result<Self, SessionError> {
        Self::with_config(vacuum, EngineConfig::default())
    }

    pub fn with_config(vacuum: &str, config: EngineConfig) -> Result<Self, SessionError> {
        let vacuum: Vacuum = vacuum.parse()?;
        Ok(Session {
            vacuum,
            config,
            bra: None,
            ket: None,
            print_level: 0,
            left: Vec::new(),
            right: Vec::new(),
            pending: Expression::new(),
            simplified: Expression::new(),
            poisoned: false,
        })
    }

    /// Session configured from a JSON [`EngineConfig`].
    pub fn from_json_config(vacuum: &str, json: &str) -> Result<Self, SessionError> {
        Self::with_config(vacuum, EngineConfig::from_json(json)?)
    }

    pub fn vacuum(&self) -> Vacuum {
        self.vacuum
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn guard(&self) -> Result<(), SessionError> {
        if self.poisoned {
            Err(SessionError::Aborted)
        } else {
            Ok(())
        }
    }

    /// The configured projection; an unset side is the reference determinant.
    pub fn projection(&self) -> Result<Projection, SessionError> {
        if self.bra.is_none() && self.ket.is_none() {
            return Err(SessionError::UnconfiguredProjection);
        }
        Ok(Projection::new(
            self.bra.unwrap_or_default(),
            self.ket.unwrap_or_default(),
        ))
    }

    pub fn set_bra(&mut self, bra: &str) -> Result<(), SessionError> {
        self.guard()?;
        self.bra = Some(bra.parse()?);
        Ok(())
    }

    pub fn set_ket(&mut self, ket: &str) -> Result<(), SessionError> {
        self.guard()?;
        self.ket = Some(ket.parse()?);
        Ok(())
    }

    /// 0 is silent; from 1 on `simplify` logs every surviving term and prints
    /// a summary table.
    pub fn set_print_level(&mut self, level: usize) {
        self.print_level = level;
    }

    /// Sum of operator products multiplied onto the left of everything added
    /// afterwards, e.g. `[["1"], ["l1"], ["l2"]]`.
    pub fn set_left_operators<S: AsRef<str>>(
        &mut self,
        products: &[Vec<S>],
    ) -> Result<(), SessionError> {
        self.guard()?;
        self.left = parse_products(products)?;
        Ok(())
    }

    /// Sum of operator products multiplied onto the right of everything added
    /// afterwards, e.g. `[["r0"], ["r1"], ["r2"]]`.
    pub fn set_right_operators<S: AsRef<str>>(
        &mut self,
        products: &[Vec<S>],
    ) -> Result<(), SessionError> {
        self.guard()?;
        self.right = parse_products(products)?;
        Ok(())
    }

    /// Run one builder call and append its terms to the pending expression.
    /// Nothing is appended if the call fails.
    fn build(
        &mut self,
        coefficient: f64,
        call: impl FnOnce(&ExpressionBuilder, Coefficient) -> Result<Expression, BuilderError>,
    ) -> Result<(), SessionError> {
        self.guard()?;
        let coefficient = Coefficient::try_from(coefficient)?;
        let builder = ExpressionBuilder::new(OperatorCatalog::standard(), &self.config)
            .with_left(&self.left)
            .with_right(&self.right);
        let added = call(&builder, coefficient)?;
        debug!("{} products pending", self.pending.len() + added.len());
        self.pending.extend(added);
        Ok(())
    }

    pub fn add_operator_product<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        names: &[S],
    ) -> Result<(), SessionError> {
        let product = parse_product(names)?;
        self.build(coefficient, |builder, coefficient| {
            builder.operator_product(Expression::new(), coefficient, &product)
        })
    }

    pub fn add_commutator<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        a: &[S],
        b: &[S],
    ) -> Result<(), SessionError> {
        let (a, b) = (parse_product(a)?, parse_product(b)?);
        self.build(coefficient, |builder, coefficient| {
            builder.commutator(Expression::new(), coefficient, &a, &b)
        })
    }

    pub fn add_double_commutator<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        a: &[S],
        b: &[S],
        c: &[S],
    ) -> Result<(), SessionError> {
        let operands = [parse_product(a)?, parse_product(b)?, parse_product(c)?];
        self.build(coefficient, |builder, coefficient| {
            let [a, b, c] = &operands;
            builder.double_commutator(Expression::new(), coefficient, [a, b, c])
        })
    }

    pub fn add_triple_commutator<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        a: &[S],
        b: &[S],
        c: &[S],
        d: &[S],
    ) -> Result<(), SessionError> {
        let operands = [
            parse_product(a)?,
            parse_product(b)?,
            parse_product(c)?,
            parse_product(d)?,
        ];
        self.build(coefficient, |builder, coefficient| {
            let [a, b, c, d] = &operands;
            builder.triple_commutator(Expression::new(), coefficient, [a, b, c, d])
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_quadruple_commutator<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        a: &[S],
        b: &[S],
        c: &[S],
        d: &[S],
        e: &[S],
    ) -> Result<(), SessionError> {
        let operands = [
            parse_product(a)?,
            parse_product(b)?,
            parse_product(c)?,
            parse_product(d)?,
            parse_product(e)?,
        ];
        self.build(coefficient, |builder, coefficient| {
            let [a, b, c, d, e] = &operands;
            builder.quadruple_commutator(Expression::new(), coefficient, [a, b, c, d, e])
        })
    }

    /// `[[…[X0, X1], …], Xdepth]` with `operands = [X0, …, Xdepth]`.
    pub fn add_nested_commutator<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        depth: usize,
        operands: &[Vec<S>],
    ) -> Result<(), SessionError> {
        let operands = parse_products(operands)?;
        self.build(coefficient, |builder, coefficient| {
            builder.nested_commutator(Expression::new(), coefficient, depth, &operands)
        })
    }

    /// Truncated `e^{-T} H e^{T}` with `H` the sum of `targets` and `T` the sum of `cluster`.
    pub fn add_similarity_transformed_operator<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        targets: &[S],
        cluster: &[S],
    ) -> Result<(), SessionError> {
        let targets = parse_product(targets)?;
        let cluster = parse_product(cluster)?;
        self.build(coefficient, |builder, coefficient| {
            builder.similarity_transformed(Expression::new(), coefficient, &targets, &cluster)
        })
    }

    /// A hand-written operator string with its tensors, e.g. `["p*", "q"]` with
    /// `["h(p,q)"]`. Left and right operators are not applied.
    pub fn add_operator_string<S: AsRef<str>>(
        &mut self,
        coefficient: f64,
        operators: &[S],
        tensors: &[S],
    ) -> Result<(), SessionError> {
        self.guard()?;
        let term = parse_term(Coefficient::try_from(coefficient)?, operators, tensors)?;
        let limit = self.config.max_operators_per_term;
        if term.operators.len() > limit {
            return Err(BuilderError::DepthLimitExceeded {
                what: "operator string length",
                found: term.operators.len(),
                limit,
            }
            .into());
        }
        let odd = term.operators.len() % 2 != 0;
        if odd && self.config.contraction == ContractionMode::FullyContracted {
            return Err(SessionError::OddOperatorString(term.operators.len()));
        }
        debug!("operator string {term} pending");
        self.pending.push(term);
        Ok(())
    }

    /// Attach bra and ket, contract every pending product and merge the result
    /// into the simplified expression.
    pub fn simplify(&mut self) -> Result<(), SessionError> {
        self.guard()?;
        let projection = self.projection()?;
        if self.pending.is_empty() {
            return Ok(());
        }

        let attached = (projection.bra.rank() + projection.ket.rank()) as usize * 2;
        if let Some(longest) = self.pending.iter().map(|t| t.operators.len() + attached).max() {
            if longest > self.config.max_operators_per_term {
                return Err(SessionError::DepthLimitExceeded {
                    found: longest,
                    limit: self.config.max_operators_per_term,
                });
            }
        }

        let pending: Expression = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|t| projection.attach(t))
            .collect();
        let products = pending.len();
        let engine = WickEngine::new(self.vacuum, &self.config);
        let contracted = match engine.contract(pending) {
            Ok(contracted) => contracted,
            Err(e) => {
                error!("contraction failed, aborting session: {e}");
                self.poisoned = true;
                return Err(SessionError::EngineInvariant(e));
            }
        };
        info!(
            "{products} products under {projection} gave {} contracted terms",
            contracted.len()
        );

        let previous = std::mem::take(&mut self.simplified);
        self.simplified = canonical::merge(previous.append(contracted), self.config.parallel);

        if self.print_level > 0 {
            for term in projection.fully_contracted(&self.simplified).iter() {
                debug!("{term}");
            }
            println!("{}", self.summary()?);
        }
        Ok(())
    }

    /// Empty the session; projection, print level and left/right operators stay.
    pub fn clear(&mut self) {
        self.pending = Expression::new();
        self.simplified = Expression::new();
    }

    /// The simplified expression.
    pub fn expression(&self) -> Result<&Expression, SessionError> {
        self.guard()?;
        Ok(&self.simplified)
    }

    pub fn fully_contracted(&self) -> Result<Expression, SessionError> {
        self.guard()?;
        Ok(self.projection()?.fully_contracted(&self.simplified))
    }

    /// Fully contracted terms whose integrals are one-body (`f`, `h`).
    pub fn one_body(&self) -> Result<Expression, SessionError> {
        self.guard()?;
        Ok(self.projection()?.with_body(&self.simplified, Body::One))
    }

    /// Fully contracted terms carrying the two-body integral `v`.
    pub fn two_body(&self) -> Result<Expression, SessionError> {
        self.guard()?;
        Ok(self.projection()?.with_body(&self.simplified, Body::Two))
    }

    pub fn summary(&self) -> Result<Summary, SessionError> {
        Ok(Summary {
            total: self.expression()?.len(),
            fully_contracted: self.fully_contracted()?.len(),
            one_body: self.one_body()?.len(),
            two_body: self.two_body()?.len(),
        })
    }

    pub fn render(&self) -> Result<String, SessionError> {
        self.projection()?;
        Ok(printer::render(self.expression()?))
    }

    pub fn render_fully_contracted(&self) -> Result<String, SessionError> {
        Ok(printer::render(&self.fully_contracted()?))
    }

    pub fn render_one_body(&self) -> Result<String, SessionError> {
        Ok(printer::render(&self.one_body()?))
    }

    pub fn render_two_body(&self) -> Result<String, SessionError> {
        Ok(printer::render(&self.two_body()?))
    }

    /// Every fully contracted term as strings, coefficient first.
    pub fn fully_contracted_strings(&self) -> Result<Vec<Vec<String>>, SessionError> {
        Ok(printer::strings(&self.fully_contracted()?))
    }

    pub fn print(&self) -> Result<(), SessionError> {
        println!("{}", self.render()?);
        Ok(())
    }

    pub fn print_fully_contracted(&self) -> Result<(), SessionError> {
        println!("{}", self.render_fully_contracted()?);
        Ok(())
    }

    pub fn print_one_body(&self) -> Result<(), SessionError> {
        println!("{}", self.render_one_body()?);
        Ok(())
    }

    pub fn print_two_body(&self) -> Result<(), SessionError> {
        println!("{}", self.render_two_body()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn singles() -> Session {
        let mut pq = Session::new("fermi").unwrap();
        pq.set_bra("singles").unwrap();
        pq
    }

    #[test]
    fn unknown_vacuum_and_projection() {
        assert!(matches!(
            Session::new("physical"),
            Err(SessionError::UnknownVacuum(_))
        ));
        let mut pq = Session::new("fermi").unwrap();
        assert!(matches!(
            pq.set_bra("quintuples"),
            Err(SessionError::UnknownProjection(_))
        ));
    }

    #[test]
    fn simplify_needs_a_projection() {
        let mut pq = Session::new("fermi").unwrap();
        pq.add_operator_product(1.0, &["f"]).unwrap();
        assert!(matches!(
            pq.simplify(),
            Err(SessionError::UnconfiguredProjection)
        ));
        assert!(matches!(
            pq.render_one_body(),
            Err(SessionError::UnconfiguredProjection)
        ));
        pq.set_ket("reference").unwrap();
        pq.simplify().unwrap();
    }

    #[test]
    fn unknown_operator_names_the_culprit() {
        let mut pq = singles();
        let err = pq.add_commutator(1.0, &["f"], &["t4"]).unwrap_err();
        assert!(err.to_string().contains("\"t4\""));
    }

    #[test]
    fn failed_call_adds_nothing() {
        let mut pq = singles();
        let err = pq
            .add_nested_commutator(1.0, 2, &[vec!["v"], vec!["t1"]])
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Builder(BuilderError::MalformedNesting { expected: 3, .. })
        ));
        pq.simplify().unwrap();
        assert!(pq.expression().unwrap().is_empty());
    }

    #[test]
    fn non_finite_coefficient() {
        let mut pq = singles();
        assert!(matches!(
            pq.add_operator_product(f64::NAN, &["f"]),
            Err(SessionError::NonFiniteCoefficient(_))
        ));
    }

    #[test]
    fn attached_length_is_limited() {
        let config = EngineConfig {
            max_operators_per_term: 8,
            ..Default::default()
        };
        let mut pq = Session::with_config("fermi", config).unwrap();
        pq.set_bra("doubles").unwrap();
        pq.add_operator_product(1.0, &["v"]).unwrap();
        pq.set_ket("doubles").unwrap();
        assert!(matches!(
            pq.simplify(),
            Err(SessionError::DepthLimitExceeded { found: 12, limit: 8 })
        ));
    }

    #[test]
    fn odd_string_poisons_the_session() {
        let mut pq = singles();
        pq.pending.push(crate::term::Term {
            operators: vec![crate::operator::ElementaryOperator::creation(
                crate::index::Index::dummy(0, crate::index::Space::Occupied),
            )],
            ..crate::term::Term::scalar(Coefficient::one())
        });
        assert!(matches!(
            pq.simplify(),
            Err(SessionError::EngineInvariant(ContractionError::OddOperatorCount(3)))
        ));
        assert!(matches!(pq.simplify(), Err(SessionError::Aborted)));
        assert!(matches!(pq.render_fully_contracted(), Err(SessionError::Aborted)));
        assert!(matches!(
            pq.add_operator_product(1.0, &["f"]),
            Err(SessionError::Aborted)
        ));
    }

    #[test]
    fn bad_operator_strings_are_rejected_up_front() {
        let mut pq = singles();
        assert!(matches!(
            pq.add_operator_string(1.0, &["i*"], &[]),
            Err(SessionError::OddOperatorString(1))
        ));
        assert!(matches!(
            pq.add_operator_string(1.0, &["i*", "z"], &[]),
            Err(SessionError::OperatorString(StringError::UnknownIndex(_)))
        ));
        pq.simplify().unwrap();
        assert!(pq.expression().unwrap().is_empty());
    }

    #[test]
    fn json_configuration() {
        let pq = Session::from_json_config("true", r#"{"parallel": false}"#).unwrap();
        assert_eq!(pq.vacuum(), Vacuum::True);
        assert!(!pq.config().parallel);
        assert!(matches!(
            Session::from_json_config("true", "{"),
            Err(SessionError::Config(_))
        ));
    }
}
