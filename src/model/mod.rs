//! Immutable model snapshot consumed by the conversion core
//!
//! A [`Model`] bundles the ordered statement sequence (segmented around the
//! ODE system), the dependent variables, the declared random variables and
//! the parameter table. Snapshots are produced upstream (by a control-stream
//! parser outside this crate) and treated as read-only here; they can also be
//! loaded from a JSON document via [`Model::from_json`].

mod parameters;
mod random_variables;

pub use parameters::{Parameter, Parameters};
pub use random_variables::{Epsilon, Eta, RandomVariables};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::Expr;

/// Errors raised by the model snapshot layer
#[derive(Debug, Error)]
pub enum ModelError {
    /// A symbol was looked up in the parameter table but never declared
    #[error("Parameter '{0}' is not defined in the parameter table")]
    UnknownParameter(String),

    /// A residual-error variable has no declared variance parameter
    #[error("Residual variable '{0}' has no declared variance parameter")]
    UnknownVariance(String),

    /// The model declares no dependent variable
    #[error("Model has no dependent variable")]
    NoDependentVariable,

    /// Failed to parse a JSON model snapshot
    #[error("Failed to parse model JSON: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// An ordered, immutable assignment `symbol := expression`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub symbol: String,
    pub expression: Expr,
}

impl Statement {
    pub fn new(symbol: impl Into<String>, expression: Expr) -> Self {
        Statement {
            symbol: symbol.into(),
            expression,
        }
    }
}

/// One differential equation `d/dt(amount) = rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeEquation {
    pub amount: String,
    pub rhs: Expr,
}

impl OdeEquation {
    pub fn new(amount: impl Into<String>, rhs: Expr) -> Self {
        OdeEquation {
            amount: amount.into(),
            rhs,
        }
    }
}

/// The system of differential equations of a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdeSystem {
    /// Compartment amount names, in declaration order
    pub amounts: Vec<String>,
    pub eqs: Vec<OdeEquation>,
}

/// The ordered statement sequence, segmented around the ODE system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statements {
    #[serde(default)]
    pub before_odes: Vec<Statement>,
    #[serde(default)]
    pub ode_system: Option<OdeSystem>,
    #[serde(default)]
    pub after_odes: Vec<Statement>,
}

impl Statements {
    /// The segment holding the dependent-variable/error statements: the
    /// after-ODE segment when present, otherwise the whole sequence
    pub fn error_segment(&self) -> &[Statement] {
        if self.after_odes.is_empty() {
            &self.before_odes
        } else {
            &self.after_odes
        }
    }

    /// All assignment statements in declaration order
    pub fn all(&self) -> impl Iterator<Item = &Statement> {
        self.before_odes.iter().chain(self.after_odes.iter())
    }
}

/// An immutable model snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub statements: Statements,
    /// Dependent-variable symbols; the first is the primary observation
    #[serde(default)]
    pub dependent_variables: Vec<String>,
    #[serde(default)]
    pub random_variables: RandomVariables,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Model {
    /// Load a model snapshot from its JSON form
    pub fn from_json(json: &str) -> Result<Model, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The primary dependent-variable symbol
    pub fn dependent_variable(&self) -> Option<&str> {
        self.dependent_variables.first().map(String::as_str)
    }

    /// The defining statement of a symbol, if any (last definition wins)
    pub fn find_assignment(&self, symbol: &str) -> Option<&Statement> {
        self.statements.all().filter(|s| s.symbol == symbol).last()
    }

    /// The variance parameter of a residual-error variable, failing fast
    /// when the variance is undeclared or missing from the parameter table
    pub fn sigma(&self, epsilon: &str) -> Result<&Parameter, ModelError> {
        let variance = self
            .random_variables
            .variance_of(epsilon)
            .ok_or_else(|| ModelError::UnknownVariance(epsilon.to_string()))?;
        self.parameters.require(variance)
    }

    /// The variance parameters of all residual-error variables, in
    /// declaration order and without duplicates
    pub fn sigmas(&self) -> Result<Vec<&Parameter>, ModelError> {
        let mut sigmas: Vec<&Parameter> = Vec::new();
        for epsilon in &self.random_variables.epsilons {
            let parameter = self.sigma(&epsilon.name)?;
            if !sigmas.iter().any(|p| p.name == parameter.name) {
                sigmas.push(parameter);
            }
        }
        Ok(sigmas)
    }

    /// The structural (theta) parameters: everything in the table that is
    /// not the variance of a random variable
    pub fn thetas(&self) -> Vec<&Parameter> {
        self.parameters
            .iter()
            .filter(|p| !self.random_variables.is_variance(&p.name))
            .collect()
    }
}
