//! Random-variable declarations of a model snapshot
//!
//! Random variables are partitioned into structural random effects (etas)
//! and residual-error variables (epsilons). Each owns the name of its
//! variance parameter in the parameter table.

use serde::{Deserialize, Serialize};

/// A structural (between-subject) random effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eta {
    pub name: String,
    pub variance: String,
}

impl Eta {
    pub fn new(name: impl Into<String>, variance: impl Into<String>) -> Self {
        Eta {
            name: name.into(),
            variance: variance.into(),
        }
    }
}

/// A residual-error variable with its owning variance ("sigma") parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epsilon {
    pub name: String,
    pub variance: String,
}

impl Epsilon {
    pub fn new(name: impl Into<String>, variance: impl Into<String>) -> Self {
        Epsilon {
            name: name.into(),
            variance: variance.into(),
        }
    }
}

/// The set of random variables declared by a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomVariables {
    #[serde(default)]
    pub etas: Vec<Eta>,
    #[serde(default)]
    pub epsilons: Vec<Epsilon>,
}

impl RandomVariables {
    /// Whether `name` is a declared residual-error variable
    pub fn has_epsilon(&self, name: &str) -> bool {
        self.epsilons.iter().any(|e| e.name == name)
    }

    /// The variance parameter name owned by a residual-error variable
    pub fn variance_of(&self, epsilon: &str) -> Option<&str> {
        self.epsilons
            .iter()
            .find(|e| e.name == epsilon)
            .map(|e| e.variance.as_str())
    }

    /// Whether `name` is the variance parameter of any random variable
    pub fn is_variance(&self, name: &str) -> bool {
        self.etas.iter().any(|e| e.variance == name)
            || self.epsilons.iter().any(|e| e.variance == name)
    }
}
