//! Parameter table for a model snapshot

use serde::{Deserialize, Serialize};

use super::ModelError;

/// A named scalar parameter with its initial value and fixed/estimated flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub init: f64,
    #[serde(default)]
    pub fix: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, init: f64, fix: bool) -> Self {
        Parameter {
            name: name.into(),
            init,
            fix,
        }
    }
}

/// An ordered parameter table keyed by symbol name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Vec<Parameter>);

impl Parameters {
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.iter().find(|p| p.name == name)
    }

    /// Look up a parameter that upstream layers guarantee to exist
    pub fn require(&self, name: &str) -> Result<&Parameter, ModelError> {
        self.get(name)
            .ok_or_else(|| ModelError::UnknownParameter(name.to_string()))
    }
}

impl From<Vec<Parameter>> for Parameters {
    fn from(parameters: Vec<Parameter>) -> Self {
        Parameters(parameters)
    }
}
