//! Error types for the nlmixr conversion core

use thiserror::Error;

use crate::model::ModelError;

/// Errors raised while classifying an error model or emitting nlmixr code
#[derive(Debug, Error)]
pub enum ConversionError {
    // ─────────────────────────────────────────────────────────────────────────
    // Unsupported error-model shapes
    // ─────────────────────────────────────────────────────────────────────────
    /// The dependent-variable expression has too many top-level terms
    #[error(
        "Unsupported error model for '{dv}': {found} additive terms found, at most 3 supported"
    )]
    TooManyErrorTerms { dv: String, found: usize },

    /// No noise-free prediction term could be identified
    #[error("Unsupported error model for '{dv}': no structural term found")]
    NoStructuralTerm { dv: String },

    /// More than one candidate prediction term was found
    #[error(
        "Unsupported error model for '{dv}': multiple structural terms found, \
         define a single symbol for the prediction"
    )]
    MultipleStructuralTerms { dv: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Lexical utilities
    // ─────────────────────────────────────────────────────────────────────────
    /// A printed expression stream had mismatched parentheses
    #[error("Unbalanced parentheses in printed expression: {0}")]
    UnbalancedParentheses(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Upstream model preconditions
    // ─────────────────────────────────────────────────────────────────────────
    /// The model snapshot violated a precondition (missing variance, ...)
    #[error(transparent)]
    ModelError(#[from] ModelError),
}

impl ConversionError {
    pub fn too_many_terms(dv: impl Into<String>, found: usize) -> Self {
        Self::TooManyErrorTerms {
            dv: dv.into(),
            found,
        }
    }

    pub fn no_structural_term(dv: impl Into<String>) -> Self {
        Self::NoStructuralTerm { dv: dv.into() }
    }

    pub fn multiple_structural_terms(dv: impl Into<String>) -> Self {
        Self::MultipleStructuralTerms { dv: dv.into() }
    }
}
