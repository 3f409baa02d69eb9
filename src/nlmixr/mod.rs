//! Conversion of model snapshots to nlmixr-dialect R code
//!
//! The subsystem splits a dependent-variable expression into a structural
//! prediction plus additive/proportional residual-error terms, then re-emits
//! the model in nlmixr syntax. `error_model` holds the symbolic classifier,
//! `model_block` the statement/ODE emission, and `convert` the orchestrator.

mod convert;
mod error_model;
mod errors;
mod model_block;

pub use convert::{convert_model, ErrorPolicy};
pub use error_model::{
    add_error_model, add_error_relation, convert_eps_to_sigma, convert_piecewise, find_aliases,
    find_term, full_expression, ErrorPart, ErrorTerms, ResErrorTerm,
};
pub use errors::ConversionError;
pub use model_block::{
    add_ode, add_statements, convert_eq, find_parentheses, find_piecewise, piecewise_replace,
    remove_piecewise, ExpressionPrinter,
};
