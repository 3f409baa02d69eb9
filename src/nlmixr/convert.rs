//! Whole-model conversion into an nlmixr script
//!
//! Assembles the `ini({...})` parameter block and the `model({...})` block
//! around the statement/ODE emitters. The ini block and the model block share
//! one code buffer: the weight normalizer may retract a redundant fixed-sigma
//! declaration from the ini block while classifying the error model.

use crate::codegen::CodeGenerator;
use crate::expr::fmt_num;
use crate::model::{Model, ModelError, Statement};

use super::errors::ConversionError;
use super::model_block::{add_ode, add_statements};

/// What to do when the dependent-variable expression cannot be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Fail the whole conversion
    #[default]
    Abort,
    /// Emit the rest of the model and mark the failed observation with a
    /// comment
    Skip,
}

/// Convert a model snapshot into a complete nlmixr script
pub fn convert_model(model: &Model, policy: ErrorPolicy) -> Result<String, ConversionError> {
    let mut cg = CodeGenerator::new();

    cg.add("ini({");
    cg.indent();
    add_ini(model, &mut cg)?;
    cg.dedent();
    cg.add("})");

    cg.add("model({");
    cg.indent();

    let statements = &model.statements;
    if statements.ode_system.is_some() {
        if statements.after_odes.is_empty() {
            cg = emit_error_segment(model, cg, statements.error_segment(), policy)?;
            add_ode(model, &mut cg)?;
        } else {
            add_statements(model, &mut cg, &statements.before_odes)?;
            add_ode(model, &mut cg)?;
            cg = emit_error_segment(model, cg, statements.error_segment(), policy)?;
        }
    } else {
        cg = emit_error_segment(model, cg, statements.error_segment(), policy)?;
    }

    cg.dedent();
    cg.add("})");
    Ok(cg.render())
}

/// Emit the statement segment holding the dependent variable, honoring the
/// failure policy. The segment runs against a copy of the buffer so that a
/// failed classification leaves no partial output behind.
fn emit_error_segment(
    model: &Model,
    cg: CodeGenerator,
    segment: &[Statement],
    policy: ErrorPolicy,
) -> Result<CodeGenerator, ConversionError> {
    let mut attempt = cg.clone();
    match add_statements(model, &mut attempt, segment) {
        Ok(()) => Ok(attempt),
        Err(error) => match policy {
            ErrorPolicy::Abort => Err(error),
            ErrorPolicy::Skip => {
                let dv = model
                    .dependent_variable()
                    .ok_or(ModelError::NoDependentVariable)?
                    .to_string();
                let kept: Vec<Statement> = segment
                    .iter()
                    .filter(|s| s.symbol != dv)
                    .cloned()
                    .collect();
                let mut fallback = cg;
                add_statements(model, &mut fallback, &kept)?;
                fallback.add(format!("# Conversion of {} failed: {}", dv, error));
                Ok(fallback)
            }
        },
    }
}

/// Emit the parameter block: structural parameters, between-subject
/// variances, residual variances
fn add_ini(model: &Model, cg: &mut CodeGenerator) -> Result<(), ConversionError> {
    for theta in model.thetas() {
        if theta.fix {
            cg.add(format!("{} <- fixed({})", theta.name, fmt_num(theta.init)));
        } else {
            cg.add(format!("{} <- {}", theta.name, fmt_num(theta.init)));
        }
    }
    for eta in &model.random_variables.etas {
        if let Some(omega) = model.parameters.get(&eta.variance) {
            cg.add(format!("{} ~ {}", eta.name, fmt_num(omega.init)));
        }
    }
    for sigma in model.sigmas()? {
        if sigma.fix {
            cg.add(format!("{} <- fixed({})", sigma.name, fmt_num(sigma.init)));
        } else {
            cg.add(format!("{} <- {}", sigma.name, fmt_num(sigma.init)));
        }
    }
    Ok(())
}
