//! Emission of model statement blocks and differential equations
//!
//! Statements before or after the ODE system are rendered into nlmixr
//! assignment syntax, the dependent-variable statement through the
//! error-model classifier. ODE right-hand sides that embed piecewise
//! coefficients are cleaned up lexically after printing, since the rendered
//! `Piecewise(...)` spans have no nlmixr counterpart.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::codegen::CodeGenerator;
use crate::expr::{Branch, Cond, Expr};
use crate::model::{Model, ModelError, Statement};

use super::error_model::{
    add_error_model, add_error_relation, convert_piecewise, find_term, ErrorTerms,
};
use super::errors::ConversionError;

lazy_static! {
    /// Arithmetic operator immediately preceding a stripped piecewise span
    static ref OP_BEFORE_PIECEWISE: Regex = Regex::new(r"([+\-/*]\s*)(Piecewise)").unwrap();
    /// Subject identifier comparisons, which nlmixr wants quoted
    static ref ID_COMPARISON: Regex = Regex::new(r"(ID\s*==\s*)(\d+)").unwrap();
}

/// Prints expressions with compartment-amount applications rendered as bare
/// amount names (`A1(t)` prints as `A1`)
pub struct ExpressionPrinter {
    amounts: Vec<String>,
}

impl ExpressionPrinter {
    pub fn new(amounts: Vec<String>) -> Self {
        ExpressionPrinter { amounts }
    }

    pub fn print(&self, expr: &Expr) -> String {
        self.strip_amount_calls(expr).to_string()
    }

    fn strip_amount_calls(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Func(name, _) if self.amounts.contains(name) => Expr::sym(name.as_str()),
            Expr::Symbol(_) | Expr::Num(_) => expr.clone(),
            Expr::Add(terms) => {
                Expr::add(terms.iter().map(|t| self.strip_amount_calls(t)).collect())
            }
            Expr::Mul(factors) => {
                Expr::mul(factors.iter().map(|f| self.strip_amount_calls(f)).collect())
            }
            Expr::Pow(base, exponent) => Expr::pow(
                self.strip_amount_calls(base),
                self.strip_amount_calls(exponent),
            ),
            Expr::Func(name, args) => Expr::func(
                name.clone(),
                args.iter().map(|a| self.strip_amount_calls(a)).collect(),
            ),
            Expr::Piecewise(branches) => Expr::piecewise(
                branches
                    .iter()
                    .map(|b| Branch::new(self.strip_amount_calls(&b.value), b.cond.clone()))
                    .collect(),
            ),
        }
    }
}

/// Emit a statement segment into the code buffer
///
/// The dependent-variable statement goes through the error-model classifier
/// (piecewise definitions through [`convert_piecewise`]); other piecewise
/// assignments become if/else-if/else chains, plain assignments are printed
/// directly. When a dependent variable was seen but no error model emitted,
/// the placeholder relation is appended so the output stays loadable.
pub fn add_statements(
    model: &Model,
    cg: &mut CodeGenerator,
    statements: &[Statement],
) -> Result<(), ConversionError> {
    let dv = model
        .dependent_variable()
        .ok_or(ModelError::NoDependentVariable)?
        .to_string();

    let mut dv_found = false;
    let mut error_model_found = false;

    for statement in statements {
        if statement.symbol == dv {
            dv_found = true;
            if statement.expression.is_piecewise() {
                convert_piecewise(statement, cg, model)?;
                // convert_piecewise emits its own relation line
                error_model_found = true;
            } else {
                let (res, error) = find_term(model, &statement.expression, cg)?;
                add_error_model(cg, &res, &error, &statement.symbol);
                add_error_relation(cg, &error, &statement.symbol);
                error_model_found = true;
            }
        } else if let Expr::Piecewise(branches) = &statement.expression {
            emit_piecewise_assignment(cg, &statement.symbol, branches);
        } else {
            cg.add(format!("{} <- {}", statement.symbol, statement.expression));
        }
    }

    if dv_found && !error_model_found {
        add_error_relation(cg, &ErrorTerms::default(), &dv);
    }
    Ok(())
}

/// Render a non-dependent-variable piecewise assignment as a conditional
/// chain. The trailing `else` of a NEWIND reset pattern (value 0) takes the
/// branch value with the largest comparison threshold instead of the zero.
fn emit_piecewise_assignment(cg: &mut CodeGenerator, symbol: &str, branches: &[Branch]) {
    let mut first = true;
    for branch in branches {
        let value = if branch.cond == Cond::True {
            cg.add("} else {");
            newind_else_value(branches, &branch.value)
        } else {
            let cond = convert_eq(&branch.cond);
            if first {
                cg.add(format!("if ({}) {{", cond));
                first = false;
            } else {
                cg.add(format!("}} else if ({}) {{", cond));
            }
            branch.value.clone()
        };
        cg.indent();
        cg.add(format!("{} <- {}", symbol, value));
        cg.dedent();
    }
    cg.add("}");
}

/// Threshold of a comparison condition against a numeric right-hand side
fn comparison_threshold(cond: &Cond) -> Option<f64> {
    match cond {
        Cond::Lt(_, r) | Cond::Le(_, r) | Cond::Gt(_, r) | Cond::Ge(_, r) => match r {
            Expr::Num(n) => Some(*n),
            _ => None,
        },
        _ => None,
    }
}

fn newind_else_value(branches: &[Branch], else_value: &Expr) -> Expr {
    let uses_newind = branches
        .iter()
        .any(|b| b.cond.free_symbols().contains("NEWIND") || b.value.free_symbols().contains("NEWIND"));
    if !uses_newind || *else_value != Expr::Num(0.0) {
        return else_value.clone();
    }

    let mut largest = &branches[0];
    let mut largest_threshold = comparison_threshold(&largest.cond);
    for branch in &branches[1..] {
        if branch.cond == Cond::True {
            continue;
        }
        let threshold = comparison_threshold(&branch.cond);
        match (threshold, largest_threshold) {
            (Some(t), Some(l)) if t > l => {
                largest = branch;
                largest_threshold = threshold;
            }
            (Some(t), Some(l)) if t == l => {
                // prefer a strict bound over a non-strict one on ties
                if !matches!(branch.cond, Cond::Le(_, _)) && matches!(largest.cond, Cond::Le(_, _))
                {
                    largest = branch;
                    largest_threshold = threshold;
                }
            }
            (Some(_), None) => {
                largest = branch;
                largest_threshold = threshold;
            }
            _ => {}
        }
    }
    largest.value.clone()
}

/// Emit the differential-equation block, stripping rendered piecewise spans
/// from right-hand sides that embed conditional coefficients
pub fn add_ode(model: &Model, cg: &mut CodeGenerator) -> Result<(), ConversionError> {
    let ode = match &model.statements.ode_system {
        Some(ode) => ode,
        None => return Ok(()),
    };
    let printer = ExpressionPrinter::new(ode.amounts.clone());

    for eq in &ode.eqs {
        let lhs = format!("d/dt({})", eq.amount);
        if eq.rhs.contains_piecewise() {
            let rhs = remove_piecewise(&printer.print(&eq.rhs))?;
            cg.add(format!("{} = {}", lhs, rhs.trim()));
        } else {
            cg.add(format!("{} = {}", lhs, printer.print(&eq.rhs)));
        }
    }
    Ok(())
}

/// Delete every rendered `Piecewise(...)` span from a printed expression
pub fn remove_piecewise(expr: &str) -> Result<String, ConversionError> {
    let mut out = expr.to_string();
    for span in find_piecewise(expr)? {
        out = piecewise_replace(&out, &span, "");
    }
    Ok(out)
}

/// Locate the argument text of every `Piecewise(...)` occurrence in a
/// printed expression
pub fn find_piecewise(expr: &str) -> Result<Vec<String>, ConversionError> {
    let parentheses = find_parentheses(expr)?;

    let mut spans = Vec::new();
    for (start, _) in expr.match_indices("Piecewise") {
        let open = start + "Piecewise".len();
        if let Some(&close) = parentheses.get(&open) {
            spans.push(expr[open + 1..close].to_string());
        }
    }
    Ok(spans)
}

/// Match opening to closing parentheses over a character stream, keyed by
/// the position of the opening parenthesis
pub fn find_parentheses(s: &str) -> Result<BTreeMap<usize, usize>, ConversionError> {
    let mut open_positions = Vec::new();
    let mut matched = BTreeMap::new();

    for (i, c) in s.char_indices() {
        match c {
            '(' => open_positions.push(i),
            ')' => match open_positions.pop() {
                Some(open) => {
                    matched.insert(open, i);
                }
                None => return Err(ConversionError::UnbalancedParentheses(s.to_string())),
            },
            _ => {}
        }
    }
    if !open_positions.is_empty() {
        return Err(ConversionError::UnbalancedParentheses(s.to_string()));
    }
    Ok(matched)
}

/// Replace one rendered piecewise span with `replacement`; an empty
/// replacement also drops the arithmetic operator joining the span to the
/// rest of the expression
pub fn piecewise_replace(expr: &str, span: &str, replacement: &str) -> String {
    if replacement.is_empty() {
        let expr = OP_BEFORE_PIECEWISE.replace_all(expr, "$2");
        expr.replace(&format!("Piecewise({})", span), replacement)
    } else {
        expr.replace(&format!("Piecewise({})", span), replacement)
    }
}

/// Render a condition in R syntax, quoting subject-identifier comparisons
pub fn convert_eq(cond: &Cond) -> String {
    ID_COMPARISON
        .replace_all(&cond.to_string(), "$1'$2'")
        .to_string()
}
