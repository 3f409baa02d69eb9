//! Symbolic decomposition of residual-error models
//!
//! For a dependent-variable expression, the classifier splits the expanded
//! sum into one structural (noise-free) term plus residual-error terms, and
//! decides for each error term whether it is additive or proportional by
//! alias-matching its symbols against the structural term. Recognized
//! encodings:
//!
//! - `Y = F + F*eps + eps`
//! - `Y = F + F*theta*eps + theta*eps` (variance fixed to 1)
//! - `Y = F + W*eps` with `W = sqrt(...)` (variance fixed to 1)
//! - `Y = F + W*eps` with `W = F*theta + theta` (variance fixed to 1)
//!
//! Anything else is an unsupported error-model shape and fails with a typed
//! error.

use std::collections::{BTreeMap, BTreeSet};

use crate::codegen::CodeGenerator;
use crate::expr::{fmt_num, Cond, Expr};
use crate::model::{Model, ModelError, Statement};

use super::errors::ConversionError;

/// The additive/proportional split of a classified error model
///
/// Each slot is either absent, a bare sigma symbol, or a sum of several
/// independent components of the same kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTerms {
    pub add: Option<Expr>,
    pub prop: Option<Expr>,
}

/// One classified residual-error component with its sigma metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPart {
    /// The error term with the structural alias factored out and epsilons
    /// renamed to their sigmas
    pub expr: Expr,
    /// The owning variance parameter
    pub sigma: String,
    /// The factor through which the epsilon entered the term, when it was
    /// not the bare epsilon symbol
    pub sigma_alias: Option<Expr>,
    /// Whether the variance is fixed at 1 (the weight-magnitude convention)
    pub sigma_fix: bool,
    /// Symbols the component depends on besides the sigma and the thetas
    pub dependencies: BTreeSet<String>,
}

/// A fully classified dependent-variable expression
///
/// Built once by [`ResErrorTerm::classify`] and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResErrorTerm {
    /// The structural (noise-free) prediction term
    pub res: Expr,
    /// Alias closure of the structural term's symbols
    pub res_alias: BTreeSet<String>,
    pub add: Option<ErrorPart>,
    pub prop: Option<ErrorPart>,
    /// Whether every dependent-variable statement is piecewise
    pub only_piecewise: bool,
}

/// Returns the set of symbol names definitionally equivalent to `symbol`
///
/// Three rules apply, statement by statement over the after-ODE segment:
/// a simple forward assignment (`A = B`), equivalence through piecewise
/// branch values (in both directions), and a reverse assignment
/// (`B = A` making `B` an alias of `A`). Closure is transitive; arithmetic
/// relationships never contribute aliases.
pub fn find_aliases(symbol: &str, model: &Model) -> BTreeSet<String> {
    let mut aliases = BTreeSet::new();
    aliases.insert(symbol.to_string());
    let mut pending = vec![symbol.to_string()];

    while let Some(current) = pending.pop() {
        for statement in &model.statements.after_odes {
            let mut found: Vec<&str> = Vec::new();

            match &statement.expression {
                Expr::Symbol(name) => {
                    // RES = ALI
                    if statement.symbol == current {
                        found.push(name.as_str());
                    }
                    // ALI = RES
                    if *name == current {
                        found.push(statement.symbol.as_str());
                    }
                }
                Expr::Piecewise(branches) => {
                    for branch in branches {
                        if let Some(name) = branch.value.as_symbol() {
                            // RES = Piecewise((ALI, ...), ...)
                            if statement.symbol == current {
                                found.push(name);
                            }
                            // OTHER = Piecewise((RES, ...), ...)
                            if name == current {
                                found.push(statement.symbol.as_str());
                            }
                        }
                    }
                }
                _ => {}
            }

            for name in found {
                if aliases.insert(name.to_string()) {
                    pending.push(name.to_string());
                }
            }
        }
    }
    aliases
}

/// Expand an expression down to primitive symbols by substituting every
/// statement's definition, walking the applicable segment in reverse
/// declaration order
///
/// The statement sequence must be acyclic under definitional substitution;
/// that is an upstream precondition, not a runtime-checked error.
pub fn full_expression(expression: &Expr, model: &Model) -> Expr {
    let mut expression = expression.clone();
    for statement in model.statements.error_segment().iter().rev() {
        expression = expression.subs_symbol(&statement.symbol, &statement.expression);
    }
    expression
}

/// Rename every residual-error variable to its owning variance parameter
pub fn convert_eps_to_sigma(expr: &Expr, model: &Model) -> Expr {
    let map: BTreeMap<String, Expr> = model
        .random_variables
        .epsilons
        .iter()
        .map(|eps| (eps.name.clone(), Expr::sym(eps.variance.as_str())))
        .collect();
    expr.subs_symbols(&map)
}

/// Split a dependent-variable expression into its structural term and its
/// additive/proportional error terms
///
/// The expression is expanded, decomposed into top-level additive terms and
/// each term classified: terms referencing a residual-error variable (after
/// full expansion) are error terms, the single remaining term is the
/// structural prediction. Error terms sharing an alias with the structural
/// term are proportional (the shared factor is eliminated), the rest are
/// additive; same-kind terms are summed and epsilons renamed to sigmas.
/// The compact weighted encoding (`Y = F + W*eps`, variance fixed at 1) is
/// re-decomposed through the weight's own definition, retracting the then
/// redundant fixed-variance line from `cg`.
///
/// # Errors
///
/// Fails with an unsupported-shape [`ConversionError`] when the expansion
/// has more than three top-level terms, no structural term, or several
/// structural candidates, and with a model-precondition error when a
/// referenced epsilon has no variance parameter.
pub fn find_term(
    model: &Model,
    expr: &Expr,
    cg: &mut CodeGenerator,
) -> Result<(Expr, ErrorTerms), ConversionError> {
    let dv = model
        .dependent_variable()
        .ok_or(ModelError::NoDependentVariable)?
        .to_string();

    let expr = expr.expand();
    let terms = expr.add_args();
    if terms.len() > 3 {
        return Err(ConversionError::too_many_terms(dv, terms.len()));
    }

    let mut res: Option<Expr> = None;
    let mut errors: Vec<(Expr, Expr)> = Vec::new();
    for term in &terms {
        let full_term = full_expression(term, model);
        let mut all_symbols = full_term.free_symbols();
        all_symbols.extend(term.free_symbols());

        if all_symbols
            .iter()
            .any(|s| model.random_variables.has_epsilon(s))
        {
            errors.push((term.clone(), full_term));
        } else if res.is_some() {
            return Err(ConversionError::multiple_structural_terms(dv));
        } else {
            res = Some(term.clone());
        }
    }
    let res = match res {
        Some(res) => res,
        None => return Err(ConversionError::no_structural_term(dv)),
    };

    let res_alias = alias_closure(&res, model);

    let mut classified = ErrorTerms::default();
    for (term, full_term) in errors {
        let (term, proportional) = eliminate_structural_alias(term, &full_term, &res_alias, model);
        let slot = if proportional {
            &mut classified.prop
        } else {
            &mut classified.add
        };
        *slot = Some(match slot.take() {
            Some(existing) => Expr::add(vec![existing, term]),
            None => term,
        });
    }

    classified.add = classified.add.map(|t| convert_eps_to_sigma(&t, model));
    classified.prop = classified.prop.map(|t| convert_eps_to_sigma(&t, model));

    let classified = check_weighted_error(classified, &res, model, cg)?;
    Ok((res, classified))
}

/// Alias closure over every free symbol of the structural term
fn alias_closure(res: &Expr, model: &Model) -> BTreeSet<String> {
    let mut closure = BTreeSet::new();
    for symbol in res.free_symbols() {
        closure.extend(find_aliases(&symbol, model));
    }
    closure
}

/// Test an error term against the structural alias set, substituting any
/// matching alias with 1. Returns the reduced term and whether a match made
/// it proportional.
fn eliminate_structural_alias(
    term: Expr,
    full_term: &Expr,
    res_alias: &BTreeSet<String>,
    model: &Model,
) -> (Expr, bool) {
    let mut term = term;
    let mut proportional = false;
    for symbol in full_term.free_symbols() {
        let mut candidates = find_aliases(&symbol, model);
        candidates.extend(term.free_symbols());
        for alias in candidates {
            if res_alias.contains(&alias) {
                proportional = true;
                term = term.subs_symbol(&alias, &Expr::num(1.0));
            }
        }
    }
    (term, proportional)
}

/// Detect the compact weighted encoding `Y = F + W*eps` with a fixed-unit
/// variance, and re-decompose the weight `W` into additive/proportional
/// sub-terms through its own definition
fn check_weighted_error(
    error: ErrorTerms,
    res: &Expr,
    model: &Model,
    cg: &mut CodeGenerator,
) -> Result<ErrorTerms, ConversionError> {
    let sigmas = model.sigmas()?;
    if sigmas.len() != 1 {
        return Ok(error);
    }
    let sigma = sigmas[0];
    if sigma.init != 1.0 {
        return Ok(error);
    }

    let term = match (&error.add, &error.prop) {
        (Some(term), None) | (None, Some(term)) => term.clone(),
        _ => return Ok(error),
    };

    let term_symbols = term.free_symbols();
    if term_symbols.len() != 2 || !term_symbols.contains(&sigma.name) {
        return Ok(error);
    }
    let weight = match term_symbols.iter().find(|s| *s != &sigma.name) {
        Some(weight) => weight.clone(),
        None => return Ok(error),
    };

    let mut weight_full = full_expression(&Expr::sym(weight.as_str()), model);
    if weight_full.is_symbol() {
        return Ok(error);
    }
    if let Expr::Piecewise(branches) = &weight_full {
        if let Some(branch) = branches.iter().find(|b| b.cond == Cond::True) {
            weight_full = branch.value.clone();
        }
    }
    let weight_full = match weight_full {
        Expr::Pow(base, _) => *base,
        other => other,
    };

    let (add, prop) = split_weight_term(&weight_full, res, model);

    // The fixed unit variance is only a magnitude convention now
    cg.remove(&format!("{} <- fixed({})", sigma.name, fmt_num(sigma.init)));

    Ok(ErrorTerms { add, prop })
}

/// Decompose a weight expression additively, keeping one representative
/// symbol per sub-term: terms sharing a symbol with the fully expanded
/// structural term are proportional (represented by their non-shared
/// symbol), the rest additive (represented by their first free symbol)
///
/// Only valid for the two-term weight pattern; general error terms go
/// through [`find_term`] instead.
fn split_weight_term(
    expr: &Expr,
    res: &Expr,
    model: &Model,
) -> (Option<Expr>, Option<Expr>) {
    let res_symbols = full_expression(res, model).free_symbols();

    let mut add = None;
    let mut prop = None;
    for term in expr.add_args() {
        let symbols = term.free_symbols();
        let shared = symbols.iter().any(|s| res_symbols.contains(s));
        if shared {
            if prop.is_none() {
                prop = symbols
                    .iter()
                    .find(|s| !res_symbols.contains(*s))
                    .map(|s| Expr::sym(s.as_str()));
            }
        } else if let Some(first) = symbols.iter().next() {
            add = Some(Expr::sym(first.as_str()));
        }
    }
    (add, prop)
}

impl ResErrorTerm {
    /// Classify a dependent-variable expression, recording sigma metadata
    /// per error component
    ///
    /// Pure over its inputs: the result is built once and returned whole.
    pub fn classify(model: &Model, expr: &Expr) -> Result<Self, ConversionError> {
        let dv = model
            .dependent_variable()
            .ok_or(ModelError::NoDependentVariable)?
            .to_string();

        let expr = expr.expand();
        let terms = expr.add_args();
        if terms.len() > 3 {
            return Err(ConversionError::too_many_terms(dv.clone(), terms.len()));
        }

        struct RawError {
            term: Expr,
            full_term: Expr,
            sigma: String,
            sigma_alias: Option<Expr>,
            sigma_fix: bool,
        }

        let mut res: Option<Expr> = None;
        let mut errors: Vec<RawError> = Vec::new();
        for term in &terms {
            let full_term = full_expression(term, model);
            let mut sigma: Option<(String, bool)> = None;
            let mut sigma_alias: Option<Expr> = None;

            for factor in term.mul_args() {
                let mut all_symbols = full_expression(&factor, model).free_symbols();
                all_symbols.extend(factor.free_symbols());
                for symbol in &all_symbols {
                    if model.random_variables.has_epsilon(symbol) {
                        let parameter = model.sigma(symbol)?;
                        sigma = Some((parameter.name.clone(), parameter.init == 1.0 && parameter.fix));
                        sigma_alias = match factor.as_symbol() {
                            Some(name) if name == symbol => None,
                            _ => Some(factor.clone()),
                        };
                    }
                }
            }

            match sigma {
                Some((sigma, sigma_fix)) => errors.push(RawError {
                    term: term.clone(),
                    full_term,
                    sigma,
                    sigma_alias,
                    sigma_fix,
                }),
                None => {
                    if res.is_some() {
                        return Err(ConversionError::multiple_structural_terms(dv.clone()));
                    }
                    res = Some(term.clone());
                }
            }
        }
        let res = match res {
            Some(res) => res,
            None => return Err(ConversionError::no_structural_term(dv.clone())),
        };
        let res_alias = alias_closure(&res, model);

        let mut add = None;
        let mut prop = None;
        for raw in errors {
            let (term, proportional) =
                eliminate_structural_alias(raw.term, &raw.full_term, &res_alias, model);
            let term = convert_eps_to_sigma(&term, model);
            let part = ErrorPart {
                dependencies: dependencies_of(&term, &raw.sigma, &raw.sigma_alias, model),
                expr: term,
                sigma: raw.sigma,
                sigma_alias: raw.sigma_alias,
                sigma_fix: raw.sigma_fix,
            };
            if proportional {
                prop = Some(part);
            } else {
                add = Some(part);
            }
        }

        Ok(ResErrorTerm {
            res,
            res_alias,
            add,
            prop,
            only_piecewise: only_piecewise(model, &dv),
        })
    }

    /// Symbols the classified error model depends on beyond sigmas and
    /// thetas (weight symbols that need their own declarations)
    pub fn dependencies(&self) -> BTreeSet<String> {
        if let Some(add) = &self.add {
            add.dependencies.clone()
        } else if let Some(prop) = &self.prop {
            prop.dependencies.clone()
        } else {
            BTreeSet::new()
        }
    }
}

/// Whether every defining statement of the dependent variable is piecewise
fn only_piecewise(model: &Model, dv: &str) -> bool {
    !model
        .statements
        .after_odes
        .iter()
        .any(|s| s.symbol == dv && !s.expression.is_piecewise())
}

fn dependencies_of(
    expr: &Expr,
    sigma: &str,
    sigma_alias: &Option<Expr>,
    model: &Model,
) -> BTreeSet<String> {
    let mut accepted: BTreeSet<String> = model
        .thetas()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    accepted.insert(sigma.to_string());
    if let Some(alias) = sigma_alias {
        accepted.extend(alias.free_symbols());
    }
    expr.free_symbols()
        .into_iter()
        .filter(|s| !accepted.contains(s))
        .collect()
}

/// Emit the structural declaration and, for compound error slots, one
/// auxiliary declaration per additive component (`add_error`,
/// `add_error_1`, ...) in nlmixr assignment syntax
pub fn add_error_model(cg: &mut CodeGenerator, expr: &Expr, error: &ErrorTerms, symbol: &str) {
    cg.add(format!("{} <- {}", symbol, expr));

    if let Some(add) = &error.add {
        if !add.is_symbol() {
            for (n, term) in add.add_args().iter().enumerate() {
                if n == 0 {
                    cg.add(format!("add_error <- {}", term));
                } else {
                    cg.add(format!("add_error_{} <- {}", n, term));
                }
            }
        }
    }
    if let Some(prop) = &error.prop {
        if !prop.is_symbol() {
            for (n, term) in prop.add_args().iter().enumerate() {
                if n == 0 {
                    cg.add(format!("prop_error <- {}", term));
                } else {
                    cg.add(format!("prop_error_{} <- {}", n, term));
                }
            }
        }
    }
}

/// Emit the statistical-relation line for the dependent variable as a sum of
/// `add(...)`/`prop(...)` combinators
///
/// When neither slot is populated the error model could not be classified
/// (a conditional dependent variable); a placeholder zero-error term is
/// emitted with an explanatory comment instead of silently producing a
/// wrong relation.
pub fn add_error_relation(cg: &mut CodeGenerator, error: &ErrorTerms, symbol: &str) {
    let mut combinators: Vec<String> = Vec::new();

    if let Some(add) = &error.add {
        if add.is_symbol() {
            combinators.push(format!("add({})", add));
        } else {
            for n in 0..add.add_args().len() {
                if n == 0 {
                    combinators.push("add(add_error)".to_string());
                } else {
                    combinators.push(format!("add(add_error_{})", n));
                }
            }
        }
    }
    if let Some(prop) = &error.prop {
        if prop.is_symbol() {
            combinators.push(format!("prop({})", prop));
        } else {
            for n in 0..prop.add_args().len() {
                if n == 0 {
                    combinators.push("prop(prop_error)".to_string());
                } else {
                    combinators.push(format!("prop(prop_error_{})", n));
                }
            }
        }
    }

    let relation = if combinators.is_empty() {
        cg.empty_line();
        cg.add("# Fake error term since error model could not be determined");
        cg.add("# Note that conditional error models cannot be converted");
        cg.add("FAKE_ERROR <- 0.0");
        "FAKE_ERROR".to_string()
    } else {
        combinators.join(" + ")
    };

    cg.add(format!("{} ~ {}", symbol, relation));
}

/// Render a piecewise dependent-variable statement as an if/else-if/else
/// chain, classifying each branch independently, then emit a best-effort
/// relation line from the last branch's classification
pub fn convert_piecewise(
    statement: &Statement,
    cg: &mut CodeGenerator,
    model: &Model,
) -> Result<(), ConversionError> {
    let branches = match &statement.expression {
        Expr::Piecewise(branches) => branches,
        _ => return Ok(()),
    };

    let mut last_error = ErrorTerms::default();
    for (i, branch) in branches.iter().enumerate() {
        if i == 0 {
            cg.add(format!("if ({}) {{", branch.cond));
        } else if branch.cond != Cond::True {
            cg.add(format!("else if ({}) {{", branch.cond));
        } else {
            cg.add("else {");
        }
        let (res, error) = find_term(model, &branch.value, cg)?;
        cg.indent();
        cg.add(format!("{} <- {}", statement.symbol, res));
        cg.dedent();
        cg.add("}");
        last_error = error;
    }

    add_error_relation(cg, &last_error, &statement.symbol);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Branch;
    use crate::model::{Epsilon, Parameter, Parameters, RandomVariables, Statements};

    fn base_model(statements: Vec<Statement>, parameters: Vec<Parameter>) -> Model {
        Model {
            name: "test".to_string(),
            statements: Statements {
                before_odes: vec![],
                ode_system: None,
                after_odes: statements,
            },
            dependent_variables: vec!["Y".to_string()],
            random_variables: RandomVariables {
                etas: vec![],
                epsilons: vec![Epsilon::new("EPS1", "SIGMA1")],
            },
            parameters: Parameters::from(parameters),
        }
    }

    fn prop_model() -> Model {
        base_model(
            vec![
                Statement::new("F", Expr::sym("THETA1") * Expr::sym("AMT")),
                Statement::new("Y", Expr::sym("F") + Expr::sym("F") * Expr::sym("EPS1")),
            ],
            vec![
                Parameter::new("THETA1", 0.5, false),
                Parameter::new("SIGMA1", 1.0, true),
            ],
        )
    }

    #[test]
    fn aliases_through_simple_assignment_are_symmetric() {
        let model = base_model(
            vec![
                Statement::new("IPRED", Expr::sym("F")),
                Statement::new("Y", Expr::sym("IPRED") + Expr::sym("EPS1")),
            ],
            vec![Parameter::new("SIGMA1", 1.0, true)],
        );
        let from_ipred = find_aliases("IPRED", &model);
        let from_f = find_aliases("F", &model);
        assert!(from_ipred.contains("F"));
        assert!(from_f.contains("IPRED"));
    }

    #[test]
    fn aliases_through_piecewise_branches() {
        let model = base_model(
            vec![Statement::new(
                "IPRED",
                Expr::piecewise(vec![
                    Branch::new(Expr::sym("F"), Cond::Eq(Expr::sym("BLQ"), Expr::num(1.0))),
                    Branch::new(Expr::sym("G"), Cond::True),
                ]),
            )],
            vec![],
        );
        let aliases = find_aliases("IPRED", &model);
        assert!(aliases.contains("F"));
        assert!(aliases.contains("G"));
        // and back through the branch value
        assert!(find_aliases("F", &model).contains("IPRED"));
    }

    #[test]
    fn arithmetic_does_not_create_aliases() {
        let model = base_model(
            vec![Statement::new(
                "A",
                Expr::sym("B") + Expr::num(1.0),
            )],
            vec![],
        );
        assert!(!find_aliases("A", &model).contains("B"));
    }

    #[test]
    fn full_expression_expands_to_primitive_symbols() {
        let model = prop_model();
        let expanded = full_expression(&Expr::sym("Y"), &model);
        let symbols = expanded.free_symbols();
        assert!(symbols.contains("THETA1"));
        assert!(symbols.contains("AMT"));
        assert!(symbols.contains("EPS1"));
        assert!(!symbols.contains("F"));
    }

    #[test]
    fn full_expression_is_idempotent_on_primitives() {
        let model = prop_model();
        let primitive = Expr::sym("THETA1") * Expr::sym("AMT") + Expr::sym("DOSE");
        assert_eq!(full_expression(&primitive, &model), primitive);
    }

    #[test]
    fn proportional_error_is_classified() {
        let model = prop_model();
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") + Expr::sym("F") * Expr::sym("EPS1");
        let (res, error) = find_term(&model, &expr, &mut cg).expect("classifies");
        assert_eq!(res, Expr::sym("F"));
        assert_eq!(error.prop, Some(Expr::sym("SIGMA1")));
        assert_eq!(error.add, None);
    }

    #[test]
    fn additive_error_is_classified() {
        let model = base_model(
            vec![
                Statement::new("F", Expr::sym("THETA1") * Expr::sym("AMT")),
                Statement::new("Y", Expr::sym("F") + Expr::sym("EPS1")),
            ],
            vec![
                Parameter::new("THETA1", 0.5, false),
                Parameter::new("SIGMA1", 1.0, true),
            ],
        );
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") + Expr::sym("EPS1");
        let (res, error) = find_term(&model, &expr, &mut cg).expect("classifies");
        assert_eq!(res, Expr::sym("F"));
        assert_eq!(error.add, Some(Expr::sym("SIGMA1")));
        assert_eq!(error.prop, None);
    }

    #[test]
    fn combined_error_is_classified() {
        let model = base_model(
            vec![
                Statement::new("F", Expr::sym("THETA1") * Expr::sym("AMT")),
                Statement::new(
                    "Y",
                    Expr::sym("F")
                        + Expr::sym("F") * Expr::sym("EPS1")
                        + Expr::sym("EPS2"),
                ),
            ],
            vec![
                Parameter::new("THETA1", 0.5, false),
                Parameter::new("SIGMA1", 0.1, false),
                Parameter::new("SIGMA2", 0.5, false),
            ],
        );
        let mut model = model;
        model
            .random_variables
            .epsilons
            .push(Epsilon::new("EPS2", "SIGMA2"));

        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") + Expr::sym("F") * Expr::sym("EPS1") + Expr::sym("EPS2");
        let (res, error) = find_term(&model, &expr, &mut cg).expect("classifies");
        assert_eq!(res, Expr::sym("F"));
        assert_eq!(error.prop, Some(Expr::sym("SIGMA1")));
        assert_eq!(error.add, Some(Expr::sym("SIGMA2")));
    }

    #[test]
    fn weighted_error_is_redecomposed() {
        // Y = F + W*EPS1 with W = sqrt(THETA2**2 * F**2), SIGMA1 fixed at 1
        let model = base_model(
            vec![
                Statement::new("F", Expr::sym("THETA1") * Expr::sym("AMT")),
                Statement::new(
                    "W",
                    Expr::sqrt(Expr::mul(vec![
                        Expr::pow(Expr::sym("THETA2"), Expr::num(2.0)),
                        Expr::pow(Expr::sym("F"), Expr::num(2.0)),
                    ])),
                ),
                Statement::new("Y", Expr::sym("F") + Expr::sym("W") * Expr::sym("EPS1")),
            ],
            vec![
                Parameter::new("THETA1", 0.5, false),
                Parameter::new("THETA2", 0.2, false),
                Parameter::new("SIGMA1", 1.0, true),
            ],
        );
        let mut cg = CodeGenerator::new();
        cg.add("SIGMA1 <- fixed(1)");
        let expr = Expr::sym("F") + Expr::sym("W") * Expr::sym("EPS1");
        let (res, error) = find_term(&model, &expr, &mut cg).expect("classifies");
        assert_eq!(res, Expr::sym("F"));
        assert_eq!(error.prop, Some(Expr::sym("THETA2")));
        assert_eq!(error.add, None);
        // The redundant fixed-variance declaration is retracted
        assert!(cg.lines().is_empty());
    }

    #[test]
    fn combined_weight_splits_into_both_kinds() {
        // W = F*THETA2 + THETA3: proportional on THETA2, additive on THETA3
        let model = base_model(
            vec![
                Statement::new("F", Expr::sym("THETA1") * Expr::sym("AMT")),
                Statement::new(
                    "W",
                    Expr::sym("F") * Expr::sym("THETA2") + Expr::sym("THETA3"),
                ),
                Statement::new("Y", Expr::sym("F") + Expr::sym("W") * Expr::sym("EPS1")),
            ],
            vec![
                Parameter::new("THETA1", 0.5, false),
                Parameter::new("THETA2", 0.2, false),
                Parameter::new("THETA3", 0.1, false),
                Parameter::new("SIGMA1", 1.0, true),
            ],
        );
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") + Expr::sym("W") * Expr::sym("EPS1");
        let (_, error) = find_term(&model, &expr, &mut cg).expect("classifies");
        assert_eq!(error.prop, Some(Expr::sym("THETA2")));
        assert_eq!(error.add, Some(Expr::sym("THETA3")));
    }

    #[test]
    fn too_many_terms_is_rejected() {
        let model = prop_model();
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F")
            + Expr::sym("F") * Expr::sym("EPS1")
            + Expr::sym("EPS1")
            + Expr::sym("EXTRA");
        let err = find_term(&model, &expr, &mut cg).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::TooManyErrorTerms { found: 4, .. }
        ));
    }

    #[test]
    fn multiple_structural_terms_are_rejected() {
        let model = prop_model();
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") + Expr::sym("G") + Expr::sym("EPS1");
        let err = find_term(&model, &expr, &mut cg).unwrap_err();
        assert!(matches!(err, ConversionError::MultipleStructuralTerms { .. }));
    }

    #[test]
    fn no_structural_term_is_rejected() {
        let model = prop_model();
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") * Expr::sym("EPS1");
        let err = find_term(&model, &expr, &mut cg).unwrap_err();
        assert!(matches!(err, ConversionError::NoStructuralTerm { .. }));
    }

    #[test]
    fn missing_variance_fails_fast() {
        let mut model = prop_model();
        model.random_variables.epsilons[0].variance = "SIGMA_MISSING".to_string();
        let mut cg = CodeGenerator::new();
        let expr = Expr::sym("F") + Expr::sym("F") * Expr::sym("EPS1");
        let err = find_term(&model, &expr, &mut cg).unwrap_err();
        assert!(matches!(err, ConversionError::ModelError(_)));
    }

    #[test]
    fn classify_records_sigma_metadata() {
        let model = prop_model();
        let expr = Expr::sym("F") + Expr::sym("F") * Expr::sym("EPS1");
        let classified = ResErrorTerm::classify(&model, &expr).expect("classifies");
        assert_eq!(classified.res, Expr::sym("F"));
        assert!(classified.res_alias.contains("F"));
        let prop = classified.prop.expect("proportional part");
        assert_eq!(prop.sigma, "SIGMA1");
        assert!(prop.sigma_fix);
        assert_eq!(prop.expr, Expr::sym("SIGMA1"));
        assert!(classified.add.is_none());
        assert!(!classified.only_piecewise);
    }

    #[test]
    fn classify_detects_piecewise_only_dv() {
        let model = base_model(
            vec![Statement::new(
                "Y",
                Expr::piecewise(vec![
                    Branch::new(Expr::sym("F"), Cond::Eq(Expr::sym("BLQ"), Expr::num(1.0))),
                    Branch::new(Expr::sym("G"), Cond::True),
                ]),
            )],
            vec![Parameter::new("SIGMA1", 1.0, true)],
        );
        let classified =
            ResErrorTerm::classify(&model, &Expr::sym("F")).expect("classifies");
        assert!(classified.only_piecewise);
    }

    #[test]
    fn relation_line_for_bare_symbols() {
        let mut cg = CodeGenerator::new();
        let error = ErrorTerms {
            add: Some(Expr::sym("SIGMA2")),
            prop: Some(Expr::sym("SIGMA1")),
        };
        add_error_relation(&mut cg, &error, "Y");
        assert_eq!(cg.render(), "Y ~ add(SIGMA2) + prop(SIGMA1)");
    }

    #[test]
    fn relation_line_for_compound_terms() {
        let mut cg = CodeGenerator::new();
        let error = ErrorTerms {
            add: Some(Expr::sym("SIGMA1") + Expr::sym("SIGMA2")),
            prop: None,
        };
        add_error_model(&mut cg, &Expr::sym("F"), &error, "Y");
        add_error_relation(&mut cg, &error, "Y");
        assert_eq!(
            cg.render(),
            "Y <- F\nadd_error <- SIGMA1\nadd_error_1 <- SIGMA2\nY ~ add(add_error) + add(add_error_1)"
        );
    }

    #[test]
    fn unclassifiable_relation_emits_placeholder() {
        let mut cg = CodeGenerator::new();
        add_error_relation(&mut cg, &ErrorTerms::default(), "Y");
        let rendered = cg.render();
        assert!(rendered.contains("FAKE_ERROR <- 0.0"));
        assert!(rendered.contains("# Fake error term since error model could not be determined"));
        assert!(rendered.ends_with("Y ~ FAKE_ERROR"));
    }

    #[test]
    fn piecewise_dv_renders_conditional_blocks() {
        let model = base_model(
            vec![Statement::new(
                "Y",
                Expr::piecewise(vec![
                    Branch::new(Expr::sym("F"), Cond::Eq(Expr::sym("BLQ"), Expr::num(1.0))),
                    Branch::new(Expr::sym("G"), Cond::True),
                ]),
            )],
            vec![Parameter::new("SIGMA1", 1.0, true)],
        );
        let statement = model.statements.after_odes[0].clone();
        let mut cg = CodeGenerator::new();
        convert_piecewise(&statement, &mut cg, &model).expect("converts");
        let rendered = cg.render();
        assert!(rendered.starts_with(
            "if (BLQ == 1) {\n    Y <- F\n}\nelse {\n    Y <- G\n}"
        ));
        // no relation line inside the blocks, placeholder relation after them
        assert!(rendered.ends_with("Y ~ FAKE_ERROR"));
    }
}
