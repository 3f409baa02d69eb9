//! Textual rendering of expressions
//!
//! Sums, products and powers print in plain algebraic form; piecewise
//! expressions print as `Piecewise((value, cond), ...)` so that the lexical
//! stripping utilities can locate them in rendered equation strings, and
//! conditions print in the target dialect's comparison syntax.

use std::fmt;

use super::{Cond, Expr};

/// Format a numeric literal, printing integral values without a trailing
/// fraction (`1`, not `1.0`)
pub fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e12 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl Expr {
    /// Split off a leading negative sign for sum printing
    fn as_negated(&self) -> Option<Expr> {
        match self {
            Expr::Num(n) if *n < 0.0 => Some(Expr::Num(-n)),
            Expr::Mul(factors) => match factors.first() {
                Some(Expr::Num(n)) if *n < 0.0 => {
                    let mut rest: Vec<Expr> = factors[1..].to_vec();
                    if *n != -1.0 {
                        rest.insert(0, Expr::Num(-n));
                    }
                    Some(Expr::mul(rest))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn fmt_factor(&self) -> String {
        match self {
            Expr::Add(_) => format!("({})", self),
            _ => format!("{}", self),
        }
    }

    fn fmt_base(&self) -> String {
        match self {
            Expr::Add(_) | Expr::Mul(_) | Expr::Pow(_, _) => format!("({})", self),
            Expr::Num(n) if *n < 0.0 => format!("({})", self),
            _ => format!("{}", self),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::Num(n) => write!(f, "{}", fmt_num(*n)),
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    match (i, term.as_negated()) {
                        (0, Some(positive)) => write!(f, "-{}", positive.fmt_factor())?,
                        (0, None) => write!(f, "{}", term)?,
                        (_, Some(positive)) => write!(f, " - {}", positive.fmt_factor())?,
                        (_, None) => write!(f, " + {}", term)?,
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                if let Some(positive) = self.as_negated() {
                    return write!(f, "-{}", positive.fmt_factor());
                }
                let rendered: Vec<String> = factors.iter().map(Expr::fmt_factor).collect();
                write!(f, "{}", rendered.join("*"))
            }
            Expr::Pow(base, exponent) => {
                if **exponent == Expr::Num(0.5) {
                    write!(f, "sqrt({})", base)
                } else {
                    write!(f, "{}**{}", base.fmt_base(), exponent.fmt_base())
                }
            }
            Expr::Func(name, args) => {
                let rendered: Vec<String> = args.iter().map(|a| format!("{}", a)).collect();
                write!(f, "{}({})", name, rendered.join(", "))
            }
            Expr::Piecewise(branches) => {
                let rendered: Vec<String> = branches
                    .iter()
                    .map(|b| format!("({}, {})", b.value, b.cond))
                    .collect();
                write!(f, "Piecewise({})", rendered.join(", "))
            }
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::True => write!(f, "True"),
            Cond::Eq(l, r) => write!(f, "{} == {}", l, r),
            Cond::Ne(l, r) => write!(f, "{} != {}", l, r),
            Cond::Lt(l, r) => write!(f, "{} < {}", l, r),
            Cond::Le(l, r) => write!(f, "{} <= {}", l, r),
            Cond::Gt(l, r) => write!(f, "{} > {}", l, r),
            Cond::Ge(l, r) => write!(f, "{} >= {}", l, r),
            Cond::And(l, r) => write!(f, "{} & {}", l, r),
            Cond::Or(l, r) => write!(f, "{} | {}", l, r),
        }
    }
}
