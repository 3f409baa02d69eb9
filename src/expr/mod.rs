//! Symbolic expression trees for model statements
//!
//! Expressions are a closed set of node kinds (symbols, numeric literals,
//! sums, products, powers, function applications and piecewise conditionals)
//! over which classification, substitution and printing are implemented by
//! exhaustive matching.

mod printer;
mod subs;

pub use printer::fmt_num;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A symbolic algebraic expression
///
/// Construct expressions through the associated functions ([`Expr::sym`],
/// [`Expr::add`], [`Expr::mul`], ...) rather than the enum variants directly;
/// the constructors flatten nested sums/products and fold numeric literals so
/// that structurally equal expressions compare equal.
///
/// # Example
///
/// ```
/// use pharmtrans::expr::Expr;
///
/// let y = Expr::sym("F") + Expr::sym("F") * Expr::sym("EPS1");
/// assert_eq!(y.add_args().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A named variable
    Symbol(String),
    /// A numeric literal
    Num(f64),
    /// A sum of two or more terms
    Add(Vec<Expr>),
    /// A product of two or more factors
    Mul(Vec<Expr>),
    /// Base raised to an exponent
    Pow(Box<Expr>, Box<Expr>),
    /// A function application, e.g. `exp(x)`
    Func(String, Vec<Expr>),
    /// An ordered list of (value, condition) branches; the last condition is
    /// typically always true
    Piecewise(Vec<Branch>),
}

/// One `(value, condition)` pair of a piecewise expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub value: Expr,
    pub cond: Cond,
}

impl Branch {
    pub fn new(value: Expr, cond: Cond) -> Self {
        Branch { value, cond }
    }
}

/// A branch condition of a piecewise expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cond {
    /// Unconditionally true (the trailing `else` branch)
    True,
    Eq(Expr, Expr),
    Ne(Expr, Expr),
    Lt(Expr, Expr),
    Le(Expr, Expr),
    Gt(Expr, Expr),
    Ge(Expr, Expr),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Expr {
    /// A named symbol
    pub fn sym(name: impl Into<String>) -> Expr {
        Expr::Symbol(name.into())
    }

    /// A numeric literal
    pub fn num(value: f64) -> Expr {
        Expr::Num(value)
    }

    /// A sum. Nested sums are flattened, numeric literals are folded into a
    /// single trailing constant, and zero terms are dropped.
    pub fn add(terms: Vec<Expr>) -> Expr {
        let mut flat = Vec::new();
        let mut constant = 0.0;
        for term in terms {
            match term {
                Expr::Add(inner) => {
                    for t in inner {
                        match t {
                            Expr::Num(n) => constant += n,
                            other => flat.push(other),
                        }
                    }
                }
                Expr::Num(n) => constant += n,
                other => flat.push(other),
            }
        }
        if constant != 0.0 || flat.is_empty() {
            flat.push(Expr::Num(constant));
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::Add(flat)
        }
    }

    /// A product. Nested products are flattened and numeric literals folded
    /// into a single leading coefficient; a zero factor annihilates the
    /// product and unit coefficients are dropped.
    pub fn mul(factors: Vec<Expr>) -> Expr {
        let mut flat = Vec::new();
        let mut coefficient = 1.0;
        for factor in factors {
            match factor {
                Expr::Mul(inner) => {
                    for f in inner {
                        match f {
                            Expr::Num(n) => coefficient *= n,
                            other => flat.push(other),
                        }
                    }
                }
                Expr::Num(n) => coefficient *= n,
                other => flat.push(other),
            }
        }
        if coefficient == 0.0 {
            return Expr::Num(0.0);
        }
        if coefficient != 1.0 || flat.is_empty() {
            flat.insert(0, Expr::Num(coefficient));
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::Mul(flat)
        }
    }

    /// Base raised to an exponent. A unit exponent collapses to the base.
    pub fn pow(base: Expr, exponent: Expr) -> Expr {
        match exponent {
            Expr::Num(n) if n == 1.0 => base,
            exponent => Expr::Pow(Box::new(base), Box::new(exponent)),
        }
    }

    /// The square root of an expression, represented structurally as
    /// `base**0.5` so that power-shaped weights are recognized uniformly.
    pub fn sqrt(base: Expr) -> Expr {
        Expr::pow(base, Expr::num(0.5))
    }

    /// A function application
    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Func(name.into(), args)
    }

    /// A piecewise conditional
    pub fn piecewise(branches: Vec<Branch>) -> Expr {
        Expr::Piecewise(branches)
    }

    /// The symbol name if this expression is a bare symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Expr::Symbol(_))
    }

    pub fn is_piecewise(&self) -> bool {
        matches!(self, Expr::Piecewise(_))
    }

    /// Whether any subtree is a piecewise conditional
    pub fn contains_piecewise(&self) -> bool {
        match self {
            Expr::Piecewise(_) => true,
            Expr::Symbol(_) | Expr::Num(_) => false,
            Expr::Add(terms) | Expr::Mul(terms) | Expr::Func(_, terms) => {
                terms.iter().any(Expr::contains_piecewise)
            }
            Expr::Pow(base, exponent) => {
                base.contains_piecewise() || exponent.contains_piecewise()
            }
        }
    }

    /// All symbol names referenced by the expression, including those inside
    /// piecewise conditions
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, into: &mut BTreeSet<String>) {
        match self {
            Expr::Symbol(name) => {
                into.insert(name.clone());
            }
            Expr::Num(_) => {}
            Expr::Add(terms) | Expr::Mul(terms) | Expr::Func(_, terms) => {
                for term in terms {
                    term.collect_symbols(into);
                }
            }
            Expr::Pow(base, exponent) => {
                base.collect_symbols(into);
                exponent.collect_symbols(into);
            }
            Expr::Piecewise(branches) => {
                for branch in branches {
                    branch.value.collect_symbols(into);
                    branch.cond.collect_symbols(into);
                }
            }
        }
    }

    /// The top-level additive terms, or the expression itself when it is not
    /// a sum
    pub fn add_args(&self) -> Vec<Expr> {
        match self {
            Expr::Add(terms) => terms.clone(),
            other => vec![other.clone()],
        }
    }

    /// The top-level multiplicative factors, or the expression itself when it
    /// is not a product
    pub fn mul_args(&self) -> Vec<Expr> {
        match self {
            Expr::Mul(factors) => factors.clone(),
            other => vec![other.clone()],
        }
    }

    /// Fully distribute products over sums (and small integer powers of
    /// sums), returning an expression whose top-level additive terms contain
    /// no un-expanded products of sums.
    pub fn expand(&self) -> Expr {
        match self {
            Expr::Symbol(_) | Expr::Num(_) => self.clone(),
            Expr::Add(terms) => Expr::add(terms.iter().map(Expr::expand).collect()),
            Expr::Mul(factors) => {
                let mut terms = vec![Expr::num(1.0)];
                for factor in factors.iter().map(Expr::expand) {
                    let args = factor.add_args();
                    let mut next = Vec::with_capacity(terms.len() * args.len());
                    for term in &terms {
                        for arg in &args {
                            next.push(Expr::mul(vec![term.clone(), arg.clone()]));
                        }
                    }
                    terms = next;
                }
                Expr::add(terms)
            }
            Expr::Pow(base, exponent) => {
                let base = base.expand();
                if let Expr::Num(n) = **exponent {
                    if n.fract() == 0.0 && (2.0..=4.0).contains(&n) && matches!(base, Expr::Add(_))
                    {
                        let mut product = base.clone();
                        for _ in 1..(n as usize) {
                            product = Expr::mul(vec![product, base.clone()]).expand();
                        }
                        return product;
                    }
                }
                Expr::pow(base, (**exponent).clone())
            }
            Expr::Func(name, args) => {
                Expr::func(name.clone(), args.iter().map(Expr::expand).collect())
            }
            Expr::Piecewise(branches) => Expr::piecewise(
                branches
                    .iter()
                    .map(|b| Branch::new(b.value.expand(), b.cond.clone()))
                    .collect(),
            ),
        }
    }
}

impl Cond {
    fn collect_symbols(&self, into: &mut BTreeSet<String>) {
        match self {
            Cond::True => {}
            Cond::Eq(l, r)
            | Cond::Ne(l, r)
            | Cond::Lt(l, r)
            | Cond::Le(l, r)
            | Cond::Gt(l, r)
            | Cond::Ge(l, r) => {
                l.collect_symbols(into);
                r.collect_symbols(into);
            }
            Cond::And(l, r) | Cond::Or(l, r) => {
                l.collect_symbols(into);
                r.collect_symbols(into);
            }
        }
    }

    /// All symbol names referenced by the condition
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::add(vec![self, rhs])
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::add(vec![self, Expr::mul(vec![Expr::num(-1.0), rhs])])
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::mul(vec![self, rhs])
    }
}
