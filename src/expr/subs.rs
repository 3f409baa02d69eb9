//! Simultaneous substitution over expression trees

use std::collections::BTreeMap;

use super::{Branch, Cond, Expr};

impl Expr {
    /// Substitute every symbol found in `map` with its replacement, in a
    /// single simultaneous pass. Replacements are spliced in verbatim and are
    /// not themselves re-substituted, so `{A -> B, B -> A}` swaps the two
    /// symbols instead of cascading.
    pub fn subs_symbols(&self, map: &BTreeMap<String, Expr>) -> Expr {
        match self {
            Expr::Symbol(name) => match map.get(name) {
                Some(replacement) => replacement.clone(),
                None => self.clone(),
            },
            Expr::Num(_) => self.clone(),
            Expr::Add(terms) => Expr::add(terms.iter().map(|t| t.subs_symbols(map)).collect()),
            Expr::Mul(factors) => {
                Expr::mul(factors.iter().map(|f| f.subs_symbols(map)).collect())
            }
            Expr::Pow(base, exponent) => {
                Expr::pow(base.subs_symbols(map), exponent.subs_symbols(map))
            }
            Expr::Func(name, args) => Expr::func(
                name.clone(),
                args.iter().map(|a| a.subs_symbols(map)).collect(),
            ),
            Expr::Piecewise(branches) => Expr::piecewise(
                branches
                    .iter()
                    .map(|b| Branch::new(b.value.subs_symbols(map), b.cond.subs_symbols(map)))
                    .collect(),
            ),
        }
    }

    /// Substitute a single symbol
    pub fn subs_symbol(&self, name: &str, replacement: &Expr) -> Expr {
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), replacement.clone());
        self.subs_symbols(&map)
    }
}

impl Cond {
    /// Substitute symbols inside both sides of the comparison
    pub fn subs_symbols(&self, map: &BTreeMap<String, Expr>) -> Cond {
        match self {
            Cond::True => Cond::True,
            Cond::Eq(l, r) => Cond::Eq(l.subs_symbols(map), r.subs_symbols(map)),
            Cond::Ne(l, r) => Cond::Ne(l.subs_symbols(map), r.subs_symbols(map)),
            Cond::Lt(l, r) => Cond::Lt(l.subs_symbols(map), r.subs_symbols(map)),
            Cond::Le(l, r) => Cond::Le(l.subs_symbols(map), r.subs_symbols(map)),
            Cond::Gt(l, r) => Cond::Gt(l.subs_symbols(map), r.subs_symbols(map)),
            Cond::Ge(l, r) => Cond::Ge(l.subs_symbols(map), r.subs_symbols(map)),
            Cond::And(l, r) => Cond::And(
                Box::new(l.subs_symbols(map)),
                Box::new(r.subs_symbols(map)),
            ),
            Cond::Or(l, r) => Cond::Or(
                Box::new(l.subs_symbols(map)),
                Box::new(r.subs_symbols(map)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_is_simultaneous() {
        let expr = Expr::sym("A") + Expr::sym("B");
        let mut map = BTreeMap::new();
        map.insert("A".to_string(), Expr::sym("B"));
        map.insert("B".to_string(), Expr::sym("A"));
        assert_eq!(
            expr.subs_symbols(&map),
            Expr::sym("B") + Expr::sym("A")
        );
    }

    #[test]
    fn substituting_one_collapses_products() {
        let term = Expr::sym("F") * Expr::sym("EPS1");
        let collapsed = term.subs_symbol("F", &Expr::num(1.0));
        assert_eq!(collapsed, Expr::sym("EPS1"));
    }

    #[test]
    fn substitution_reaches_conditions() {
        let pw = Expr::piecewise(vec![Branch::new(
            Expr::sym("F"),
            Cond::Eq(Expr::sym("BLQ"), Expr::num(1.0)),
        )]);
        let out = pw.subs_symbol("BLQ", &Expr::sym("FLAG"));
        assert!(out.free_symbols().contains("FLAG"));
        assert!(!out.free_symbols().contains("BLQ"));
    }
}
