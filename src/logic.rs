use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Constant(String),
    Variable(String),
}

impl Term {
    pub fn constant(name: &str) -> Term {
        Term::Constant(name.to_string())
    }

    pub fn variable(name: &str) -> Term {
        Term::Variable(name.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Term::Constant(name) | Term::Variable(name) => name,
        }
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Constant(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(name) => write!(f, "{name}"),
            Term::Variable(name) => write!(f, "?{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    pub predicate: String,
    pub terms: Vec<Term>,
    pub positive: bool,
}

impl Literal {
    pub fn new(predicate: &str, terms: Vec<Term>) -> Literal {
        Literal {
            predicate: predicate.to_string(),
            terms,
            positive: true,
        }
    }

    /// A ground positive literal over constant arguments.
    pub fn fact(predicate: &str, constants: &[&str]) -> Literal {
        Literal::new(predicate, constants.iter().map(|c| Term::constant(c)).collect())
    }

    /// A positive literal over variable arguments, as used in operation and
    /// method declarations.
    pub fn atom(predicate: &str, variables: &[&str]) -> Literal {
        Literal::new(predicate, variables.iter().map(|v| Term::variable(v)).collect())
    }

    pub fn negated(mut self) -> Literal {
        self.positive = !self.positive;
        self
    }

    pub fn positive_form(&self) -> Literal {
        let mut literal = self.clone();
        literal.positive = true;
        literal
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    pub fn substitute(&self, substitution: &Substitution) -> Literal {
        Literal {
            predicate: self.predicate.clone(),
            terms: self.terms.iter().map(|t| substitution.apply(t)).collect(),
            positive: self.positive,
        }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            write!(f, "!")?;
        }
        write!(f, "{}(", self.predicate)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

/// A conjunction of literals. Used both for states (all literals ground and
/// positive) and for preconditions (possibly negated, possibly with
/// variables).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Monom(BTreeSet<Literal>);

impl Monom {
    pub fn new() -> Monom {
        Monom(BTreeSet::new())
    }

    pub fn insert(&mut self, literal: Literal) {
        self.0.insert(literal);
    }

    pub fn remove(&mut self, literal: &Literal) {
        self.0.remove(literal);
    }

    pub fn contains(&self, literal: &Literal) -> bool {
        self.0.contains(literal)
    }

    pub fn add_all(&mut self, other: &Monom) {
        for literal in other.iter() {
            self.0.insert(literal.clone());
        }
    }

    pub fn remove_all(&mut self, other: &Monom) {
        for literal in other.iter() {
            self.0.remove(literal);
        }
    }

    pub fn contains_all(&self, other: &Monom) -> bool {
        other.iter().all(|literal| self.0.contains(literal))
    }

    pub fn is_disjoint(&self, other: &Monom) -> bool {
        self.0.is_disjoint(&other.0)
    }

    /// Treats `self` as a condition and checks it against a state of ground
    /// positive facts: positive literals must be present, negated ones
    /// absent.
    pub fn satisfied_in(&self, state: &Monom) -> bool {
        self.iter().all(|literal| {
            if literal.positive {
                state.contains(literal)
            } else {
                !state.contains(&literal.positive_form())
            }
        })
    }

    pub fn substitute(&self, substitution: &Substitution) -> Monom {
        self.iter().map(|l| l.substitute(substitution)).collect()
    }

    pub fn constants(&self) -> BTreeSet<String> {
        let mut constants = BTreeSet::new();
        for literal in self.iter() {
            for term in &literal.terms {
                if let Term::Constant(name) = term {
                    constants.insert(name.clone());
                }
            }
        }
        constants
    }

    pub fn is_ground(&self) -> bool {
        self.iter().all(Literal::is_ground)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Literal> for Monom {
    fn from_iter<I: IntoIterator<Item = Literal>>(iter: I) -> Monom {
        Monom(iter.into_iter().collect())
    }
}

impl fmt::Display for Monom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, literal) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{literal}")?;
        }
        write!(f, "]")
    }
}

/// A grounding: a mapping from variable names to constant names.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Substitution(BTreeMap<String, String>);

impl Substitution {
    pub fn new() -> Substitution {
        Substitution(BTreeMap::new())
    }

    pub fn bind(&mut self, variable: &str, constant: &str) {
        self.0.insert(variable.to_string(), constant.to_string());
    }

    pub fn get(&self, variable: &str) -> Option<&str> {
        self.0.get(variable).map(String::as_str)
    }

    pub fn merged_with(&self, other: &Substitution) -> Substitution {
        let mut merged = self.clone();
        for (variable, constant) in &other.0 {
            merged.0.insert(variable.clone(), constant.clone());
        }
        merged
    }

    pub fn apply(&self, term: &Term) -> Term {
        match term {
            Term::Constant(_) => term.clone(),
            Term::Variable(name) => match self.0.get(name) {
                Some(constant) => Term::Constant(constant.clone()),
                None => term.clone(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_literal() {
        let mut substitution = Substitution::new();
        substitution.bind("x", "a");
        substitution.bind("y", "b");

        let literal = Literal::atom("on", &["x", "y"]);
        assert_eq!(literal.substitute(&substitution), Literal::fact("on", &["a", "b"]));
        assert!(!literal.is_ground());
        assert!(literal.substitute(&substitution).is_ground());
    }

    #[test]
    fn test_partial_substitution_leaves_variables() {
        let mut substitution = Substitution::new();
        substitution.bind("x", "a");

        let literal = Literal::atom("on", &["x", "y"]);
        let substituted = literal.substitute(&substitution);
        assert_eq!(substituted.terms[0], Term::constant("a"));
        assert_eq!(substituted.terms[1], Term::variable("y"));
    }

    #[test]
    fn test_condition_with_negation() {
        let state: Monom = vec![Literal::fact("clear", &["a"]), Literal::fact("ontable", &["a"])]
            .into_iter()
            .collect();

        let mut condition = Monom::new();
        condition.insert(Literal::fact("clear", &["a"]));
        condition.insert(Literal::fact("holding", &["a"]).negated());
        assert!(condition.satisfied_in(&state));

        condition.insert(Literal::fact("ontable", &["a"]).negated());
        assert!(!condition.satisfied_in(&state));
    }

    #[test]
    fn test_monom_set_operations() {
        let mut state: Monom = vec![Literal::fact("clear", &["a"]), Literal::fact("handempty", &[])]
            .into_iter()
            .collect();
        let delete: Monom = vec![Literal::fact("handempty", &[])].into_iter().collect();
        let add: Monom = vec![Literal::fact("holding", &["a"])].into_iter().collect();

        state.remove_all(&delete);
        state.add_all(&add);

        assert!(state.contains(&Literal::fact("holding", &["a"])));
        assert!(!state.contains(&Literal::fact("handempty", &[])));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_constants_collects_only_constants() {
        let mut monom = Monom::new();
        monom.insert(Literal::fact("at", &["r1", "l1"]));
        monom.insert(Literal::atom("adjacent", &["from", "to"]));

        let constants = monom.constants();
        assert_eq!(constants.len(), 2);
        assert!(constants.contains("r1"));
        assert!(constants.contains("l1"));
    }
}
