//! Declarative validation.
//!
//! A [`RuleSet`] is plain data: an ordered list of field rules and nested
//! rule-sets over some type `T`. One generic evaluator walks it and produces a
//! [`ValidationErrors`] map keyed by field path. An empty map means the
//! instance is valid.

pub mod rules;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Field path -> message. Keys are unique. When several rules fail on one
/// path the lexicographically smallest message is kept, so neither the key
/// set nor the stored messages depend on evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        match self.0.entry(path.into()) {
            Entry::Vacant(slot) => {
                slot.insert(message);
            }
            Entry::Occupied(mut slot) => {
                if message < *slot.get() {
                    slot.insert(message);
                }
            }
        }
    }

    /// Merge `nested` under `prefix`, e.g. `user` becomes `authentication.user`.
    fn merge_under(&mut self, prefix: &str, nested: ValidationErrors) {
        for (path, message) in nested.0 {
            self.insert(join_path(prefix, &path), message);
        }
    }

    /// Turn the map into a `Result`, handing the map back on failure.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{path}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    if path.starts_with('[') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}.{path}")
    }
}

type Check<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;
type Condition<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Delegate<T> = Box<dyn Fn(&T) -> Nested + Send + Sync>;

enum Nested {
    Absent,
    Checked(ValidationErrors),
}

enum RuleKind<T> {
    Field(Check<T>),
    Each(Box<dyn Fn(&T) -> Option<ValidationErrors> + Send + Sync>, bool),
    Nested(Delegate<T>),
}

struct Rule<T> {
    path: String,
    when: Option<Condition<T>>,
    kind: RuleKind<T>,
}

/// Ordered collection of rules over `T`.
pub struct RuleSet<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for RuleSet<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T: 'static> RuleSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A field rule: `check` returns the failure message, if any.
    pub fn field<F>(mut self, path: &str, check: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            path: path.to_string(),
            when: None,
            kind: RuleKind::Field(Box::new(check)),
        });
        self
    }

    /// Apply `check` to every element of an array field. An absent array
    /// fails with "is required".
    pub fn each<E, G, F>(self, path: &str, get: G, check: F) -> Self
    where
        E: 'static,
        G: Fn(&T) -> Option<&[E]> + Send + Sync + 'static,
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        self.push_each(path, get, check, false)
    }

    /// Like [`RuleSet::each`] but an absent or empty array is accepted.
    pub fn each_optional<E, G, F>(self, path: &str, get: G, check: F) -> Self
    where
        E: 'static,
        G: Fn(&T) -> Option<&[E]> + Send + Sync + 'static,
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        self.push_each(path, get, check, true)
    }

    fn push_each<E, G, F>(mut self, path: &str, get: G, check: F, optional: bool) -> Self
    where
        E: 'static,
        G: Fn(&T) -> Option<&[E]> + Send + Sync + 'static,
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        let walk = move |instance: &T| {
            let items = get(instance)?;
            let mut errors = ValidationErrors::new();
            for (index, item) in items.iter().enumerate() {
                if let Some(message) = check(item) {
                    errors.insert(format!("[{index}]"), message);
                }
            }
            Some(errors)
        };
        self.rules.push(Rule {
            path: path.to_string(),
            when: None,
            kind: RuleKind::Each(Box::new(walk), optional),
        });
        self
    }

    /// Delegate a sub-object to its own rule-set. The rule-set is built from
    /// the parent so nested rules can depend on sibling fields. An absent
    /// sub-object yields a single "is required" error at `path`.
    pub fn nested<U, G, B>(mut self, path: &str, get: G, build: B) -> Self
    where
        U: 'static,
        G: Fn(&T) -> Option<&U> + Send + Sync + 'static,
        B: Fn(&T) -> RuleSet<U> + Send + Sync + 'static,
    {
        let delegate = move |instance: &T| match get(instance) {
            Some(child) => Nested::Checked(build(instance).validate(child)),
            None => Nested::Absent,
        };
        self.rules.push(Rule {
            path: path.to_string(),
            when: None,
            kind: RuleKind::Nested(Box::new(delegate)),
        });
        self
    }

    /// Make the most recently added rule conditional on `condition`.
    pub fn when<C>(mut self, condition: C) -> Self
    where
        C: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if let Some(rule) = self.rules.last_mut() {
            rule.when = Some(Box::new(condition));
        }
        self
    }

    pub fn validate(&self, instance: &T) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for rule in &self.rules {
            if let Some(condition) = &rule.when {
                if !condition(instance) {
                    continue;
                }
            }
            match &rule.kind {
                RuleKind::Field(check) => {
                    if let Some(message) = check(instance) {
                        errors.insert(rule.path.clone(), message);
                    }
                }
                RuleKind::Each(walk, optional) => match walk(instance) {
                    Some(nested) => errors.merge_under(&rule.path, nested),
                    None if *optional => {}
                    None => errors.insert(rule.path.clone(), REQUIRED),
                },
                RuleKind::Nested(delegate) => match delegate(instance) {
                    Nested::Checked(nested) => errors.merge_under(&rule.path, nested),
                    Nested::Absent => errors.insert(rule.path.clone(), REQUIRED),
                },
            }
        }
        errors
    }
}

/// Evaluate `rules` against `instance`.
pub fn validate<T: 'static>(rules: &RuleSet<T>, instance: &T) -> ValidationErrors {
    rules.validate(instance)
}

pub const REQUIRED: &str = "is required";
pub const BLANK: &str = "must not be empty";

/// Reusable predicates. Each returns the failure message, if any.
pub mod check {
    use super::{BLANK, REQUIRED};

    pub fn required<V>(value: Option<&V>) -> Option<String> {
        value.is_none().then(|| REQUIRED.to_string())
    }

    pub fn not_blank(value: Option<&str>) -> Option<String> {
        match value {
            None => Some(REQUIRED.to_string()),
            Some(v) if v.trim().is_empty() => Some(BLANK.to_string()),
            Some(_) => None,
        }
    }

    pub fn email_address(value: &str) -> Option<String> {
        if value.trim().is_empty() {
            return Some(BLANK.to_string());
        }
        match value.parse::<lettre::Address>() {
            Ok(_) => None,
            Err(_) => Some(format!("'{value}' is not a valid email address")),
        }
    }

    pub fn non_empty<E>(value: &[E], message: &str) -> Option<String> {
        value.is_empty().then(|| message.to_string())
    }
}
