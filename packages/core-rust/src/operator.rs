//! Filter operators: named predicate builders.
//!
//! Each [`Operator`] turns a filter operand into a [`Predicate`] over an
//! extracted cell value, and advertises which column kinds it applies to so
//! the filter editor can offer it. Predicates are pure and total: a missing
//! cell, a type mismatch or an unparsable operand yields `false`, never a
//! panic.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::RegexBuilder;

use crate::column::ColumnKind;
use crate::filter::FilterValue;
use crate::value::Scalar;

pub const EQUAL: &str = "EQUAL";
pub const NOT_EQUAL: &str = "NOT_EQUAL";
pub const GREATER: &str = "GREATER";
pub const GREATER_EQUAL: &str = "GREATER_EQUAL";
pub const LESS: &str = "LESS";
pub const LESS_EQUAL: &str = "LESS_EQUAL";
pub const CONTAIN: &str = "CONTAIN";
pub const NOT_CONTAIN: &str = "NOT_CONTAIN";
pub const BEGIN_WITH: &str = "BEGIN_WITH";
pub const RANGE: &str = "RANGE";
pub const IN: &str = "IN";
pub const NOT_IN: &str = "NOT_IN";
pub const REGEX: &str = "REGEX";

/// Compiled filter test over one extracted cell value.
pub type Predicate = Box<dyn Fn(Option<&Scalar>) -> bool + Send + Sync>;

/// Shape of the operand an operator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// A single value (`FilterValue::One`).
    One,
    /// Two bounds (`FilterValue::Many` of length 2).
    Pair,
    /// Any number of values (`FilterValue::Many`).
    List,
}

/// A named predicate builder.
pub trait Operator: Send + Sync {
    /// Registry key, e.g. `"EQUAL"`.
    fn id(&self) -> &str;

    /// Short label for the filter editor.
    fn label(&self) -> &str;

    /// Operand shape the editor should collect.
    fn arity(&self) -> Arity;

    /// Whether the operator is offered for columns of `kind`.
    fn supports(&self, kind: ColumnKind) -> bool;

    /// Builds the predicate for a concrete operand.
    fn build_filter(&self, value: &FilterValue) -> Predicate;
}

const COMPARABLE: &[ColumnKind] = &[
    ColumnKind::String,
    ColumnKind::Int,
    ColumnKind::Float,
    ColumnKind::Bool,
    ColumnKind::Raw,
];
const ORDERED: &[ColumnKind] = &[ColumnKind::Int, ColumnKind::Float, ColumnKind::String];
const TEXTUAL: &[ColumnKind] = &[ColumnKind::String, ColumnKind::Raw];

/// Operator backed by a plain builder function.
#[derive(Clone, Copy)]
pub struct BuiltinOperator {
    id: &'static str,
    label: &'static str,
    arity: Arity,
    kinds: &'static [ColumnKind],
    build: fn(&FilterValue) -> Predicate,
}

impl BuiltinOperator {
    /// Creates an operator from its parts.
    #[must_use]
    pub const fn new(
        id: &'static str,
        label: &'static str,
        arity: Arity,
        kinds: &'static [ColumnKind],
        build: fn(&FilterValue) -> Predicate,
    ) -> Self {
        Self {
            id,
            label,
            arity,
            kinds,
            build,
        }
    }
}

impl fmt::Debug for BuiltinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOperator")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl Operator for BuiltinOperator {
    fn id(&self) -> &str {
        self.id
    }

    fn label(&self) -> &str {
        self.label
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn supports(&self, kind: ColumnKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn build_filter(&self, value: &FilterValue) -> Predicate {
        (self.build)(value)
    }
}

/// The operators every registry starts with, in editor display order.
pub const BUILTINS: &[BuiltinOperator] = &[
    BuiltinOperator::new(EQUAL, "=", Arity::One, COMPARABLE, build_equal),
    BuiltinOperator::new(NOT_EQUAL, "!=", Arity::One, COMPARABLE, build_not_equal),
    BuiltinOperator::new(GREATER, ">", Arity::One, ORDERED, build_greater),
    BuiltinOperator::new(GREATER_EQUAL, ">=", Arity::One, ORDERED, build_greater_equal),
    BuiltinOperator::new(LESS, "<", Arity::One, ORDERED, build_less),
    BuiltinOperator::new(LESS_EQUAL, "<=", Arity::One, ORDERED, build_less_equal),
    BuiltinOperator::new(CONTAIN, "contains", Arity::One, TEXTUAL, build_contain),
    BuiltinOperator::new(NOT_CONTAIN, "does not contain", Arity::One, TEXTUAL, build_not_contain),
    BuiltinOperator::new(BEGIN_WITH, "begins with", Arity::One, TEXTUAL, build_begin_with),
    BuiltinOperator::new(RANGE, "is between", Arity::Pair, ORDERED, build_range),
    BuiltinOperator::new(IN, "is in list", Arity::List, COMPARABLE, build_in),
    BuiltinOperator::new(NOT_IN, "is not in list", Arity::List, COMPARABLE, build_not_in),
    BuiltinOperator::new(REGEX, "matches", Arity::One, TEXTUAL, build_regex),
];

fn never() -> Predicate {
    Box::new(|_| false)
}

fn build_equal(value: &FilterValue) -> Predicate {
    let Some(operand) = value.first().cloned() else {
        return never();
    };
    Box::new(move |candidate| {
        candidate.is_some_and(|c| operand.coerce_like(c).is_some_and(|op| c.loose_eq(&op)))
    })
}

fn build_not_equal(value: &FilterValue) -> Predicate {
    let Some(operand) = value.first().cloned() else {
        return never();
    };
    Box::new(move |candidate| {
        candidate.is_some_and(|c| operand.coerce_like(c).is_some_and(|op| !c.loose_eq(&op)))
    })
}

fn build_ordered(value: &FilterValue, accept: fn(Ordering) -> bool) -> Predicate {
    let Some(operand) = value.first().cloned() else {
        return never();
    };
    Box::new(move |candidate| {
        candidate.is_some_and(|c| {
            operand
                .coerce_like(c)
                .and_then(|op| c.partial_order(&op))
                .is_some_and(accept)
        })
    })
}

fn build_greater(value: &FilterValue) -> Predicate {
    build_ordered(value, Ordering::is_gt)
}

fn build_greater_equal(value: &FilterValue) -> Predicate {
    build_ordered(value, Ordering::is_ge)
}

fn build_less(value: &FilterValue) -> Predicate {
    build_ordered(value, Ordering::is_lt)
}

fn build_less_equal(value: &FilterValue) -> Predicate {
    build_ordered(value, Ordering::is_le)
}

fn build_text(value: &FilterValue, test: fn(&str, &str) -> bool) -> Predicate {
    let Some(needle) = value.first().map(|s| s.to_display_string().to_lowercase()) else {
        return never();
    };
    Box::new(move |candidate| {
        candidate
            .and_then(Scalar::as_str)
            .is_some_and(|hay| test(&hay.to_lowercase(), &needle))
    })
}

fn build_contain(value: &FilterValue) -> Predicate {
    build_text(value, |hay, needle| hay.contains(needle))
}

fn build_not_contain(value: &FilterValue) -> Predicate {
    build_text(value, |hay, needle| !hay.contains(needle))
}

fn build_begin_with(value: &FilterValue) -> Predicate {
    build_text(value, |hay, needle| hay.starts_with(needle))
}

fn build_range(value: &FilterValue) -> Predicate {
    let [low, high] = value.values() else {
        return never();
    };
    let (low, high) = (low.clone(), high.clone());
    Box::new(move |candidate| {
        candidate.is_some_and(|c| {
            let above = low
                .coerce_like(c)
                .and_then(|lo| c.partial_order(&lo))
                .is_some_and(Ordering::is_ge);
            let below = high
                .coerce_like(c)
                .and_then(|hi| c.partial_order(&hi))
                .is_some_and(Ordering::is_le);
            above && below
        })
    })
}

fn member_of(list: &[Scalar], candidate: &Scalar) -> bool {
    list.iter().any(|item| {
        item.coerce_like(candidate)
            .is_some_and(|op| candidate.loose_eq(&op))
    })
}

fn build_in(value: &FilterValue) -> Predicate {
    let list = value.values().to_vec();
    Box::new(move |candidate| candidate.is_some_and(|c| member_of(&list, c)))
}

fn build_not_in(value: &FilterValue) -> Predicate {
    let list = value.values().to_vec();
    Box::new(move |candidate| candidate.is_some_and(|c| !member_of(&list, c)))
}

fn build_regex(value: &FilterValue) -> Predicate {
    let Some(pattern) = value.first().and_then(Scalar::as_str) else {
        return never();
    };
    match RegexBuilder::new(pattern).size_limit(1 << 20).build() {
        Ok(re) => Box::new(move |candidate| {
            candidate.and_then(Scalar::as_str).is_some_and(|s| re.is_match(s))
        }),
        Err(err) => {
            tracing::debug!(%pattern, error = %err, "invalid regex filter, matching nothing");
            never()
        }
    }
}

/// Lookup table from operator id to operator.
///
/// Registration order is kept: [`OperatorRegistry::operators_for`] lists
/// operators the way they were registered.
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: Vec<Arc<dyn Operator>>,
    index: HashMap<String, usize>,
}

impl OperatorRegistry {
    /// A registry with no operators at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            operators: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds an operator, replacing any operator already registered under the
    /// same id (in place, keeping its display position).
    pub fn register(&mut self, operator: Arc<dyn Operator>) {
        let id = operator.id().to_string();
        if let Some(&pos) = self.index.get(&id) {
            self.operators[pos] = operator;
        } else {
            self.index.insert(id, self.operators.len());
            self.operators.push(operator);
        }
    }

    /// Looks up an operator by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn Operator> {
        self.index.get(id).map(|&pos| &*self.operators[pos])
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Operators applicable to a column kind, in registration order.
    #[must_use]
    pub fn operators_for(&self, kind: ColumnKind) -> Vec<&dyn Operator> {
        self.operators
            .iter()
            .filter(|op| op.supports(kind))
            .map(|op| &**op)
            .collect()
    }

    /// Number of registered operators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for builtin in BUILTINS {
            registry.register(Arc::new(*builtin));
        }
        registry
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.operators.iter().map(|op| op.id()))
            .finish()
    }
}
