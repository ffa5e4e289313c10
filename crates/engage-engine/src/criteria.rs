//! Criteria expression language: parsing from manifest JSON and evaluation.
//!
//! Encoding:
//! ```text
//! Criteria   ::= { Entry, ... }              (entries are AND-ed; {} is always true)
//! Entry      ::= "$and": [Criteria, ...]
//!              | "$or":  [Criteria, ...]
//!              | "$not": Criteria
//!              | Path: Literal               (implicit $eq)
//!              | Path: { Operator: Operand, ... }
//! Path       ::= segment ( '/' segment )*  |  segment ( '.' segment )*
//! ```
//!
//! Parsing never fails. Anything that cannot be understood becomes an
//! [`Criteria::Invalid`] node, and evaluation of a tree that reaches one is
//! `false` with a warning logged.

use engage_types::{json_type_name, DataContext};
use serde::Deserialize;
use serde_json::Value;

use crate::operators::{shared_operators, OperatorRegistry};

/// A parsed criteria tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum Criteria {
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Not(Box<Criteria>),
    Compare {
        path: String,
        operator: String,
        operand: Value,
    },
    Invalid {
        reason: String,
    },
}

impl Criteria {
    /// The tautology: an empty `$and`.
    pub fn always() -> Self {
        Criteria::And(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Criteria::And(children) if children.is_empty())
    }

    /// Shorthand for a single `$eq` comparison.
    pub fn equals(path: impl Into<String>, operand: Value) -> Self {
        Criteria::Compare {
            path: path.into(),
            operator: "$eq".into(),
            operand,
        }
    }

    /// Every structural problem in the tree, checked against `registry`.
    ///
    /// Evaluation stops at the first problem it reaches; this walks the whole
    /// tree so load-time lint can report all of them.
    pub fn problems(&self, registry: &OperatorRegistry) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_problems(registry, &mut out);
        out
    }

    fn collect_problems(&self, registry: &OperatorRegistry, out: &mut Vec<String>) {
        match self {
            Criteria::And(children) | Criteria::Or(children) => {
                for child in children {
                    child.collect_problems(registry, out);
                }
            }
            Criteria::Not(inner) => inner.collect_problems(registry, out),
            Criteria::Compare {
                path,
                operator,
                operand,
            } => match registry.get(operator) {
                None => out.push(format!("unknown operator '{operator}' on path '{path}'")),
                Some(op) => {
                    if let Err(e) = op.check_operand(operand) {
                        out.push(format!("{e} (path '{path}')"));
                    }
                }
            },
            Criteria::Invalid { reason } => out.push(reason.clone()),
        }
    }
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria::always()
    }
}

impl From<Value> for Criteria {
    fn from(value: Value) -> Self {
        parse_criteria(&value)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a criteria JSON value. `null` and `{}` are the tautology.
pub fn parse_criteria(value: &Value) -> Criteria {
    match value {
        Value::Null => Criteria::always(),
        Value::Object(map) => {
            let mut clauses: Vec<Criteria> = map
                .iter()
                .map(|(key, operand)| parse_entry(key, operand))
                .collect();
            if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                Criteria::And(clauses)
            }
        }
        other => invalid(format!(
            "criteria must be an object, got {}",
            json_type_name(other)
        )),
    }
}

fn parse_entry(key: &str, operand: &Value) -> Criteria {
    match key {
        "$and" | "$or" => {
            let Some(items) = operand.as_array() else {
                return invalid(format!(
                    "{key} requires an array, got {}",
                    json_type_name(operand)
                ));
            };
            let children = items.iter().map(parse_criteria).collect();
            if key == "$and" {
                Criteria::And(children)
            } else {
                Criteria::Or(children)
            }
        }
        "$not" => {
            if operand.is_object() {
                Criteria::Not(Box::new(parse_criteria(operand)))
            } else {
                invalid(format!(
                    "$not requires an object, got {}",
                    json_type_name(operand)
                ))
            }
        }
        k if k.starts_with('$') => invalid(format!("unknown combinator '{k}'")),
        path => parse_comparisons(path, operand),
    }
}

fn parse_comparisons(path: &str, operand: &Value) -> Criteria {
    let Value::Object(ops) = operand else {
        return Criteria::equals(path, operand.clone());
    };

    let operator_keys = ops.keys().filter(|k| k.starts_with('$')).count();
    if ops.is_empty() {
        return invalid(format!("empty operator object on path '{path}'"));
    }
    if operator_keys == 0 {
        // Plain object literal.
        return Criteria::equals(path, operand.clone());
    }
    if operator_keys != ops.len() {
        return invalid(format!(
            "path '{path}' mixes operators with plain keys"
        ));
    }

    let mut comparisons: Vec<Criteria> = ops
        .iter()
        .map(|(operator, value)| Criteria::Compare {
            path: path.to_string(),
            operator: operator.clone(),
            operand: value.clone(),
        })
        .collect();
    if comparisons.len() == 1 {
        comparisons.remove(0)
    } else {
        Criteria::And(comparisons)
    }
}

fn invalid(reason: String) -> Criteria {
    Criteria::Invalid { reason }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate `criteria` against `context` with the built-in operators.
pub fn evaluate(criteria: &Criteria, context: &DataContext) -> bool {
    evaluate_with(criteria, context, shared_operators())
}

/// Evaluate with a caller-supplied operator registry.
///
/// Malformed nodes make the whole expression `false` and are logged; this
/// function never panics.
pub fn evaluate_with(criteria: &Criteria, context: &DataContext, registry: &OperatorRegistry) -> bool {
    match eval_node(criteria, context, registry) {
        Ok(result) => result,
        Err(reason) => {
            tracing::warn!(%reason, "Malformed criteria evaluated as false");
            false
        }
    }
}

fn eval_node(
    criteria: &Criteria,
    context: &DataContext,
    registry: &OperatorRegistry,
) -> Result<bool, String> {
    match criteria {
        Criteria::And(children) => {
            for child in children {
                if !eval_node(child, context, registry)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Criteria::Or(children) => {
            for child in children {
                if eval_node(child, context, registry)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Criteria::Not(inner) => Ok(!eval_node(inner, context, registry)?),
        Criteria::Compare {
            path,
            operator,
            operand,
        } => {
            let op = registry
                .get(operator)
                .ok_or_else(|| format!("unknown operator '{operator}' on path '{path}'"))?;
            op.check_operand(operand)
                .map_err(|e| format!("{e} (path '{path}')"))?;
            let actual = context.resolve(path);
            let result = op.compare(actual, operand);
            tracing::trace!(%path, %operator, result, "Criteria comparison");
            Ok(result)
        }
        Criteria::Invalid { reason } => Err(reason.clone()),
    }
}
