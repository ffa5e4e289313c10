//! Comparison operators and the registry the criteria evaluator dispatches to.
//!
//! Combinators (`$and`, `$or`, `$not`) live in the evaluator's recursion; every
//! leaf comparison is a [`ComparisonOperator`] looked up by name, so new
//! operators can be registered without touching [`crate::criteria`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

use engage_types::json_type_name;
use serde_json::Value;

// ---------------------------------------------------------------------------
// ComparisonOperator trait
// ---------------------------------------------------------------------------

pub trait ComparisonOperator: Send + Sync {
    /// Operator name as written in the manifest (e.g. `"$eq"`).
    fn name(&self) -> &str;

    /// Reject operands this operator cannot compare against.
    fn check_operand(&self, _operand: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Compare the resolved value (`None` when the path is absent) against the
    /// operand. Only called after [`check_operand`](Self::check_operand) passed.
    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool;
}

// ---------------------------------------------------------------------------
// OperatorRegistry
// ---------------------------------------------------------------------------

pub struct OperatorRegistry {
    operators: HashMap<String, Box<dyn ComparisonOperator>>,
}

impl OperatorRegistry {
    /// An empty registry. Use [`default_operators`] for the built-in set.
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    pub fn register(&mut self, operator: impl ComparisonOperator + 'static) {
        let name = operator.name().to_string();
        self.operators.insert(name, Box::new(operator));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ComparisonOperator> {
        self.operators.get(name).map(|op| op.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Registered operator names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.operators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        default_operators()
    }
}

/// Registry holding every built-in comparison operator.
pub fn default_operators() -> OperatorRegistry {
    let mut reg = OperatorRegistry::new();
    reg.register(Equals);
    reg.register(NotEquals);
    reg.register(Ordered::new("$gt", |o| o == Ordering::Greater));
    reg.register(Ordered::new("$gte", |o| o != Ordering::Less));
    reg.register(Ordered::new("$lt", |o| o == Ordering::Less));
    reg.register(Ordered::new("$lte", |o| o != Ordering::Greater));
    reg.register(InList);
    reg.register(NotInList);
    reg.register(Exists);
    reg.register(Contains);
    reg.register(StringAffix::starts_with());
    reg.register(StringAffix::ends_with());
    reg
}

/// Process-wide built-in registry used by [`crate::criteria::evaluate`].
pub fn shared_operators() -> &'static OperatorRegistry {
    static REGISTRY: OnceLock<OperatorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(default_operators)
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Type-aware equality: numbers compare numerically, everything else
/// structurally. A number never equals a string.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Ordering between two numbers or two strings; `None` for any other pairing.
pub fn values_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Apply `predicate` to a scalar, or to any element when `actual` is an array.
fn any_element(actual: &Value, predicate: impl Fn(&Value) -> bool) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(predicate),
        scalar => predicate(scalar),
    }
}

fn require_scalar(name: &str, operand: &Value) -> Result<(), String> {
    match operand {
        Value::Array(_) | Value::Object(_) | Value::Null => Err(format!(
            "{name} requires a scalar operand, got {}",
            json_type_name(operand)
        )),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Built-in operators
// ---------------------------------------------------------------------------

pub struct Equals;

impl ComparisonOperator for Equals {
    fn name(&self) -> &str {
        "$eq"
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        match actual {
            None => false,
            Some(Value::Array(items)) if !operand.is_array() => {
                items.iter().any(|item| values_equal(item, operand))
            }
            Some(value) => values_equal(value, operand),
        }
    }
}

pub struct NotEquals;

impl ComparisonOperator for NotEquals {
    fn name(&self) -> &str {
        "$ne"
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        !Equals.compare(actual, operand)
    }
}

/// `$gt`/`$gte`/`$lt`/`$lte` over numbers or strings.
pub struct Ordered {
    name: &'static str,
    accept: fn(Ordering) -> bool,
}

impl Ordered {
    pub fn new(name: &'static str, accept: fn(Ordering) -> bool) -> Self {
        Self { name, accept }
    }
}

impl ComparisonOperator for Ordered {
    fn name(&self) -> &str {
        self.name
    }

    fn check_operand(&self, operand: &Value) -> Result<(), String> {
        if operand.is_number() || operand.is_string() {
            Ok(())
        } else {
            Err(format!(
                "{} requires a number or string operand, got {}",
                self.name,
                json_type_name(operand)
            ))
        }
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        any_element(actual, |value| {
            values_ordering(value, operand).is_some_and(self.accept)
        })
    }
}

pub struct InList;

impl ComparisonOperator for InList {
    fn name(&self) -> &str {
        "$in"
    }

    fn check_operand(&self, operand: &Value) -> Result<(), String> {
        if operand.is_array() {
            Ok(())
        } else {
            Err(format!("$in requires an array operand, got {}", json_type_name(operand)))
        }
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        let (Some(actual), Some(list)) = (actual, operand.as_array()) else {
            return false;
        };
        any_element(actual, |value| list.iter().any(|item| values_equal(value, item)))
    }
}

pub struct NotInList;

impl ComparisonOperator for NotInList {
    fn name(&self) -> &str {
        "$nin"
    }

    fn check_operand(&self, operand: &Value) -> Result<(), String> {
        InList.check_operand(operand).map_err(|e| e.replacen("$in", "$nin", 1))
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        !InList.compare(actual, operand)
    }
}

pub struct Exists;

impl ComparisonOperator for Exists {
    fn name(&self) -> &str {
        "$exists"
    }

    fn check_operand(&self, operand: &Value) -> Result<(), String> {
        if operand.is_boolean() {
            Ok(())
        } else {
            Err(format!("$exists requires a boolean operand, got {}", json_type_name(operand)))
        }
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        operand.as_bool() == Some(actual.is_some())
    }
}

/// Substring match on strings, membership on arrays.
pub struct Contains;

impl ComparisonOperator for Contains {
    fn name(&self) -> &str {
        "$contains"
    }

    fn check_operand(&self, operand: &Value) -> Result<(), String> {
        require_scalar("$contains", operand)
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        match (actual, operand) {
            (Some(Value::String(haystack)), Value::String(needle)) => {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            (Some(Value::Array(items)), _) => items.iter().any(|item| values_equal(item, operand)),
            _ => false,
        }
    }
}

/// `$starts_with` / `$ends_with`, case-insensitive.
pub struct StringAffix {
    name: &'static str,
    suffix: bool,
}

impl StringAffix {
    pub fn starts_with() -> Self {
        Self {
            name: "$starts_with",
            suffix: false,
        }
    }

    pub fn ends_with() -> Self {
        Self {
            name: "$ends_with",
            suffix: true,
        }
    }
}

impl ComparisonOperator for StringAffix {
    fn name(&self) -> &str {
        self.name
    }

    fn check_operand(&self, operand: &Value) -> Result<(), String> {
        if operand.is_string() {
            Ok(())
        } else {
            Err(format!(
                "{} requires a string operand, got {}",
                self.name,
                json_type_name(operand)
            ))
        }
    }

    fn compare(&self, actual: Option<&Value>, operand: &Value) -> bool {
        let (Some(actual), Some(affix)) = (actual, operand.as_str()) else {
            return false;
        };
        let affix = affix.to_lowercase();
        any_element(actual, |value| {
            value.as_str().is_some_and(|s| {
                let s = s.to_lowercase();
                if self.suffix {
                    s.ends_with(&affix)
                } else {
                    s.starts_with(&affix)
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(name: &str) -> &'static dyn ComparisonOperator {
        shared_operators().get(name).unwrap()
    }

    #[test]
    fn default_registry_has_builtins() {
        let reg = default_operators();
        assert_eq!(
            reg.names(),
            vec![
                "$contains", "$ends_with", "$eq", "$exists", "$gt", "$gte", "$in", "$lt",
                "$lte", "$ne", "$nin", "$starts_with"
            ]
        );
        assert!(!reg.has("$regex"));
    }

    #[test]
    fn equality_is_type_aware() {
        assert!(op("$eq").compare(Some(&json!(2)), &json!(2.0)));
        assert!(!op("$eq").compare(Some(&json!("2")), &json!(2)));
        assert!(!op("$eq").compare(Some(&json!(true)), &json!("true")));
        assert!(!op("$eq").compare(None, &json!("x")));
    }

    #[test]
    fn equality_over_arrays_matches_any_element() {
        let ids = json!(["a1", "a2"]);
        assert!(op("$eq").compare(Some(&ids), &json!("a2")));
        assert!(!op("$eq").compare(Some(&ids), &json!("a3")));
        assert!(op("$eq").compare(Some(&ids), &json!(["a1", "a2"])));
    }

    #[test]
    fn not_equals_holds_for_absent_values() {
        assert!(op("$ne").compare(None, &json!("x")));
        assert!(!op("$ne").compare(Some(&json!("x")), &json!("x")));
    }

    #[test]
    fn ordering_only_within_same_type() {
        assert!(op("$gt").compare(Some(&json!(5)), &json!(3)));
        assert!(op("$gte").compare(Some(&json!(3)), &json!(3)));
        assert!(op("$lt").compare(Some(&json!("apple")), &json!("banana")));
        assert!(!op("$lt").compare(Some(&json!("1")), &json!(5)));
        assert!(!op("$lte").compare(None, &json!(5)));
        assert!(op("$gt").check_operand(&json!([1])).is_err());
    }

    #[test]
    fn membership_operators() {
        let list = json!(["gold", "silver"]);
        assert!(op("$in").compare(Some(&json!("gold")), &list));
        assert!(!op("$in").compare(Some(&json!("bronze")), &list));
        assert!(op("$nin").compare(Some(&json!("bronze")), &list));
        assert!(op("$nin").compare(None, &list));
        assert!(op("$in").check_operand(&json!("gold")).is_err());
        assert!(op("$nin").check_operand(&json!("gold")).unwrap_err().starts_with("$nin"));
    }

    #[test]
    fn exists_checks_presence() {
        assert!(op("$exists").compare(Some(&json!(0)), &json!(true)));
        assert!(op("$exists").compare(None, &json!(false)));
        assert!(!op("$exists").compare(None, &json!(true)));
        assert!(op("$exists").check_operand(&json!("yes")).is_err());
    }

    #[test]
    fn string_operators_ignore_case() {
        assert!(op("$contains").compare(Some(&json!("Hello World")), &json!("world")));
        assert!(op("$contains").compare(Some(&json!(["a", "b"])), &json!("b")));
        assert!(op("$starts_with").compare(Some(&json!("iPhone 15")), &json!("iphone")));
        assert!(op("$ends_with").compare(Some(&json!("build-RC")), &json!("rc")));
        assert!(!op("$ends_with").compare(Some(&json!(12)), &json!("2")));
    }
}
