//! Evaluated values and the unification lattice

use std::fmt;

use serde_json::Value as JsonValue;

use crate::parser::ast::Kind;

use super::error::EvalError;

/// A conflict, with the labels leading to it
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub path: Vec<String>,
    pub message: String,
}

impl Conflict {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    fn within(mut self, label: String) -> Self {
        self.path.insert(0, label);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub label: String,
    pub value: Value,
    pub optional: bool,
}

impl StructField {
    pub fn new(label: impl Into<String>, value: Value) -> Self {
        Self {
            label: label.into(),
            value,
            optional: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub value: Value,
    pub default: bool,
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `_`, unifies with anything
    Top,
    /// Failed unification
    Bottom(Conflict),
    /// Unresolved reference or missing field, with the reason
    Incomplete(String),
    Kind(Kind),
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Struct(Vec<StructField>),
    List(Vec<Value>),
    Disjunction(Vec<Alternative>),
}

impl Value {
    pub fn conflict(message: impl Into<String>) -> Self {
        Value::Bottom(Conflict::new(message))
    }

    fn conflicting(a: &Value, b: &Value) -> Self {
        Value::conflict(format!("conflicting values {} and {}", a, b))
    }

    /// Build a normalized disjunction
    ///
    /// Nested disjunctions are flattened, bottoms dropped and duplicates
    /// merged. An empty result is a conflict and a single alternative
    /// collapses to its value.
    pub fn disjunction(alternatives: Vec<Alternative>) -> Value {
        let mut flat: Vec<Alternative> = Vec::new();
        let mut last_conflict = None;

        for alt in alternatives {
            match alt.value {
                Value::Disjunction(inner) => {
                    let inner_marked = inner.iter().any(|a| a.default);
                    for a in inner {
                        push_alternative(
                            &mut flat,
                            Alternative {
                                default: alt.default && (!inner_marked || a.default),
                                value: a.value,
                            },
                        );
                    }
                }
                Value::Bottom(conflict) => last_conflict = Some(conflict),
                value => push_alternative(
                    &mut flat,
                    Alternative {
                        value,
                        default: alt.default,
                    },
                ),
            }
        }

        // Marking every alternative is the same as marking none
        if flat.iter().all(|a| a.default) {
            for a in &mut flat {
                a.default = false;
            }
        }

        match flat.len() {
            0 => Value::Bottom(last_conflict.unwrap_or_else(|| Conflict::new("empty disjunction"))),
            1 => flat.remove(0).value,
            _ => Value::Disjunction(flat),
        }
    }

    /// Build a struct, merging repeated labels
    ///
    /// A conflicting field turns the whole struct into a conflict.
    pub fn structure(fields: Vec<StructField>) -> Value {
        merge_structs(&[], &fields)
    }

    /// Build a list, propagating the first conflicting element
    pub fn list(items: Vec<Value>) -> Value {
        for (i, item) in items.iter().enumerate() {
            if let Value::Bottom(conflict) = item {
                return Value::Bottom(conflict.clone().within(i.to_string()));
            }
        }
        Value::List(items)
    }

    /// Unify two values
    pub fn unify(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Bottom(_), _) => self.clone(),
            (_, Value::Bottom(_)) => other.clone(),
            (Value::Top, _) => other.clone(),
            (_, Value::Top) => self.clone(),
            (Value::Incomplete(_), _) => self.clone(),
            (_, Value::Incomplete(_)) => other.clone(),
            (Value::Disjunction(alts), _) => distribute(alts, other),
            (_, Value::Disjunction(alts)) => distribute(alts, self),
            (Value::Kind(a), Value::Kind(b)) => match meet(*a, *b) {
                Some(kind) => Value::Kind(kind),
                None => Value::conflicting(self, other),
            },
            (Value::Kind(kind), value) | (value, Value::Kind(kind)) => {
                if admits(*kind, value) {
                    value.clone()
                } else {
                    Value::conflicting(self, other)
                }
            }
            (Value::Struct(a), Value::Struct(b)) => merge_structs(a, b),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Value::conflict(format!(
                        "incompatible list lengths ({} and {})",
                        a.len(),
                        b.len()
                    ));
                }
                let mut items = Vec::with_capacity(a.len());
                for (i, (x, y)) in a.iter().zip(b).enumerate() {
                    match x.unify(y) {
                        Value::Bottom(conflict) => {
                            return Value::Bottom(conflict.within(i.to_string()))
                        }
                        v => items.push(v),
                    }
                }
                Value::List(items)
            }
            (a, b) if a == b => a.clone(),
            _ => Value::conflicting(self, other),
        }
    }

    /// The default of a disjunction, if it has exactly one
    pub fn default_value(&self) -> Option<&Value> {
        match self {
            Value::Disjunction(alts) => {
                let mut defaults = alts.iter().filter(|a| a.default);
                match (defaults.next(), defaults.next()) {
                    (Some(only), None) => Some(&only.value),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The value with disjunction defaults applied
    pub fn resolved(&self) -> &Value {
        match self.default_value() {
            Some(default) => default.resolved(),
            None => self,
        }
    }

    /// Select a field, looking through defaults
    pub fn field(&self, label: &str) -> Option<&Value> {
        match self.resolved() {
            Value::Struct(fields) => fields.iter().find(|f| f.label == label).map(|f| &f.value),
            _ => None,
        }
    }

    /// Select a list element, looking through defaults
    pub fn index(&self, i: usize) -> Option<&Value> {
        match self.resolved() {
            Value::List(items) => items.get(i),
            _ => None,
        }
    }

    /// Non-optional fields of a struct in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        let fields: &[StructField] = match self.resolved() {
            Value::Struct(fields) => fields,
            _ => &[],
        };
        fields
            .iter()
            .filter(|f| !f.optional)
            .map(|f| (f.label.as_str(), &f.value))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.resolved(), Value::Struct(_))
    }

    /// Whether this value is fully resolved
    pub fn is_concrete(&self) -> bool {
        self.first_conflict().is_none() && self.first_incomplete().is_none()
    }

    /// First conflict found anywhere in the value
    pub fn first_conflict(&self) -> Option<Conflict> {
        match self {
            Value::Bottom(conflict) => Some(conflict.clone()),
            Value::Struct(fields) => fields.iter().find_map(|f| {
                f.value
                    .first_conflict()
                    .map(|c| c.within(f.label.clone()))
            }),
            Value::List(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, v)| v.first_conflict().map(|c| c.within(i.to_string()))),
            _ => None,
        }
    }

    /// First non-concrete value outside optional fields, as (path, reason)
    pub fn first_incomplete(&self) -> Option<(Vec<String>, String)> {
        match self.resolved() {
            Value::Top => Some((Vec::new(), "incomplete value _".to_string())),
            Value::Kind(kind) => Some((Vec::new(), format!("incomplete value {}", kind))),
            Value::Incomplete(reason) => Some((Vec::new(), reason.clone())),
            Value::Disjunction(_) => Some((Vec::new(), format!("unresolved disjunction {}", self))),
            Value::Struct(fields) => fields.iter().filter(|f| !f.optional).find_map(|f| {
                f.value.first_incomplete().map(|(mut path, reason)| {
                    path.insert(0, f.label.clone());
                    (path, reason)
                })
            }),
            Value::List(items) => items.iter().enumerate().find_map(|(i, v)| {
                v.first_incomplete().map(|(mut path, reason)| {
                    path.insert(0, i.to_string());
                    (path, reason)
                })
            }),
            _ => None,
        }
    }

    /// Convert a concrete value into a JSON document
    ///
    /// Defaults are applied and optional fields omitted.
    pub fn to_json(&self) -> Result<JsonValue, EvalError> {
        self.export(&mut Vec::new())
    }

    fn export(&self, path: &mut Vec<String>) -> Result<JsonValue, EvalError> {
        match self.resolved() {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Int(i) => Ok(JsonValue::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| EvalError::export(path, format!("float {} is not representable", f))),
            Value::String(s) => Ok(JsonValue::String(s.clone())),
            Value::Struct(fields) => {
                let mut map = serde_json::Map::new();
                for field in fields.iter().filter(|f| !f.optional) {
                    path.push(field.label.clone());
                    let value = field.value.export(path)?;
                    path.pop();
                    map.insert(field.label.clone(), value);
                }
                Ok(JsonValue::Object(map))
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push(i.to_string());
                    out.push(item.export(path)?);
                    path.pop();
                }
                Ok(JsonValue::Array(out))
            }
            other => Err(EvalError::export(
                path,
                format!("non-concrete value {}", other),
            )),
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Struct(
                map.iter()
                    .map(|(label, value)| StructField::new(label.clone(), Value::from(value)))
                    .collect(),
            ),
        }
    }
}

fn push_alternative(flat: &mut Vec<Alternative>, alt: Alternative) {
    match flat.iter_mut().find(|a| a.value == alt.value) {
        Some(existing) => existing.default |= alt.default,
        None => flat.push(alt),
    }
}

/// Unify every alternative with `other`, keeping defaults of both sides
fn distribute(alts: &[Alternative], other: &Value) -> Value {
    let other_alts = match other {
        Value::Disjunction(b) => b.clone(),
        v => vec![Alternative {
            value: v.clone(),
            default: false,
        }],
    };
    let a_marked = alts.iter().any(|a| a.default);
    let b_marked = other_alts.iter().any(|a| a.default);

    let mut out = Vec::new();
    for x in alts {
        for y in &other_alts {
            out.push(Alternative {
                value: x.value.unify(&y.value),
                default: (a_marked || b_marked)
                    && (!a_marked || x.default)
                    && (!b_marked || y.default),
            });
        }
    }
    Value::disjunction(out)
}

fn merge_structs(a: &[StructField], b: &[StructField]) -> Value {
    let mut fields = a.to_vec();
    for field in b {
        match fields.iter_mut().find(|f| f.label == field.label) {
            Some(existing) => {
                existing.value = existing.value.unify(&field.value);
                existing.optional &= field.optional;
            }
            None => fields.push(field.clone()),
        }
    }

    // A conflicting field makes the whole struct a conflict
    for field in &fields {
        if let Value::Bottom(conflict) = &field.value {
            return Value::Bottom(conflict.clone().within(field.label.clone()));
        }
    }
    Value::Struct(fields)
}

fn meet(a: Kind, b: Kind) -> Option<Kind> {
    match (a, b) {
        (a, b) if a == b => Some(a),
        (Kind::Number, Kind::Int) | (Kind::Int, Kind::Number) => Some(Kind::Int),
        (Kind::Number, Kind::Float) | (Kind::Float, Kind::Number) => Some(Kind::Float),
        _ => None,
    }
}

fn admits(kind: Kind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (Kind::String, Value::String(_))
            | (Kind::Int, Value::Int(_))
            | (Kind::Float, Value::Float(_))
            | (Kind::Number, Value::Int(_) | Value::Float(_))
            | (Kind::Bool, Value::Bool(_))
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Top => f.write_str("_"),
            Value::Bottom(_) => f.write_str("_|_"),
            Value::Incomplete(_) => f.write_str("_"),
            Value::Kind(kind) => write!(f, "{}", kind),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Struct(_) => f.write_str("{...}"),
            Value::List(_) => f.write_str("[...]"),
            Value::Disjunction(alts) => {
                let rendered: Vec<String> = alts
                    .iter()
                    .map(|a| {
                        if a.default {
                            format!("*{}", a.value)
                        } else {
                            a.value.to_string()
                        }
                    })
                    .collect();
                f.write_str(&rendered.join(" | "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn record(fields: &[(&str, Value)]) -> Value {
        Value::Struct(
            fields
                .iter()
                .map(|(l, v)| StructField::new(*l, v.clone()))
                .collect(),
        )
    }

    fn alt(value: Value, default: bool) -> Alternative {
        Alternative { value, default }
    }

    #[test]
    fn test_top_is_identity() {
        assert_eq!(Value::Top.unify(&Value::Int(1)), Value::Int(1));
        assert_eq!(s("a").unify(&Value::Top), s("a"));
    }

    #[test]
    fn test_kind_admits_matching_scalar() {
        assert_eq!(Value::Kind(Kind::Int).unify(&Value::Int(3)), Value::Int(3));
        assert_eq!(
            Value::Kind(Kind::Number).unify(&Value::Float(1.5)),
            Value::Float(1.5)
        );
        assert!(matches!(
            Value::Kind(Kind::String).unify(&Value::Int(3)),
            Value::Bottom(_)
        ));
    }

    #[test]
    fn test_kind_meet() {
        assert_eq!(
            Value::Kind(Kind::Number).unify(&Value::Kind(Kind::Int)),
            Value::Kind(Kind::Int)
        );
        assert!(matches!(
            Value::Kind(Kind::Bool).unify(&Value::Kind(Kind::String)),
            Value::Bottom(_)
        ));
    }

    #[test]
    fn test_scalar_conflict_message() {
        match Value::Int(1).unify(&Value::Int(2)) {
            Value::Bottom(conflict) => {
                assert_eq!(conflict.message, "conflicting values 1 and 2")
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_int_and_float_do_not_unify() {
        assert!(matches!(
            Value::Int(1).unify(&Value::Float(1.0)),
            Value::Bottom(_)
        ));
    }

    #[test]
    fn test_struct_merge_keeps_first_order() {
        let a = record(&[("name", s("web")), ("replicas", Value::Kind(Kind::Int))]);
        let b = record(&[("replicas", Value::Int(2)), ("image", s("nginx"))]);
        assert_eq!(
            a.unify(&b),
            record(&[
                ("name", s("web")),
                ("replicas", Value::Int(2)),
                ("image", s("nginx"))
            ])
        );
    }

    #[test]
    fn test_struct_conflict_carries_path() {
        let a = record(&[("spec", record(&[("replicas", Value::Int(1))]))]);
        let b = record(&[("spec", record(&[("replicas", Value::Int(2))]))]);
        match a.unify(&b) {
            Value::Bottom(conflict) => {
                assert_eq!(conflict.path, vec!["spec".to_string(), "replicas".to_string()])
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_list_length_mismatch() {
        let a = Value::List(vec![Value::Int(1)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(a.unify(&b), Value::Bottom(_)));
    }

    #[test]
    fn test_disjunction_eliminates_conflicts() {
        let d = Value::disjunction(vec![alt(s("a"), false), alt(s("b"), false)]);
        assert_eq!(d.unify(&s("b")), s("b"));
        assert!(matches!(d.unify(&s("c")), Value::Bottom(_)));
    }

    #[test]
    fn test_disjunction_eliminates_conflicting_structs() {
        let d = Value::disjunction(vec![
            alt(record(&[("kind", s("A"))]), true),
            alt(record(&[("kind", s("B"))]), false),
        ]);
        assert_eq!(d.unify(&record(&[("kind", s("B"))])), record(&[("kind", s("B"))]));
    }

    #[test]
    fn test_default_survives_unification_with_kind() {
        let d = Value::disjunction(vec![alt(Value::Int(80), true), alt(Value::Kind(Kind::Int), false)]);
        let unified = d.unify(&Value::Kind(Kind::Int));
        assert_eq!(unified.resolved(), &Value::Int(80));
        assert!(unified.is_concrete());
    }

    #[test]
    fn test_disjunction_without_default_is_incomplete() {
        let d = Value::disjunction(vec![alt(s("a"), false), alt(s("b"), false)]);
        assert!(d.default_value().is_none());
        assert!(!d.is_concrete());
    }

    #[test]
    fn test_all_defaults_means_no_default() {
        let d = Value::disjunction(vec![alt(s("a"), true), alt(s("b"), true)]);
        assert!(d.default_value().is_none());
    }

    #[test]
    fn test_single_alternative_collapses() {
        assert_eq!(Value::disjunction(vec![alt(s("a"), true)]), s("a"));
    }

    #[test]
    fn test_incomplete_path() {
        let v = record(&[(
            "output",
            record(&[("replicas", Value::Incomplete("undefined field: n".to_string()))]),
        )]);
        assert_eq!(
            v.first_incomplete(),
            Some((
                vec!["output".to_string(), "replicas".to_string()],
                "undefined field: n".to_string()
            ))
        );
    }

    #[test]
    fn test_optional_fields_are_not_required() {
        let v = Value::Struct(vec![StructField {
            label: "image".to_string(),
            value: Value::Kind(Kind::String),
            optional: true,
        }]);
        assert!(v.is_concrete());
        assert_eq!(v.to_json().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_to_json_applies_defaults() {
        let v = record(&[
            ("name", s("front")),
            (
                "type",
                Value::disjunction(vec![alt(s("ClusterIP"), true), alt(Value::Kind(Kind::String), false)]),
            ),
            ("ports", Value::List(vec![Value::Int(80), Value::Int(443)])),
        ]);
        assert_eq!(
            v.to_json().unwrap(),
            serde_json::json!({"name": "front", "type": "ClusterIP", "ports": [80, 443]})
        );
    }

    #[test]
    fn test_structure_merges_repeated_labels() {
        let v = Value::structure(vec![
            StructField::new("replicas", Value::Kind(Kind::Int)),
            StructField::new("replicas", Value::Int(2)),
        ]);
        assert_eq!(v, record(&[("replicas", Value::Int(2))]));
    }

    #[test]
    fn test_json_unifies_with_patch() {
        let base = Value::from(&serde_json::json!({"spec": {"replicas": 1}}));
        let patch = record(&[("spec", record(&[("paused", Value::Bool(true))]))]);
        assert_eq!(
            base.unify(&patch).to_json().unwrap(),
            serde_json::json!({"spec": {"replicas": 1, "paused": true}})
        );
    }

    #[test]
    fn test_to_json_rejects_kinds() {
        let v = record(&[("replicas", Value::Kind(Kind::Int))]);
        let err = v.to_json().unwrap_err();
        assert!(err.to_string().contains("replicas"));
    }
}
