//! Evaluation of parsed fragments into a single value tree
//!
//! Every location in the result is identified by a path from the root. The
//! expressions contributing to a path (its conjuncts) are found by walking
//! the fragments structurally, following references where a struct is
//! reached through one. The value at a path is the unification of the values
//! of all its conjuncts.
//!
//! References resolve lexically: each conjunct remembers the chain of struct
//! literals it was written in, and a reference's first identifier must be
//! declared by one of them (or at the top level of some fragment).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::parser::ast::{Expr, Field, File, Identifier, Spanned, StringPart};

use super::error::{display_path, EvalError};
use super::instance::Instance;
use super::value::{Alternative, StructField, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Field(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(label) => f.write_str(label),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

type Path = Vec<Segment>;

fn labels(path: &[Segment]) -> Vec<String> {
    path.iter().map(Segment::to_string).collect()
}

/// A struct literal enclosing an expression, and the path it is unified at
#[derive(Debug)]
struct Scope<'a> {
    fields: &'a [Spanned<Field>],
    path: Path,
    parent: Env<'a>,
}

/// Enclosing struct literals, innermost first; `None` is the top level
type Env<'a> = Option<Rc<Scope<'a>>>;

fn declares(fields: &[Spanned<Field>], label: &str) -> bool {
    fields.iter().any(|f| f.node.label.node.as_str() == label)
}

/// An expression contributing to a path, with its lexical scope
#[derive(Debug, Clone)]
struct Conjunct<'a> {
    expr: &'a Spanned<Expr>,
    env: Env<'a>,
}

/// Unify the given fragments and evaluate the result
pub fn evaluate<'a>(files: impl IntoIterator<Item = &'a File>) -> Result<Instance, EvalError> {
    let evaluator = Evaluator::new(files);
    let root = evaluator.eval_path(&[])?;

    if let Value::Bottom(conflict) = &root {
        return Err(EvalError::Conflict {
            path: display_path(&conflict.path),
            message: conflict.message.clone(),
        });
    }
    Ok(Instance::new(root))
}

struct Evaluator<'a> {
    files: Vec<&'a File>,
    memo: RefCell<HashMap<Path, Value>>,
    /// Paths currently being evaluated
    active: RefCell<HashSet<Path>>,
    /// References currently being selected through, keyed by expression and
    /// the path being selected
    selecting: RefCell<HashSet<(usize, Path)>>,
}

impl<'a> Evaluator<'a> {
    fn new(files: impl IntoIterator<Item = &'a File>) -> Self {
        Self {
            files: files.into_iter().collect(),
            memo: RefCell::new(HashMap::new()),
            active: RefCell::new(HashSet::new()),
            selecting: RefCell::new(HashSet::new()),
        }
    }

    /// Expressions contributing to `path`
    fn conjuncts(&self, path: &[Segment]) -> Vec<Conjunct<'a>> {
        let Some((last, parent)) = path.split_last() else {
            return self
                .files
                .iter()
                .map(|&file| Conjunct {
                    expr: &file.body,
                    env: None,
                })
                .collect();
        };

        let mut out = Vec::new();
        for conjunct in self.conjuncts(parent) {
            self.select(conjunct.expr, &conjunct.env, parent, last, &mut out);
        }
        out
    }

    /// Conjuncts of `location.seg` contributed by `expr`, which is itself a
    /// conjunct of `location`
    fn select(
        &self,
        expr: &'a Spanned<Expr>,
        env: &Env<'a>,
        location: &[Segment],
        seg: &Segment,
        out: &mut Vec<Conjunct<'a>>,
    ) {
        match (&expr.node, seg) {
            (Expr::Struct(fields), Segment::Field(label)) => {
                if !declares(fields, label) {
                    return;
                }
                let scope = Rc::new(Scope {
                    fields,
                    path: location.to_vec(),
                    parent: env.clone(),
                });
                for field in fields.iter().filter(|f| f.node.label.node.as_str() == label) {
                    out.push(Conjunct {
                        expr: &field.node.value,
                        env: Some(Rc::clone(&scope)),
                    });
                }
            }
            (Expr::List(items), Segment::Index(i)) => {
                if let Some(item) = items.get(*i) {
                    out.push(Conjunct {
                        expr: item,
                        env: env.clone(),
                    });
                }
            }
            (Expr::Unify(parts), _) => {
                for part in parts {
                    self.select(part, env, location, seg, out);
                }
            }
            (Expr::Reference(segments), _) => {
                let mut selected = location.to_vec();
                selected.push(seg.clone());
                let key = (expr as *const Spanned<Expr> as usize, selected);

                if !self.selecting.borrow_mut().insert(key.clone()) {
                    return;
                }
                if let Some(mut target) = self.resolve(segments, env) {
                    target.push(seg.clone());
                    out.extend(self.conjuncts(&target));
                }
                self.selecting.borrow_mut().remove(&key);
            }
            _ => {}
        }
    }

    /// Find the path a reference points to
    ///
    /// The first identifier is looked up in the enclosing struct literals,
    /// innermost first, then among the top-level fields of all fragments.
    /// Fields that reach a scope through a reference are not visible.
    fn resolve(&self, segments: &[Spanned<Identifier>], env: &Env<'a>) -> Option<Path> {
        let (first, rest) = segments.split_first()?;
        let head = first.node.as_str();

        let mut target = None;
        let mut scope = env.as_deref();
        while let Some(s) = scope {
            if declares(s.fields, head) {
                target = Some(s.path.clone());
                break;
            }
            scope = s.parent.as_deref();
        }
        let mut target = match target {
            Some(path) => path,
            None if self.files.iter().any(|f| declares(f.fields(), head)) => Vec::new(),
            None => return None,
        };

        target.push(Segment::Field(head.to_string()));
        target.extend(
            rest.iter()
                .map(|s| Segment::Field(s.node.as_str().to_string())),
        );
        Some(target)
    }

    fn eval_path(&self, path: &[Segment]) -> Result<Value, EvalError> {
        if let Some(value) = self.memo.borrow().get(path) {
            return Ok(value.clone());
        }
        if !self.active.borrow_mut().insert(path.to_vec()) {
            return Err(EvalError::Cycle {
                path: display_path(&labels(path)),
            });
        }

        let result = self.unify_conjuncts(path);
        self.active.borrow_mut().remove(path);
        let value = result?;

        trace!(path = %display_path(&labels(path)), value = %value, "evaluated");
        self.memo.borrow_mut().insert(path.to_vec(), value.clone());
        Ok(value)
    }

    fn unify_conjuncts(&self, path: &[Segment]) -> Result<Value, EvalError> {
        let mut value = Value::Top;
        for conjunct in self.conjuncts(path) {
            let contribution = self.eval_conjunct(conjunct.expr, &conjunct.env, path)?;
            value = value.unify(&contribution);
        }
        Ok(value)
    }

    /// Value of one conjunct of `path`
    ///
    /// Struct and list literals take their children from the paths below
    /// `path`, so every declaration of a child is taken into account.
    fn eval_conjunct(
        &self,
        expr: &'a Spanned<Expr>,
        env: &Env<'a>,
        path: &[Segment],
    ) -> Result<Value, EvalError> {
        match &expr.node {
            Expr::Struct(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    let label = field.node.label.node.as_str();
                    let mut child = path.to_vec();
                    child.push(Segment::Field(label.to_string()));
                    out.push(StructField {
                        label: label.to_string(),
                        value: self.eval_path(&child)?,
                        optional: field.node.optional,
                    });
                }
                Ok(Value::structure(out))
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for i in 0..items.len() {
                    let mut child = path.to_vec();
                    child.push(Segment::Index(i));
                    out.push(self.eval_path(&child)?);
                }
                Ok(Value::list(out))
            }
            Expr::Unify(parts) => {
                let mut value = Value::Top;
                for part in parts {
                    value = value.unify(&self.eval_conjunct(part, env, path)?);
                }
                Ok(value)
            }
            _ => self.eval_expr(expr, env),
        }
    }

    /// Evaluate an expression by value, outside of any path
    fn eval_expr(&self, expr: &'a Spanned<Expr>, env: &Env<'a>) -> Result<Value, EvalError> {
        Ok(match &expr.node {
            Expr::Top => Value::Top,
            Expr::Kind(kind) => Value::Kind(*kind),
            Expr::Null => Value::Null,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::String(s) => Value::String(s.clone()),
            Expr::Interpolation(parts) => self.interpolate(parts, env)?,
            Expr::Reference(segments) => self.reference(segments, env)?,
            Expr::Struct(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    out.push(StructField {
                        label: field.node.label.node.as_str().to_string(),
                        value: self.eval_expr(&field.node.value, env)?,
                        optional: field.node.optional,
                    });
                }
                Value::structure(out)
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, env)?);
                }
                Value::list(out)
            }
            Expr::Unify(parts) => {
                let mut value = Value::Top;
                for part in parts {
                    value = value.unify(&self.eval_expr(part, env)?);
                }
                value
            }
            Expr::Disjunction(alternatives) => {
                let mut out = Vec::with_capacity(alternatives.len());
                for alt in alternatives {
                    out.push(Alternative {
                        value: self.eval_expr(&alt.expr, env)?,
                        default: alt.default,
                    });
                }
                Value::disjunction(out)
            }
        })
    }

    fn reference(
        &self,
        segments: &[Spanned<Identifier>],
        env: &Env<'a>,
    ) -> Result<Value, EvalError> {
        match self.resolve(segments, env) {
            Some(target) => self.lookup(&target),
            None => Ok(Value::Incomplete(format!(
                "reference \"{}\" not found",
                Expr::reference_name(segments)
            ))),
        }
    }

    /// Value at `target`, selecting from the parent's value when no
    /// expression declares it directly
    fn lookup(&self, target: &[Segment]) -> Result<Value, EvalError> {
        let Some((last, parent)) = target.split_last() else {
            return self.eval_path(target);
        };
        if !self.conjuncts(target).is_empty() {
            return self.eval_path(target);
        }
        if self.active.borrow().contains(parent) {
            return Ok(Value::Incomplete(format!("undefined field: {}", last)));
        }

        let parent_value = self.lookup(parent)?;
        if matches!(parent_value, Value::Bottom(_) | Value::Incomplete(_)) {
            return Ok(parent_value);
        }
        let selected = match last {
            Segment::Field(label) => parent_value.field(label),
            Segment::Index(i) => parent_value.index(*i),
        };
        Ok(selected
            .cloned()
            .unwrap_or_else(|| Value::Incomplete(format!("undefined field: {}", last))))
    }

    fn interpolate(&self, parts: &[StringPart], env: &Env<'a>) -> Result<Value, EvalError> {
        let mut out = String::new();
        for part in parts {
            let segments = match part {
                StringPart::Literal(s) => {
                    out.push_str(s);
                    continue;
                }
                StringPart::Reference(segments) => segments,
            };
            let value = self.reference(segments, env)?;
            match value.resolved() {
                Value::String(s) => out.push_str(s),
                Value::Int(i) => out.push_str(&i.to_string()),
                Value::Float(f) => out.push_str(&f.to_string()),
                Value::Bool(b) => out.push_str(&b.to_string()),
                Value::Bottom(conflict) => return Ok(Value::Bottom(conflict.clone())),
                Value::Incomplete(reason) => return Ok(Value::Incomplete(reason.clone())),
                other => {
                    return Ok(Value::Incomplete(format!(
                        "cannot interpolate non-concrete value {}",
                        other
                    )))
                }
            }
        }
        Ok(Value::String(out))
    }
}
