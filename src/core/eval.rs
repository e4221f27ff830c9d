//! Expression evaluator.
//!
//! Walks an `hcl::Expression` AST and produces a [`Value`]. Namespace
//! lookups (`global.*`, `terramate.*`, `let.*`, `env.*`) are resolved
//! through an [`EvalContext`] built by the caller (the globals engine for
//! `global.*`, the code generator for `terramate.stack.*`, and so on) so
//! this module stays agnostic of where values come from.

use std::path::Path;

use hcl::expr::{BinaryOperator, Conditional, ForExpr, Operation, Traversal, TraversalOperator, UnaryOperator};
use hcl::Expression;
use rustc_hash::FxHashMap;

use crate::core::error::{Result, TmError};
use crate::core::functions;
use crate::core::hcl::SourceRange;
use crate::core::value::{Number, Value, ValueMap};

/// The namespaces visible while evaluating an expression, plus enough
/// context to build useful error messages.
#[derive(Clone, Default)]
pub struct EvalContext {
    pub namespaces: FxHashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: impl Into<String>, value: Value) -> Self {
        self.namespaces.insert(namespace.into(), value);
        self
    }

    pub fn set(&mut self, namespace: impl Into<String>, value: Value) {
        self.namespaces.insert(namespace.into(), value);
    }

    /// A child context with one extra `let`-style binding layered over the
    /// existing `let` namespace (used for `for`-comprehension loop vars and
    /// `lets` sub-blocks).
    fn child_with_var(&self, namespace: &str, name: &str, value: Value) -> EvalContext {
        let mut ctx = self.clone();
        let mut ns = match ctx.namespaces.get(namespace) {
            Some(Value::Map(m)) => m.clone(),
            _ => ValueMap::new(),
        };
        ns.insert(name, value);
        ctx.namespaces.insert(namespace.to_string(), Value::Map(ns));
        ctx
    }
}

fn range_of(file: &Path) -> Option<SourceRange> {
    Some(SourceRange::whole_file(file))
}

/// Evaluate `expr` in `ctx`. `file` is used only for error messages.
pub fn eval(expr: &Expression, ctx: &EvalContext, file: &Path) -> Result<Value> {
    match expr {
        Expression::Null => Ok(Value::Null),
        Expression::Bool(b) => Ok(Value::Bool(*b)),
        Expression::Number(n) => Ok(Value::Number(hcl_number_to_value(n))),
        Expression::String(s) => Ok(Value::String(s.clone())),
        Expression::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, ctx, file)?);
            }
            Ok(Value::List(out))
        }
        Expression::Object(obj) => {
            let mut out = ValueMap::new();
            for (k, v) in obj.iter() {
                let key = eval_object_key(k, ctx, file)?;
                let value = eval(v, ctx, file)?;
                out.insert(key, value);
            }
            Ok(Value::Map(out))
        }
        Expression::TemplateExpr(tpl) => eval_template(tpl, ctx, file),
        Expression::Variable(var) => resolve_variable(var.as_str(), ctx, file),
        Expression::Traversal(traversal) => eval_traversal(traversal, ctx, file),
        Expression::Parenthesis(inner) => eval(inner, ctx, file),
        Expression::Conditional(cond) => eval_conditional(cond, ctx, file),
        Expression::Operation(op) => eval_operation(op, ctx, file),
        Expression::ForExpr(for_expr) => eval_for(for_expr, ctx, file),
        Expression::FuncCall(call) => functions::call(call, ctx, file),
        _ => Err(TmError::EvalError {
            message: "unsupported expression form".to_string(),
            range: range_of(file),
        }),
    }
}

fn hcl_number_to_value(n: &hcl::Number) -> Number {
    if let Some(i) = n.as_i64() {
        Number::Int(i)
    } else {
        Number::Float(n.as_f64().unwrap_or(0.0))
    }
}

fn eval_object_key(key: &hcl::ObjectKey, ctx: &EvalContext, file: &Path) -> Result<String> {
    match key {
        hcl::ObjectKey::Identifier(id) => Ok(id.as_str().to_string()),
        hcl::ObjectKey::Expression(expr) => {
            let v = eval(expr, ctx, file)?;
            Ok(value_to_key(&v))
        }
        _ => Err(TmError::EvalError {
            message: "unsupported object key form".to_string(),
            range: range_of(file),
        }),
    }
}

fn value_to_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn eval_template(tpl: &hcl::template::Template, ctx: &EvalContext, file: &Path) -> Result<Value> {
    let mut out = String::new();
    for element in tpl.elements() {
        match element {
            hcl::template::Element::Literal(lit) => out.push_str(lit),
            hcl::template::Element::Interpolation(interp) => {
                let v = eval(&interp.expr, ctx, file)?;
                out.push_str(&display_for_interp(&v));
            }
            // %{if}/%{for} template directives are not evaluated; they are
            // rare in globals/generate content and fall back to their
            // literal source text so authors see what was skipped.
            _ => {}
        }
    }
    Ok(Value::String(out))
}

fn display_for_interp(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_variable(name: &str, ctx: &EvalContext, file: &Path) -> Result<Value> {
    match ctx.namespaces.get(name) {
        Some(v) => Ok(v.clone()),
        None => Err(TmError::UnknownReference {
            reference: name.to_string(),
            range: range_of(file),
        }),
    }
}

fn eval_traversal(traversal: &Traversal, ctx: &EvalContext, file: &Path) -> Result<Value> {
    let mut current = eval(&traversal.expr, ctx, file)?;
    let mut path = describe_base(&traversal.expr);
    for op in &traversal.operators {
        match op {
            TraversalOperator::GetAttr(ident) => {
                let key = Value::String(ident.as_str().to_string());
                path.push('.');
                path.push_str(ident.as_str());
                current = current.index(&key).ok_or_else(|| TmError::UnknownReference {
                    reference: path.clone(),
                    range: range_of(file),
                })?;
            }
            TraversalOperator::Index(expr) => {
                let idx = eval(expr, ctx, file)?;
                current = current.index(&idx).ok_or_else(|| TmError::UnknownReference {
                    reference: format!("{path}[...]"),
                    range: range_of(file),
                })?;
            }
            TraversalOperator::LegacyIndex(i) => {
                let idx = Value::int(*i as i64);
                current = current.index(&idx).ok_or_else(|| TmError::UnknownReference {
                    reference: format!("{path}[{i}]"),
                    range: range_of(file),
                })?;
            }
            _ => {
                return Err(TmError::EvalError {
                    message: "splat traversal operators are not supported".to_string(),
                    range: range_of(file),
                })
            }
        }
    }
    Ok(current)
}

fn describe_base(expr: &Expression) -> String {
    match expr {
        Expression::Variable(v) => v.as_str().to_string(),
        _ => "<expr>".to_string(),
    }
}

fn eval_conditional(cond: &Conditional, ctx: &EvalContext, file: &Path) -> Result<Value> {
    let c = eval(&cond.cond_expr, ctx, file)?;
    if c.is_truthy() {
        eval(&cond.true_expr, ctx, file)
    } else {
        eval(&cond.false_expr, ctx, file)
    }
}

fn eval_operation(op: &Operation, ctx: &EvalContext, file: &Path) -> Result<Value> {
    match op {
        Operation::Unary(unary) => {
            let v = eval(&unary.expr, ctx, file)?;
            match unary.operator {
                UnaryOperator::Neg => match v {
                    Value::Number(Number::Int(i)) => Ok(Value::Number(Number::Int(-i))),
                    Value::Number(Number::Float(f)) => Ok(Value::Number(Number::Float(-f))),
                    _ => Err(type_error("-", file)),
                },
                UnaryOperator::Not => Ok(Value::Bool(!v.is_truthy())),
            }
        }
        Operation::Binary(binary) => {
            let lhs = eval(&binary.lhs_expr, ctx, file)?;
            // Short-circuit boolean operators before evaluating rhs.
            match binary.operator {
                BinaryOperator::And if !lhs.is_truthy() => return Ok(Value::Bool(false)),
                BinaryOperator::Or if lhs.is_truthy() => return Ok(Value::Bool(true)),
                _ => {}
            }
            let rhs = eval(&binary.rhs_expr, ctx, file)?;
            eval_binary(binary.operator, lhs, rhs, file)
        }
    }
}

fn type_error(op: &str, file: &Path) -> TmError {
    TmError::EvalError {
        message: format!("operator {op} is not defined for this value type"),
        range: range_of(file),
    }
}

fn eval_binary(op: BinaryOperator, lhs: Value, rhs: Value, file: &Path) -> Result<Value> {
    use BinaryOperator::*;
    match op {
        And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
        Eq => Ok(Value::Bool(lhs == rhs)),
        NotEq => Ok(Value::Bool(lhs != rhs)),
        Plus | Minus | Mul | Div | Mod => {
            let (a, b) = match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                _ => return Err(type_error("arithmetic", file)),
            };
            arith(op, a, b, file)
        }
        Less | LessEq | Greater | GreaterEq => {
            let (a, b) = match (&lhs, &rhs) {
                (Value::Number(a), Value::Number(b)) => (a.as_f64(), b.as_f64()),
                _ => return Err(type_error("comparison", file)),
            };
            let result = match op {
                Less => a < b,
                LessEq => a <= b,
                Greater => a > b,
                GreaterEq => a >= b,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
    }
}

fn arith(op: BinaryOperator, a: Number, b: Number, file: &Path) -> Result<Value> {
    use BinaryOperator::*;
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let result = match op {
            Plus => x.checked_add(y),
            Minus => x.checked_sub(y),
            Mul => x.checked_mul(y),
            Div => {
                if y == 0 {
                    return Err(type_error("division by zero", file));
                }
                Some(x / y)
            }
            Mod => {
                if y == 0 {
                    return Err(type_error("modulo by zero", file));
                }
                Some(x % y)
            }
            _ => unreachable!(),
        };
        if let Some(r) = result {
            return Ok(Value::Number(Number::Int(r)));
        }
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        Plus => x + y,
        Minus => x - y,
        Mul => x * y,
        Div => x / y,
        Mod => x % y,
        _ => unreachable!(),
    };
    Ok(Value::Number(Number::Float(result)))
}

fn eval_for(for_expr: &ForExpr, ctx: &EvalContext, file: &Path) -> Result<Value> {
    let collection = eval(&for_expr.collection_expr, ctx, file)?;
    let entries: Vec<(Value, Value)> = match &collection {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::int(i as i64), v.clone()))
            .collect(),
        Value::Map(m) => m.iter().map(|(k, v)| (Value::String(k.clone()), v.clone())).collect(),
        _ => {
            return Err(TmError::EvalError {
                message: "for expression collection must be a list or object".to_string(),
                range: range_of(file),
            })
        }
    };

    let mut list_out = Vec::new();
    let mut map_out = ValueMap::new();

    for (key, value) in entries {
        let mut iter_ctx = ctx.clone();
        if let Some(key_var) = &for_expr.key_var {
            iter_ctx = iter_ctx.child_with_var("let", key_var.as_str(), key.clone());
        }
        iter_ctx = iter_ctx.child_with_var("let", for_expr.value_var.as_str(), value.clone());

        if let Some(cond) = &for_expr.cond_expr {
            if !eval(cond, &iter_ctx, file)?.is_truthy() {
                continue;
            }
        }

        if let Some(key_expr) = &for_expr.key_expr {
            let k = eval(key_expr, &iter_ctx, file)?;
            let v = eval(&for_expr.value_expr, &iter_ctx, file)?;
            map_out.insert(value_to_key(&k), v);
        } else {
            let v = eval(&for_expr.value_expr, &iter_ctx, file)?;
            list_out.push(v);
        }
    }

    if for_expr.key_expr.is_some() {
        Ok(Value::Map(map_out))
    } else {
        Ok(Value::List(list_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(src: &str) -> Expression {
        let body: hcl::Body = hcl::from_str(&format!("x = {src}")).unwrap();
        for s in body.into_iter() {
            if let hcl::Structure::Attribute(attr) = s {
                return attr.expr;
            }
        }
        panic!("no attribute parsed")
    }

    fn eval_str(src: &str, ctx: &EvalContext) -> Result<Value> {
        eval(&parse(src), ctx, &PathBuf::from("test.tm"))
    }

    #[test]
    fn arithmetic_stays_integer_when_possible() {
        let ctx = EvalContext::new();
        assert_eq!(eval_str("1 + 2", &ctx).unwrap(), Value::int(3));
    }

    #[test]
    fn comparisons_and_boolean_short_circuit() {
        let ctx = EvalContext::new();
        assert_eq!(eval_str("1 < 2", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(eval_str("false && (1/0 == 0)", &ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn traversal_resolves_through_namespaces() {
        let mut m = ValueMap::new();
        m.insert("a", Value::int(42));
        let ctx = EvalContext::new().with("global", Value::Map(m));
        assert_eq!(eval_str("global.a", &ctx).unwrap(), Value::int(42));
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let ctx = EvalContext::new();
        let err = eval_str("global.missing", &ctx).unwrap_err();
        assert_eq!(err.kind(), "UnknownReference");
    }

    #[test]
    fn for_expr_over_list_produces_list() {
        let ctx = EvalContext::new().with("global", Value::Map({
            let mut m = ValueMap::new();
            m.insert("xs", Value::List(vec![Value::int(1), Value::int(2)]));
            m
        }));
        let result = eval_str("[for x in global.xs: x * 2]", &ctx).unwrap();
        assert_eq!(result, Value::List(vec![Value::int(2), Value::int(4)]));
    }
}
