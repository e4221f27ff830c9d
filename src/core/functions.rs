//! Built-in `tm_*` functions.
//!
//! Every built-in is namespaced under `tm_` so user code can never shadow
//! it. `tm_try` is special: unlike every other function, it must not
//! evaluate its later arguments unless an earlier one fails, so it is
//! dispatched before argument evaluation rather than after.

use std::path::Path;

use hcl::expr::FuncCall;

use crate::core::error::{Result, TmError};
use crate::core::eval::{eval, EvalContext};
use crate::core::value::{from_json, to_json, Number, Value, ValueMap};

pub fn call(func: &FuncCall, ctx: &EvalContext, file: &Path) -> Result<Value> {
    let name = func.name.as_str();

    if name == "tm_try" {
        return eval_try(&func.args, ctx, file);
    }

    let mut args = Vec::with_capacity(func.args.len());
    for arg in &func.args {
        args.push(eval(arg, ctx, file)?);
    }
    dispatch(name, args, file)
}

fn eval_try(args: &[hcl::Expression], ctx: &EvalContext, file: &Path) -> Result<Value> {
    if args.is_empty() {
        return Err(TmError::EvalError {
            message: "tm_try requires at least one argument".to_string(),
            range: None,
        });
    }
    let (candidates, fallback) = args.split_at(args.len() - 1);
    for candidate in candidates {
        match eval(candidate, ctx, file) {
            Ok(v) => return Ok(v),
            Err(e) if e.is_try_catchable() => continue,
            Err(e) => return Err(e),
        }
    }
    eval(&fallback[0], ctx, file)
}

fn arity_err(name: &str) -> TmError {
    TmError::EvalError {
        message: format!("wrong number of arguments to {name}"),
        range: None,
    }
}

fn expect_string(v: &Value, name: &str) -> Result<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| TmError::EvalError {
            message: format!("{name} expects a string argument"),
            range: None,
        })
}

fn expect_number(v: &Value, name: &str) -> Result<f64> {
    match v {
        Value::Number(n) => Ok(n.as_f64()),
        _ => Err(TmError::EvalError {
            message: format!("{name} expects a number argument"),
            range: None,
        }),
    }
}

fn expect_list(v: &Value, name: &str) -> Result<Vec<Value>> {
    match v {
        Value::List(l) => Ok(l.clone()),
        _ => Err(TmError::EvalError {
            message: format!("{name} expects a list argument"),
            range: None,
        }),
    }
}

fn dispatch(name: &str, args: Vec<Value>, file: &Path) -> Result<Value> {
    let _ = file;
    match name {
        // --- string ---
        "tm_upper" => Ok(Value::String(expect_string(arg(&args, 0, name)?, name)?.to_uppercase())),
        "tm_lower" => Ok(Value::String(expect_string(arg(&args, 0, name)?, name)?.to_lowercase())),
        "tm_trim" => Ok(Value::String(expect_string(arg(&args, 0, name)?, name)?.trim().to_string())),
        "tm_trimspace" => Ok(Value::String(expect_string(arg(&args, 0, name)?, name)?.trim().to_string())),
        "tm_split" => {
            let sep = expect_string(arg(&args, 0, name)?, name)?;
            let s = expect_string(arg(&args, 1, name)?, name)?;
            Ok(Value::List(s.split(sep.as_str()).map(Value::string).collect()))
        }
        "tm_join" => {
            let sep = expect_string(arg(&args, 0, name)?, name)?;
            let items = expect_list(arg(&args, 1, name)?, name)?;
            let parts: Result<Vec<String>> = items.iter().map(|v| expect_string(v, name)).collect();
            Ok(Value::String(parts?.join(&sep)))
        }
        "tm_replace" => {
            let s = expect_string(arg(&args, 0, name)?, name)?;
            let from = expect_string(arg(&args, 1, name)?, name)?;
            let to = expect_string(arg(&args, 2, name)?, name)?;
            Ok(Value::String(s.replace(&from, &to)))
        }
        "tm_format" => {
            let fmt = expect_string(arg(&args, 0, name)?, name)?;
            let mut out = fmt.clone();
            for a in &args[1..] {
                out = out.replacen("%s", &a.to_string(), 1);
            }
            Ok(Value::String(out))
        }

        // --- numeric ---
        "tm_abs" => Ok(Value::Number(Number::Float(expect_number(arg(&args, 0, name)?, name)?.abs()))),
        "tm_ceil" => Ok(Value::int(expect_number(arg(&args, 0, name)?, name)?.ceil() as i64)),
        "tm_floor" => Ok(Value::int(expect_number(arg(&args, 0, name)?, name)?.floor() as i64)),
        "tm_round" => Ok(Value::int(expect_number(arg(&args, 0, name)?, name)?.round() as i64)),
        "tm_max" => numeric_fold(&args, name, f64::max),
        "tm_min" => numeric_fold(&args, name, f64::min),

        // --- collections ---
        "tm_length" => match arg(&args, 0, name)? {
            Value::List(l) => Ok(Value::int(l.len() as i64)),
            Value::Map(m) => Ok(Value::int(m.0.len() as i64)),
            Value::String(s) => Ok(Value::int(s.chars().count() as i64)),
            _ => Err(arity_err(name)),
        },
        "tm_contains" => {
            let items = expect_list(arg(&args, 0, name)?, name)?;
            let needle = arg(&args, 1, name)?;
            Ok(Value::Bool(items.iter().any(|v| v == needle)))
        }
        "tm_element" => {
            let items = expect_list(arg(&args, 0, name)?, name)?;
            let idx = expect_number(arg(&args, 1, name)?, name)? as i64;
            if items.is_empty() {
                return Err(arity_err(name));
            }
            let idx = idx.rem_euclid(items.len() as i64) as usize;
            Ok(items[idx].clone())
        }
        "tm_concat" => {
            let mut out = Vec::new();
            for a in &args {
                out.extend(expect_list(a, name)?);
            }
            Ok(Value::List(out))
        }
        "tm_flatten" => {
            let mut out = Vec::new();
            flatten_into(&expect_list(arg(&args, 0, name)?, name)?, &mut out);
            Ok(Value::List(out))
        }
        "tm_distinct" => {
            let items = expect_list(arg(&args, 0, name)?, name)?;
            let mut out: Vec<Value> = Vec::new();
            for item in items {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Ok(Value::List(out))
        }
        "tm_reverse" => {
            let mut items = expect_list(arg(&args, 0, name)?, name)?;
            items.reverse();
            Ok(Value::List(items))
        }
        "tm_sort" => {
            let mut items = expect_list(arg(&args, 0, name)?, name)?;
            items.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            Ok(Value::List(items))
        }
        "tm_slice" => {
            let items = expect_list(arg(&args, 0, name)?, name)?;
            let from = expect_number(arg(&args, 1, name)?, name)? as usize;
            let to = expect_number(arg(&args, 2, name)?, name)? as usize;
            if from > to || to > items.len() {
                return Err(arity_err(name));
            }
            Ok(Value::List(items[from..to].to_vec()))
        }
        "tm_keys" => match arg(&args, 0, name)? {
            Value::Map(m) => Ok(Value::List(m.iter().map(|(k, _)| Value::string(k.clone())).collect())),
            _ => Err(arity_err(name)),
        },
        "tm_values" => match arg(&args, 0, name)? {
            Value::Map(m) => Ok(Value::List(m.iter().map(|(_, v)| v.clone()).collect())),
            _ => Err(arity_err(name)),
        },
        "tm_lookup" => {
            let map = match arg(&args, 0, name)? {
                Value::Map(m) => m.clone(),
                _ => return Err(arity_err(name)),
            };
            let key = expect_string(arg(&args, 1, name)?, name)?;
            match map.get(&key) {
                Some(v) => Ok(v.clone()),
                None if args.len() > 2 => Ok(args[2].clone()),
                None => Err(TmError::EvalError {
                    message: format!("key {key:?} not found and no default supplied"),
                    range: None,
                }),
            }
        }
        "tm_merge" => {
            let mut out = Value::Map(ValueMap::new());
            for a in &args {
                out = out.merge_into(a.clone());
            }
            Ok(out)
        }

        // --- encoding ---
        "tm_jsonencode" => Ok(Value::String(serde_json::to_string(&to_json(arg(&args, 0, name)?)).unwrap_or_default())),
        "tm_jsondecode" => {
            let s = expect_string(arg(&args, 0, name)?, name)?;
            let v: serde_json::Value = serde_json::from_str(&s).map_err(|e| TmError::EvalError {
                message: format!("invalid JSON: {e}"),
                range: None,
            })?;
            Ok(from_json(v))
        }
        "tm_yamlencode" => {
            let json = to_json(arg(&args, 0, name)?);
            serde_yaml::to_string(&json)
                .map(Value::String)
                .map_err(|e| TmError::EvalError { message: e.to_string(), range: None })
        }
        "tm_yamldecode" => {
            let s = expect_string(arg(&args, 0, name)?, name)?;
            let v: serde_json::Value = serde_yaml::from_str(&s).map_err(|e| TmError::EvalError {
                message: format!("invalid YAML: {e}"),
                range: None,
            })?;
            Ok(from_json(v))
        }
        "tm_tomlencode" => {
            let json = to_json(arg(&args, 0, name)?);
            toml::to_string(&json)
                .map(Value::String)
                .map_err(|e| TmError::EvalError { message: e.to_string(), range: None })
        }
        "tm_tomldecode" => {
            let s = expect_string(arg(&args, 0, name)?, name)?;
            let v: serde_json::Value = toml::from_str(&s).map_err(|e| TmError::EvalError {
                message: format!("invalid TOML: {e}"),
                range: None,
            })?;
            Ok(from_json(v))
        }
        "tm_hclencode" => {
            let json = to_json(arg(&args, 0, name)?);
            hcl::to_string(&json)
                .map(Value::String)
                .map_err(|e| TmError::EvalError { message: e.to_string(), range: None })
        }
        "tm_hcldecode" => {
            let s = expect_string(arg(&args, 0, name)?, name)?;
            let v: serde_json::Value = hcl::from_str(&s).map_err(|e| TmError::EvalError {
                message: format!("invalid HCL: {e}"),
                range: None,
            })?;
            Ok(from_json(v))
        }

        // --- filesystem ---
        "tm_file" => {
            let path = expect_string(arg(&args, 0, name)?, name)?;
            std::fs::read_to_string(&path)
                .map(Value::String)
                .map_err(|e| TmError::EvalError { message: format!("tm_file: {e}"), range: None })
        }
        "tm_fileset" => {
            let base = expect_string(arg(&args, 0, name)?, name)?;
            let pattern = expect_string(arg(&args, 1, name)?, name)?;
            let glob_pattern = format!("{}/{}", base.trim_end_matches('/'), pattern);
            let matcher = globset::Glob::new(&glob_pattern)
                .map_err(|e| TmError::EvalError { message: e.to_string(), range: None })?
                .compile_matcher();
            let mut out = Vec::new();
            for entry in walkdir::WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    let path_str = entry.path().to_string_lossy().to_string();
                    if matcher.is_match(&path_str) {
                        out.push(Value::string(path_str));
                    }
                }
            }
            out.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            Ok(Value::List(out))
        }

        // --- network ---
        "tm_cidrcontains" => {
            let cidr = expect_string(arg(&args, 0, name)?, name)?;
            let ip = expect_string(arg(&args, 1, name)?, name)?;
            Ok(Value::Bool(cidr_contains(&cidr, &ip)))
        }

        // --- time ---
        "tm_timestamp" => Ok(Value::String(chrono::Utc::now().to_rfc3339())),
        "tm_formatdate" => {
            let fmt = expect_string(arg(&args, 0, name)?, name)?;
            let ts = expect_string(arg(&args, 1, name)?, name)?;
            let parsed = chrono::DateTime::parse_from_rfc3339(&ts).map_err(|e| TmError::EvalError {
                message: e.to_string(),
                range: None,
            })?;
            Ok(Value::String(parsed.format(&fmt).to_string()))
        }

        _ => Err(TmError::UnknownReference {
            reference: name.to_string(),
            range: None,
        }),
    }
}

fn arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a Value> {
    args.get(idx).ok_or_else(|| arity_err(name))
}

fn numeric_fold(args: &[Value], name: &str, f: fn(f64, f64) -> f64) -> Result<Value> {
    if args.is_empty() {
        return Err(arity_err(name));
    }
    let mut acc = expect_number(&args[0], name)?;
    for a in &args[1..] {
        acc = f(acc, expect_number(a, name)?);
    }
    Ok(Value::Number(Number::Float(acc)))
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::List(inner) => flatten_into(inner, out),
            other => out.push(other.clone()),
        }
    }
}

fn cidr_contains(cidr: &str, ip: &str) -> bool {
    let (base, prefix) = match cidr.split_once('/') {
        Some((b, p)) => (b, p.parse::<u32>().unwrap_or(32)),
        None => (cidr, 32),
    };
    let (Some(base), Some(ip)) = (parse_ipv4(base), parse_ipv4(ip)) else {
        return false;
    };
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    (base & mask) == (ip & mask)
}

fn parse_ipv4(s: &str) -> Option<u32> {
    let parts: Vec<u32> = s.split('.').map(|p| p.parse().ok()).collect::<Option<Vec<u32>>>()?;
    if parts.len() != 4 || parts.iter().any(|p| *p > 255) {
        return None;
    }
    Some((parts[0] << 24) | (parts[1] << 16) | (parts[2] << 8) | parts[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eval::EvalContext;
    use std::path::PathBuf;

    fn eval_expr(src: &str) -> Result<Value> {
        let body: hcl::Body = hcl::from_str(&format!("x = {src}")).unwrap();
        let expr = body
            .into_iter()
            .find_map(|s| match s {
                hcl::Structure::Attribute(a) => Some(a.expr),
                _ => None,
            })
            .unwrap();
        eval(&expr, &EvalContext::new(), &PathBuf::from("t.tm"))
    }

    #[test]
    fn tm_try_falls_back_on_unknown_reference() {
        let result = eval_expr(r#"tm_try(global.missing, "fallback")"#).unwrap();
        assert_eq!(result, Value::string("fallback"));
    }

    #[test]
    fn tm_upper_and_join() {
        assert_eq!(eval_expr(r#"tm_upper("abc")"#).unwrap(), Value::string("ABC"));
        assert_eq!(
            eval_expr(r#"tm_join("-", ["a", "b"])"#).unwrap(),
            Value::string("a-b")
        );
    }

    #[test]
    fn cidrcontains_matches_subnet() {
        assert!(cidr_contains("10.0.0.0/8", "10.1.2.3"));
        assert!(!cidr_contains("10.0.0.0/8", "11.1.2.3"));
    }

    #[test]
    fn tm_merge_overlays_right_to_left() {
        let result = eval_expr(r#"tm_merge({a = 1}, {a = 2, b = 3})"#).unwrap();
        let m = result.as_map().unwrap();
        assert_eq!(m.get("a"), Some(&Value::int(2)));
        assert_eq!(m.get("b"), Some(&Value::int(3)));
    }
}
