//! Built-in projectors.
//!
//! Arguments are loosely typed: a null argument reads as the zero value of
//! the expected type (0, "", false, []), and a variadic parameter called
//! with exactly one array spreads that array.

use std::collections::BTreeSet;

use rand::RngCore;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use whistle_json::{hash_hex, merge, Value};

use crate::error::EngineError;
use crate::registry::BuiltinFn;

pub(crate) const BUILTINS: &[(&str, BuiltinFn)] = &[
    // Arithmetic
    ("$Sum", sum),
    ("$Sub", sub),
    ("$Mul", mul),
    ("$Div", div),
    ("$Mod", modulo),
    // Logic
    ("$And", and),
    ("$Or", or),
    ("$Not", not),
    // Comparison
    ("$Eq", eq),
    ("$NEq", neq),
    ("$Gt", gt),
    ("$GtEq", gt_eq),
    ("$Lt", lt),
    ("$LtEq", lt_eq),
    ("$IsNil", is_nil),
    ("$IsNotNil", is_not_nil),
    // Lists
    ("$ListOf", list_of),
    ("$ListCat", list_cat),
    ("$ListLen", list_len),
    ("$Flatten", flatten),
    ("$Unique", unique),
    ("$Range", range),
    // Strings
    ("$StrCat", str_cat),
    ("$StrJoin", str_join),
    ("$StrSplit", str_split),
    ("$SubStr", sub_str),
    ("$ToLower", to_lower),
    ("$ToUpper", to_upper),
    ("$Trim", trim),
    ("$ParseFloat", parse_float),
    ("$ParseInt", parse_int),
    ("$DebugString", debug_string),
    // Misc
    ("$Hash", hash),
    ("$Type", type_of),
    ("$MergeJSON", merge_json),
    ("$Void", void),
    ("$UUID", uuid),
    ("$CurrentTime", current_time),
];

// ──────────────────────────────────────────────
// Argument extraction
// ──────────────────────────────────────────────

fn arity(args: &[Value], expected: usize) -> Result<(), EngineError> {
    if args.len() != expected {
        return Err(EngineError::ArgCount {
            expected: expected.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

fn mismatch(position: usize, expected: &'static str, got: &Value) -> EngineError {
    EngineError::ArgType {
        position: position + 1,
        expected,
        got: got.type_name(),
    }
}

fn num_at(args: &[Value], i: usize) -> Result<f64, EngineError> {
    match &args[i] {
        Value::Null => Ok(0.0),
        Value::Num(n) => Ok(*n),
        other => Err(mismatch(i, "number", other)),
    }
}

fn str_at(args: &[Value], i: usize) -> Result<&str, EngineError> {
    match &args[i] {
        Value::Null => Ok(""),
        Value::Str(s) => Ok(s),
        other => Err(mismatch(i, "string", other)),
    }
}

fn bool_at(args: &[Value], i: usize) -> Result<bool, EngineError> {
    match &args[i] {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        other => Err(mismatch(i, "bool", other)),
    }
}

fn array_at(args: &[Value], i: usize) -> Result<&[Value], EngineError> {
    match &args[i] {
        Value::Null => Ok(&[]),
        Value::Array(items) => Ok(items),
        other => Err(mismatch(i, "array", other)),
    }
}

/// The values of a variadic parameter.
fn spread(args: &[Value]) -> &[Value] {
    match args {
        [Value::Array(items)] => items,
        _ => args,
    }
}

fn nums(args: &[Value]) -> Result<Vec<f64>, EngineError> {
    let values = spread(args);
    (0..values.len()).map(|i| num_at(values, i)).collect()
}

/// Strings print bare; everything else prints as JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

// ──────────────────────────────────────────────
// Arithmetic
// ──────────────────────────────────────────────

fn sum(args: &[Value]) -> Result<Value, EngineError> {
    Ok(Value::Num(nums(args)?.into_iter().sum()))
}

fn sub(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 2)?;
    Ok(Value::Num(num_at(args, 0)? - num_at(args, 1)?))
}

fn mul(args: &[Value]) -> Result<Value, EngineError> {
    let operands = nums(args)?;
    if operands.is_empty() {
        return Ok(Value::Num(0.0));
    }
    Ok(Value::Num(operands.into_iter().product()))
}

fn div(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 2)?;
    Ok(Value::Num(num_at(args, 0)? / num_at(args, 1)?))
}

fn modulo(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 2)?;
    let res = num_at(args, 0)? % num_at(args, 1)?;
    if res.is_nan() {
        return Err(EngineError::Builtin(
            "modulo operation returned NaN".to_string(),
        ));
    }
    Ok(Value::Num(res))
}

// ──────────────────────────────────────────────
// Logic and comparison
// ──────────────────────────────────────────────

/// Bools are themselves; anything else is truthy when not nil.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => !other.is_empty(),
    }
}

fn and(args: &[Value]) -> Result<Value, EngineError> {
    let values = spread(args);
    Ok(Value::Bool(!values.is_empty() && values.iter().all(truthy)))
}

fn or(args: &[Value]) -> Result<Value, EngineError> {
    Ok(Value::Bool(spread(args).iter().any(truthy)))
}

fn not(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Bool(!truthy(&args[0])))
}

fn eq(args: &[Value]) -> Result<Value, EngineError> {
    let values = spread(args);
    Ok(Value::Bool(values.windows(2).all(|w| w[0] == w[1])))
}

fn neq(args: &[Value]) -> Result<Value, EngineError> {
    let values = spread(args);
    let mut seen = BTreeSet::new();
    Ok(Value::Bool(
        values.iter().all(|v| seen.insert(whistle_json::hash(v, false))),
    ))
}

fn compare(args: &[Value], op: fn(f64, f64) -> bool) -> Result<Value, EngineError> {
    arity(args, 2)?;
    Ok(Value::Bool(op(num_at(args, 0)?, num_at(args, 1)?)))
}

fn gt(args: &[Value]) -> Result<Value, EngineError> {
    compare(args, |l, r| l > r)
}

fn gt_eq(args: &[Value]) -> Result<Value, EngineError> {
    compare(args, |l, r| l >= r)
}

fn lt(args: &[Value]) -> Result<Value, EngineError> {
    compare(args, |l, r| l < r)
}

fn lt_eq(args: &[Value]) -> Result<Value, EngineError> {
    compare(args, |l, r| l <= r)
}

fn is_nil(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Bool(args[0].is_empty()))
}

fn is_not_nil(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Bool(!args[0].is_empty()))
}

// ──────────────────────────────────────────────
// Lists
// ──────────────────────────────────────────────

fn list_of(args: &[Value]) -> Result<Value, EngineError> {
    Ok(Value::Array(spread(args).to_vec()))
}

fn list_cat(args: &[Value]) -> Result<Value, EngineError> {
    let mut out = Vec::new();
    for i in 0..args.len() {
        out.extend_from_slice(array_at(args, i)?);
    }
    Ok(Value::Array(out))
}

fn list_len(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Num(array_at(args, 0)?.len() as f64))
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten_into(inner, out),
            other => out.push(other.clone()),
        }
    }
}

fn flatten(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    let mut out = Vec::new();
    flatten_into(array_at(args, 0)?, &mut out);
    Ok(Value::Array(out))
}

fn unique(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    let mut seen = BTreeSet::new();
    let out = array_at(args, 0)?
        .iter()
        .filter(|v| seen.insert(whistle_json::hash(v, false)))
        .cloned()
        .collect();
    Ok(Value::Array(out))
}

/// Most elements `$Range` produces.
pub(crate) const MAX_RANGE_LEN: usize = 1_000_000;

/// Largest magnitude below which consecutive integers are exact.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// `start` inclusive to `end` exclusive, counting down when `end < start`.
fn range(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 2)?;
    let (start, end) = (num_at(args, 0)?, num_at(args, 1)?);
    if !start.is_finite() || !end.is_finite() {
        return Err(EngineError::Builtin(format!(
            "range bounds must be finite, got {} and {}",
            start, end
        )));
    }
    if start.abs() > MAX_EXACT_INTEGER || end.abs() > MAX_EXACT_INTEGER {
        return Err(EngineError::Builtin(format!(
            "range bounds {} and {} exceed {}",
            start, end, MAX_EXACT_INTEGER
        )));
    }
    let span = (end - start).abs().ceil();
    if span > MAX_RANGE_LEN as f64 {
        return Err(EngineError::Builtin(format!(
            "range from {} to {} has more than {} elements",
            start, end, MAX_RANGE_LEN
        )));
    }
    let step = if start <= end { 1.0 } else { -1.0 };
    let out = (0..span as usize)
        .map(|k| Value::Num(start + step * k as f64))
        .collect();
    Ok(Value::Array(out))
}

// ──────────────────────────────────────────────
// Strings
// ──────────────────────────────────────────────

fn join(sep: &str, values: &[Value]) -> String {
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(plain)
        .collect::<Vec<_>>()
        .join(sep)
}

fn str_cat(args: &[Value]) -> Result<Value, EngineError> {
    Ok(Value::Str(join("", spread(args))))
}

fn str_join(args: &[Value]) -> Result<Value, EngineError> {
    if args.is_empty() {
        return Err(EngineError::ArgCount {
            expected: "at least 1".to_string(),
            got: 0,
        });
    }
    let sep = str_at(args, 0)?;
    Ok(Value::Str(join(sep, spread(&args[1..]))))
}

/// Splits on `sep`, trimming pieces and dropping empty ones.
fn str_split(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 2)?;
    let (s, sep) = (str_at(args, 0)?, str_at(args, 1)?);
    let parts = s
        .split(sep)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Value::from)
        .collect();
    Ok(Value::Array(parts))
}

/// Characters `start` (inclusive) to `end` (exclusive); `end` is clamped
/// to the length of the string.
fn sub_str(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 3)?;
    let s = str_at(args, 0)?;
    let (start, end) = (num_at(args, 1)?, num_at(args, 2)?);
    let len = s.chars().count();
    if start < 0.0 || start as usize > len {
        return Err(EngineError::Builtin(format!(
            "start index {} is greater than string length {}",
            start, len
        )));
    }
    let start = start as usize;
    let end = (end.max(0.0) as usize).min(len);
    if end < start {
        return Err(EngineError::Builtin(format!(
            "end index {} is before start index {}",
            end, start
        )));
    }
    Ok(Value::Str(s.chars().skip(start).take(end - start).collect()))
}

fn to_lower(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Str(str_at(args, 0)?.to_lowercase()))
}

fn to_upper(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Str(str_at(args, 0)?.to_uppercase()))
}

fn trim(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Str(str_at(args, 0)?.trim().to_string()))
}

fn parse_float(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    let s = str_at(args, 0)?;
    s.parse::<f64>()
        .map(Value::Num)
        .map_err(|e| EngineError::Builtin(format!("parsing {:?}: {}", s, e)))
}

fn parse_int(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    let s = str_at(args, 0)?;
    s.parse::<i64>()
        .map(|i| Value::Num(i as f64))
        .map_err(|e| EngineError::Builtin(format!("parsing {:?}: {}", s, e)))
}

fn debug_string(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Str(args[0].to_string()))
}

// ──────────────────────────────────────────────
// Misc
// ──────────────────────────────────────────────

/// Hex digest; key order never matters, array order does.
fn hash(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::Str(hash_hex(&args[0], false)))
}

fn type_of(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 1)?;
    Ok(Value::from(args[0].type_name()))
}

/// Folds the array with merge; later primitives replace earlier ones.
fn merge_json(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 2)?;
    let overwrite_arrays = bool_at(args, 1)?;
    let mut out = Value::Null;
    for item in array_at(args, 0)? {
        merge(item.clone(), &mut out, false, overwrite_arrays)?;
    }
    Ok(out)
}

fn void(_args: &[Value]) -> Result<Value, EngineError> {
    Ok(Value::Null)
}

/// A random (version 4) UUID.
fn uuid(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 0)?;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(Value::Str(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )))
}

fn current_time(args: &[Value]) -> Result<Value, EngineError> {
    arity(args, 0)?;
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map(Value::Str)
        .map_err(|e| EngineError::Builtin(format!("formatting current time: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    fn call(f: BuiltinFn, args: serde_json::Value) -> Value {
        let serde_json::Value::Array(items) = args else {
            panic!("args must be an array");
        };
        let args: Vec<Value> = items.into_iter().map(Value::from).collect();
        f(&args).unwrap()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(call(sum, json!([1, 2, 3.5])), v(json!(6.5)));
        assert_eq!(call(sum, json!([[1, 2]])), v(json!(3)));
        assert_eq!(call(sum, json!([])), v(json!(0)));
        assert_eq!(call(sub, json!([5, null])), v(json!(5)));
        assert_eq!(call(mul, json!([])), v(json!(0)));
        assert_eq!(call(mul, json!([2, 3, 4])), v(json!(24)));
        assert_eq!(call(div, json!([1, 4])), v(json!(0.25)));
        assert_eq!(call(modulo, json!([7, 3])), v(json!(1)));
        assert!(modulo(&[Value::Num(1.0), Value::Num(0.0)]).is_err());
    }

    #[test]
    fn wrong_argument_type_is_reported_by_position() {
        assert_eq!(
            sub(&[Value::Num(1.0), Value::from("x")]),
            Err(EngineError::ArgType {
                position: 2,
                expected: "number",
                got: "string"
            })
        );
        assert!(matches!(sub(&[]), Err(EngineError::ArgCount { .. })));
    }

    #[test]
    fn logic() {
        assert_eq!(call(and, json!([])), v(json!(false)));
        assert_eq!(call(and, json!([true, "x", 1])), v(json!(true)));
        assert_eq!(call(and, json!([true, ""])), v(json!(false)));
        assert_eq!(call(or, json!([false, null, [1]])), v(json!(true)));
        assert_eq!(call(or, json!([])), v(json!(false)));
        assert_eq!(call(not, json!([true])), v(json!(false)));
        assert_eq!(call(not, json!([{}])), v(json!(true)));
        assert_eq!(call(not, json!(["a"])), v(json!(false)));
    }

    #[test]
    fn equality() {
        assert_eq!(call(eq, json!([1])), v(json!(true)));
        assert_eq!(call(eq, json!([{"a": 1}, {"a": 1}, {"a": 1}])), v(json!(true)));
        assert_eq!(call(eq, json!([1, 2])), v(json!(false)));
        assert_eq!(call(neq, json!([1, 2, 3])), v(json!(true)));
        assert_eq!(call(neq, json!([1, 2, 1])), v(json!(false)));
        assert_eq!(call(gt_eq, json!([2, 2])), v(json!(true)));
        assert_eq!(call(lt, json!([2, 2])), v(json!(false)));
        assert_eq!(call(is_nil, json!([[]])), v(json!(true)));
        assert_eq!(call(is_not_nil, json!([0])), v(json!(true)));
    }

    #[test]
    fn lists() {
        assert_eq!(call(list_of, json!([1, "a"])), v(json!([1, "a"])));
        assert_eq!(call(list_cat, json!([[1], null, [2, 3]])), v(json!([1, 2, 3])));
        assert_eq!(call(list_len, json!([[1, 2]])), v(json!(2)));
        assert_eq!(call(flatten, json!([[1, [2, [3]], 4]])), v(json!([1, 2, 3, 4])));
        assert_eq!(
            call(unique, json!([[{"a": 1}, 2, {"a": 1}, 2]])),
            v(json!([{"a": 1}, 2]))
        );
        assert_eq!(call(range, json!([2, 5])), v(json!([2, 3, 4])));
        assert_eq!(call(range, json!([5, 2])), v(json!([5, 4, 3])));
        assert_eq!(call(range, json!([-2, 1])), v(json!([-2, -1, 0])));
        assert_eq!(call(range, json!([0.5, 3])), v(json!([0.5, 1.5, 2.5])));
        assert_eq!(call(range, json!([3, 3])), v(json!([])));
    }

    #[test]
    fn range_rejects_unbounded_input() {
        let bounds = |start: f64, end: f64| range(&[Value::Num(start), Value::Num(end)]);
        assert!(matches!(
            bounds(0.0, f64::INFINITY),
            Err(EngineError::Builtin(_))
        ));
        assert!(matches!(
            bounds(f64::NEG_INFINITY, 0.0),
            Err(EngineError::Builtin(_))
        ));
        assert!(matches!(bounds(0.0, f64::NAN), Err(EngineError::Builtin(_))));
        assert!(matches!(
            bounds(MAX_EXACT_INTEGER, MAX_EXACT_INTEGER + 4.0),
            Err(EngineError::Builtin(_))
        ));
        assert!(matches!(
            bounds(0.0, MAX_RANGE_LEN as f64 + 1.0),
            Err(EngineError::Builtin(_))
        ));
        let Value::Array(items) = bounds(0.0, MAX_RANGE_LEN as f64).unwrap() else {
            panic!("expected an array");
        };
        assert_eq!(items.len(), MAX_RANGE_LEN);
    }

    #[test]
    fn strings() {
        assert_eq!(call(str_cat, json!(["a", 1, null, true])), v(json!("a1true")));
        assert_eq!(call(str_join, json!(["-", "a", "b", 2.5])), v(json!("a-b-2.5")));
        assert_eq!(call(str_split, json!([" a, ,b ,", ","])), v(json!(["a", "b"])));
        assert_eq!(call(sub_str, json!(["hello", 1, 3])), v(json!("el")));
        assert_eq!(call(sub_str, json!(["hello", 3, 99])), v(json!("lo")));
        assert!(sub_str(&[Value::from("hi"), Value::Num(3.0), Value::Num(4.0)]).is_err());
        assert_eq!(call(to_upper, json!(["aB"])), v(json!("AB")));
        assert_eq!(call(trim, json!(["  x "])), v(json!("x")));
        assert_eq!(call(parse_float, json!(["1.5"])), v(json!(1.5)));
        assert_eq!(call(parse_int, json!(["42"])), v(json!(42)));
        assert!(parse_int(&[Value::from("4.2")]).is_err());
        assert_eq!(call(debug_string, json!([{"a": [1]}])), v(json!("{\"a\":[1]}")));
    }

    #[test]
    fn misc() {
        assert_eq!(call(type_of, json!([null])), v(json!("null")));
        assert_eq!(call(type_of, json!([{}])), v(json!("container")));
        assert_eq!(call(void, json!([1, 2])), Value::Null);
        assert_eq!(
            call(merge_json, json!([[{"a": 1, "l": [1]}, {"a": 2, "l": [2]}], false])),
            v(json!({"a": 2, "l": [1, 2]}))
        );
        assert_eq!(
            call(merge_json, json!([[{"l": [1]}, {"l": [2]}], true])),
            v(json!({"l": [2]}))
        );
        assert_eq!(
            call(hash, json!([{"a": 1, "b": 2}])),
            call(hash, json!([{"b": 2, "a": 1}]))
        );
    }

    #[test]
    fn uuid_is_version_four() {
        let Value::Str(id) = call(uuid, json!([])) else {
            panic!("expected string");
        };
        assert_eq!(id.len(), 36);
        assert_eq!(&id[14..15], "4");
        assert!(matches!(&id[19..20], "8" | "9" | "a" | "b"));
        assert_ne!(call(uuid, json!([])), Value::Str(id));
    }

    #[test]
    fn current_time_is_rfc3339() {
        let Value::Str(now) = call(current_time, json!([])) else {
            panic!("expected string");
        };
        assert!(OffsetDateTime::parse(&now, &Rfc3339).is_ok());
    }
}
