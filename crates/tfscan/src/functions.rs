//! builtin functions available to every expression
//!
//! A subset of the terraform standard library. Functions only transform values, they never
//! touch the file system or network.
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::{Number, Value};

type FuncResult = Result<Value, String>;

/// Declare all builtin functions on `context`
pub fn declare(context: &mut hcl::eval::Context) {
    let fixed = |arity: usize, func: hcl::eval::Func| {
        (0..arity)
            .fold(FuncDef::builder(), |builder, _| builder.param(ParamType::Any))
            .build(func)
    };
    let variadic = |arity: usize, func: hcl::eval::Func| {
        (0..arity)
            .fold(FuncDef::builder(), |builder, _| builder.param(ParamType::Any))
            .variadic_param(ParamType::Any)
            .build(func)
    };

    context.declare_func("length", fixed(1, length));
    context.declare_func("lower", fixed(1, lower));
    context.declare_func("upper", fixed(1, upper));
    context.declare_func("trimspace", fixed(1, trimspace));
    context.declare_func("join", fixed(2, join));
    context.declare_func("split", fixed(2, split));
    context.declare_func("replace", fixed(3, replace));
    context.declare_func("merge", variadic(0, merge));
    context.declare_func("concat", variadic(0, concat));
    context.declare_func("coalesce", variadic(0, coalesce));
    context.declare_func("lookup", variadic(2, lookup));
    context.declare_func("keys", fixed(1, keys));
    context.declare_func("values", fixed(1, values));
    context.declare_func("contains", fixed(2, contains));
    context.declare_func("element", fixed(2, element));
    context.declare_func("flatten", fixed(1, flatten));
    context.declare_func("distinct", fixed(1, distinct));
    context.declare_func("toset", fixed(1, distinct));
    context.declare_func("tolist", fixed(1, tolist));
    context.declare_func("tomap", fixed(1, tomap));
    context.declare_func("tostring", fixed(1, tostring));
    context.declare_func("tonumber", fixed(1, tonumber));
    context.declare_func("tobool", fixed(1, tobool));
    context.declare_func("jsonencode", fixed(1, jsonencode));
    context.declare_func("min", variadic(0, min));
    context.declare_func("max", variadic(0, max));
    context.declare_func("abs", fixed(1, abs));
    context.declare_func("range", variadic(1, range));
}

fn string_arg<'a>(args: &'a FuncArgs, index: usize) -> Result<&'a str, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        other => Err(format!("argument {index}: expected string, got {other:?}")),
    }
}

fn list_arg(args: &FuncArgs, index: usize) -> Result<&Vec<Value>, String> {
    match args.get(index) {
        Some(Value::Array(list)) => Ok(list),
        other => Err(format!("argument {index}: expected list, got {other:?}")),
    }
}

fn number_arg(args: &FuncArgs, index: usize) -> Result<f64, String> {
    match args.get(index) {
        Some(Value::Number(num)) => num
            .as_f64()
            .ok_or_else(|| format!("argument {index}: number out of range")),
        other => Err(format!("argument {index}: expected number, got {other:?}")),
    }
}

fn number(value: f64) -> FuncResult {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(Value::Number(Number::from(value as i64)));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| format!("{value} is not a valid number"))
}

fn length(args: FuncArgs) -> FuncResult {
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(list) => list.len(),
        Value::Object(object) => object.len(),
        other => return Err(format!("cannot take length of {other:?}")),
    };
    Ok(Value::Number(Number::from(len as u64)))
}

fn lower(args: FuncArgs) -> FuncResult {
    Ok(Value::String(string_arg(&args, 0)?.to_lowercase()))
}

fn upper(args: FuncArgs) -> FuncResult {
    Ok(Value::String(string_arg(&args, 0)?.to_uppercase()))
}

fn trimspace(args: FuncArgs) -> FuncResult {
    Ok(Value::String(string_arg(&args, 0)?.trim().to_string()))
}

fn join(args: FuncArgs) -> FuncResult {
    let separator = string_arg(&args, 0)?;
    let parts = list_arg(&args, 1)?
        .iter()
        .map(|value| match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(num) => Ok(num.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("cannot join {other:?}")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(separator)))
}

fn split(args: FuncArgs) -> FuncResult {
    let separator = string_arg(&args, 0)?;
    let input = string_arg(&args, 1)?;
    Ok(Value::Array(
        input
            .split(separator)
            .map(|part| Value::String(part.to_string()))
            .collect(),
    ))
}

fn replace(args: FuncArgs) -> FuncResult {
    let input = string_arg(&args, 0)?;
    let search = string_arg(&args, 1)?;
    let replacement = string_arg(&args, 2)?;
    Ok(Value::String(input.replace(search, replacement)))
}

fn merge(args: FuncArgs) -> FuncResult {
    let mut merged = hcl::value::Map::new();
    for arg in args.iter() {
        match arg {
            Value::Object(object) => merged.extend(object.clone()),
            Value::Null => {}
            other => return Err(format!("cannot merge {other:?}")),
        }
    }
    Ok(Value::Object(merged))
}

fn concat(args: FuncArgs) -> FuncResult {
    let mut concatenated = vec![];
    for arg in args.iter() {
        match arg {
            Value::Array(list) => concatenated.extend(list.iter().cloned()),
            other => return Err(format!("cannot concat {other:?}")),
        }
    }
    Ok(Value::Array(concatenated))
}

fn coalesce(args: FuncArgs) -> FuncResult {
    args.iter()
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .cloned()
        .ok_or_else(|| "no non-null arguments".to_string())
}

fn lookup(args: FuncArgs) -> FuncResult {
    let Value::Object(object) = &args[0] else {
        return Err(format!("cannot lookup in {:?}", args[0]));
    };
    let key = string_arg(&args, 1)?;

    object
        .get(key)
        .or_else(|| args.get(2))
        .cloned()
        .ok_or_else(|| format!("key {key:?} not found"))
}

fn keys(args: FuncArgs) -> FuncResult {
    let Value::Object(object) = &args[0] else {
        return Err(format!("cannot take keys of {:?}", args[0]));
    };
    Ok(Value::Array(
        object.keys().map(|key| Value::String(key.clone())).collect(),
    ))
}

fn values(args: FuncArgs) -> FuncResult {
    let Value::Object(object) = &args[0] else {
        return Err(format!("cannot take values of {:?}", args[0]));
    };
    Ok(Value::Array(object.values().cloned().collect()))
}

fn contains(args: FuncArgs) -> FuncResult {
    Ok(Value::Bool(list_arg(&args, 0)?.contains(&args[1])))
}

fn element(args: FuncArgs) -> FuncResult {
    let list = list_arg(&args, 0)?;
    if list.is_empty() {
        return Err("cannot use element on an empty list".to_string());
    }
    let index = number_arg(&args, 1)?.max(0.0) as usize;
    Ok(list[index % list.len()].clone())
}

fn flatten(args: FuncArgs) -> FuncResult {
    fn flatten_into(list: &[Value], out: &mut Vec<Value>) {
        for value in list {
            match value {
                Value::Array(inner) => flatten_into(inner, out),
                other => out.push(other.clone()),
            }
        }
    }

    let mut flat = vec![];
    flatten_into(list_arg(&args, 0)?, &mut flat);
    Ok(Value::Array(flat))
}

fn distinct(args: FuncArgs) -> FuncResult {
    let mut unique: Vec<Value> = vec![];
    for value in list_arg(&args, 0)? {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    Ok(Value::Array(unique))
}

fn tolist(args: FuncArgs) -> FuncResult {
    list_arg(&args, 0).map(|list| Value::Array(list.clone()))
}

fn tomap(args: FuncArgs) -> FuncResult {
    match &args[0] {
        Value::Object(object) => Ok(Value::Object(object.clone())),
        other => Err(format!("cannot convert {other:?} to map")),
    }
}

fn tostring(args: FuncArgs) -> FuncResult {
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Number(num) => Ok(Value::String(num.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Null => Ok(Value::Null),
        other => Err(format!("cannot convert {other:?} to string")),
    }
}

fn tonumber(args: FuncArgs) -> FuncResult {
    match &args[0] {
        Value::Number(num) => Ok(Value::Number(num.clone())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|err| err.to_string())
            .and_then(number),
        Value::Null => Ok(Value::Null),
        other => Err(format!("cannot convert {other:?} to number")),
    }
}

fn tobool(args: FuncArgs) -> FuncResult {
    match &args[0] {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) if s == "true" => Ok(Value::Bool(true)),
        Value::String(s) if s == "false" => Ok(Value::Bool(false)),
        Value::Null => Ok(Value::Null),
        other => Err(format!("cannot convert {other:?} to bool")),
    }
}

fn jsonencode(args: FuncArgs) -> FuncResult {
    serde_json::to_string(&args[0])
        .map(Value::String)
        .map_err(|err| err.to_string())
}

fn numbers(args: &FuncArgs) -> Result<Vec<f64>, String> {
    (0..args.len()).map(|index| number_arg(args, index)).collect()
}

fn min(args: FuncArgs) -> FuncResult {
    numbers(&args)?
        .into_iter()
        .reduce(f64::min)
        .ok_or_else(|| "min needs at least one argument".to_string())
        .and_then(number)
}

fn max(args: FuncArgs) -> FuncResult {
    numbers(&args)?
        .into_iter()
        .reduce(f64::max)
        .ok_or_else(|| "max needs at least one argument".to_string())
        .and_then(number)
}

fn abs(args: FuncArgs) -> FuncResult {
    number(number_arg(&args, 0)?.abs())
}

fn range(args: FuncArgs) -> FuncResult {
    let bounds = numbers(&args)?;
    let (start, end, step) = match bounds.as_slice() {
        [end] => (0.0, *end, 1.0),
        [start, end] => (*start, *end, if start <= end { 1.0 } else { -1.0 }),
        [start, end, step] => (*start, *end, *step),
        _ => return Err("range takes one to three arguments".to_string()),
    };
    if step == 0.0 {
        return Err("range step must not be zero".to_string());
    }

    let mut values = vec![];
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        values.push(number(current)?);
        current += step;
    }
    Ok(Value::Array(values))
}
