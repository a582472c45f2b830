use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Print,
    Len,
    Range,
    Random,
    RandInt,
    Str,
    Abs,
    Round,
    Min,
    Max,
}

impl BuiltinFunction {
    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Len => "len",
            Self::Range => "range",
            Self::Random => "random",
            Self::RandInt => "randint",
            Self::Str => "str",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Self::Print),
            "len" => Some(Self::Len),
            "range" => Some(Self::Range),
            "random" => Some(Self::Random),
            "randint" => Some(Self::RandInt),
            "str" => Some(Self::Str),
            "abs" => Some(Self::Abs),
            "round" => Some(Self::Round),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Whether the builtin leaves VM-visible state alone (safe for host expressions).
    pub fn is_pure(self) -> bool {
        !matches!(self, Self::Print)
    }
}

/// Runs a builtin; printed lines are appended to `output`. `range` refuses to
/// build lists longer than `max_items`.
pub(crate) fn call_builtin(
    builtin: BuiltinFunction,
    args: Vec<Value>,
    rng: &mut StdRng,
    output: &mut Vec<String>,
    max_items: usize,
) -> Result<Value, RuntimeErrorKind> {
    match builtin {
        BuiltinFunction::Print => {
            let rendered = args.iter().map(Value::to_output).collect::<Vec<_>>();
            output.push(rendered.join(" "));
            Ok(Value::Null)
        }
        BuiltinFunction::Len => {
            RuntimeError::expect_function_arity("len", 1, args.len())?;
            Ok(Value::Number(args[0].len()? as f64))
        }
        BuiltinFunction::Range => range(&args, max_items),
        BuiltinFunction::Random => {
            RuntimeError::expect_function_arity("random", 0, args.len())?;
            Ok(Value::Number(rng.r#gen::<f64>()))
        }
        BuiltinFunction::RandInt => {
            RuntimeError::expect_function_arity("randint", 2, args.len())?;
            let low = args[0].as_number("randint")?.floor() as i64;
            let high = args[1].as_number("randint")?.floor() as i64;
            if low > high {
                return Err(RuntimeErrorKind::InvalidArgumentType {
                    operation: "randint".to_string(),
                    expected: "low <= high".to_string(),
                    got: format!("{low} > {high}"),
                });
            }
            Ok(Value::Number(rng.gen_range(low..=high) as f64))
        }
        BuiltinFunction::Str => {
            RuntimeError::expect_function_arity("str", 1, args.len())?;
            Ok(Value::String(args[0].to_output()))
        }
        BuiltinFunction::Abs => {
            RuntimeError::expect_function_arity("abs", 1, args.len())?;
            Ok(Value::Number(args[0].as_number("abs")?.abs()))
        }
        BuiltinFunction::Round => match args.as_slice() {
            [value] => Ok(Value::Number(value.as_number("round")?.round())),
            [value, digits] => {
                let factor = 10f64.powi(digits.as_number("round")? as i32);
                Ok(Value::Number(
                    (value.as_number("round")? * factor).round() / factor,
                ))
            }
            _ => Err(RuntimeErrorKind::FunctionArityMismatch {
                name: "round".to_string(),
                expected: 1,
                found: args.len(),
            }),
        },
        BuiltinFunction::Min => extreme("min", args, std::cmp::Ordering::Less),
        BuiltinFunction::Max => extreme("max", args, std::cmp::Ordering::Greater),
    }
}

fn range(args: &[Value], max_items: usize) -> Result<Value, RuntimeErrorKind> {
    let (start, end, step) = match args {
        [end] => (0.0, end.as_number("range")?, 1.0),
        [start, end] => (start.as_number("range")?, end.as_number("range")?, 1.0),
        [start, end, step] => (
            start.as_number("range")?,
            end.as_number("range")?,
            step.as_number("range")?,
        ),
        _ => {
            return Err(RuntimeErrorKind::FunctionArityMismatch {
                name: "range".to_string(),
                expected: 1,
                found: args.len(),
            });
        }
    };
    if step == 0.0 {
        return Err(RuntimeErrorKind::ZeroRangeStep);
    }
    let count = ((end - start) / step).ceil();
    if !count.is_finite() || count > max_items as f64 {
        return Err(RuntimeErrorKind::RangeTooLarge { limit: max_items });
    }
    let mut values = Vec::with_capacity(count.max(0.0) as usize);
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        values.push(Value::Number(current));
        current += step;
    }
    Ok(Value::List(values))
}

/// `min`/`max` over either a single list argument or the arguments themselves.
fn extreme(
    name: &str,
    args: Vec<Value>,
    wanted: std::cmp::Ordering,
) -> Result<Value, RuntimeErrorKind> {
    let candidates = match args.as_slice() {
        [Value::List(values)] => values.clone(),
        _ => args,
    };
    let mut candidates = candidates.into_iter();
    let Some(mut best) = candidates.next() else {
        return Err(RuntimeErrorKind::InvalidArgumentType {
            operation: name.to_string(),
            expected: "at least one value".to_string(),
            got: "nothing".to_string(),
        });
    };
    for candidate in candidates {
        if candidate.compare(name, &best)? == wanted {
            best = candidate;
        }
    }
    Ok(best)
}
