//! `Math.*` and number methods

use super::{CallArgs, number};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::RuntimeValue;
use crate::value_utils::format_number;

/// `Math.<function>(...)`
pub fn call_namespace(function: &str, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    let name = args.function();
    let result = match function {
        "min" | "max" => {
            let mut acc = if function == "min" {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            };
            for i in 0..args.len() {
                let n = args.get_number(i, "value")?;
                acc = if function == "min" { acc.min(n) } else { acc.max(n) };
            }
            acc
        }
        "pow" => args.get_number(0, "base")?.powf(args.get_number(1, "exponent")?),
        _ => {
            let x = args.get_number(0, "x")?;
            match function {
                "abs" => x.abs(),
                "ceil" => x.ceil(),
                "floor" => x.floor(),
                "round" => js_round(x),
                "trunc" => x.trunc(),
                "sign" => {
                    if x == 0.0 {
                        0.0
                    } else {
                        x.signum()
                    }
                }
                "sqrt" => x.sqrt(),
                "cbrt" => x.cbrt(),
                "log" => x.ln(),
                "log10" => x.log10(),
                "log2" => x.log2(),
                "exp" => x.exp(),
                _ => return Err(ExpressionError::function_not_found(name)),
            }
        }
    };
    number(name, result)
}

/// Methods on a number receiver
pub fn call_method(n: f64, method: &str, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    match method {
        "toFixed" => {
            let digits = args.get_opt_int(0, "digits")?.unwrap_or(0);
            if !(0..=100).contains(&digits) {
                return Err(args.invalid("toFixed() digits argument must be between 0 and 100"));
            }
            Ok(RuntimeValue::string(format!("{n:.*}", digits as usize)))
        }
        "toString" => {
            let radix = args.get_opt_int(0, "radix")?.unwrap_or(10);
            if !(2..=36).contains(&radix) {
                return Err(args.invalid("toString() radix must be between 2 and 36"));
            }
            Ok(RuntimeValue::string(to_radix_string(n, radix as u32)))
        }
        "round" => {
            let decimals = args.get_opt_int(0, "decimals")?.unwrap_or(0).clamp(0, 15);
            let factor = 10f64.powi(decimals as i32);
            number(method, js_round(n * factor) / factor)
        }
        "floor" => number(method, n.floor()),
        "ceil" => number(method, n.ceil()),
        "abs" => number(method, n.abs()),
        "isEven" => Ok(RuntimeValue::bool(n.fract() == 0.0 && n % 2.0 == 0.0)),
        "isOdd" => Ok(RuntimeValue::bool(n.fract() == 0.0 && n % 2.0 != 0.0)),
        _ => Err(ExpressionError::function_not_found(format!("number.{method}"))),
    }
}

/// `Math.round`: halves round toward positive infinity
pub fn js_round(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// Integer part in `radix`; fractional values fall back to decimal
fn to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || n.fract() != 0.0 || !n.is_finite() {
        return format_number(n);
    }
    let negative = n < 0.0;
    let mut value = n.abs() as u128;
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % u128::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('?'));
        value /= u128::from(radix);
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}
