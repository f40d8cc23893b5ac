//! Native procedures bound in the global environment.
//!
//! ```lisp
//! (+ 1 2 3)       ; 6
//! (+ 1 true 2)    ; 4, booleans count as 0/1
//! (- 10 3 2)      ; 5
//! (/ 20 2 2)      ; 5
//! ```
//!
//! ## Coercion
//!
//! Arithmetic folds left to right over the arguments that coerce to an
//! integer (see [`Value::to_number`]). Anything else is skipped without
//! error. `+` and `*` start from their identity; `-` and `/` start from
//! the first coercible argument and fold the rest against it, yielding 0
//! when no argument is coercible.
//!
//! Overflow and division by zero are reported as [`Error::EvalError`].
//!
//! ## Adding New Operations
//!
//! 1. Implement the function with the [`NativeFn`] signature
//! 2. Add it to `BUILTIN_OPS` under the symbol it is bound to

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::{Context, NativeFn};

/// Definition of a native procedure
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// Symbol the procedure is bound to in the global environment
    pub id: &'static str,
    pub func: NativeFn,
}

fn coercible(args: &[Value]) -> impl Iterator<Item = NumberType> + '_ {
    args.iter().filter_map(Value::to_number)
}

fn overflow(op: &str) -> Error {
    Error::EvalError(format!("integer overflow in {op}"))
}

fn builtin_add(_ctx: &mut Context, args: &[Value]) -> Result<Value, Error> {
    let mut sum = 0 as NumberType;
    for n in coercible(args) {
        sum = sum.checked_add(n).ok_or_else(|| overflow("addition"))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_mul(_ctx: &mut Context, args: &[Value]) -> Result<Value, Error> {
    let mut product = 1 as NumberType;
    for n in coercible(args) {
        product = product
            .checked_mul(n)
            .ok_or_else(|| overflow("multiplication"))?;
    }
    Ok(Value::Number(product))
}

fn builtin_sub(_ctx: &mut Context, args: &[Value]) -> Result<Value, Error> {
    let mut nums = coercible(args);
    let Some(mut result) = nums.next() else {
        return Ok(Value::Number(0));
    };
    for n in nums {
        result = result
            .checked_sub(n)
            .ok_or_else(|| overflow("subtraction"))?;
    }
    Ok(Value::Number(result))
}

fn builtin_div(_ctx: &mut Context, args: &[Value]) -> Result<Value, Error> {
    let mut nums = coercible(args);
    let Some(mut result) = nums.next() else {
        return Ok(Value::Number(0));
    };
    for n in nums {
        if n == 0 {
            return Err(Error::EvalError("division by zero".into()));
        }
        // i64::MIN / -1 is the only remaining failure
        result = result.checked_div(n).ok_or_else(|| overflow("division"))?;
    }
    Ok(Value::Number(result))
}

static BUILTIN_OPS: [BuiltinOp; 4] = [
    BuiltinOp {
        id: "+",
        func: builtin_add,
    },
    BuiltinOp {
        id: "-",
        func: builtin_sub,
    },
    BuiltinOp {
        id: "*",
        func: builtin_mul,
    },
    BuiltinOp {
        id: "/",
        func: builtin_div,
    },
];

/// All native procedures, in the order they are bound
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    &BUILTIN_OPS
}
