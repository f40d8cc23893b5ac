//! This module defines the runtime value model shared by the reader, the
//! environment and the evaluator. The main enum, [`Value`], covers every
//! katie datum: nil, booleans, integers, symbols, lists, special-form
//! markers, native procedures and closures. Its [`Display`](std::fmt::Display)
//! implementation is the printer used for program output.
//!
//! Ergonomic helpers such as [`val`], [`sym`] and [`nil`] keep tree
//! construction in tests short.

use std::fmt;
use std::rc::Rc;

use crate::evaluator::{Environment, NativeFn};

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// The closed set of special-form keywords.
///
/// `let*`, `do` and `defn` are recognised by the lexer and reader but
/// their evaluation is not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Def,
    LetStar,
    If,
    Do,
    Fn,
    Defn,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 6] = [
        SpecialForm::Def,
        SpecialForm::LetStar,
        SpecialForm::If,
        SpecialForm::Do,
        SpecialForm::Fn,
        SpecialForm::Defn,
    ];

    /// Canonical spelling of the keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Def => "def",
            SpecialForm::LetStar => "let*",
            SpecialForm::If => "if",
            SpecialForm::Do => "do",
            SpecialForm::Fn => "fn",
            SpecialForm::Defn => "defn",
        }
    }

    pub fn from_keyword(text: &str) -> Option<SpecialForm> {
        SpecialForm::ALL
            .into_iter()
            .find(|form| form.keyword() == text)
    }
}

impl fmt::Display for SpecialForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A user procedure created by `fn`.
pub struct Closure {
    /// Frame the closure was created in; shared, never owned exclusively
    pub env: Environment,
    /// Set by `def` when an unnamed closure is bound to a symbol
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Value,
}

impl Closure {
    /// Copy of this closure carrying `name`, sharing the captured frame.
    pub(crate) fn named(&self, name: &str) -> Closure {
        Closure {
            env: self.env.clone(),
            name: Some(name.to_owned()),
            params: self.params.clone(),
            body: self.body.clone(),
        }
    }
}

impl fmt::Debug for Closure {
    // The captured frame may (indirectly) contain this closure again.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Core value type of the interpreter
///
/// To build a tree, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for nil
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Numbers (integers only)
    Number(NumberType),
    /// Symbols (identifiers)
    Symbol(String),
    /// Lists; each element is owned by its list
    List(Vec<Value>),
    /// A special-form keyword in head position
    Special(SpecialForm),
    /// Built-in procedure, compared by id rather than function pointer
    NativeProcedure { id: &'static str, func: NativeFn },
    /// User procedure; clones share the same closure
    Closure(Rc<Closure>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Special(form) => write!(f, "Special({form})"),
            Value::NativeProcedure { id, .. } => write!(f, "NativeProcedure({id})"),
            Value::Closure(closure) => write!(f, "{closure:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(elements) => {
                // Every element, including the last, is followed by a space.
                write!(f, "(")?;
                for elem in elements {
                    write!(f, "{elem} ")?;
                }
                write!(f, ")")
            }
            Value::Special(form) => write!(f, "{form}"),
            Value::NativeProcedure { id, .. } => write!(f, "#<native-procedure:{id}>"),
            Value::Closure(closure) => match &closure.name {
                Some(name) => write!(f, "#<closure:{name}>"),
                None => write!(f, "#<closure>"),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Special(a), Value::Special(b)) => a == b,
            (Value::NativeProcedure { id: id1, .. }, Value::NativeProcedure { id: id2, .. }) => {
                id1 == id2
            }
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false, // Different variants are never equal
        }
    }
}

impl Value {
    /// Integer view used by native arithmetic: numbers pass through,
    /// booleans become 0/1, everything else is not coercible.
    pub fn to_number(&self) -> Option<NumberType> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(NumberType::from(*b)),
            _ => None,
        }
    }

    /// Only the boolean `true` is truthy.
    pub fn is_truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<SpecialForm> for Value {
    fn from(form: SpecialForm) -> Self {
        Value::Special(form)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Nil
}
