use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::{Closure, SpecialForm, Value};
use crate::builtinops::get_builtin_ops;

/// Signature shared by every native procedure.
pub type NativeFn = fn(&mut Context, &[Value]) -> Result<Value, Error>;

/// Number of arguments a form or procedure accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// Inclusive range
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, got: usize) -> bool {
        match *self {
            Arity::Exact(n) => got == n,
            Arity::Range(min, max) => (min..=max).contains(&got),
        }
    }

    /// Check `got` against the arity, naming `expression` on mismatch
    pub fn validate(&self, got: usize, expression: &Value) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(self.mismatch(got, expression))
        }
    }

    pub fn mismatch(&self, got: usize, expression: &Value) -> Error {
        Error::arity_error(*self, got, expression.to_string())
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

/// A shared, mutable scope frame with an optional parent.
///
/// Cloning an `Environment` clones the handle, not the frame: closures
/// and the evaluation context all see the same bindings.
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// A root frame without parent.
    pub fn new() -> Self {
        Environment::default()
    }

    /// A new empty frame whose parent is `self`.
    pub fn child(&self) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.borrow().parent.clone()
    }

    /// Insert or overwrite a binding in this frame only.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Resolve `name`, innermost frame first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = self.clone();
        loop {
            let parent = {
                let inner = frame.0.borrow();
                if let Some(value) = inner.bindings.get(name) {
                    return Some(value.clone());
                }
                inner.parent.clone()
            };
            frame = parent?;
        }
    }

    /// The binding held by this frame itself, ignoring ancestors.
    pub fn local(&self, name: &str) -> Option<Value> {
        self.0.borrow().bindings.get(name).cloned()
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Get all bindings visible from this frame
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = self.parent() {
            bindings.extend(parent.get_all_bindings());
        }

        for (name, value) in &self.0.borrow().bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Drop every binding of this frame.
    pub fn clear(&self) {
        // Release the borrow before the old bindings drop; they may hold
        // closures whose frames point back here.
        let bindings = std::mem::take(&mut self.0.borrow_mut().bindings);
        drop(bindings);
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<&String> = frame.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &frame.parent)
            .finish()
    }
}

/// Evaluation state: the global frame and the frame currently in scope.
///
/// Dropping the context clears the global frame, breaking the reference
/// cycles between global closures and the frame they were defined in.
pub struct Context {
    global: Environment,
    current: Environment,
}

impl Context {
    /// A context over a fresh global environment (see [`create_global_env`]).
    pub fn new() -> Self {
        Context::with_global(create_global_env())
    }

    pub fn with_global(global: Environment) -> Self {
        Context {
            current: global.clone(),
            global,
        }
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    pub fn current(&self) -> &Environment {
        &self.current
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("at_global", &self.current.ptr_eq(&self.global))
            .finish_non_exhaustive()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.global.clear();
    }
}

/// Evaluate an expression in the context's current frame
pub fn eval(expr: &Value, ctx: &mut Context) -> Result<Value, Error> {
    match expr {
        // Self-evaluating forms
        Value::Nil
        | Value::Bool(_)
        | Value::Number(_)
        | Value::Special(_)
        | Value::NativeProcedure { .. }
        | Value::Closure(_) => Ok(expr.clone()),

        // Checked at the point of use, not at definition
        Value::Symbol(name) => ctx
            .current
            .lookup(name)
            .ok_or_else(|| Error::UnresolvedSymbol(name.clone())),

        Value::List(elements) => match elements.as_slice() {
            [] => Ok(Value::Nil),
            [Value::Special(form), args @ ..] => eval_special(*form, args, expr, ctx),
            [head, arg_exprs @ ..] => {
                // Operator first, then arguments, in source order
                let procedure = eval(head, ctx)?;
                let args = eval_args(arg_exprs, ctx)?;
                apply(&procedure, &args, ctx)
            }
        },
    }
}

fn eval_args(args: &[Value], ctx: &mut Context) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| eval(arg, ctx)).collect()
}

fn eval_special(
    form: SpecialForm,
    args: &[Value],
    expr: &Value,
    ctx: &mut Context,
) -> Result<Value, Error> {
    match form {
        SpecialForm::Def => eval_def(args, expr, ctx),
        SpecialForm::If => eval_if(args, expr, ctx),
        SpecialForm::Fn => eval_fn(args, expr, ctx),
        SpecialForm::LetStar | SpecialForm::Do | SpecialForm::Defn => {
            Err(Error::Unimplemented(form))
        }
    }
}

/// `(def name expr)`: bind in the current frame and return the value
pub(crate) fn eval_def(args: &[Value], expr: &Value, ctx: &mut Context) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), value_expr] => {
            let value = match eval(value_expr, ctx)? {
                Value::Closure(closure) if closure.name.is_none() => {
                    Value::Closure(Rc::new(closure.named(name)))
                }
                other => other,
            };
            debug!(name = name.as_str(), value = %value, "def");
            ctx.current.define(name.as_str(), value.clone());
            Ok(value)
        }
        [other, _] => Err(Error::InvalidForm(format!(
            "def expects a symbol as its first argument, got {other}"
        ))),
        _ => Err(Arity::Exact(2).mismatch(args.len(), expr)),
    }
}

/// `(if cond then [else])`: only the boolean `true` selects `then`
pub(crate) fn eval_if(args: &[Value], expr: &Value, ctx: &mut Context) -> Result<Value, Error> {
    match args {
        [condition, then_expr, rest @ ..] if rest.len() <= 1 => {
            if eval(condition, ctx)?.is_truthy() {
                eval(then_expr, ctx)
            } else if let [else_expr] = rest {
                eval(else_expr, ctx)
            } else {
                Ok(Value::Nil)
            }
        }
        _ => Err(Arity::Range(2, 3).mismatch(args.len(), expr)),
    }
}

/// `(fn (params...) body)`: capture a child of the current frame with
/// every parameter pre-bound to nil
pub(crate) fn eval_fn(args: &[Value], expr: &Value, ctx: &mut Context) -> Result<Value, Error> {
    match args {
        [Value::List(param_list), body] => {
            let mut params = Vec::with_capacity(param_list.len());
            for param in param_list {
                match param {
                    Value::Symbol(name) => {
                        if params.contains(name) {
                            return Err(Error::InvalidForm(format!(
                                "duplicate parameter name: {name}"
                            )));
                        }
                        params.push(name.clone());
                    }
                    other => {
                        return Err(Error::InvalidForm(format!(
                            "fn parameters must be symbols, got {other}"
                        )));
                    }
                }
            }

            let env = ctx.current.child();
            for param in &params {
                env.define(param.as_str(), Value::Nil);
            }

            Ok(Value::Closure(Rc::new(Closure {
                env,
                name: None,
                params,
                body: body.clone(),
            })))
        }
        [other, _] => Err(Error::InvalidForm(format!(
            "fn expects a parameter list, got {other}"
        ))),
        _ => Err(Arity::Exact(2).mismatch(args.len(), expr)),
    }
}

/// Apply an evaluated procedure to evaluated arguments
pub fn apply(procedure: &Value, args: &[Value], ctx: &mut Context) -> Result<Value, Error> {
    match procedure {
        Value::NativeProcedure { func, .. } => func(ctx, args),
        Value::Closure(closure) => {
            Arity::Exact(closure.params.len()).validate(args.len(), procedure)?;

            // Each call binds its arguments in a fresh frame below the captured one.
            let frame = closure.env.child();
            for (param, arg) in closure.params.iter().zip(args) {
                frame.define(param.as_str(), arg.clone());
            }

            debug!(procedure = %procedure, args = args.len(), "call");
            let caller = std::mem::replace(&mut ctx.current, frame);
            let result = eval(&closure.body, ctx);
            ctx.current = caller;
            result
        }
        other => Err(Error::NotAProcedure(other.to_string())),
    }
}

/// Create a global environment with the native procedures and the
/// `true`, `false` and `nil` constants
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for op in get_builtin_ops() {
        env.define(
            op.id,
            Value::NativeProcedure {
                id: op.id,
                func: op.func,
            },
        );
    }

    env.define("true", Value::Bool(true));
    env.define("false", Value::Bool(false));
    env.define("nil", Value::Nil);
    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use crate::reader::read_str;
    use maplit::hashmap;

    /// Test result variants for data-driven tests
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        Printed(&'static str),       // Evaluation should succeed and print as this text
        SpecificError(&'static str), // Evaluation should fail with error containing this string
    }
    use TestResult::*;

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Test cases sharing one context, evaluated in order
    struct TestSession(Vec<(&'static str, TestResult)>);

    fn eval_str(input: &str, ctx: &mut Context) -> Result<Value, Error> {
        let forms = read_str(input)?;
        let mut result = Value::Nil;
        for form in &forms {
            result = eval(form, ctx)?;
        }
        Ok(result)
    }

    fn execute_test_case(input: &str, expected: &TestResult, ctx: &mut Context, test_id: &str) {
        match (eval_str(input, ctx), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(&actual, expected_val, "{test_id}: {input}");
            }
            (Ok(actual), Printed(text)) => {
                assert_eq!(actual.to_string(), *text, "{test_id}: {input}");
            }
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual:?}");
            }
            (Err(err), _) => {
                panic!("{test_id}: {input}: expected {expected:?}, got error {err:?}");
            }
        }
    }

    fn run_sessions(sessions: Vec<TestSession>) {
        for (session_idx, TestSession(cases)) in sessions.iter().enumerate() {
            let mut ctx = Context::new();
            for (case_idx, (input, expected)) in cases.iter().enumerate() {
                let test_id = format!("Session #{} case #{}", session_idx + 1, case_idx + 1);
                execute_test_case(input, expected, &mut ctx, &test_id);
            }
        }
    }

    fn run_isolated(cases: Vec<(&'static str, TestResult)>) {
        for (i, (input, expected)) in cases.iter().enumerate() {
            let mut ctx = Context::new();
            execute_test_case(input, expected, &mut ctx, &format!("#{}", i + 1));
        }
    }

    #[test]
    fn test_evaluation_data_driven() {
        run_isolated(vec![
            // self-evaluating forms
            ("42", success(42)),
            ("0x1F", success(31)),
            ("true", success(true)),
            ("false", success(false)),
            ("nil", EvalResult(nil())),
            ("()", EvalResult(nil())),
            ("(())", SpecificError("cannot apply non-procedure: nil")),
            ("+", Printed("#<native-procedure:+>")),
            // arithmetic
            ("(+ 1 2 3)", success(6)),
            ("(+)", success(0)),
            ("(*)", success(1)),
            ("(+ 1 true 2)", success(4)),
            ("(+ 1 nil 2)", success(3)),
            ("(+ 1 (fn (x) x) 2)", success(3)),
            ("(- 10 3 2)", success(5)),
            ("(- nil 10 3)", success(7)),
            ("(/ 20 2 2)", success(5)),
            ("(* 2 3 4)", success(24)),
            ("(+ (* 2 3) (- 10 4))", success(12)),
            ("(/ 1 0)", SpecificError("division by zero")),
            // if
            ("(if true 1 2)", success(1)),
            ("(if false 1 2)", success(2)),
            ("(if false 1)", EvalResult(nil())),
            ("(if nil 1 2)", success(2)),
            ("(if 1 1 2)", success(2)),
            ("(if (fn () 1) 1 2)", success(2)),
            ("(if true 1 undefined-symbol)", success(1)),
            ("(if true)", SpecificError("expected 2 to 3 arguments, got 1")),
            (
                "(if true 1 2 3)",
                SpecificError("arity mismatch in (if true 1 2 3 ): expected 2 to 3 arguments, got 4"),
            ),
            // fn and application
            ("((fn (a b) (+ a b)) 3 4)", success(7)),
            ("((fn () 5))", success(5)),
            ("((fn (a) a))", SpecificError("expected 1 arguments, got 0")),
            ("((fn (a) a) 1 2)", SpecificError("arity mismatch in #<closure>")),
            ("(fn (a a) a)", SpecificError("duplicate parameter name: a")),
            ("(fn (a 1) a)", SpecificError("fn parameters must be symbols")),
            ("(fn a a)", SpecificError("fn expects a parameter list")),
            ("(fn (a))", SpecificError("expected 2 arguments, got 1")),
            ("(fn (a) a)", Printed("#<closure>")),
            // def
            ("(def x)", SpecificError("expected 2 arguments, got 1")),
            ("(def 1 2)", SpecificError("def expects a symbol")),
            ("(def f (fn (x) x))", Printed("#<closure:f>")),
            // errors
            ("undefined", SpecificError("unresolved symbol: undefined")),
            ("(1 2 3)", SpecificError("cannot apply non-procedure: 1")),
            ("(let* (a 1) a)", SpecificError("special form 'let*' is not implemented")),
            ("(do 1 2)", SpecificError("special form 'do' is not implemented")),
            ("(defn f (x) x)", SpecificError("special form 'defn' is not implemented")),
            ("def", Printed("def")),
        ]);
    }

    #[test]
    fn test_sessions_share_state() {
        run_sessions(vec![
            TestSession(vec![
                ("(def x 5)", success(5)),
                ("x", success(5)),
                ("(def x (+ x 1))", success(6)),
                ("x", success(6)),
            ]),
            TestSession(vec![
                ("(def add (fn (a b) (+ a b)))", Printed("#<closure:add>")),
                ("(add 1 2)", success(3)),
                ("(add 10 20)", success(30)),
                ("(def alias add)", Printed("#<closure:add>")),
                ("(alias 2 2)", success(4)),
            ]),
            TestSession(vec![
                // closures capture the defining frame
                ("(def make-adder (fn (n) (fn (x) (+ x n))))", Printed("#<closure:make-adder>")),
                ("(def add5 (make-adder 5))", Printed("#<closure:add5>")),
                ("(def add7 (make-adder 7))", Printed("#<closure:add7>")),
                ("(add5 1)", success(6)),
                ("(add7 1)", success(8)),
                ("(add5 1)", success(6)),
            ]),
            TestSession(vec![
                // lexical, not dynamic, scoping
                ("(def n 1)", success(1)),
                ("(def get-n (fn () n))", Printed("#<closure:get-n>")),
                ("((fn (n) (get-n)) 100)", success(1)),
                // parameters shadow globals without touching them
                ("((fn (n) n) 100)", success(100)),
                ("n", success(1)),
            ]),
            TestSession(vec![
                // def inside a body binds in the call frame
                ("((fn (a) (def inner a)) 3)", success(3)),
                ("inner", SpecificError("unresolved symbol: inner")),
            ]),
            TestSession(vec![
                // a parameter is unresolved once the call returns
                ("(def f (fn (secret) secret))", Printed("#<closure:f>")),
                ("(f 1)", success(1)),
                ("secret", SpecificError("unresolved symbol: secret")),
            ]),
        ]);
    }

    #[test]
    fn test_closure_calls_do_not_leak_arguments() {
        let mut ctx = Context::new();
        eval_str("(def f (fn (a b) (+ a b)))", &mut ctx).unwrap();
        assert_eq!(eval_str("(f 3 4)", &mut ctx).unwrap(), val(7));
        assert_eq!(eval_str("(f 10 20)", &mut ctx).unwrap(), val(30));

        // the captured frame keeps its nil placeholders
        let Value::Closure(closure) = ctx.global().lookup("f").unwrap() else {
            panic!("f should be a closure");
        };
        assert_eq!(closure.env.local("a"), Some(nil()));
        assert_eq!(closure.env.local("b"), Some(nil()));
    }

    #[test]
    fn test_nested_calls_use_separate_frames() {
        let mut ctx = Context::new();
        eval_str("(def twice (fn (f x) (f (f x))))", &mut ctx).unwrap();
        eval_str("(def inc (fn (x) (+ x 1)))", &mut ctx).unwrap();
        assert_eq!(eval_str("(twice inc 5)", &mut ctx).unwrap(), val(7));
        assert_eq!(
            eval_str("((fn (x) (+ x ((fn (x) (* x 10)) 2))) 1)", &mut ctx).unwrap(),
            val(21)
        );
    }

    #[test]
    fn test_current_frame_restored_after_error() {
        let mut ctx = Context::new();
        eval_str("(def boom (fn (a) (+ a missing)))", &mut ctx).unwrap();
        let err = eval_str("(boom 1)", &mut ctx).unwrap_err();
        assert_eq!(err, Error::UnresolvedSymbol("missing".into()));
        assert!(ctx.current().ptr_eq(ctx.global()));
        // the argument did not leak into the global frame
        assert!(matches!(
            eval_str("a", &mut ctx),
            Err(Error::UnresolvedSymbol(name)) if name == "a"
        ));
    }

    #[test]
    fn test_arity_checked_before_binding() {
        let mut ctx = Context::new();
        eval_str("(def f (fn (a b) a))", &mut ctx).unwrap();
        let err = eval_str("(f 1)", &mut ctx).unwrap_err();
        assert_eq!(
            err,
            Error::arity_error(Arity::Exact(2), 1, "#<closure:f>".into())
        );
        let Value::Closure(closure) = ctx.global().lookup("f").unwrap() else {
            panic!("f should be a closure");
        };
        assert_eq!(closure.env.local("a"), Some(nil()));
    }

    #[test]
    fn test_environment_define_and_lookup() {
        let global = Environment::new();
        global.define("x", val(1));
        global.define("y", val(2));

        let child = global.child();
        child.define("x", val(10));
        child.define("z", val(30));

        assert_eq!(child.lookup("x"), Some(val(10)));
        assert_eq!(child.lookup("y"), Some(val(2)));
        assert_eq!(child.lookup("missing"), None);
        assert_eq!(global.lookup("x"), Some(val(1)));
        assert_eq!(global.lookup("z"), None);
        assert_eq!(child.local("y"), None);
        assert!(child.parent().unwrap().ptr_eq(&global));
        assert!(global.parent().is_none());

        let expected = hashmap! {
            "x".to_owned() => val(10),
            "y".to_owned() => val(2),
            "z".to_owned() => val(30),
        };
        let bindings = child.get_all_bindings();
        assert_eq!(
            bindings.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["x", "y", "z"]
        );
        assert_eq!(bindings.into_iter().collect::<HashMap<_, _>>(), expected);
    }

    #[test]
    fn test_global_environment_contents() {
        let env = create_global_env();
        let names: Vec<String> = env.get_all_bindings().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["*", "+", "-", "/", "false", "nil", "true"]);
        assert_eq!(env.lookup("true"), Some(val(true)));
        assert_eq!(env.lookup("nil"), Some(nil()));
        assert!(matches!(
            env.lookup("+").unwrap(),
            Value::NativeProcedure { id: "+", .. }
        ));
    }

    #[test]
    fn test_context_drop_clears_global_frame() {
        let ctx = Context::new();
        let global = ctx.global().clone();
        global.define("x", val(1));
        drop(ctx);
        assert!(global.get_all_bindings().is_empty());
    }

    #[test]
    fn test_apply_directly() {
        let mut ctx = Context::new();
        let plus = ctx.global().lookup("+").unwrap();
        assert_eq!(apply(&plus, &[val(2), val(3)], &mut ctx).unwrap(), val(5));
        assert_eq!(
            apply(&sym("+"), &[], &mut ctx).unwrap_err(),
            Error::NotAProcedure("+".into())
        );
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        let expr = sym("f");
        Exact(2).validate(2, &expr).unwrap();
        Exact(2).validate(1, &expr).unwrap_err();
        Exact(2).validate(3, &expr).unwrap_err();

        Range(2, 3).validate(2, &expr).unwrap();
        Range(2, 3).validate(3, &expr).unwrap();
        Range(2, 3).validate(1, &expr).unwrap_err();
        Range(2, 3).validate(4, &expr).unwrap_err();

        match Exact(2).validate(1, &expr).unwrap_err() {
            Error::ArityError {
                expected,
                got,
                expression,
            } => {
                assert_eq!(expected, Exact(2));
                assert_eq!(got, 1);
                assert_eq!(expression, "f");
            }
            other => panic!("Expected ArityError, got {other:?}"),
        }

        assert_eq!(Range(2, 3).to_string(), "2 to 3");
    }

    #[test]
    fn test_arity_errors_name_the_expression() {
        let mut ctx = Context::new();
        eval_str("(def pair (fn (a b) a))", &mut ctx).unwrap();

        let cases = vec![
            (
                "(def x)",
                "arity mismatch in (def x ): expected 2 arguments, got 1",
            ),
            (
                "(if true 1 2 3)",
                "arity mismatch in (if true 1 2 3 ): expected 2 to 3 arguments, got 4",
            ),
            (
                "(fn (a))",
                "arity mismatch in (fn (a ) ): expected 2 arguments, got 1",
            ),
            (
                "(pair 1)",
                "arity mismatch in #<closure:pair>: expected 2 arguments, got 1",
            ),
        ];

        for (source, expected) in cases {
            let err = eval_str(source, &mut ctx).unwrap_err();
            assert_eq!(err.to_string(), expected, "for {source}");
        }
    }
}
