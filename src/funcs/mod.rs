//! The function registry.
//!
//! Functions are resolved by name once at compile time. The compiler checks
//! their arity and the interpreter calls them with the evaluated arguments,
//! the piped value (if any) is always the last argument.

mod args;
#[cfg(feature = "builtins")]
mod builtins;
pub(crate) mod escape;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use crate::funcs::args::{CallError, FuncArg};
use crate::Value;

/// The name of the escaper inserted for HTML text content.
pub const HTML_ESCAPER: &str = "_html_template_htmlescaper";

/// The name of the escaper inserted for HTML attribute values.
pub const ATTR_ESCAPER: &str = "_html_template_attrescaper";

pub(crate) type FuncFn =
    dyn Fn(Vec<Value>) -> std::result::Result<Value, CallError> + Send + Sync + 'static;

/// The statically known kind of value a function returns.
///
/// The compiler uses this to drop escaper calls that can't change the
/// output, e.g. escaping a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnKind {
    #[default]
    Any,
    Number,
    Bool,
    /// Text that is already safe HTML. String results of such functions are
    /// treated as [`Value::Html`].
    Html,
}

impl ReturnKind {
    /// Checks a function result against the declared kind.
    ///
    /// Escapers dropped at compile time rely on the declaration, so a
    /// mismatching result is an error instead of unescaped output.
    pub(crate) fn check(self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (Self::Any, value)
            | (Self::Number, value @ (Value::Integer(_) | Value::Float(_)))
            | (Self::Bool, value @ Value::Bool(_)) => Ok(value),
            (Self::Html, Value::String(s)) => Ok(Value::Html(s)),
            (Self::Html, value) => Ok(value),
            (Self::Number, value) => Err(err_declared("number", &value)),
            (Self::Bool, value) => Err(err_declared("bool", &value)),
        }
    }
}

fn err_declared(kind: &str, got: &Value) -> String {
    format!("declared {kind} but returned {}", got.human())
}

/// Which builtin escaper an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escaper {
    Html,
    Attr,
}

/// A resolved function.
#[derive(Clone)]
pub struct FuncEntry {
    pub(crate) name: String,
    /// The exact number of arguments, or the minimum if variadic.
    pub(crate) arity: usize,
    pub(crate) variadic: bool,
    /// Whether the function can return an error.
    pub(crate) fallible: bool,
    pub(crate) returns: ReturnKind,
    pub(crate) escaper: Option<Escaper>,
    pub(crate) call: Arc<FuncFn>,
}

/// A set of named functions that templates can call.
///
/// A new registry always contains the two HTML escapers. With the `builtins`
/// feature, [`Registry::with_builtins`] also adds the standard text/template
/// functions.
#[derive(Clone)]
pub struct Registry {
    funcs: BTreeMap<String, Arc<FuncEntry>>,
}

/// Represents any function that can be added to a [`Registry`].
///
/// This trait is used by [`Engine::add_function`][crate::Engine::add_function]
/// to abstract over functions and closures with different argument types,
/// return types and arity. Functions can take up to five arguments.
///
/// Arguments can be any type implementing [`FuncArg`]:
/// - [`Value`]
/// - [`bool`]
/// - [`i64`]
/// - [`f64`]
/// - [`String`]
/// - [`Vec<Value>`]
///
/// Functions can return any `T` where `T: Into<Value>`, an `Option<T>`, or a
/// `Result<T, E>` where `E: Display`. A returned error aborts rendering.
///
/// ## Examples
///
/// ```
/// let mut engine = stencil::Engine::new();
/// engine.add_function("repeat", |s: String, n: i64| s.repeat(n as usize));
/// engine.add_function("parse", |s: String| s.parse::<i64>());
///
/// let result = engine
///     .compile(r#"{{ repeat "ab" 3 }} {{ "12" | parse }}"#)?
///     .render_from(stencil::Value::None)?;
/// assert_eq!(result, "ababab 12");
/// # Ok::<(), stencil::Error>(())
/// ```
pub trait Function<R, A>
where
    A: FuncArgs,
{
    #[doc(hidden)]
    fn call(&self, args: A) -> R;
}

/// A tuple of [`FuncArg`]s.
pub trait FuncArgs: Sized {
    #[doc(hidden)]
    const LEN: usize;

    #[doc(hidden)]
    fn from_values(args: Vec<Value>) -> std::result::Result<Self, CallError>;
}

/// The return type of a [`Function`].
pub trait FuncReturn {
    #[doc(hidden)]
    const FALLIBLE: bool;

    #[doc(hidden)]
    fn into_result(self) -> std::result::Result<Value, CallError>;
}

////////////////////////////////////////////////////////////////////////////////
// Function
////////////////////////////////////////////////////////////////////////////////

macro_rules! one {
    ($x:ident) => {
        1
    };
}

macro_rules! impl_function {
    ($($arg:ident)*) => {
        #[allow(non_snake_case)]
        impl<Func, R, $($arg,)*> Function<R, ($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> R,
            R: FuncReturn,
            $($arg: FuncArg,)*
        {
            #[doc(hidden)]
            fn call(&self, ($($arg,)*): ($($arg,)*)) -> R {
                self($($arg),*)
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<$($arg,)*> FuncArgs for ($($arg,)*)
        where
            $($arg: FuncArg,)*
        {
            const LEN: usize = 0 $(+ one!($arg))*;

            fn from_values(args: Vec<Value>) -> std::result::Result<Self, CallError> {
                if args.len() != Self::LEN {
                    return Err(CallError::Args(format!(
                        "wrong number of args: want {} got {}",
                        Self::LEN,
                        args.len()
                    )));
                }
                let mut iter = args.into_iter();
                Ok(($($arg::from_value(iter.next().unwrap_or_default())?,)*))
            }
        }
    };
}

impl_function! {}
impl_function! { A }
impl_function! { A B }
impl_function! { A B C }
impl_function! { A B C D }
impl_function! { A B C D E }

////////////////////////////////////////////////////////////////////////////////
// FuncReturn
////////////////////////////////////////////////////////////////////////////////

impl<T> FuncReturn for T
where
    T: Into<Value>,
{
    const FALLIBLE: bool = false;

    fn into_result(self) -> std::result::Result<Value, CallError> {
        Ok(self.into())
    }
}

impl<T, E> FuncReturn for std::result::Result<T, E>
where
    T: Into<Value>,
    E: fmt::Display,
{
    const FALLIBLE: bool = true;

    fn into_result(self) -> std::result::Result<Value, CallError> {
        self.map(Into::into)
            .map_err(|err| CallError::Failed(err.to_string()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Registry
////////////////////////////////////////////////////////////////////////////////

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Construct a registry containing only the HTML escapers.
    pub fn new() -> Self {
        let mut reg = Self {
            funcs: BTreeMap::new(),
        };
        reg.add_variadic(HTML_ESCAPER, 0, escape::html_escaper);
        reg.add_variadic(ATTR_ESCAPER, 0, escape::attr_escaper);
        reg.mark_escaper(HTML_ESCAPER, Escaper::Html);
        reg.mark_escaper(ATTR_ESCAPER, Escaper::Attr);
        reg
    }

    /// Construct a registry containing the builtin functions.
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut reg = Self::new();
        #[cfg(feature = "builtins")]
        builtins::register(&mut reg);
        reg
    }

    /// Add a function taking a fixed number of arguments.
    ///
    /// Adding a function with an existing name replaces it.
    pub fn add<F, R, A>(&mut self, name: impl Into<String>, f: F)
    where
        F: Function<R, A> + Send + Sync + 'static,
        R: FuncReturn,
        A: FuncArgs,
    {
        let call = move |args: Vec<Value>| {
            let args = A::from_values(args)?;
            Function::call(&f, args).into_result()
        };
        self.insert(name.into(), A::LEN, false, R::FALLIBLE, Arc::new(call));
    }

    /// Add a function taking at least `min` arguments.
    pub fn add_variadic<F, R>(&mut self, name: impl Into<String>, min: usize, f: F)
    where
        F: Fn(Vec<Value>) -> R + Send + Sync + 'static,
        R: FuncReturn,
    {
        let call = move |args: Vec<Value>| f(args).into_result();
        self.insert(name.into(), min, true, R::FALLIBLE, Arc::new(call));
    }

    /// Declare the kind of value a function returns.
    ///
    /// Returns `false` if there is no such function.
    pub fn set_return_kind(&mut self, name: &str, kind: ReturnKind) -> bool {
        match self.funcs.get_mut(name) {
            Some(entry) => {
                Arc::make_mut(entry).returns = kind;
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the registry contains the function.
    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<FuncEntry>> {
        self.funcs.get(name)
    }

    fn insert(&mut self, name: String, arity: usize, variadic: bool, fallible: bool, call: Arc<FuncFn>) {
        let entry = FuncEntry {
            name: name.clone(),
            arity,
            variadic,
            fallible,
            returns: ReturnKind::Any,
            escaper: None,
            call,
        };
        self.funcs.insert(name, Arc::new(entry));
    }

    fn mark_escaper(&mut self, name: &str, escaper: Escaper) {
        if let Some(entry) = self.funcs.get_mut(name) {
            Arc::make_mut(entry).escaper = Some(escaper);
        }
    }
}

impl FuncEntry {
    /// Checks the number of arguments given to this function.
    pub(crate) fn check_arity(&self, got: usize) -> Result<(), String> {
        let ok = if self.variadic {
            got >= self.arity
        } else {
            got == self.arity
        };
        if ok {
            return Ok(());
        }
        let want = if self.variadic {
            format!("at least {}", self.arity)
        } else {
            self.arity.to_string()
        };
        Err(format!(
            "wrong number of args for {}: want {want} got {got}",
            self.name
        ))
    }
}

impl fmt::Debug for FuncEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("variadic", &self.variadic)
            .field("fallible", &self.fallible)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.funcs.keys()).finish()
    }
}
