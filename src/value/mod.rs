//! Defines the [`Value`] enum, representing any valid renderable data.

mod from;
#[cfg(feature = "serde")]
mod ser;

pub use std::collections::BTreeMap as Map;
use std::fmt;
use std::mem;
use std::sync::Arc;

use crossbeam::channel::Receiver;

#[cfg(feature = "serde")]
pub use crate::value::ser::to_value;

/// Data to be rendered represented as a recursive enum.
///
/// Lists and maps are reference counted so that values can be cloned onto
/// the interpreter stacks cheaply.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Text that is already safe to emit into HTML.
    Html(String),
    List(Arc<Vec<Value>>),
    Map(Arc<Map<String, Value>>),
    /// A host object accessed through [`Object`].
    Object(Arc<dyn Object>),
    /// Values received until the sending side disconnects.
    Channel(Receiver<Value>),
}

/// Looks up named fields on a host object.
pub trait FieldLookup {
    /// Returns the field value or `None` if the type has no such field.
    fn lookup_field(&self, name: &str) -> Option<Value>;
}

/// Looks up and calls named methods on a host object.
///
/// Methods take priority over fields with the same name.
pub trait MethodLookup {
    fn has_method(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, String> {
        let _ = args;
        Err(format!("can't call method {name}"))
    }
}

/// A host object that can be accessed from templates.
///
/// # Examples
///
/// ```
/// use stencil::{FieldLookup, MethodLookup, Object, Value};
///
/// #[derive(Debug)]
/// struct User {
///     name: String,
/// }
///
/// impl FieldLookup for User {
///     fn lookup_field(&self, name: &str) -> Option<Value> {
///         match name {
///             "Name" => Some(Value::from(self.name.as_str())),
///             _ => None,
///         }
///     }
/// }
///
/// impl MethodLookup for User {
///     fn has_method(&self, name: &str) -> bool {
///         name == "Greet"
///     }
///
///     fn call_method(&self, _: &str, args: Vec<Value>) -> Result<Value, String> {
///         let greeting = match args.first() {
///             Some(Value::String(s)) => s.as_str(),
///             _ => "Hello",
///         };
///         Ok(Value::from(format!("{greeting}, {}!", self.name)))
///     }
/// }
///
/// impl Object for User {
///     fn type_name(&self) -> &str {
///         "User"
///     }
/// }
///
/// let user = Value::object(User { name: "John".into() });
/// let result = stencil::Engine::new()
///     .compile(r#"{{ .Greet "Hi" }} {{ .Name }}"#)?
///     .render_from(user)?;
/// assert_eq!(result, "Hi, John! John");
/// # Ok::<(), stencil::Error>(())
/// ```
pub trait Object: FieldLookup + MethodLookup + fmt::Debug + Send + Sync {
    /// The type name used in error messages.
    fn type_name(&self) -> &str;

    /// Whether this object models a nil pointer.
    fn is_nil(&self) -> bool {
        false
    }

    /// The printed form of this object, objects without one can't be printed.
    fn to_text(&self) -> Option<String> {
        None
    }
}

impl Value {
    /// Wraps a host object.
    pub fn object<T>(obj: T) -> Self
    where
        T: Object + 'static,
    {
        Self::Object(Arc::new(obj))
    }

    /// Marks a string as safe HTML.
    pub fn html(s: impl Into<String>) -> Self {
        Self::Html(s.into())
    }

    /// Whether the value is considered true in a condition.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) | Self::Html(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
            Self::Object(o) => !o.is_nil(),
            Self::Channel(_) => true,
        }
    }

    /// A human readable name of the kind of value.
    pub fn human(&self) -> &str {
        match self {
            Self::None => "nil",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Html(_) => "html",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(o) => o.type_name(),
            Self::Channel(_) => "channel",
        }
    }

    /// Returns the string contents of a string or HTML value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Html(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(s), Self::Bool(o)) => s == o,
            (Self::Integer(s), Self::Integer(o)) => s == o,
            (Self::Float(s), Self::Float(o)) => s == o,
            (Self::String(s), Self::String(o)) => s == o,
            (Self::Html(s), Self::Html(o)) => s == o,
            (Self::List(s), Self::List(o)) => s == o,
            (Self::Map(s), Self::Map(o)) => s == o,
            (Self::Object(s), Self::Object(o)) => Arc::ptr_eq(s, o),
            (Self::Channel(s), Self::Channel(o)) => s.same_channel(o),
            _ => mem::discriminant(self) == mem::discriminant(other),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::None
    }
}
