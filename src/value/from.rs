use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::Value;

impl Value {
    fn list_of<I>(iter: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::List(Arc::new(iter.into_iter().map(Into::into).collect()))
    }

    fn map_of<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(Arc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }
}

/// Conversions that wrap the input in a variant, after an optional lossless
/// conversion.
macro_rules! impl_from {
    ($($ty:ty => |$v:ident| $expr:expr;)+) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $expr
                }
            }
        )+
    };
}

impl_from! {
    () => |_v| Self::None;
    bool => |b| Self::Bool(b);
    u8 => |i| Self::Integer(i64::from(i));
    u16 => |i| Self::Integer(i64::from(i));
    u32 => |i| Self::Integer(i64::from(i));
    i8 => |i| Self::Integer(i64::from(i));
    i16 => |i| Self::Integer(i64::from(i));
    i32 => |i| Self::Integer(i64::from(i));
    i64 => |i| Self::Integer(i);
    usize => |i| Self::Integer(i64::try_from(i).unwrap_or(i64::MAX));
    f32 => |f| Self::Float(f64::from(f));
    f64 => |f| Self::Float(f);
    String => |s| Self::String(s);
    &str => |s| Self::String(s.to_owned());
    Cow<'_, str> => |s| Self::String(s.into_owned());
    Receiver<Value> => |rx| Self::Channel(rx);
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(list: Vec<V>) -> Self {
        Self::list_of(list)
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Value {
    fn from(list: [V; N]) -> Self {
        Self::list_of(list)
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::list_of(iter)
    }
}

impl<K: Into<String>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(map: BTreeMap<K, V>) -> Self {
        Self::map_of(map)
    }
}

impl<K: Into<String>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(map: HashMap<K, V>) -> Self {
        Self::map_of(map)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Value {
    fn from(map: [(K, V); N]) -> Self {
        Self::map_of(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::map_of(iter)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(opt: Option<V>) -> Self {
        opt.map_or(Self::None, Into::into)
    }
}
