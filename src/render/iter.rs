use std::sync::Arc;
use std::vec;

use crossbeam::channel::Receiver;

use crate::Value;

/// The state of a `range` over a value.
///
/// Each step yields a `(key, value)` pair, the key is the index for lists,
/// channels and integers and the key string for maps.
#[derive(Debug)]
pub enum ValueIter {
    List { list: Arc<Vec<Value>>, i: usize },
    Map(vec::IntoIter<(String, Value)>),
    Channel { rx: Receiver<Value>, received: i64 },
    Range { i: i64, n: i64 },
    Empty,
}

impl ValueIter {
    pub fn new(value: Value) -> Result<Self, String> {
        let iter = match value {
            Value::None => Self::Empty,
            Value::List(list) => Self::List { list, i: 0 },
            // Maps are ordered so this is sorted by key.
            Value::Map(map) => {
                let entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Self::Map(entries.into_iter())
            }
            Value::Channel(rx) => Self::Channel { rx, received: 0 },
            Value::Integer(n) => Self::Range { i: 0, n },
            Value::Object(obj) if obj.is_nil() => Self::Empty,
            value => {
                return Err(format!("range can't iterate over {}", value.human()));
            }
        };
        Ok(iter)
    }

    /// Advances the iterator, blocking if this is a channel with nothing
    /// buffered.
    pub fn next(&mut self) -> Option<(Value, Value)> {
        match self {
            Self::List { list, i } => {
                let item = list.get(*i)?.clone();
                let key = Value::from(*i);
                *i += 1;
                Some((key, item))
            }
            Self::Map(entries) => entries.next().map(|(k, v)| (Value::String(k), v)),
            Self::Channel { rx, received } => {
                let item = rx.recv().ok()?;
                let key = Value::Integer(*received);
                *received += 1;
                Some((key, item))
            }
            Self::Range { i, n } => {
                if *i >= *n {
                    return None;
                }
                let key = Value::Integer(*i);
                *i += 1;
                Some((key.clone(), key))
            }
            Self::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crossbeam::channel;

    fn collect(value: Value) -> Vec<(Value, Value)> {
        let mut iter = ValueIter::new(value).unwrap();
        let mut items = Vec::new();
        while let Some(item) = iter.next() {
            items.push(item);
        }
        items
    }

    #[test]
    fn iter_list() {
        assert_eq!(
            collect(Value::from(["a", "b"])),
            [
                (Value::Integer(0), Value::from("a")),
                (Value::Integer(1), Value::from("b")),
            ]
        );
    }

    #[test]
    fn iter_map_sorted() {
        assert_eq!(
            collect(Value::from([("b", 2), ("a", 1)])),
            [
                (Value::from("a"), Value::Integer(1)),
                (Value::from("b"), Value::Integer(2)),
            ]
        );
    }

    #[test]
    fn iter_integer() {
        assert_eq!(collect(Value::Integer(2)).len(), 2);
        assert!(collect(Value::Integer(-3)).is_empty());
        assert!(collect(Value::None).is_empty());
    }

    #[test]
    fn iter_channel() {
        let (tx, rx) = channel::unbounded();
        tx.send(Value::from("x")).unwrap();
        tx.send(Value::from("y")).unwrap();
        drop(tx);
        assert_eq!(
            collect(Value::from(rx)),
            [
                (Value::Integer(0), Value::from("x")),
                (Value::Integer(1), Value::from("y")),
            ]
        );
    }

    #[test]
    fn iter_err() {
        let err = ValueIter::new(Value::from("abc")).unwrap_err();
        assert_eq!(err, "range can't iterate over string");
        let err = ValueIter::new(Value::Float(1.0)).unwrap_err();
        assert_eq!(err, "range can't iterate over float");
    }
}
