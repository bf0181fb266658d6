use std::borrow::Cow;

use crate::Value;

/// Returns the printed form of a value.
///
/// `None` prints as the empty string, lists, maps and channels can't be
/// printed.
pub(crate) fn to_text(value: &Value) -> Result<Cow<'_, str>, String> {
    let text = match value {
        Value::None => Cow::Borrowed(""),
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        Value::Integer(n) => Cow::Owned(n.to_string()),
        Value::Float(n) => Cow::Owned(n.to_string()),
        Value::String(s) | Value::Html(s) => Cow::Borrowed(s.as_str()),
        Value::Object(obj) => match obj.to_text() {
            Some(text) => Cow::Owned(text),
            None => return Err(err_unprintable(value)),
        },
        Value::List(_) | Value::Map(_) | Value::Channel(_) => {
            return Err(err_unprintable(value));
        }
    };
    Ok(text)
}

/// Resolves the member `name` on `receiver`, calling it with `args` if it is
/// a method.
pub(crate) fn member(receiver: Value, name: &str, args: Vec<Value>) -> Result<Value, String> {
    match receiver {
        Value::None => {
            if args.is_empty() {
                Ok(Value::None)
            } else {
                Err(err_not_method(name))
            }
        }

        Value::Map(map) => {
            if !args.is_empty() {
                return Err(err_not_method(name));
            }
            Ok(map.get(name).cloned().unwrap_or(Value::None))
        }

        Value::Object(obj) => {
            if obj.is_nil() {
                return Err(format!(
                    "nil pointer evaluating {}.{name}",
                    obj.type_name()
                ));
            }
            if obj.has_method(name) {
                return obj
                    .call_method(name, args)
                    .map_err(|err| format!("error calling {name}: {err}"));
            }
            match obj.lookup_field(name) {
                Some(_) if !args.is_empty() => Err(err_not_method(name)),
                Some(value) => Ok(value),
                None => Err(err_no_field(name, obj.type_name())),
            }
        }

        value => Err(err_no_field(name, value.human())),
    }
}

fn err_unprintable(value: &Value) -> String {
    format!("can't print value of type {}", value.human())
}

fn err_not_method(name: &str) -> String {
    format!("{name} is not a method but has arguments")
}

fn err_no_field(name: &str, ty: &str) -> String {
    format!("can't evaluate field {name} in type {ty}")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{FieldLookup, MethodLookup, Object};

    #[derive(Debug)]
    struct Point {
        nil: bool,
    }

    impl FieldLookup for Point {
        fn lookup_field(&self, name: &str) -> Option<Value> {
            match name {
                "X" => Some(Value::Integer(3)),
                _ => None,
            }
        }
    }

    impl MethodLookup for Point {
        fn has_method(&self, name: &str) -> bool {
            matches!(name, "Add" | "Fail")
        }

        fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, String> {
            match (name, args.as_slice()) {
                ("Add", [Value::Integer(n)]) => Ok(Value::Integer(3 + n)),
                _ => Err(String::from("boom")),
            }
        }
    }

    impl Object for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn is_nil(&self) -> bool {
            self.nil
        }
    }

    #[test]
    fn to_text_scalars() {
        assert_eq!(to_text(&Value::None).unwrap(), "");
        assert_eq!(to_text(&Value::Bool(false)).unwrap(), "false");
        assert_eq!(to_text(&Value::Integer(-42)).unwrap(), "-42");
        assert_eq!(to_text(&Value::Float(1.5)).unwrap(), "1.5");
        assert_eq!(to_text(&Value::html("<b>")).unwrap(), "<b>");
    }

    #[test]
    fn to_text_containers() {
        let err = to_text(&Value::from(vec![1, 2])).unwrap_err();
        assert_eq!(err, "can't print value of type list");
        let err = to_text(&Value::from([("a", 1)])).unwrap_err();
        assert_eq!(err, "can't print value of type map");
        let err = to_text(&Value::object(Point { nil: false })).unwrap_err();
        assert_eq!(err, "can't print value of type Point");
    }

    #[test]
    fn member_map() {
        let map = Value::from([("a", 1)]);
        assert_eq!(member(map.clone(), "a", vec![]), Ok(Value::Integer(1)));
        assert_eq!(member(map.clone(), "b", vec![]), Ok(Value::None));
        assert_eq!(
            member(map, "a", vec![Value::Integer(1)]),
            Err(String::from("a is not a method but has arguments"))
        );
    }

    #[test]
    fn member_none() {
        assert_eq!(member(Value::None, "a", vec![]), Ok(Value::None));
        assert!(member(Value::None, "a", vec![Value::None]).is_err());
    }

    #[test]
    fn member_object() {
        let p = Value::object(Point { nil: false });
        assert_eq!(member(p.clone(), "X", vec![]), Ok(Value::Integer(3)));
        assert_eq!(
            member(p.clone(), "Add", vec![Value::Integer(2)]),
            Ok(Value::Integer(5))
        );
        assert_eq!(
            member(p.clone(), "Fail", vec![]),
            Err(String::from("error calling Fail: boom"))
        );
        assert_eq!(
            member(p, "Y", vec![]),
            Err(String::from("can't evaluate field Y in type Point"))
        );
        let nil = Value::object(Point { nil: true });
        assert_eq!(
            member(nil, "X", vec![]),
            Err(String::from("nil pointer evaluating Point.X"))
        );
    }

    #[test]
    fn member_scalar() {
        assert_eq!(
            member(Value::Integer(1), "X", vec![]),
            Err(String::from("can't evaluate field X in type int"))
        );
    }
}
