/// Construct a [`Value`][crate::Value] using a JSON-like literal.
///
/// Maps are written with braces and keys can be identifiers or string
/// literals, lists are written with brackets and `nil` is
/// [`Value::None`][crate::Value::None]. Anything else is converted using
/// `Value::from`.
///
/// # Examples
///
/// ```
/// let value = stencil::value! {
///     Name: "John Smith",
///     Emails: ["john@example.com", nil],
///     "first-seen": { Year: 2021 },
/// };
/// ```
// Heavily based on `serde_json::json!`
#[macro_export]
macro_rules! value {
    () => {
        $crate::_value!({})
    };

    // A map without the enclosing braces.
    ($key:ident : $($rest:tt)+) => {
        $crate::_value!({ $key : $($rest)+ })
    };

    ($key:literal : $($rest:tt)+) => {
        $crate::_value!({ $key : $($rest)+ })
    };

    ($($value:tt)+) => {
        $crate::_value!($($value)+)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! _value {
    //////////////////////////////////////////////////////////////////////////
    // TT muncher for the inside of a list [...], produces a `Vec<Value>`.
    //
    // Must be invoked as: _value!(@list [] $($tt)*)
    //////////////////////////////////////////////////////////////////////////

    // Done.
    (@list [$($elems:expr,)*]) => {
        ::std::vec![$($elems,)*]
    };

    // Next element is `nil`.
    (@list [$($elems:expr,)*] nil $(, $($rest:tt)*)?) => {
        $crate::_value!(@list [$($elems,)* $crate::Value::None,] $($($rest)*)?)
    };

    // Next element is a list.
    (@list [$($elems:expr,)*] [$($list:tt)*] $(, $($rest:tt)*)?) => {
        $crate::_value!(@list [$($elems,)* $crate::_value!([$($list)*]),] $($($rest)*)?)
    };

    // Next element is a map.
    (@list [$($elems:expr,)*] {$($map:tt)*} $(, $($rest:tt)*)?) => {
        $crate::_value!(@list [$($elems,)* $crate::_value!({$($map)*}),] $($($rest)*)?)
    };

    // Next element is an expression.
    (@list [$($elems:expr,)*] $next:expr $(, $($rest:tt)*)?) => {
        $crate::_value!(@list [$($elems,)* $crate::Value::from($next),] $($($rest)*)?)
    };

    //////////////////////////////////////////////////////////////////////////
    // TT muncher for the inside of a map {...}, each entry is inserted into
    // the given map variable.
    //
    // Must be invoked as: _value!(@map map $($tt)*)
    //////////////////////////////////////////////////////////////////////////

    // Done.
    (@map $map:ident) => {};

    (@map $map:ident $key:ident : $($rest:tt)+) => {
        $crate::_value!(@entry $map (stringify!($key)) $($rest)+);
    };

    (@map $map:ident $key:literal : $($rest:tt)+) => {
        $crate::_value!(@entry $map ($key) $($rest)+);
    };

    (@entry $map:ident ($key:expr) nil $(, $($rest:tt)*)?) => {
        let _ = $map.insert(::std::string::String::from($key), $crate::Value::None);
        $crate::_value!(@map $map $($($rest)*)?);
    };

    (@entry $map:ident ($key:expr) [$($list:tt)*] $(, $($rest:tt)*)?) => {
        let _ = $map.insert(::std::string::String::from($key), $crate::_value!([$($list)*]));
        $crate::_value!(@map $map $($($rest)*)?);
    };

    (@entry $map:ident ($key:expr) {$($inner:tt)*} $(, $($rest:tt)*)?) => {
        let _ = $map.insert(::std::string::String::from($key), $crate::_value!({$($inner)*}));
        $crate::_value!(@map $map $($($rest)*)?);
    };

    (@entry $map:ident ($key:expr) $value:expr $(, $($rest:tt)*)?) => {
        let _ = $map.insert(::std::string::String::from($key), $crate::Value::from($value));
        $crate::_value!(@map $map $($($rest)*)?);
    };

    //////////////////////////////////////////////////////////////////////////
    // The main implementation.
    //////////////////////////////////////////////////////////////////////////

    (nil) => {
        $crate::Value::None
    };

    ([]) => {
        $crate::Value::from(::std::vec::Vec::<$crate::Value>::new())
    };

    ([ $($tt:tt)+ ]) => {
        $crate::Value::from($crate::_value!(@list [] $($tt)+))
    };

    ({}) => {
        $crate::Value::from($crate::Map::<::std::string::String, $crate::Value>::new())
    };

    ({ $($tt:tt)+ }) => {
        $crate::Value::from({
            let mut map = $crate::Map::<::std::string::String, $crate::Value>::new();
            $crate::_value!(@map map $($tt)+);
            map
        })
    };

    // Default to `From` implementation.
    ($other:expr) => {
        $crate::Value::from($other)
    };
}
