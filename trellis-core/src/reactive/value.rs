//! Values stored in reactive state.
//!
//! [`ReactiveValue`] is the bound on everything a [`Cell`](super::cell::Cell),
//! [`Computed`](super::computed::Computed) or watch can hold. It defines the
//! change-detection rule (`same_value`, the `Object.is` comparison: NaN
//! equals NaN, `+0` and `-0` differ, shared containers compare by identity)
//! and how deep watches descend into a value.
//!
//! [`Value`] is the dynamic value used inside proxied containers and props.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use super::collections::{ReactiveList, ReactiveSet};
use super::object::ReactiveObject;
use super::traverse::Seen;

/// A value that can live in reactive state.
pub trait ReactiveValue: Clone + Send + Sync + 'static {
    /// Whether assigning `other` over `self` is a no-op.
    fn same_value(&self, other: &Self) -> bool;

    /// Read every nested part of the value so a running computation depends
    /// on all of it. Plain values have nothing to descend into.
    fn traverse(&self, _seen: &mut Seen) {}

    /// Convert raw containers to deep reactive views. Deep cells store the
    /// converted value so that nested mutations are observable.
    fn to_reactive(self) -> Self {
        self
    }
}

/// `Object.is` on numbers.
pub fn same_number(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

/// Implement [`ReactiveValue`] for types whose `PartialEq` is the right
/// change-detection rule.
#[macro_export]
macro_rules! impl_reactive_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::reactive::ReactiveValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_reactive_value!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    &'static str,
);

impl ReactiveValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        same_number(*self, *other)
    }
}

impl ReactiveValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        same_number(f64::from(*self), f64::from(*other))
    }
}

impl<T: ReactiveValue> ReactiveValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn traverse(&self, seen: &mut Seen) {
        if let Some(value) = self {
            value.traverse(seen);
        }
    }

    fn to_reactive(self) -> Self {
        self.map(ReactiveValue::to_reactive)
    }
}

impl<T: ReactiveValue> ReactiveValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }

    fn traverse(&self, seen: &mut Seen) {
        for value in self {
            value.traverse(seen);
        }
    }

    fn to_reactive(self) -> Self {
        self.into_iter().map(ReactiveValue::to_reactive).collect()
    }
}

impl<T: Send + Sync + 'static + ?Sized> ReactiveValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

macro_rules! impl_reactive_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: ReactiveValue),+> ReactiveValue for ($($name,)+) {
            fn same_value(&self, other: &Self) -> bool {
                $(self.$idx.same_value(&other.$idx))&&+
            }

            fn traverse(&self, seen: &mut Seen) {
                $(self.$idx.traverse(seen);)+
            }

            fn to_reactive(self) -> Self {
                ($(self.$idx.to_reactive(),)+)
            }
        }
    };
}

impl_reactive_tuple!(A 0);
impl_reactive_tuple!(A 0, B 1);
impl_reactive_tuple!(A 0, B 1, C 2);
impl_reactive_tuple!(A 0, B 1, C 2, D 3);

/// A dynamically typed value, as stored in reactive objects, lists and sets.
///
/// Equality and hashing follow `SameValueZero` (NaN equals NaN, `+0` equals
/// `-0`), which is the rule for set membership. Change detection uses the
/// stricter [`ReactiveValue::same_value`].
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(ReactiveObject),
    List(ReactiveList),
    Set(ReactiveSet),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Set(_) => "set",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ReactiveList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&ReactiveSet> {
        match self {
            Self::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Strip any proxy view from a container value.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Object(obj) => Self::Object(obj.to_raw()),
            Self::List(list) => Self::List(list.to_raw()),
            Self::Set(set) => Self::Set(set.to_raw()),
            other => other.clone(),
        }
    }

    /// Snapshot the value as JSON without tracking.
    ///
    /// `undefined` becomes `null`, sets become arrays, and a container that
    /// is reached again through a cycle is rendered as `null`.
    pub fn to_json(&self) -> Json {
        self.to_json_inner(&mut Seen::new())
    }

    pub(crate) fn to_json_inner(&self, seen: &mut Seen) -> Json {
        match self {
            Self::Undefined | Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.to_string()),
            Self::Object(obj) => obj.snapshot_json(seen),
            Self::List(list) => list.snapshot_json(seen),
            Self::Set(set) => set.snapshot_json(seen),
        }
    }
}

impl ReactiveValue for Value {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => same_number(*a, *b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.same_value(b),
            (Self::List(a), Self::List(b)) => a.same_value(b),
            (Self::Set(a), Self::Set(b)) => a.same_value(b),
            _ => false,
        }
    }

    fn traverse(&self, seen: &mut Seen) {
        match self {
            Self::Object(obj) => obj.traverse(seen),
            Self::List(list) => list.traverse(seen),
            Self::Set(set) => set.traverse(seen),
            _ => {}
        }
    }

    fn to_reactive(self) -> Self {
        match self {
            Self::Object(obj) => Self::Object(obj.to_reactive()),
            Self::List(list) => Self::List(list.to_reactive()),
            Self::Set(set) => Self::Set(set.to_reactive()),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.same_value(other),
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => {
                let canonical = if n.is_nan() {
                    f64::NAN
                } else if *n == 0.0 {
                    0.0
                } else {
                    *n
                };
                canonical.to_bits().hash(state);
            }
            Self::String(s) => s.hash(state),
            Self::Object(obj) => obj.hash(state),
            Self::List(list) => list.hash(state),
            Self::Set(set) => set.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! value_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

value_from_number!(f64, f32, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Self::String(s)
    }
}

impl From<ReactiveObject> for Value {
    fn from(obj: ReactiveObject) -> Self {
        Self::Object(obj)
    }
}

impl From<ReactiveList> for Value {
    fn from(list: ReactiveList) -> Self {
        Self::List(list)
    }
}

impl From<ReactiveSet> for Value {
    fn from(set: ReactiveSet) -> Self {
        Self::Set(set)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::from(s),
            Json::Array(items) => Self::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for Json {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

/// Property bag passed from the host to a bridged component.
pub type Props = IndexMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn numbers_follow_object_is() {
        assert!(f64::NAN.same_value(&f64::NAN));
        assert!(!0.0f64.same_value(&-0.0));
        assert!(1.5f64.same_value(&1.5));
    }

    #[test]
    fn set_equality_is_same_value_zero() {
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert!(!Value::from(0.0).same_value(&Value::from(-0.0)));

        let mut set = HashSet::new();
        set.insert(Value::from(f64::NAN));
        assert!(set.contains(&Value::from(f64::NAN)));
        set.insert(Value::from(-0.0));
        assert!(set.contains(&Value::from(0.0)));
    }

    #[test]
    fn arcs_compare_by_identity() {
        let a: Arc<Vec<i32>> = Arc::new(vec![1]);
        let b: Arc<Vec<i32>> = Arc::new(vec![1]);
        assert!(a.same_value(&a.clone()));
        assert!(!a.same_value(&b));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = ReactiveObject::new();
        let b = ReactiveObject::new();
        assert!(Value::Object(a.clone()).same_value(&Value::Object(a)));
        assert!(!Value::Object(b).same_value(&Value::Object(ReactiveObject::new())));
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let json = serde_json::json!({ "a": 1.0, "b": [true, null], "c": "x" });
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
        assert_eq!(Value::Undefined.to_json(), Json::Null);
    }

    #[test]
    fn json_snapshot_breaks_cycles() {
        let obj = ReactiveObject::new();
        obj.set("self", Value::Object(obj.clone()))
            .expect("raw object is extensible");

        assert_eq!(obj.snapshot_json(&mut Seen::new())["self"], Json::Null);
    }

    #[test]
    fn tuples_compare_slotwise() {
        assert!((1, String::from("a")).same_value(&(1, String::from("a"))));
        assert!(!(1, f64::NAN).same_value(&(2, f64::NAN)));
        assert!(Some(f64::NAN).same_value(&Some(f64::NAN)));
    }
}
