//! Type-erased resolved values.
//!
//! Every binding resolves to a [`BoundValue`]: a cheaply clonable handle to
//! an `Arc<dyn Any + Send + Sync>`, or *undefined* when there is nothing to
//! hand out (a missing deep property, options injected outside a binding).
//!
//! [`FromBoundValue`] is the way back to concrete types. It plays the role
//! `FromRef` plays for a statically typed context: each injected field is
//! extracted from the resolved value by its declared type.
//!
//! # Example
//!
//! ```ignore
//! let value = BoundValue::new(String::from("hello"));
//! let text: String = value.clone().extract("msg")?;
//! let shared: Arc<String> = value.extract("msg")?;
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

const UNDEFINED: &str = "undefined";

/// A resolved value with its concrete type erased.
#[derive(Clone)]
pub struct BoundValue {
    inner: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl Default for BoundValue {
    fn default() -> Self {
        Self::undefined()
    }
}

impl BoundValue {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value without re-allocating it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: Some(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wraps a JSON value.
    pub fn json(value: JsonValue) -> Self {
        Self::new(value)
    }

    /// The undefined value.
    pub fn undefined() -> Self {
        Self {
            inner: None,
            type_name: UNDEFINED,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.inner.is_none()
    }

    /// Name of the stored type, `"undefined"` when empty.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the stored value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.as_deref().is_some_and(|v| v.is::<T>())
    }

    /// Returns a shared handle to the stored `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone()?.downcast::<T>().ok()
    }

    /// Borrows the stored `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_deref()?.downcast_ref::<T>()
    }

    /// Borrows the stored JSON value, if this is one.
    pub fn as_json(&self) -> Option<&JsonValue> {
        self.downcast_ref::<JsonValue>()
    }

    /// Indexes into a JSON value by a dot-delimited path.
    ///
    /// An empty path returns the value itself. Any missing step, or a
    /// non-empty path on a non-JSON value, yields undefined.
    pub fn deep_property(&self, path: &str) -> BoundValue {
        if path.is_empty() {
            return self.clone();
        }
        self.as_json()
            .and_then(|json| json_path(json, path))
            .map(|v| BoundValue::json(v.clone()))
            .unwrap_or_default()
    }

    /// Identity comparison: true if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &BoundValue) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }

    /// Converts into `T`, reporting a type mismatch against `key`.
    pub fn extract<T: FromBoundValue>(self, key: &str) -> Result<T> {
        let found = self.type_name;
        T::from_bound_value(self).ok_or_else(|| Error::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
            found,
        })
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_json() {
            Some(json) => write!(f, "BoundValue({json})"),
            None => write!(f, "BoundValue(<{}>)", self.type_name),
        }
    }
}

/// Looks up a dot-delimited path inside a JSON value.
///
/// Object members are addressed by name, array elements by index.
pub fn json_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Conversion from a resolved value into a concrete type.
///
/// Returns `None` when the stored value has the wrong shape; callers turn
/// that into [`Error::TypeMismatch`] with the key they were resolving.
pub trait FromBoundValue: Sized {
    fn from_bound_value(value: BoundValue) -> Option<Self>;
}

impl FromBoundValue for BoundValue {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        Some(value)
    }
}

impl<T: Any + Send + Sync> FromBoundValue for Arc<T> {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        value.downcast::<T>()
    }
}

/// Undefined and JSON `null` become `None`.
impl<T: FromBoundValue> FromBoundValue for Option<T> {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        if value.is_undefined() || value.as_json().is_some_and(JsonValue::is_null) {
            return Some(None);
        }
        T::from_bound_value(value).map(Some)
    }
}

/// Accepts tag-injection arrays (`Vec<BoundValue>`) and JSON arrays.
impl<T: FromBoundValue> FromBoundValue for Vec<T> {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        if let Some(items) = value.downcast_ref::<Vec<BoundValue>>() {
            return items.iter().cloned().map(T::from_bound_value).collect();
        }
        match value.as_json() {
            Some(JsonValue::Array(items)) => items
                .iter()
                .cloned()
                .map(|item| T::from_bound_value(BoundValue::json(item)))
                .collect(),
            _ => None,
        }
    }
}

impl FromBoundValue for JsonValue {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        value.as_json().cloned()
    }
}

impl FromBoundValue for String {
    fn from_bound_value(value: BoundValue) -> Option<Self> {
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(s.clone());
        }
        if let Some(s) = value.downcast_ref::<&'static str>() {
            return Some((*s).to_string());
        }
        value.as_json()?.as_str().map(str::to_string)
    }
}

macro_rules! impl_from_bound_value_for_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl FromBoundValue for $ty {
            fn from_bound_value(value: BoundValue) -> Option<Self> {
                if let Some(v) = value.downcast_ref::<$ty>() {
                    return Some(*v);
                }
                serde_json::from_value(value.as_json()?.clone()).ok()
            }
        }
    )*};
}

impl_from_bound_value_for_scalar!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);
