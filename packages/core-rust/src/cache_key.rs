//! Deterministic cache keys for memoized operations.
//!
//! A key is `{qualified_name}:{positional}:{keyword}`. Arguments that
//! serialize to a JSON object fill the keyword section; anything else fills
//! the positional section. The unused section is rendered empty (`[]` or
//! `{}`) so the shape of the key never changes.
//!
//! Arguments should be a tuple (one element per parameter, `&()` for none)
//! or a struct. A bare `Option` or sequence at the top level is ambiguous:
//! `None` and an empty sequence both render as `[]`. Non-finite floats
//! serialize as `null`, so `NaN` and infinities cannot be told apart;
//! [`CacheKey::derive`] rejects them.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::codec::CodecError;

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `qualified_name` called with `args`.
    ///
    /// `qualified_name` must be stable across process restarts (a module
    /// path, never an address).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if `args` cannot be represented
    /// as JSON or contain a non-finite float.
    pub fn derive<A: Serialize + ?Sized>(qualified_name: &str, args: &A) -> Result<Self, CodecError> {
        let error = |reason: String| CodecError::Serialization {
            data: qualified_name.to_string(),
            reason,
        };
        // msgpack values keep NaN and infinities as floats; JSON would turn
        // them into `null`.
        let packed = rmpv::ext::to_value(args).map_err(|e| error(e.to_string()))?;
        if has_non_finite_float(&packed) {
            return Err(error("non-finite float in cache key arguments".to_string()));
        }
        let value = serde_json::to_value(args).map_err(|e| error(e.to_string()))?;

        // `serde_json::Map` is ordered by key unless `preserve_order` is on,
        // so objects render deterministically.
        let (positional, keyword) = match value {
            Value::Object(map) => (Value::Array(Vec::new()), Value::Object(map)),
            Value::Array(items) => (Value::Array(items), Value::Object(serde_json::Map::new())),
            Value::Null => (Value::Array(Vec::new()), Value::Object(serde_json::Map::new())),
            scalar => (Value::Array(vec![scalar]), Value::Object(serde_json::Map::new())),
        };

        Ok(Self(format!("{qualified_name}:{positional}:{keyword}")))
    }

    /// Returns a copy of this key namespaced under `prefix`.
    ///
    /// An empty prefix leaves the key unchanged.
    #[must_use]
    pub fn with_prefix(self, prefix: &str) -> Self {
        if prefix.is_empty() {
            self
        } else {
            Self(format!("{prefix}:{}", self.0))
        }
    }

    /// The key as it is sent to the cache store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn has_non_finite_float(value: &rmpv::Value) -> bool {
    match value {
        rmpv::Value::F32(f) => !f.is_finite(),
        rmpv::Value::F64(f) => !f.is_finite(),
        rmpv::Value::Array(items) => items.iter().any(has_non_finite_float),
        rmpv::Value::Map(entries) => entries
            .iter()
            .any(|(k, v)| has_non_finite_float(k) || has_non_finite_float(v)),
        _ => false,
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[derive(Serialize)]
    struct ByUser<'a> {
        user_uuid: &'a str,
        include_posts: bool,
    }

    #[test]
    fn tuple_args_fill_positional_section() {
        let key = CacheKey::derive("profile::read::get", &("abc", 3)).unwrap();
        assert_eq!(key.as_str(), r#"profile::read::get:["abc",3]:{}"#);
    }

    #[test]
    fn struct_args_fill_keyword_section() {
        let key = CacheKey::derive(
            "profile::read::by_user",
            &ByUser {
                user_uuid: "u-1",
                include_posts: false,
            },
        )
        .unwrap();
        assert_eq!(
            key.as_str(),
            r#"profile::read::by_user:[]:{"include_posts":false,"user_uuid":"u-1"}"#
        );
    }

    #[test]
    fn scalar_arg_is_wrapped() {
        let key = CacheKey::derive("counter::read", "abc").unwrap();
        assert_eq!(key.as_str(), r#"counter::read:["abc"]:{}"#);
    }

    #[test]
    fn unit_args_render_empty_sections() {
        let key = CacheKey::derive("stats::total", &()).unwrap();
        assert_eq!(key.as_str(), "stats::total:[]:{}");
    }

    #[test]
    fn prefix_is_prepended_when_present() {
        let key = CacheKey::derive("f", &(1,)).unwrap();
        assert_eq!(key.clone().with_prefix("").as_str(), "f:[1]:{}");
        assert_eq!(key.with_prefix("profiles").as_str(), "profiles:f:[1]:{}");
    }

    #[test]
    fn optional_arguments_inside_a_tuple_stay_distinct() {
        let none = CacheKey::derive("op", &(None::<Vec<u8>>,)).unwrap();
        let empty = CacheKey::derive("op", &(Some(Vec::<u8>::new()),)).unwrap();
        assert_eq!(none.as_str(), "op:[null]:{}");
        assert_eq!(empty.as_str(), "op:[[]]:{}");
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = CacheKey::derive("op", &(bad,)).unwrap_err();
            assert!(matches!(err, CodecError::Serialization { .. }));
        }
        let nested = CacheKey::derive("op", &("a", vec![1.0f32, f32::NAN]));
        assert!(nested.is_err());
        assert_eq!(
            CacheKey::derive("op", &(1.5f64, "x")).unwrap().as_str(),
            r#"op:[1.5,"x"]:{}"#
        );
    }

    #[derive(Serialize)]
    struct Nested {
        name: String,
        scores: Vec<f64>,
        tag: Option<&'static str>,
        blob: Vec<u8>,
    }

    #[test]
    fn finite_nested_structs_are_accepted() {
        let key = CacheKey::derive(
            "op",
            &Nested {
                name: "x".repeat(40),
                scores: vec![0.5, -2.0, 1e300],
                tag: Some("t"),
                blob: vec![7; 300],
            },
        );
        assert!(key.is_ok());
    }

    proptest! {
        #[test]
        fn finite_floats_are_never_rejected(a in proptest::num::f64::NORMAL | proptest::num::f64::ZERO, s in ".{0,40}") {
            prop_assert!(CacheKey::derive("op", &(a, s)).is_ok());
        }

        #[test]
        fn identical_calls_share_a_key(a in ".{0,16}", b in any::<i64>()) {
            let first = CacheKey::derive("op", &(a.clone(), b)).unwrap();
            let second = CacheKey::derive("op", &(a, b)).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn distinct_args_never_collide(
            a in ".{0,16}", b in any::<i64>(),
            c in ".{0,16}", d in any::<i64>(),
        ) {
            prop_assume!((a.as_str(), b) != (c.as_str(), d));
            let first = CacheKey::derive("op", &(a, b)).unwrap();
            let second = CacheKey::derive("op", &(c, d)).unwrap();
            prop_assert_ne!(first, second);
        }
    }
}
