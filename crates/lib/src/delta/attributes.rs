//! Operations over formatting attribute maps.
//!
//! A `null` value means "remove this attribute" inside a change. Inserts
//! never carry nulls once composed.

use serde_json::Value;

use super::op::AttributeMap;

fn non_empty(map: AttributeMap) -> Option<AttributeMap> {
    (!map.is_empty()).then_some(map)
}

/// Apply `b` on top of `a`. Nulls in `b` survive only when `keep_null` is set,
/// which is the case when the left side is itself a change (a retain).
pub fn compose(
    a: Option<&AttributeMap>,
    b: Option<&AttributeMap>,
    keep_null: bool,
) -> Option<AttributeMap> {
    let mut attributes: AttributeMap = b
        .into_iter()
        .flatten()
        .filter(|(_, value)| keep_null || !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if let Some(a) = a {
        for (key, value) in a {
            if !b.is_some_and(|b| b.contains_key(key)) {
                attributes.insert(key.clone(), value.clone());
            }
        }
    }
    non_empty(attributes)
}

/// The change that turns attributes `a` into attributes `b`.
pub fn diff(a: Option<&AttributeMap>, b: Option<&AttributeMap>) -> Option<AttributeMap> {
    let empty = AttributeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    let mut attributes = AttributeMap::new();
    for key in a.keys().chain(b.keys()) {
        if a.get(key) != b.get(key) {
            attributes.insert(key.clone(), b.get(key).cloned().unwrap_or(Value::Null));
        }
    }
    non_empty(attributes)
}

/// The change that undoes `attr` when applied over `base`.
pub fn invert(attr: Option<&AttributeMap>, base: Option<&AttributeMap>) -> AttributeMap {
    let empty = AttributeMap::new();
    let attr = attr.unwrap_or(&empty);
    let base = base.unwrap_or(&empty);
    let mut inverted = AttributeMap::new();
    for (key, value) in base {
        if attr.get(key).is_some_and(|changed| changed != value) {
            inverted.insert(key.clone(), value.clone());
        }
    }
    for key in attr.keys() {
        if !base.contains_key(key) {
            inverted.insert(key.clone(), Value::Null);
        }
    }
    inverted
}

/// Rebase `b` over a concurrent `a`. With priority, `a` wins on shared keys.
pub fn transform(
    a: Option<&AttributeMap>,
    b: Option<&AttributeMap>,
    priority: bool,
) -> Option<AttributeMap> {
    let Some(a) = a else {
        return b.cloned();
    };
    let b = b?;
    if !priority {
        return Some(b.clone());
    }
    non_empty(
        b.iter()
            .filter(|(key, _)| !a.contains_key(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}
