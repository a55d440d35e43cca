//! Dot-notation field path traversal over JSON documents.
//!
//! Array fields use the `[]` suffix before the dot separator, e.g.
//! `"contacts[].phone"` visits the `phone` of every element of `contacts`.

use serde_json::Value;

/// Segments of a dot-notation field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Navigate into an object property by name.
    Key(String),
    /// Expand into every element of a JSON array.
    ArrayItem,
}

/// Parse a dot-notation path into a list of [`PathSegment`]s.
///
/// `"contacts[].phone"` → `[Key("contacts"), ArrayItem, Key("phone")]`.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if let Some(key) = part.strip_suffix("[]") {
            segments.push(PathSegment::Key(key.to_owned()));
            segments.push(PathSegment::ArrayItem);
        } else {
            segments.push(PathSegment::Key(part.to_owned()));
        }
    }
    segments
}

/// Apply `f` to every string leaf of `value` reached by `path`.
///
/// Missing fields, `null`s and non-string leaves are left alone. The first
/// error returned by `f` stops the walk.
pub fn for_each_string<E, F>(value: &mut Value, path: &str, mut f: F) -> Result<(), E>
where
    F: FnMut(&mut String) -> Result<(), E>,
{
    for_each_leaf(value, path, |leaf| match leaf {
        Value::String(s) => f(s),
        _ => Ok(()),
    })
}

/// Apply `f` to every value of `value` reached by `path`, whatever its type.
///
/// Only missing fields are skipped; `null`s, numbers, objects and arrays at
/// the end of the path are all handed to `f`.
pub fn for_each_leaf<E, F>(value: &mut Value, path: &str, mut f: F) -> Result<(), E>
where
    F: FnMut(&mut Value) -> Result<(), E>,
{
    let segments = parse_path(path);
    walk(value, &segments, &mut f)
}

fn walk<E, F>(value: &mut Value, segments: &[PathSegment], f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Value) -> Result<(), E>,
{
    let Some((head, rest)) = segments.split_first() else {
        return f(value);
    };

    match head {
        PathSegment::Key(key) => {
            if let Value::Object(map) = value {
                if let Some(child) = map.get_mut(key) {
                    walk(child, rest, f)?;
                }
            }
        }
        PathSegment::ArrayItem => {
            if let Value::Array(arr) = value {
                for item in arr.iter_mut() {
                    walk(item, rest, f)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upper(v: &mut Value, path: &str) {
        for_each_string::<(), _>(v, path, |s| {
            *s = s.to_uppercase();
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn parse_path_flat() {
        assert_eq!(parse_path("phone"), vec![PathSegment::Key("phone".into())]);
    }

    #[test]
    fn parse_path_nested() {
        assert_eq!(parse_path("emergency_contact.phone").len(), 2);
    }

    #[test]
    fn parse_path_array() {
        let segs = parse_path("contacts[].phone");
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1], PathSegment::ArrayItem);
    }

    #[test]
    fn visits_flat_field_only() {
        let mut v = json!({"address": "izmir", "full_name": "ayse"});
        upper(&mut v, "address");
        assert_eq!(v["address"], "IZMIR");
        assert_eq!(v["full_name"], "ayse");
    }

    #[test]
    fn visits_nested_field() {
        let mut v = json!({"emergency_contact": {"phone": "abc", "name": "x"}});
        upper(&mut v, "emergency_contact.phone");
        assert_eq!(v["emergency_contact"]["phone"], "ABC");
        assert_eq!(v["emergency_contact"]["name"], "x");
    }

    #[test]
    fn visits_every_array_element() {
        let mut v = json!({"contacts": [{"phone": "a"}, {"phone": "b"}, {"email": "c"}]});
        upper(&mut v, "contacts[].phone");
        assert_eq!(v["contacts"][0]["phone"], "A");
        assert_eq!(v["contacts"][1]["phone"], "B");
        assert_eq!(v["contacts"][2]["email"], "c");
    }

    #[test]
    fn missing_and_non_string_fields_are_noops() {
        let mut v = json!({"phone": null, "identity_number": 90123456789u64});
        upper(&mut v, "phone");
        upper(&mut v, "identity_number");
        upper(&mut v, "address");
        assert_eq!(v, json!({"phone": null, "identity_number": 90123456789u64}));
    }

    #[test]
    fn error_stops_the_walk() {
        let mut v = json!({"contacts": [{"phone": "a"}, {"phone": "b"}]});
        let mut seen = 0;
        let result = for_each_string(&mut v, "contacts[].phone", |_| {
            seen += 1;
            Err("boom")
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(seen, 1);
    }

    #[test]
    fn leaf_walk_sees_every_type() {
        let mut v = json!({
            "identity_number": 90123456789u64,
            "address": {"city": "Istanbul"},
            "phone": null,
        });
        let mut kinds = Vec::new();
        for path in ["identity_number", "address", "phone", "notes"] {
            for_each_leaf::<(), _>(&mut v, path, |leaf| {
                kinds.push(match leaf {
                    Value::Null => "null",
                    Value::Number(_) => "number",
                    Value::Object(_) => "object",
                    _ => "other",
                });
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(kinds, vec!["number", "object", "null"]);
    }
}
