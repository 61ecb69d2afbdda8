//! Operation application and undo replay.
//!
//! The forward direction ([`apply_op`]) applies one [`Op`] to a document and
//! reports it as a [`Change`] carrying the previous state at the target
//! path. The reverse direction ([`apply_previous`]) is the path patcher: it
//! puts a recorded previous value back, handling the degenerate empty-path
//! case (whole-root array replacement in place).

use crate::{
    error::{value_type_name, WatchiError, WatchiResult},
    Change, Number, Op, Path, Previous, Seg,
};
use serde_json::{Map, Value};

/// Apply a single operation to a document in place.
///
/// The previous state is captured before the write lands; if the operation
/// fails, no change is reported. When the write creates structure that did
/// not exist (intermediate objects, a fresh array), the change is recorded
/// at the shallowest created segment, so one replay removes the whole
/// subtree instead of just the leaf.
pub(crate) fn apply_op(doc: &mut Value, op: &Op) -> WatchiResult<Change> {
    let (path, previous) = capture_previous(doc, op.path());

    match op {
        Op::Set { path, value } => apply_set(doc, path, value.clone())?,
        Op::Delete { path } => apply_delete(doc, path),
        Op::Append { path, value } => apply_append(doc, path, value.clone())?,
        Op::Insert { path, index, value } => apply_insert(doc, path, *index, value.clone())?,
        Op::Remove { path, value } => apply_remove(doc, path, value)?,
        Op::Splice { path, items } => apply_splice(doc, path, items)?,
        Op::Increment { path, amount } => apply_add(doc, path, amount, 1.0)?,
        Op::Decrement { path, amount } => apply_add(doc, path, amount, -1.0)?,
    }

    Ok(Change::new(path, previous))
}

/// Restore a recorded previous value at a path (the revert direction).
///
/// - Empty path, both sides arrays: in-place structural replace, so the root
///   keeps its identity for external holders.
/// - Empty path otherwise: the whole root is assigned back.
/// - Otherwise: walk to the parent and assign at the final segment;
///   [`Previous::Absent`] removes the key or index instead.
///
/// Paths are expected to come from the observer on the same document shape;
/// a path that no longer resolves is an error, not a recoverable condition.
pub(crate) fn apply_previous(
    doc: &mut Value,
    path: &Path,
    previous: &Previous,
) -> WatchiResult<()> {
    let value = match previous {
        Previous::Existing(v) => v,
        Previous::Absent => {
            delete_at_path(doc, path.segments());
            return Ok(());
        }
    };

    if path.is_empty() {
        if let (Value::Array(root), Value::Array(items)) = (&mut *doc, value) {
            root.clear();
            root.extend(items.iter().cloned());
        } else {
            *doc = value.clone();
        }
        return Ok(());
    }

    let (parent_segs, last) = path.segments().split_at(path.len() - 1);
    let parent = get_at_path_mut(doc, parent_segs)
        .ok_or_else(|| WatchiError::path_unresolvable(path.clone()))?;

    let found = value_type_name(parent);
    match &last[0] {
        Seg::Key(key) => {
            let obj = parent
                .as_object_mut()
                .ok_or_else(|| WatchiError::type_mismatch(path.clone(), "object", found))?;
            obj.insert(key.clone(), value.clone());
        }
        Seg::Index(idx) => {
            let arr = parent
                .as_array_mut()
                .ok_or_else(|| WatchiError::type_mismatch(path.clone(), "array", found))?;
            if *idx >= arr.len() {
                return Err(WatchiError::index_out_of_bounds(
                    path.clone(),
                    *idx,
                    arr.len(),
                ));
            }
            arr[*idx] = value.clone();
        }
    }

    Ok(())
}

/// Capture the undo record for a write targeting `path`.
///
/// Walks the document toward the target. The record lands at the first
/// segment the write will have to create (missing entry) or structurally
/// replace (a non-container where further traversal is needed); if the walk
/// reaches the target, the record is the full path with the value found
/// there.
fn capture_previous(doc: &Value, path: &Path) -> (Path, Previous) {
    let segments = path.segments();
    let mut current = doc;

    for (i, seg) in segments.iter().enumerate() {
        let child = match seg {
            Seg::Key(key) => current.get(key),
            Seg::Index(idx) => current.get(*idx),
        };
        let prefix = || Path::from_segments(segments[..=i].to_vec());
        match child {
            None => return (prefix(), Previous::Absent),
            Some(v) => {
                let is_leaf = i == segments.len() - 1;
                if !is_leaf && !v.is_object() && !v.is_array() {
                    return (prefix(), Previous::Existing(v.clone()));
                }
                current = v;
            }
        }
    }

    (path.clone(), Previous::Existing(current.clone()))
}

fn apply_set(doc: &mut Value, path: &Path, value: Value) -> WatchiResult<()> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    set_at_path(doc, path.segments(), value, path)
}

/// Recursively set a value at a path, creating intermediate objects as needed.
fn set_at_path(
    current: &mut Value,
    segments: &[Seg],
    value: Value,
    full_path: &Path,
) -> WatchiResult<()> {
    match segments {
        [] => {
            *current = value;
            Ok(())
        }
        [Seg::Key(key), rest @ ..] => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }

            let obj = current.as_object_mut().unwrap();

            if rest.is_empty() {
                obj.insert(key.clone(), value);
            } else {
                let entry = obj.entry(key.clone()).or_insert(Value::Null);
                set_at_path(entry, rest, value, full_path)?;
            }
            Ok(())
        }
        [Seg::Index(idx), rest @ ..] => {
            if !current.is_array() {
                return Err(WatchiError::type_mismatch(
                    full_path.clone(),
                    "array",
                    value_type_name(current),
                ));
            }

            let arr = current.as_array_mut().unwrap();

            if *idx >= arr.len() {
                return Err(WatchiError::index_out_of_bounds(
                    full_path.clone(),
                    *idx,
                    arr.len(),
                ));
            }

            if rest.is_empty() {
                arr[*idx] = value;
            } else {
                set_at_path(&mut arr[*idx], rest, value, full_path)?;
            }
            Ok(())
        }
    }
}

fn apply_delete(doc: &mut Value, path: &Path) {
    if path.is_empty() {
        *doc = Value::Null;
        return;
    }
    // No-op if the path doesn't exist.
    delete_at_path(doc, path.segments());
}

/// Try to delete a value at a path. Missing paths are ignored.
fn delete_at_path(current: &mut Value, segments: &[Seg]) {
    match segments {
        [] => {}
        [Seg::Key(key)] => {
            if let Some(obj) = current.as_object_mut() {
                obj.remove(key);
            }
        }
        [Seg::Index(idx)] => {
            if let Some(arr) = current.as_array_mut() {
                if *idx < arr.len() {
                    arr.remove(*idx);
                }
            }
        }
        [Seg::Key(key), rest @ ..] => {
            if let Some(child) = current.as_object_mut().and_then(|o| o.get_mut(key)) {
                delete_at_path(child, rest);
            }
        }
        [Seg::Index(idx), rest @ ..] => {
            if let Some(child) = current.as_array_mut().and_then(|a| a.get_mut(*idx)) {
                delete_at_path(child, rest);
            }
        }
    }
}

fn apply_append(doc: &mut Value, path: &Path, value: Value) -> WatchiResult<()> {
    let target = get_or_create_at_path(doc, path, 0, || Value::Array(vec![]))?;

    match target {
        Value::Array(arr) => {
            arr.push(value);
            Ok(())
        }
        _ => Err(WatchiError::type_mismatch(
            path.clone(),
            "array",
            value_type_name(target),
        )),
    }
}

fn apply_insert(doc: &mut Value, path: &Path, index: usize, value: Value) -> WatchiResult<()> {
    let target = get_at_path_mut(doc, path.segments())
        .ok_or_else(|| WatchiError::path_unresolvable(path.clone()))?;

    match target {
        Value::Array(arr) => {
            if index > arr.len() {
                return Err(WatchiError::index_out_of_bounds(
                    path.clone(),
                    index,
                    arr.len(),
                ));
            }
            arr.insert(index, value);
            Ok(())
        }
        _ => Err(WatchiError::type_mismatch(
            path.clone(),
            "array",
            value_type_name(target),
        )),
    }
}

fn apply_remove(doc: &mut Value, path: &Path, value: &Value) -> WatchiResult<()> {
    let target = get_at_path_mut(doc, path.segments())
        .ok_or_else(|| WatchiError::path_unresolvable(path.clone()))?;

    match target {
        Value::Array(arr) => {
            if let Some(pos) = arr.iter().position(|v| v == value) {
                arr.remove(pos);
            }
            Ok(())
        }
        _ => Err(WatchiError::type_mismatch(
            path.clone(),
            "array",
            value_type_name(target),
        )),
    }
}

fn apply_splice(doc: &mut Value, path: &Path, items: &[Value]) -> WatchiResult<()> {
    let target = get_at_path_mut(doc, path.segments())
        .ok_or_else(|| WatchiError::path_unresolvable(path.clone()))?;

    match target {
        Value::Array(arr) => {
            arr.clear();
            arr.extend(items.iter().cloned());
            Ok(())
        }
        _ => Err(WatchiError::type_mismatch(
            path.clone(),
            "array",
            value_type_name(target),
        )),
    }
}

/// Shared implementation of increment/decrement; `sign` is +1.0 or -1.0.
fn apply_add(doc: &mut Value, path: &Path, amount: &Number, sign: f64) -> WatchiResult<()> {
    let target = get_at_path_mut(doc, path.segments())
        .ok_or_else(|| WatchiError::path_unresolvable(path.clone()))?;

    let n = match target {
        Value::Number(n) => n,
        _ => return Err(WatchiError::numeric_on_non_number(path.clone())),
    };

    let result = if let (Some(i), Number::Int(a)) = (n.as_i64(), amount) {
        let delta = if sign < 0.0 { a.checked_neg() } else { Some(*a) };
        let value = delta.and_then(|d| i.checked_add(d)).ok_or_else(|| {
            WatchiError::invalid_operation(format!("arithmetic overflow at {path}"))
        })?;
        Value::Number(value.into())
    } else {
        let f = n
            .as_f64()
            .ok_or_else(|| WatchiError::numeric_on_non_number(path.clone()))?;
        let value = f + sign * amount.as_f64();
        if !value.is_finite() {
            return Err(WatchiError::invalid_operation(format!(
                "arithmetic produced non-finite value at {path}"
            )));
        }
        let num = serde_json::Number::from_f64(value).ok_or_else(|| {
            WatchiError::invalid_operation(format!(
                "arithmetic produced non-representable value at {path}"
            ))
        })?;
        Value::Number(num)
    };

    *target = result;
    Ok(())
}

fn get_at_path_mut<'a>(current: &'a mut Value, segments: &[Seg]) -> Option<&'a mut Value> {
    match segments {
        [] => Some(current),
        [Seg::Key(key), rest @ ..] => {
            let child = current.as_object_mut()?.get_mut(key)?;
            get_at_path_mut(child, rest)
        }
        [Seg::Index(idx), rest @ ..] => {
            let child = current.as_array_mut()?.get_mut(*idx)?;
            get_at_path_mut(child, rest)
        }
    }
}

/// Get or create a value at a path, inserting `default` at the leaf.
fn get_or_create_at_path<'a, F>(
    current: &'a mut Value,
    full_path: &Path,
    consumed: usize,
    default: F,
) -> WatchiResult<&'a mut Value>
where
    F: Fn() -> Value,
{
    let segments = &full_path.segments()[consumed..];
    match segments {
        [] => {
            if current.is_null() {
                *current = default();
            }
            Ok(current)
        }
        [Seg::Key(key), ..] => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }

            let obj = current.as_object_mut().unwrap();
            let entry = obj.entry(key.clone()).or_insert(Value::Null);
            get_or_create_at_path(entry, full_path, consumed + 1, default)
        }
        [Seg::Index(idx), ..] => {
            let error_path = Path::from_segments(full_path.segments()[..=consumed].to_vec());

            if !current.is_array() {
                return Err(WatchiError::type_mismatch(
                    error_path,
                    "array",
                    value_type_name(current),
                ));
            }

            let arr = current.as_array_mut().unwrap();

            if *idx >= arr.len() {
                return Err(WatchiError::index_out_of_bounds(error_path, *idx, arr.len()));
            }

            get_or_create_at_path(&mut arr[*idx], full_path, consumed + 1, default)
        }
    }
}

/// Get a reference to a value at a path (for reading).
pub fn get_at_path<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path.segments() {
        match seg {
            Seg::Key(key) => {
                current = current.get(key)?;
            }
            Seg::Index(idx) => {
                current = current.get(idx)?;
            }
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_apply_set_reports_previous() {
        let mut doc = json!({"count": 3});
        let change = apply_op(&mut doc, &Op::set(path!("count"), json!(7))).unwrap();

        assert_eq!(doc["count"], 7);
        assert_eq!(change.path, path!("count"));
        assert_eq!(change.previous, Previous::Existing(json!(3)));
    }

    #[test]
    fn test_apply_set_new_key_reports_absent() {
        let mut doc = json!({});
        let change = apply_op(&mut doc, &Op::set(path!("fresh"), json!(1))).unwrap();

        assert_eq!(doc["fresh"], 1);
        assert_eq!(change.previous, Previous::Absent);
    }

    #[test]
    fn test_apply_set_creates_intermediate_objects() {
        let mut doc = json!({});
        let change = apply_op(&mut doc, &Op::set(path!("a", "b", "c"), json!(42))).unwrap();
        assert_eq!(doc["a"]["b"]["c"], 42);

        // Recorded at the shallowest created segment, not the leaf.
        assert_eq!(change.path, path!("a"));
        assert_eq!(change.previous, Previous::Absent);
    }

    #[test]
    fn test_deep_create_revert_removes_whole_subtree() {
        let mut doc = json!({});
        let change = apply_op(&mut doc, &Op::set(path!("a", "b", "c"), json!(42))).unwrap();

        apply_previous(&mut doc, &change.path, &change.previous).unwrap();
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn test_partial_create_records_first_missing_segment() {
        let mut doc = json!({"a": {"keep": 1}});
        let change = apply_op(&mut doc, &Op::set(path!("a", "b", "c"), json!(42))).unwrap();
        assert_eq!(change.path, path!("a", "b"));
        assert_eq!(change.previous, Previous::Absent);

        apply_previous(&mut doc, &change.path, &change.previous).unwrap();
        assert_eq!(doc, json!({"a": {"keep": 1}}));
    }

    #[test]
    fn test_set_through_scalar_records_replaced_value() {
        let mut doc = json!({"a": 5});
        let change = apply_op(&mut doc, &Op::set(path!("a", "b"), json!(1))).unwrap();
        assert_eq!(doc, json!({"a": {"b": 1}}));

        // The write replaced the scalar at "a" with an object; the record
        // carries the scalar so replay restores it.
        assert_eq!(change.path, path!("a"));
        assert_eq!(change.previous, Previous::Existing(json!(5)));

        apply_previous(&mut doc, &change.path, &change.previous).unwrap();
        assert_eq!(doc, json!({"a": 5}));
    }

    #[test]
    fn test_apply_set_array_oob() {
        let mut doc = json!({"arr": [1, 2, 3]});
        let result = apply_op(&mut doc, &Op::set(path!("arr", 10), json!(42)));
        assert!(matches!(result, Err(WatchiError::IndexOutOfBounds { .. })));
        // Failed op leaves the document untouched.
        assert_eq!(doc, json!({"arr": [1, 2, 3]}));
    }

    #[test]
    fn test_apply_delete() {
        let mut doc = json!({"x": 1, "y": 2});
        let change = apply_op(&mut doc, &Op::delete(path!("x"))).unwrap();
        assert_eq!(doc, json!({"y": 2}));
        assert_eq!(change.previous, Previous::Existing(json!(1)));
    }

    #[test]
    fn test_apply_delete_missing_is_noop() {
        let mut doc = json!({"x": 1});
        let change = apply_op(&mut doc, &Op::delete(path!("nope"))).unwrap();
        assert_eq!(doc, json!({"x": 1}));
        assert_eq!(change.previous, Previous::Absent);
    }

    #[test]
    fn test_apply_append_records_whole_array() {
        let mut doc = json!({"items": [1, 2]});
        let change = apply_op(&mut doc, &Op::append(path!("items"), json!(3))).unwrap();
        assert_eq!(doc["items"], json!([1, 2, 3]));
        assert_eq!(change.previous, Previous::Existing(json!([1, 2])));
    }

    #[test]
    fn test_apply_append_creates_array() {
        let mut doc = json!({});
        let change = apply_op(&mut doc, &Op::append(path!("items"), json!(1))).unwrap();
        assert_eq!(doc["items"], json!([1]));
        assert_eq!(change.previous, Previous::Absent);
    }

    #[test]
    fn test_apply_insert_and_remove() {
        let mut doc = json!({"arr": [1, 2, 3]});
        apply_op(&mut doc, &Op::insert(path!("arr"), 1, json!(99))).unwrap();
        assert_eq!(doc["arr"], json!([1, 99, 2, 3]));

        apply_op(&mut doc, &Op::remove(path!("arr"), json!(99))).unwrap();
        assert_eq!(doc["arr"], json!([1, 2, 3]));
    }

    #[test]
    fn test_apply_splice_root_array() {
        let mut doc = json!([1, 2, 3]);
        let change =
            apply_op(&mut doc, &Op::splice(path!(), vec![json!(9), json!(8)])).unwrap();
        assert_eq!(doc, json!([9, 8]));
        assert!(change.path.is_empty());
        assert_eq!(change.previous, Previous::Existing(json!([1, 2, 3])));
    }

    #[test]
    fn test_apply_splice_non_array_fails() {
        let mut doc = json!({"x": 1});
        let result = apply_op(&mut doc, &Op::splice(path!("x"), vec![]));
        assert!(matches!(result, Err(WatchiError::TypeMismatch { .. })));
    }

    #[test]
    fn test_apply_increment_decrement() {
        let mut doc = json!({"count": 5});
        apply_op(&mut doc, &Op::increment(path!("count"), 3i64)).unwrap();
        assert_eq!(doc["count"], 8);
        apply_op(&mut doc, &Op::decrement(path!("count"), 10i64)).unwrap();
        assert_eq!(doc["count"], -2);
    }

    #[test]
    fn test_apply_increment_non_number_fails() {
        let mut doc = json!({"name": "x"});
        let result = apply_op(&mut doc, &Op::increment(path!("name"), 1i64));
        assert!(matches!(
            result,
            Err(WatchiError::NumericOperationOnNonNumber { .. })
        ));
    }

    #[test]
    fn test_apply_increment_nan_fails() {
        let mut doc = json!({"count": 5});
        let result = apply_op(&mut doc, &Op::increment(path!("count"), f64::NAN));
        assert!(matches!(result, Err(WatchiError::InvalidOperation { .. })));
    }

    #[test]
    fn test_revert_existing_value() {
        let mut doc = json!({"count": 7});
        apply_previous(&mut doc, &path!("count"), &Previous::Existing(json!(3))).unwrap();
        assert_eq!(doc["count"], 3);
    }

    #[test]
    fn test_revert_absent_removes_key() {
        let mut doc = json!({"fresh": 1, "keep": 2});
        apply_previous(&mut doc, &path!("fresh"), &Previous::Absent).unwrap();
        assert_eq!(doc, json!({"keep": 2}));
    }

    #[test]
    fn test_revert_empty_path_array_in_place() {
        let mut doc = json!([9, 8]);
        apply_previous(&mut doc, &path!(), &Previous::Existing(json!([1, 2, 3]))).unwrap();
        assert_eq!(doc, json!([1, 2, 3]));
    }

    #[test]
    fn test_revert_empty_path_non_array_replaces_root() {
        let mut doc = json!({"x": 1});
        apply_previous(&mut doc, &path!(), &Previous::Existing(json!({"y": 2}))).unwrap();
        assert_eq!(doc, json!({"y": 2}));
    }

    #[test]
    fn test_revert_unresolvable_path_fails() {
        let mut doc = json!({});
        let result = apply_previous(
            &mut doc,
            &path!("gone", "deep"),
            &Previous::Existing(json!(1)),
        );
        assert!(matches!(result, Err(WatchiError::PathUnresolvable { .. })));
    }

    #[test]
    fn test_get_at_path() {
        let doc = json!({"a": {"b": {"c": 42}}});
        assert_eq!(get_at_path(&doc, &path!("a", "b", "c")), Some(&json!(42)));
        assert_eq!(get_at_path(&doc, &path!("a", "x")), None);
    }
}
