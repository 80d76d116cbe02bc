use std::cmp::Ordering;

use serde_json::Value;

use super::{Document, SortDirection, SortSpec};

/// Sort-order rank of a JSON type. Missing fields sort with `null`.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over optional JSON values: by type first, then by value.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(Some(left), Some(right));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Stable in-place sort; equal keys keep their current relative order.
pub fn sort_documents(docs: &mut [Document], sort: &SortSpec) {
    docs.sort_by(|a, b| {
        let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn orders_by_type_then_value() {
        assert_eq!(compare_values(None, Some(&json!(false))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(1)), Some(&json!("1"))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(1))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(compare_values(Some(&Value::Null), None), Ordering::Equal);
    }

    #[test]
    fn descending_sort_keeps_ties_in_insertion_order() {
        let mut docs = vec![
            doc(json!({"n": 1, "seq": "a"})),
            doc(json!({"n": 2, "seq": "b"})),
            doc(json!({"n": 1, "seq": "c"})),
            doc(json!({"n": 2, "seq": "d"})),
        ];
        sort_documents(
            &mut docs,
            &SortSpec {
                field: "n".to_string(),
                direction: SortDirection::Desc,
            },
        );

        let order: Vec<&str> = docs.iter().map(|d| d["seq"].as_str().unwrap()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }
}
