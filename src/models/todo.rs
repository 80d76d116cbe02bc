use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::Resource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Owner, stamped from the authenticated caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Resource for Todo {
    const COLLECTION: &'static str = "todos";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DocumentSchema, StoreError};
    use serde_json::json;

    #[test]
    fn title_is_required_and_completed_defaults_false() {
        let schema = DocumentSchema::of::<Todo>();

        let doc = json!({"title": "walk dog", "dueDate": "2024-05-01T10:00:00Z"});
        let stored = schema.prepare("t1", doc.as_object().cloned().unwrap()).unwrap();
        assert_eq!(stored["completed"], json!(false));
        assert_eq!(stored["dueDate"], json!("2024-05-01T10:00:00Z"));

        let err = schema.prepare("t2", json!({"completed": true}).as_object().cloned().unwrap());
        assert!(matches!(err, Err(StoreError::Validation { .. })));
    }

    #[test]
    fn malformed_due_date_is_rejected() {
        let schema = DocumentSchema::of::<Todo>();
        let doc = json!({"title": "x", "dueDate": "next tuesday"});
        assert!(schema.prepare("t1", doc.as_object().cloned().unwrap()).is_err());
    }
}
