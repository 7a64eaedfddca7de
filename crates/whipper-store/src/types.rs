//! Store types: registry entries, result rows, input tables.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prompt registry entry persisted to prompts.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDefinition {
    #[serde(rename = "No")]
    pub id: String,
    #[serde(rename = "Date")]
    pub created_date: String,
    #[serde(rename = "prompt")]
    pub template: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub parent_message_id: Option<String>,
}

/// One processed input and the reply it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub result: String,
    pub input: String,
    /// Marked by a reviewer as wrong; candidates for a redo run.
    #[serde(rename = "Is false", default)]
    pub flagged: bool,
    #[serde(rename = "Comment", default)]
    pub comment: String,
}

impl ResultRow {
    pub fn new(input: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            input: input.into(),
            flagged: false,
            comment: String::new(),
        }
    }
}

/// Reviewer edit for one result row, addressed by position.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewEdit {
    pub index: usize,
    #[serde(default)]
    pub flagged: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Request body for adding a prompt.
#[derive(Debug, Deserialize)]
pub struct AddPromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub name: String,
}

/// An uploaded input table: one JSON object per row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputTable {
    pub rows: Vec<Map<String, Value>>,
}

impl InputTable {
    /// Column names in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// The values of one column as text; missing cells are empty.
    pub fn column(&self, field: &str) -> Option<Vec<String>> {
        if !self.rows.iter().any(|row| row.contains_key(field)) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| match row.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_row_columns() {
        let row = ResultRow::new("cat", "animal");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            json!({"result": "animal", "input": "cat", "Is false": false, "Comment": ""})
        );
    }

    #[test]
    fn test_prompt_definition_columns() {
        let json = json!({"No": "intro_0", "Date": "2024-01-02", "prompt": "Classify: "});
        let def: PromptDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(def.id, "intro_0");
        assert_eq!(def.template, "Classify: ");
        assert!(def.conversation_id.is_none());
    }

    #[test]
    fn test_input_table_column() {
        let table: InputTable = serde_json::from_value(json!({"rows": [
            {"animal": "cat", "legs": 4},
            {"animal": "bird"},
            {"animal": null, "legs": 2}
        ]}))
        .unwrap();

        assert_eq!(table.columns(), vec!["animal", "legs"]);
        assert_eq!(table.column("animal").unwrap(), vec!["cat", "bird", ""]);
        assert_eq!(table.column("legs").unwrap(), vec!["4", "", "2"]);
        assert!(table.column("colour").is_none());
    }
}
