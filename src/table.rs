// src/table.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// A rectangular result: one header row, then data rows of the same width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { header, rows }
    }

    /// Build a table from the API's array-of-arrays body, row 0 being the header.
    pub fn from_json(body: Value) -> Result<Self, TransportError> {
        let Value::Array(outer) = body else {
            return Err(TransportError::Shape("body is not a JSON array".into()));
        };
        let mut outer = outer.into_iter();

        let header = match outer.next() {
            Some(Value::Array(cells)) => cells
                .into_iter()
                .map(|c| match c {
                    Value::String(s) => Ok(s),
                    other => Err(TransportError::Shape(format!(
                        "header cell is not a string: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(TransportError::Shape("header row is not an array".into())),
            None => return Err(TransportError::Shape("body has no header row".into())),
        };

        let mut rows = Vec::with_capacity(outer.len());
        for (i, row) in outer.enumerate() {
            match row {
                Value::Array(cells) if cells.len() == header.len() => rows.push(cells),
                Value::Array(cells) => {
                    return Err(TransportError::Shape(format!(
                        "row {} has {} cells, header has {}",
                        i + 1,
                        cells.len(),
                        header.len()
                    )))
                }
                _ => {
                    return Err(TransportError::Shape(format!(
                        "row {} is not an array",
                        i + 1
                    )))
                }
            }
        }

        Ok(Self { header, rows })
    }

    /// Index of the column called `name`, if any.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_row_becomes_header() {
        let t = Table::from_json(json!([
            ["NAME", "B01001_001E", "state"],
            ["Alabama", "5024279", "01"],
            ["Alaska", "733391", "02"]
        ]))
        .unwrap();
        assert_eq!(t.header, vec!["NAME", "B01001_001E", "state"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("state"), Some(2));
        assert_eq!(t.rows[1][0], json!("Alaska"));
    }

    #[test]
    fn header_only_is_empty() {
        let t = Table::from_json(json!([["AGEP"]])).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn rejects_ragged_and_non_array_bodies() {
        assert!(matches!(
            Table::from_json(json!({"error": "nope"})),
            Err(TransportError::Shape(_))
        ));
        assert!(matches!(
            Table::from_json(json!([])),
            Err(TransportError::Shape(_))
        ));
        assert!(matches!(
            Table::from_json(json!([["A", "B"], ["1"]])),
            Err(TransportError::Shape(_))
        ));
        assert!(matches!(
            Table::from_json(json!([[1, 2]])),
            Err(TransportError::Shape(_))
        ));
    }
}
