//! Per-request message metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::projector::{project, Projected};
use crate::tree::XmlNode;

/// The `FieldTypes` table of a rowset message.
///
/// Keys are the `FieldTypes` children: a record element (e.g. `PERSON`)
/// maps to its fields, a field element maps directly to its `type` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTypes(BTreeMap<String, Projected<String>>);

impl FieldTypes {
    /// Project a `FieldTypes` element. Every leaf must carry a `type` attribute.
    pub fn from_element(element: &XmlNode) -> Result<Self, DecodeError> {
        let mut table = BTreeMap::new();
        for child in &element.children {
            table.insert(child.tag.clone(), project(child, &field_type)?);
        }
        Ok(Self(table))
    }

    /// Type of the field at `path`, e.g. `["PERSON", "EMPLID"]`.
    pub fn get(&self, path: &[&str]) -> Option<&str> {
        let (first, rest) = path.split_first()?;
        self.0.get(*first)?.get(rest)?.as_leaf().map(String::as_str)
    }

    /// Type of the first field named `field`, searching records in key order.
    pub fn find(&self, field: &str) -> Option<&str> {
        fn search<'a>(node: &'a Projected<String>, field: &str) -> Option<&'a str> {
            let map = node.as_branch()?;
            if let Some(Projected::Leaf(ty)) = map.get(field) {
                return Some(ty.as_str());
            }
            map.values().find_map(|child| search(child, field))
        }

        if let Some(Projected::Leaf(ty)) = self.0.get(field) {
            return Some(ty.as_str());
        }
        self.0.values().find_map(|node| search(node, field))
    }

    /// Number of top-level entries (records, or bare fields).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of typed fields across all records.
    pub fn field_count(&self) -> usize {
        self.0.values().map(Projected::leaf_count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Projected<String>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn field_type(node: &XmlNode) -> Result<String, DecodeError> {
    node.attribute("type")
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::MissingTypeAttribute {
            field: node.tag.clone(),
        })
}

/// Result of the header pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsetHeader {
    /// Local name of the document root, i.e. the PeopleSoft message name.
    pub message_name: String,
    pub field_types: FieldTypes,
}

/// Everything known about one inbound message before its transactions are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowsetMessage {
    pub message_name: String,
    pub field_types: FieldTypes,
    pub transaction_id: String,
    pub orig_time_stamp: String,
}

impl RowsetMessage {
    pub fn new(
        header: RowsetHeader,
        transaction_id: impl Into<String>,
        orig_time_stamp: impl Into<String>,
    ) -> Self {
        Self {
            message_name: header.message_name,
            field_types: header.field_types,
            transaction_id: transaction_id.into(),
            orig_time_stamp: orig_time_stamp.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_types(xml: &str) -> Result<FieldTypes, DecodeError> {
        FieldTypes::from_element(&XmlNode::parse(xml).unwrap())
    }

    #[test]
    fn flat_table() {
        let types = field_types(r#"<FieldTypes><FIELD1 type="char"/></FieldTypes>"#).unwrap();
        assert_eq!(types.find("FIELD1"), Some("char"));
        assert_eq!(types.get(&["FIELD1"]), Some("char"));
        assert_eq!(types.field_count(), 1);
    }

    #[test]
    fn record_table() {
        let types = field_types(
            r#"<FieldTypes>
                 <PERSON class="R"><EMPLID type="CHAR"/><BIRTHDATE type="DATE"/></PERSON>
                 <PSCAMA class="R"><AUDIT_ACTN type="CHAR"/></PSCAMA>
               </FieldTypes>"#,
        )
        .unwrap();

        assert_eq!(types.len(), 2);
        assert_eq!(types.field_count(), 3);
        assert_eq!(types.get(&["PERSON", "BIRTHDATE"]), Some("DATE"));
        assert_eq!(types.find("AUDIT_ACTN"), Some("CHAR"));
        assert_eq!(types.find("NOPE"), None);
    }

    #[test]
    fn empty_table() {
        let types = field_types("<FieldTypes/>").unwrap();
        assert!(types.is_empty());
    }

    #[test]
    fn missing_type_attribute() {
        let err = field_types(r#"<FieldTypes><PERSON><EMPLID/></PERSON></FieldTypes>"#).unwrap_err();
        match err {
            DecodeError::MissingTypeAttribute { field } => assert_eq!(field, "EMPLID"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_serializes_as_nested_json() {
        let header = RowsetHeader {
            message_name: "SYNC_MESSAGE".into(),
            field_types: field_types(r#"<FieldTypes><FIELD1 type="char"/></FieldTypes>"#).unwrap(),
        };
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message_name": "SYNC_MESSAGE", "field_types": {"FIELD1": "char"}})
        );
    }
}
