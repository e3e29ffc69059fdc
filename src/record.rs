use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TagError;

/// The `{id, name, price}` item stored on a tag.
///
/// Field order is the on-tag order; serialization is compact JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub price: f64,
}

/// An item as submitted for writing, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRecord {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub id: Option<String>,
}

impl NewRecord {
    /// Check the fields and produce a record, generating an id if none was given.
    ///
    /// Duplicate ids are checked by the caller against the store.
    pub fn validate(self) -> Result<Record, TagError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(TagError::invalid_input("Item name cannot be empty"));
        }
        if !self.price.is_finite() {
            return Err(TagError::invalid_input("Item price must be a finite number"));
        }
        if self.price < 0.0 {
            return Err(TagError::invalid_input("Item price cannot be negative"));
        }

        let id = match self.id {
            Some(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(TagError::invalid_input("Item ID cannot be empty"));
                }
                id.to_owned()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        Ok(Record {
            id,
            name: name.to_owned(),
            price: self.price,
        })
    }
}

impl Record {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TagError> {
        serde_json::to_vec(self)
            .map_err(|e| TagError::invalid_input(format!("Item could not be serialized: {e}")))
    }

    /// Parse the bytes decoded from a tag.
    pub fn from_tag_bytes(bytes: &[u8]) -> Result<Record, TagError> {
        let text = std::str::from_utf8(bytes)?;
        let value: Value = serde_json::from_str(text)?;

        let Value::Object(fields) = &value else {
            return Err(TagError::MissingFields("expected a JSON object".into()));
        };
        let missing: Vec<&str> = ["id", "name", "price"]
            .into_iter()
            .filter(|k| !fields.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(TagError::MissingFields(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        serde_json::from_value(value).map_err(|e| TagError::MissingFields(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(name: &str, price: f64, id: Option<&str>) -> NewRecord {
        NewRecord {
            name: name.into(),
            price,
            id: id.map(Into::into),
        }
    }

    #[test]
    fn serializes_compactly_in_field_order() {
        let record = Record {
            id: "abc".into(),
            name: "Widget".into(),
            price: 9.99,
        };
        assert_eq!(record.to_bytes().unwrap(), br#"{"id":"abc","name":"Widget","price":9.99}"#);
    }

    #[test]
    fn validation_trims_fields() {
        let record = new("  Widget ", 1.5, Some(" abc ")).validate().unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.name, "Widget");
    }

    #[test]
    fn generates_id_when_absent() {
        let record = new("Widget", 0.0, None).validate().unwrap();
        assert!(uuid::Uuid::parse_str(&record.id).is_ok(), "{}", record.id);
    }

    #[test]
    fn rejects_bad_fields() {
        for (req, msg) in [
            (new("  ", 1.0, None), "Item name cannot be empty"),
            (new("Widget", -0.01, None), "Item price cannot be negative"),
            (new("Widget", f64::NAN, None), "Item price must be a finite number"),
            (new("Widget", 1.0, Some("   ")), "Item ID cannot be empty"),
        ] {
            match req.validate() {
                Err(TagError::InvalidInput(m)) => assert_eq!(m, msg),
                other => panic!("expected invalid input, got {other:?}"),
            }
        }
    }

    #[test]
    fn parses_tag_bytes() {
        let record = Record::from_tag_bytes(br#"{"id":"abc","name":"Widget","price":9.99}"#).unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.price, 9.99);
    }

    #[test]
    fn integer_price_is_accepted() {
        let record = Record::from_tag_bytes(br#"{"id":"a","name":"b","price":3}"#).unwrap();
        assert_eq!(record.price, 3.0);
    }

    #[test]
    fn classifies_bad_tag_bytes() {
        assert!(matches!(
            Record::from_tag_bytes(&[0xff, 0xfe]),
            Err(TagError::MalformedUtf8(_))
        ));
        assert!(matches!(
            Record::from_tag_bytes(b"{\"id\":"),
            Err(TagError::MalformedJson(_))
        ));
        assert!(matches!(
            Record::from_tag_bytes(b"[1,2]"),
            Err(TagError::MissingFields(_))
        ));
        match Record::from_tag_bytes(br#"{"id":"a"}"#) {
            Err(TagError::MissingFields(m)) => assert_eq!(m, "missing name, price"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            Record::from_tag_bytes(br#"{"id":"a","name":"b","price":"free"}"#),
            Err(TagError::MissingFields(_))
        ));
    }
}
