use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::qname::{QName, CONTENT_MODEL_URI, EXIF_MODEL_URI, IMAP_MODEL_URI};

/// Data types of repository properties.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Plain text.
    Text,
    /// Multilingual text, converted like [`DataType::Text`].
    MlText,
    /// 32-bit integers.
    Int,
    /// 64-bit integers.
    Long,
    /// Single precision floats.
    Float,
    /// Double precision floats.
    Double,
    /// Booleans.
    Boolean,
    /// Dates.
    Date,
    /// Dates with a time.
    DateTime,
    /// References to other nodes, `protocol://identifier/id`.
    NodeRef,
    /// Anything; values are not converted.
    Any,
}

impl DataType {
    /// Whether values of this type are parsed as dates.
    ///
    pub fn is_date(&self) -> bool {
        matches!(self, DataType::Date | DataType::DateTime)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Text => "d:text",
            DataType::MlText => "d:mltext",
            DataType::Int => "d:int",
            DataType::Long => "d:long",
            DataType::Float => "d:float",
            DataType::Double => "d:double",
            DataType::Boolean => "d:boolean",
            DataType::Date => "d:date",
            DataType::DateTime => "d:datetime",
            DataType::NodeRef => "d:noderef",
            DataType::Any => "d:any",
        };
        f.write_str(name)
    }
}

/// Looks up the definitions of properties.
///
pub trait Dictionary: Send + Sync {
    /// The data type of a property, or [`None`] if the property is not defined.
    ///
    fn property_type(&self, name: &QName) -> Option<DataType>;
}

/// A dictionary backed by a fixed table.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticDictionary {
    properties: HashMap<QName, DataType>,
}

impl StaticDictionary {
    /// Define a property.
    ///
    pub fn with_property(mut self, name: QName, data_type: DataType) -> Self {
        self.properties.insert(name, data_type);
        self
    }

    /// The properties the built-in extracters map to.
    ///
    pub fn content_model() -> Self {
        let cm = [
            ("name", DataType::Text),
            ("title", DataType::MlText),
            ("description", DataType::MlText),
            ("author", DataType::Text),
            ("created", DataType::DateTime),
            ("modified", DataType::DateTime),
            ("latitude", DataType::Double),
            ("longitude", DataType::Double),
            ("originator", DataType::Text),
            ("addressee", DataType::Text),
            ("addressees", DataType::Text),
            ("subjectline", DataType::Text),
            ("sentdate", DataType::DateTime),
            ("taggable", DataType::NodeRef),
        ];
        let exif = [
            ("dateTimeOriginal", DataType::DateTime),
            ("pixelXDimension", DataType::Int),
            ("pixelYDimension", DataType::Int),
            ("manufacturer", DataType::Text),
            ("model", DataType::Text),
            ("flash", DataType::Boolean),
            ("orientation", DataType::Int),
            ("focalLength", DataType::Double),
        ];
        let imap = [
            ("messageFrom", DataType::Text),
            ("messageTo", DataType::Text),
            ("messageCc", DataType::Text),
            ("messageSubject", DataType::Text),
            ("messageId", DataType::Text),
            ("threadIndex", DataType::Text),
            ("dateSent", DataType::DateTime),
            ("dateReceived", DataType::DateTime),
        ];

        let mut dictionary = Self::default();
        for (namespace, properties) in [
            (CONTENT_MODEL_URI, &cm[..]),
            (EXIF_MODEL_URI, &exif[..]),
            (IMAP_MODEL_URI, &imap[..]),
        ] {
            for (local_name, data_type) in properties {
                dictionary = dictionary.with_property(QName::new(namespace, *local_name), *data_type);
            }
        }
        dictionary
    }
}

impl Dictionary for StaticDictionary {
    fn property_type(&self, name: &QName) -> Option<DataType> {
        self.properties.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_model() {
        let dictionary = StaticDictionary::content_model();

        assert_eq!(dictionary.property_type(&QName::cm("created")), Some(DataType::DateTime));
        assert_eq!(
            dictionary.property_type(&QName::new(IMAP_MODEL_URI, "messageFrom")),
            Some(DataType::Text)
        );
        assert_eq!(dictionary.property_type(&QName::cm("undefined")), None);
    }

    #[test]
    fn test_with_property() {
        let dictionary = StaticDictionary::default().with_property(QName::new("urn:x", "count"), DataType::Int);

        assert_eq!(dictionary.property_type(&QName::new("urn:x", "count")), Some(DataType::Int));
        assert_eq!(DataType::Int.to_string(), "d:int");
    }
}
