//! Records, pages, and the dynamically-typed values they carry.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    ops::Deref,
};

use chrono::{DateTime, SecondsFormat, Utc};
use wkt::ToWkt;

/// Opaque identifier of a remote record.
///
/// # Examples
/// ```
/// # use verdant_core::RecordId;
/// let id = RecordId::new("recW0rKedExample");
/// assert_eq!(id.as_ref(), "recW0rKedExample");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Construct a new [`RecordId`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for RecordId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque continuation token returned by a paginated listing.
///
/// The token is never parsed or computed locally; its absence on a page
/// signals the final page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    /// Construct a new [`PageToken`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for PageToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for PageToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a remote table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    /// Construct a new [`TableName`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for TableName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dynamically-typed cell value.
///
/// The wire-representable variants (`Null`, `Bool`, `Number`, `Text`, `List`,
/// `Object`) convert losslessly from and to JSON. `Timestamp` and `Geometry`
/// only occur on the outbound path: the pipeline derives them locally and
/// the uploader coerces them to text before serialisation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing or undefined.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Numeric value; the remote service reports all numbers as doubles.
    Number(f64),
    /// Free-form text.
    Text(String),
    /// Date-time produced by local derivation, held in UTC.
    Timestamp(DateTime<Utc>),
    /// Ordered list of values (linked-record ids, attachments, multi-selects).
    List(Vec<Value>),
    /// String-keyed map (attachment descriptors and similar nested objects).
    Object(BTreeMap<String, Value>),
    /// Geospatial geometry produced by the local pipeline.
    Geometry(Box<geo::Geometry<f64>>),
}

impl Value {
    /// Convert a JSON value into a [`Value`].
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(flag),
            serde_json::Value::Number(number) => {
                number.as_f64().map_or(Self::Null, Self::Number)
            }
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Project the value onto JSON.
    ///
    /// `Timestamp` and `Geometry` have no wire representation of their own
    /// and are rendered as their canonical text forms (RFC 3339 and
    /// well-known text respectively).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(flag) => serde_json::Value::Bool(*flag),
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Timestamp(_) | Self::Geometry(_) => {
                serde_json::Value::String(self.to_string())
            }
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Borrow the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Return the numeric content, if this is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Borrow the list content, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the map content, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Whether the value is missing.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    /// Render the canonical text form used when the remote schema only
    /// accepts plain text: nulls become the empty string, whole numbers drop
    /// their fraction, timestamps use RFC 3339, geometries use well-known
    /// text, and nested values use their JSON rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(number) => {
                if number.fract() == 0.0 && number.is_finite() {
                    write!(f, "{number:.0}")
                } else {
                    write!(f, "{number}")
                }
            }
            Self::Text(text) => f.write_str(text),
            Self::Timestamp(instant) => {
                f.write_str(&instant.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Self::List(_) | Self::Object(_) => {
                f.write_str(&self.to_json().to_string())
            }
            Self::Geometry(geometry) => f.write_str(&geometry.wkt_string()),
        }
    }
}

/// A record fetched from a remote table: an opaque id plus named fields.
///
/// Fetched records are immutable; callers derive new rows for upload instead
/// of mutating a record in place.
///
/// # Examples
/// ```
/// # use std::collections::HashMap;
/// # use verdant_core::{Record, RecordId, Value};
/// let mut fields = HashMap::new();
/// fields.insert("plot_id".to_owned(), Value::Number(7.0));
/// let record = Record::new(RecordId::new("rec1"), fields);
/// assert_eq!(record.field("plot_id"), Some(&Value::Number(7.0)));
/// assert!(record.field("absent").is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: HashMap<String, Value>,
}

impl Record {
    /// Construct a record from its id and field map.
    #[must_use]
    pub fn new(id: RecordId, fields: HashMap<String, Value>) -> Self {
        Self { id, fields }
    }

    /// The record's opaque identifier.
    #[must_use]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Borrow the full field map.
    #[must_use]
    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Records carried by this page, in listing order.
    pub records: Vec<Record>,
    /// Continuation token; `None` on the final page.
    pub offset: Option<PageToken>,
}

impl Page {
    /// Construct a page from its records and optional continuation token.
    #[must_use]
    pub fn new(records: Vec<Record>, offset: Option<PageToken>) -> Self {
        Self { records, offset }
    }

    /// Whether this page terminates the listing.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.offset.is_none()
    }
}
