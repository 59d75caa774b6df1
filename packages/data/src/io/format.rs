//! Text encodings for exported documents.
//!
//! - `json`: pretty-printed JSON, lossless
//! - `csv`: an array of flat records; cell types are inferred on import
//! - `xml`: one element per value named after its type, lossless

use crate::errors::{DataError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Csv,
    Xml,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Xml => "xml",
        }
    }

    pub fn encode(&self, data: &Value) -> Result<String> {
        match self {
            Format::Json => Ok(serde_json::to_string_pretty(data)?),
            Format::Csv => encode_csv(data),
            Format::Xml => encode_xml(data),
        }
    }

    pub fn decode(&self, text: &str) -> Result<Value> {
        match self {
            Format::Json => {
                serde_json::from_str(text).map_err(|e| DataError::parse(self.as_str(), e))
            }
            Format::Csv => decode_csv(text),
            Format::Xml => decode_xml(text),
        }
    }
}

impl FromStr for Format {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            "xml" => Ok(Format::Xml),
            _ => Err(DataError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- CSV ---

fn encode_csv(data: &Value) -> Result<String> {
    let records: Vec<&Map<String, Value>> = match data {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| DataError::parse("csv", "every row must be an object"))
            })
            .collect::<Result<_>>()?,
        Value::Object(record) => vec![record],
        _ => {
            return Err(DataError::parse(
                "csv",
                "only objects or arrays of objects can be written",
            ))
        }
    };

    // Union of keys in first-seen order
    let mut headers: Vec<&str> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&headers)
        .map_err(|e| DataError::parse("csv", e))?;
    for record in &records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| record.get(*h).map(csv_cell).unwrap_or_default())
            .collect();
        writer
            .write_record(&row)
            .map_err(|e| DataError::parse("csv", e))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DataError::parse("csv", e))?;
    String::from_utf8(bytes).map_err(|e| DataError::parse("csv", e))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

fn decode_csv(text: &str) -> Result<Value> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| DataError::parse("csv", e))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DataError::parse("csv", e))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), infer_cell(cell)))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

fn infer_cell(cell: &str) -> Value {
    match cell {
        "" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = Number::from_str(cell) {
                return Value::Number(n);
            }
            if cell.starts_with('{') || cell.starts_with('[') {
                if let Ok(nested) = serde_json::from_str(cell) {
                    return nested;
                }
            }
            Value::String(cell.to_string())
        }
    }
}

// --- XML ---

const KEY_ATTR: &str = "key";
const VALUE_ATTR: &str = "value";

fn xml_err(e: impl ToString) -> DataError {
    DataError::parse("xml", e)
}

fn encode_xml(data: &Value) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    write_node(&mut writer, None, data)?;

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn write_node(writer: &mut Writer<Vec<u8>>, key: Option<&str>, value: &Value) -> Result<()> {
    let tag = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };

    let mut start = BytesStart::new(tag);
    if let Some(key) = key {
        start.push_attribute((KEY_ATTR, key));
    }

    match value {
        Value::Array(items) => {
            writer.write_event(Event::Start(start)).map_err(xml_err)?;
            for item in items {
                write_node(writer, None, item)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(tag)))
                .map_err(xml_err)?;
        }
        Value::Object(members) => {
            writer.write_event(Event::Start(start)).map_err(xml_err)?;
            for (member_key, member) in members {
                write_node(writer, Some(member_key), member)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(tag)))
                .map_err(xml_err)?;
        }
        Value::Null => {
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        }
        scalar => {
            let text = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            start.push_attribute((VALUE_ATTR, text.as_str()));
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        }
    }
    Ok(())
}

/// Open container or scalar element waiting for its end tag
enum Frame {
    Array(Option<String>, Vec<Value>),
    Object(Option<String>, Map<String, Value>),
    Scalar(Option<String>, Value),
}

struct Node {
    tag: String,
    key: Option<String>,
    value: Option<String>,
}

fn read_node(start: &BytesStart<'_>) -> Result<Node> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(xml_err)?
        .to_string();

    let mut node = Node {
        tag,
        key: None,
        value: None,
    };
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let raw = std::str::from_utf8(&attr.value).map_err(xml_err)?;
        let text = quick_xml::escape::unescape(raw).map_err(xml_err)?.into_owned();
        match attr.key.as_ref() {
            b"key" => node.key = Some(text),
            b"value" => node.value = Some(text),
            _ => {}
        }
    }
    Ok(node)
}

fn scalar(node: &Node) -> Result<Value> {
    let raw = || {
        node.value
            .as_deref()
            .ok_or_else(|| xml_err(format!("<{}> is missing its value", node.tag)))
    };

    match node.tag.as_str() {
        "null" => Ok(Value::Null),
        "string" => Ok(Value::String(raw()?.to_string())),
        "bool" => match raw()? {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(xml_err(format!("invalid bool '{}'", other))),
        },
        "number" => Number::from_str(raw()?)
            .map(Value::Number)
            .map_err(|e| xml_err(format!("invalid number: {}", e))),
        other => Err(xml_err(format!("unknown element <{}>", other))),
    }
}

fn attach(stack: &mut [Frame], root: &mut Option<Value>, key: Option<String>, value: Value) -> Result<()> {
    match stack.last_mut() {
        None if root.is_none() => {
            *root = Some(value);
            Ok(())
        }
        None => Err(xml_err("multiple root elements")),
        Some(Frame::Array(_, items)) => {
            items.push(value);
            Ok(())
        }
        Some(Frame::Object(_, members)) => {
            let key = key.ok_or_else(|| xml_err("object member without a key"))?;
            members.insert(key, value);
            Ok(())
        }
        Some(Frame::Scalar(..)) => Err(xml_err("scalar elements cannot have children")),
    }
}

fn decode_xml(text: &str) -> Result<Value> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(start) => {
                let node = read_node(&start)?;
                let frame = match node.tag.as_str() {
                    "array" => Frame::Array(node.key, Vec::new()),
                    "object" => Frame::Object(node.key, Map::new()),
                    _ => {
                        let value = scalar(&node)?;
                        Frame::Scalar(node.key, value)
                    }
                };
                stack.push(frame);
            }
            Event::Empty(start) => {
                let node = read_node(&start)?;
                let value = match node.tag.as_str() {
                    "array" => Value::Array(Vec::new()),
                    "object" => Value::Object(Map::new()),
                    _ => scalar(&node)?,
                };
                attach(&mut stack, &mut root, node.key, value)?;
            }
            Event::End(_) => {
                let (key, value) = match stack.pop() {
                    Some(Frame::Array(key, items)) => (key, Value::Array(items)),
                    Some(Frame::Object(key, members)) => (key, Value::Object(members)),
                    Some(Frame::Scalar(key, value)) => (key, value),
                    None => return Err(xml_err("unbalanced end tag")),
                };
                attach(&mut stack, &mut root, key, value)?;
            }
            Event::Eof => break,
            // Whitespace, declarations and comments carry no data
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(xml_err("unexpected end of document"));
    }
    root.ok_or_else(|| xml_err("document has no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_unknown_format_tag() {
        assert!(matches!(
            "yaml".parse::<Format>(),
            Err(DataError::UnsupportedFormat(tag)) if tag == "yaml"
        ));
        assert_eq!("XML".parse::<Format>().unwrap(), Format::Xml);
    }

    #[test]
    fn test_xml_is_lossless() {
        let data = json!({
            "title": "Fish & <Chips>",
            "count": 3,
            "ratio": 0.25,
            "big": u64::MAX,
            "flags": [true, false, null],
            "nested": { "empty": {}, "list": [], "quote": "\"hi\"\n'there'" },
            "blank": ""
        });

        let xml = Format::Xml.encode(&data).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert_eq!(Format::Xml.decode(&xml).unwrap(), data);
    }

    #[test]
    fn test_xml_scalar_root() {
        let xml = Format::Xml.encode(&json!("solo")).unwrap();
        assert_eq!(Format::Xml.decode(&xml).unwrap(), json!("solo"));
    }

    #[test]
    fn test_xml_rejects_unknown_elements() {
        let err = Format::Xml.decode("<object><widget key=\"a\"/></object>");
        assert!(matches!(err, Err(DataError::Parse { .. })));
    }

    #[test]
    fn test_csv_union_headers_and_inference() {
        let data = json!([
            { "id": 1, "name": "Ada", "active": true },
            { "id": 2, "email": "bob@example.com", "tags": ["x"] }
        ]);

        let text = Format::Csv.encode(&data).unwrap();
        assert_eq!(text.lines().next(), Some("active,id,name,email,tags"));

        let decoded = Format::Csv.decode(&text).unwrap();
        assert_eq!(
            decoded,
            json!([
                { "id": 1, "name": "Ada", "active": true, "email": null, "tags": null },
                { "id": 2, "name": null, "active": null, "email": "bob@example.com", "tags": ["x"] }
            ])
        );
    }

    #[test]
    fn test_csv_rejects_scalars() {
        assert!(Format::Csv.encode(&json!(42)).is_err());
        assert!(Format::Csv.encode(&json!([1, 2])).is_err());
    }
}
