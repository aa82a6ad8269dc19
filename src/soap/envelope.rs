//! rpc/encoded SOAP 1.1 envelopes.
//!
//! Requests are written with SOAP-ENC typing (`xsi:type` on every value).
//! Responses are read into a small element tree first, then turned into
//! [`SoapValue`]s the way rpc/encoded servers lay them out:
//!
//! - elements with `SOAP-ENC:arrayType` or an `Array` type are lists
//! - Apache `Map` typed elements are associative arrays of `item/key/value`
//! - other elements with children are structs; a repeated child name turns
//!   that field into a list, in document order
//! - leaves are scalars typed by their `xsi:type`

use std::collections::HashMap;
use std::io::Cursor;

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::value::{Scalar, SoapValue};
use super::{SoapError, SoapResult};

pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const APACHE_MAP_NS: &str = "http://xml.apache.org/xml-soap";

fn xml_err(e: impl std::fmt::Display) -> SoapError {
    SoapError::Xml(e.to_string())
}

// ============================================================================
// Request encoding
// ============================================================================

/// Build the request envelope for `method` with positional arguments.
pub fn encode_request(namespace: &str, method: &str, args: &[SoapValue]) -> SoapResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let envelope = BytesStart::new("SOAP-ENV:Envelope").with_attributes([
        ("xmlns:SOAP-ENV", ENVELOPE_NS),
        ("xmlns:SOAP-ENC", ENCODING_NS),
        ("xmlns:xsd", XSD_NS),
        ("xmlns:xsi", XSI_NS),
        ("xmlns:ns1", namespace),
        ("xmlns:ns2", APACHE_MAP_NS),
        ("SOAP-ENV:encodingStyle", ENCODING_NS),
    ]);
    writer
        .write_event(Event::Start(envelope))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("SOAP-ENV:Body")))
        .map_err(xml_err)?;

    let call = format!("ns1:{}", method);
    writer
        .write_event(Event::Start(BytesStart::new(call.as_str())))
        .map_err(xml_err)?;

    for (index, arg) in args.iter().enumerate() {
        write_value(&mut writer, &format!("param{}", index), arg)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(call.as_str())))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("SOAP-ENV:Body")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("SOAP-ENV:Envelope")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(xml_err)
}

fn write_value(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, value: &SoapValue) -> SoapResult<()> {
    match value {
        SoapValue::Scalar(Scalar::Null) => {
            let start = BytesStart::new(name).with_attributes([("xsi:nil", "true")]);
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        }
        SoapValue::Scalar(scalar) => {
            let xsd_type = match scalar {
                Scalar::Bool(_) => "xsd:boolean",
                Scalar::Int(n) if i32::try_from(*n).is_ok() => "xsd:int",
                Scalar::Int(_) => "xsd:long",
                Scalar::Float(_) => "xsd:double",
                Scalar::String(_) | Scalar::Null => "xsd:string",
            };
            let text = scalar.to_string();
            write_element(writer, name, &[("xsi:type", xsd_type)], |w| {
                w.write_event(Event::Text(BytesText::new(&text)))
                    .map_err(xml_err)
            })?;
        }
        SoapValue::List(items) => {
            let array_type = format!("xsd:anyType[{}]", items.len());
            let attrs = [
                ("SOAP-ENC:arrayType", array_type.as_str()),
                ("xsi:type", "SOAP-ENC:Array"),
            ];
            write_element(writer, name, &attrs, |w| {
                items.iter().try_for_each(|item| write_value(w, "item", item))
            })?;
        }
        SoapValue::Struct(fields) => {
            write_element(writer, name, &[("xsi:type", "SOAP-ENC:Struct")], |w| {
                fields.iter().try_for_each(|(field, v)| write_value(w, field, v))
            })?;
        }
        SoapValue::AssocArray(entries) => {
            write_element(writer, name, &[("xsi:type", "ns2:Map")], |w| {
                entries.iter().try_for_each(|(key, v)| {
                    write_element(w, "item", &[], |w| {
                        write_value(w, "key", &SoapValue::string(key.clone()))?;
                        write_value(w, "value", v)
                    })
                })
            })?;
        }
    }
    Ok(())
}

fn write_element<F>(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    attrs: &[(&str, &str)],
    body: F,
) -> SoapResult<()>
where
    F: FnOnce(&mut Writer<Cursor<Vec<u8>>>) -> SoapResult<()>,
{
    let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    body(writer)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

// ============================================================================
// Response decoding
// ============================================================================

/// Generic XML element with namespace prefixes stripped
#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> SoapResult<Self> {
        let mut attrs = HashMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_err)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(xml_err)?
                .into_owned();
            attrs.insert(key, value);
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attrs,
            ..Self::default()
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Local part of `xsi:type`, lowercased
    fn xsi_type(&self) -> Option<String> {
        self.attrs.get("type").map(|t| {
            t.rsplit(':')
                .next()
                .unwrap_or(t.as_str())
                .to_ascii_lowercase()
        })
    }

    fn is_nil(&self) -> bool {
        self.attrs
            .get("nil")
            .is_some_and(|v| v == "true" || v == "1")
    }
}

fn parse_tree(xml: &str) -> SoapResult<Element> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = vec![Element::default()];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(ref e) => stack.push(Element::from_start(e, &reader)?),
            Event::Empty(ref e) => {
                let element = Element::from_start(e, &reader)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(xml_err)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SoapError::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Err(SoapError::Xml("unbalanced end tag".to_string())),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match stack.pop() {
        Some(root) if stack.is_empty() => Ok(root),
        _ => Err(SoapError::Xml("unexpected end of document".to_string())),
    }
}

/// Decode a response envelope into the returned value.
///
/// A `Fault` body becomes [`SoapError::Fault`]; a response element without
/// a return part decodes to a null scalar.
pub fn decode_response(method: &str, xml: &str) -> SoapResult<SoapValue> {
    let document = parse_tree(xml)?;

    let body = document
        .child("Envelope")
        .and_then(|envelope| envelope.child("Body"))
        .ok_or_else(|| SoapError::unexpected(method, "missing SOAP Body"))?;

    let payload = body
        .children
        .first()
        .ok_or_else(|| SoapError::unexpected(method, "empty SOAP Body"))?;

    if payload.name == "Fault" {
        let text = |name: &str| {
            payload
                .child(name)
                .map(|c| c.text.clone())
                .unwrap_or_default()
        };
        return Err(SoapError::Fault {
            code: text("faultcode"),
            message: text("faultstring"),
        });
    }

    Ok(payload
        .children
        .first()
        .map(decode_element)
        .unwrap_or(SoapValue::Scalar(Scalar::Null)))
}

/// Extract a fault from a non-success response body, if it carries one.
pub fn decode_fault(xml: &str) -> Option<SoapError> {
    match decode_response("", xml) {
        Err(fault @ SoapError::Fault { .. }) => Some(fault),
        _ => None,
    }
}

fn decode_element(element: &Element) -> SoapValue {
    if element.is_nil() {
        return SoapValue::Scalar(Scalar::Null);
    }

    let xsi_type = element.xsi_type();

    if element.attrs.contains_key("arrayType") || xsi_type.as_deref() == Some("array") {
        return SoapValue::List(element.children.iter().map(decode_element).collect());
    }

    if xsi_type.as_deref() == Some("map") {
        let entries = element
            .children
            .iter()
            .map(|item| {
                let key = item.child("key").map(|k| k.text.clone()).unwrap_or_default();
                let value = item
                    .child("value")
                    .map(decode_element)
                    .unwrap_or(SoapValue::Scalar(Scalar::Null));
                (key, value)
            })
            .collect();
        return SoapValue::AssocArray(entries);
    }

    if !element.children.is_empty() || xsi_type.as_deref() == Some("struct") {
        return SoapValue::Struct(decode_fields(&element.children));
    }

    SoapValue::Scalar(decode_scalar(xsi_type.as_deref(), &element.text))
}

fn decode_fields(children: &[Element]) -> IndexMap<String, SoapValue> {
    let mut fields: IndexMap<String, SoapValue> = IndexMap::new();
    let mut repeated: Vec<&str> = Vec::new();

    for child in children {
        let value = decode_element(child);
        match fields.get_mut(&child.name) {
            None => {
                fields.insert(child.name.clone(), value);
            }
            Some(SoapValue::List(items)) if repeated.contains(&child.name.as_str()) => {
                items.push(value);
            }
            Some(existing) => {
                let first = std::mem::replace(existing, SoapValue::List(Vec::new()));
                *existing = SoapValue::List(vec![first, value]);
                repeated.push(&child.name);
            }
        }
    }

    fields
}

fn decode_scalar(xsi_type: Option<&str>, text: &str) -> Scalar {
    let string = || Scalar::String(text.to_string());

    match xsi_type {
        Some(
            "int" | "integer" | "long" | "short" | "byte" | "unsignedint" | "unsignedlong"
            | "unsignedshort" | "unsignedbyte" | "nonnegativeinteger" | "positiveinteger",
        ) => text.trim().parse().map(Scalar::Int).unwrap_or_else(|_| string()),
        Some("float" | "double" | "decimal") => {
            text.trim().parse().map(Scalar::Float).unwrap_or_else(|_| string())
        }
        Some("boolean") => match text.trim() {
            "true" | "1" => Scalar::Bool(true),
            "false" | "0" => Scalar::Bool(false),
            _ => string(),
        },
        _ => string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::value::normalize;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:ns1="urn:ovd" xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:SOAP-ENC="http://schemas.xmlsoap.org/soap/encoding/"
    xmlns:ns2="http://xml.apache.org/xml-soap"
    SOAP-ENV:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<SOAP-ENV:Body>{}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
            body
        )
    }

    #[test]
    fn test_encode_request_shape() {
        let xml = encode_request(
            "urn:ovd",
            "session_kill",
            &[SoapValue::string("sess-<1>")],
        )
        .unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"xmlns:ns1="urn:ovd""#));
        assert!(xml.contains("<ns1:session_kill>"));
        assert!(xml.contains(r#"<param0 xsi:type="xsd:string">sess-&lt;1&gt;</param0>"#));
    }

    #[test]
    fn test_encode_key_value_list() {
        let arg = SoapValue::List(vec![SoapValue::key_value("general", SoapValue::int(1))]);
        let xml = encode_request("urn:ovd", "settings_set", &[arg]).unwrap();
        assert!(xml.contains(r#"SOAP-ENC:arrayType="xsd:anyType[1]""#));
        assert!(xml.contains(r#"<item xsi:type="SOAP-ENC:Struct"><key xsi:type="xsd:string">general</key><value xsi:type="xsd:int">1</value></item>"#));
    }

    #[test]
    fn test_request_round_trips_through_decoder() {
        let arg = SoapValue::structure([
            ("flag", SoapValue::bool(true)),
            ("count", SoapValue::int(3)),
        ]);
        let xml = encode_request("urn:ovd", "echo", &[arg.clone()]).unwrap();
        // the request body has the same shape as a response body
        assert_eq!(decode_response("echo", &xml).unwrap(), arg);
    }

    #[test]
    fn test_decode_apache_map() {
        let xml = envelope(
            r#"<ns1:getInitialConfigurationResponse><return xsi:type="ns2:Map">
<item><key xsi:type="xsd:string">system_in_maintenance</key><value xsi:type="xsd:int">0</value></item>
<item><key xsi:type="xsd:string">version</key><value xsi:type="xsd:string">3.0</value></item>
</return></ns1:getInitialConfigurationResponse>"#,
        );
        let value = decode_response("getInitialConfiguration", &xml).unwrap();
        let normalized: Value = normalize(&value).unwrap().into();
        assert_eq!(normalized, json!({"system_in_maintenance": 0, "version": "3.0"}));
    }

    #[test]
    fn test_decode_repeated_items_struct() {
        let xml = envelope(
            r#"<ns1:sessions_listResponse><return>
<item><key>s1</key><value><id>s1</id><status>ready</status></value></item>
<item><key>s2</key><value><id>s2</id><status>logged</status></value></item>
</return></ns1:sessions_listResponse>"#,
        );
        let value = decode_response("sessions_list", &xml).unwrap();
        let normalized: Value = normalize(&value).unwrap().into();
        assert_eq!(
            normalized,
            json!({
                "s1": {"id": "s1", "status": "ready"},
                "s2": {"id": "s2", "status": "logged"}
            })
        );
    }

    #[test]
    fn test_decode_soap_array() {
        let xml = envelope(
            r#"<ns1:listResponse><return SOAP-ENC:arrayType="xsd:string[2]" xsi:type="SOAP-ENC:Array">
<item xsi:type="xsd:string">a</item><item xsi:type="xsd:string">b</item></return></ns1:listResponse>"#,
        );
        let value = decode_response("list", &xml).unwrap();
        assert_eq!(
            value,
            SoapValue::List(vec![SoapValue::string("a"), SoapValue::string("b")])
        );
    }

    #[test]
    fn test_decode_scalars_and_nil() {
        let xml = envelope(
            r#"<ns1:settings_setResponse><return xsi:type="xsd:boolean">true</return></ns1:settings_setResponse>"#,
        );
        assert_eq!(decode_response("settings_set", &xml).unwrap(), SoapValue::bool(true));

        let nil = envelope(r#"<ns1:xResponse><return xsi:nil="true"/></ns1:xResponse>"#);
        assert_eq!(
            decode_response("x", &nil).unwrap(),
            SoapValue::Scalar(Scalar::Null)
        );

        let empty = envelope(r#"<ns1:xResponse/>"#);
        assert_eq!(
            decode_response("x", &empty).unwrap(),
            SoapValue::Scalar(Scalar::Null)
        );
    }

    #[test]
    fn test_decode_fault() {
        let xml = envelope(
            r#"<SOAP-ENV:Fault><faultcode>not_authorized</faultcode><faultstring>You are not allowed</faultstring></SOAP-ENV:Fault>"#,
        );
        match decode_response("settings_set", &xml) {
            Err(SoapError::Fault { code, message }) => {
                assert_eq!(code, "not_authorized");
                assert_eq!(message, "You are not allowed");
            }
            other => panic!("expected fault, got {:?}", other),
        }
        assert!(decode_fault(&xml).is_some());
        assert!(decode_fault("<html>Internal Server Error</html>").is_none());
    }

    #[test]
    fn test_decode_rejects_missing_body() {
        let result = decode_response("x", "<foo/>");
        assert!(matches!(result, Err(SoapError::UnexpectedResponse { .. })));
    }
}
