// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A small navigable node tree over XML markup.  Both the CellML reader
//! and the expression builder walk documents through this type rather
//! than through the event stream.

use std::borrow::Cow;
use std::io::Cursor;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::common::Result;
use crate::import_err;

pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

type XmlWriter = Cursor<Vec<u8>>;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Element {
    pub prefix: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    /// Attributes in document order, keyed by their qualified name.
    /// Namespace declarations are kept here too so that a subtree can
    /// be written back out on its own.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    pub fn is_mathml(&self) -> bool {
        self.namespace.as_deref() == Some(MATHML_NS)
    }

    pub fn qualified_name(&self) -> Cow<'_, str> {
        match self.prefix {
            Some(ref prefix) => Cow::Owned(format!("{}:{}", prefix, self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Child elements in the MathML namespace, skipping everything else.
    pub fn mathml_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements().filter(|el| el.is_mathml())
    }

    /// All directly contained text, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for child in self.children.iter() {
            if let Node::Text(t) = child {
                text.push_str(t);
            }
        }
        text.trim().to_owned()
    }

    /// Writes this element and its subtree out as standalone markup.
    /// If the element's namespace was inherited from an ancestor, a
    /// declaration for it is added to the root of the output.
    pub fn to_markup(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let xmlns = match self.prefix {
            Some(ref prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_owned(),
        };
        let extra_decl = match self.namespace {
            Some(ref ns) if self.attribute(&xmlns).is_none() => Some((xmlns, ns.clone())),
            _ => None,
        };

        write_element(&mut writer, self, extra_decl.as_ref())?;

        String::from_utf8(writer.into_inner().into_inner())
            .or_else(|err| import_err!(XmlDeserialization, err.to_string()))
    }
}

fn write_element(
    writer: &mut Writer<XmlWriter>,
    element: &Element,
    extra_attr: Option<&(String, String)>,
) -> Result<()> {
    let name = element.qualified_name();
    let mut start = BytesStart::new(name.as_ref());
    if let Some((k, v)) = extra_attr {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    for (k, v) in element.attributes.iter() {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    let has_content = element.children.iter().any(|child| match child {
        Node::Element(_) => true,
        Node::Text(t) => !t.trim().is_empty(),
    });
    if !has_content {
        return writer.write_event(Event::Empty(start)).map_err(xml_error);
    }

    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    for child in element.children.iter() {
        match child {
            Node::Element(el) => write_element(writer, el, None)?,
            Node::Text(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    writer
                        .write_event(Event::Text(BytesText::new(t)))
                        .map_err(xml_error)?;
                }
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(name.as_ref())))
        .map_err(xml_error)
}

pub(crate) fn xml_error(err: std::io::Error) -> crate::common::Error {
    use crate::common::{Error, ErrorCode, ErrorKind};

    Error::new(
        ErrorKind::Import,
        ErrorCode::XmlDeserialization,
        Some(err.to_string()),
    )
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn decode(bytes: &[u8]) -> Result<String> {
    let s = match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => return import_err!(XmlDeserialization, err.to_string()),
    };
    match unescape(s) {
        Ok(s) => Ok(s.into_owned()),
        Err(err) => import_err!(XmlDeserialization, err.to_string()),
    }
}

fn resolve_entity(name: &str) -> Result<String> {
    let resolved = match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        }
    };

    match resolved {
        Some(c) => Ok(c.to_string()),
        None => import_err!(XmlDeserialization, format!("unknown entity '&{name};'")),
    }
}

/// Looks a namespace prefix up through the in-scope declarations,
/// innermost first.
fn lookup_namespace(
    prefix: Option<&str>,
    own: &[(Option<String>, String)],
    scopes: &[Vec<(Option<String>, String)>],
) -> Option<String> {
    std::iter::once(own)
        .chain(scopes.iter().rev().map(|s| s.as_slice()))
        .flat_map(|decls| decls.iter())
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.clone())
        .filter(|uri| !uri.is_empty())
}

fn start_element(
    start: &BytesStart,
    scopes: &[Vec<(Option<String>, String)>],
) -> Result<(Element, Vec<(Option<String>, String)>)> {
    let qname = decode(start.name().as_ref())?;

    let mut attributes = Vec::new();
    let mut decls = Vec::new();
    for attr in start.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => return import_err!(XmlDeserialization, err.to_string()),
        };
        let key = decode(attr.key.as_ref())?;
        let value = decode(&attr.value)?;
        if key == "xmlns" {
            decls.push((None, value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            decls.push((Some(prefix.to_owned()), value.clone()));
        }
        attributes.push((key, value));
    }

    let (prefix, name) = split_qname(&qname);
    let namespace = lookup_namespace(prefix, &decls, scopes);
    if prefix.is_some() && namespace.is_none() {
        return import_err!(
            XmlDeserialization,
            format!("unbound namespace prefix in '{qname}'")
        );
    }

    let element = Element {
        prefix: prefix.map(|p| p.to_owned()),
        name: name.to_owned(),
        namespace,
        attributes,
        children: vec![],
    };
    Ok((element, decls))
}

fn push_text(stack: &mut [Element], text: String) {
    if let Some(parent) = stack.last_mut() {
        if let Some(Node::Text(prev)) = parent.children.last_mut() {
            prev.push_str(&text);
        } else {
            parent.children.push(Node::Text(text));
        }
    }
}

fn finish_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        import_err!(
            XmlDeserialization,
            "document has more than one root element".to_owned()
        )
    }
}

/// Parses markup text into its root element.
pub fn parse(source: &str) -> Result<Element> {
    let mut reader = Reader::from_str(source);

    let mut stack: Vec<Element> = vec![];
    let mut scopes: Vec<Vec<(Option<String>, String)>> = vec![];
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                return import_err!(
                    XmlDeserialization,
                    format!("at byte {}: {}", reader.buffer_position(), err)
                );
            }
        };
        match event {
            Event::Start(ref start) => {
                let (element, decls) = start_element(start, &scopes)?;
                stack.push(element);
                scopes.push(decls);
            }
            Event::Empty(ref start) => {
                let (element, _decls) = start_element(start, &scopes)?;
                finish_element(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                scopes.pop();
                match stack.pop() {
                    Some(element) => finish_element(element, &mut stack, &mut root)?,
                    None => {
                        return import_err!(
                            XmlDeserialization,
                            "unbalanced closing tag".to_owned()
                        );
                    }
                }
            }
            Event::Text(ref text) => {
                let text = decode(text)?;
                push_text(&mut stack, text);
            }
            Event::CData(ref data) => {
                let text = match std::str::from_utf8(data) {
                    Ok(text) => text.to_owned(),
                    Err(err) => return import_err!(XmlDeserialization, err.to_string()),
                };
                push_text(&mut stack, text);
            }
            Event::GeneralRef(ref entity) => {
                let name = decode(entity)?;
                let text = resolve_entity(&name)?;
                push_text(&mut stack, text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return import_err!(XmlDeserialization, "unexpected end of document".to_owned());
    }

    match root {
        Some(root) => Ok(root),
        None => import_err!(XmlDeserialization, "document is empty".to_owned()),
    }
}

#[test]
fn test_parse_namespaces() {
    let doc = parse(
        r#"<?xml version="1.0"?>
<model xmlns="http://www.cellml.org/cellml/2.0#" xmlns:m="http://www.w3.org/1998/Math/MathML">
  <m:math><m:ci>x</m:ci></m:math>
  <component name="c"/>
</model>"#,
    )
    .unwrap();

    assert!(doc.is("http://www.cellml.org/cellml/2.0#", "model"));
    let children: Vec<_> = doc.elements().collect();
    assert_eq!(2, children.len());
    assert!(children[0].is(MATHML_NS, "math"));
    assert_eq!(Some("m"), children[0].prefix.as_deref());
    assert!(!children[1].is_mathml());
    assert_eq!(Some("c"), children[1].attribute("name"));

    let ci = children[0].elements().next().unwrap();
    assert!(ci.is(MATHML_NS, "ci"));
    assert_eq!("x", ci.text());
}

#[test]
fn test_parse_entities() {
    let doc = parse(r#"<cn a="1 &amp; 2">&lt;3&#x41;&#66;</cn>"#).unwrap();
    assert_eq!("<3AB", doc.text());
    assert_eq!(Some("1 & 2"), doc.attribute("a"));
}

#[test]
fn test_parse_errors() {
    assert!(parse("").is_err());
    assert!(parse("<a><b></a>").is_err());
    assert!(parse("<x:a/>").is_err());
    assert!(parse("<a/><b/>").is_err());
}

#[test]
fn test_to_markup_adds_inherited_namespace() {
    let doc = parse(
        r#"<model xmlns="urn:cellml"><math xmlns="http://www.w3.org/1998/Math/MathML"><apply><eq/><ci>x</ci><cn>1</cn></apply></math></model>"#,
    )
    .unwrap();
    let math = doc.elements().next().unwrap();
    let markup = math.to_markup().unwrap();
    assert_eq!(
        r#"<math xmlns="http://www.w3.org/1998/Math/MathML"><apply><eq/><ci>x</ci><cn>1</cn></apply></math>"#,
        markup
    );

    let doc = parse(
        r#"<model xmlns:m="http://www.w3.org/1998/Math/MathML"><m:math><m:ci>y</m:ci></m:math></model>"#,
    )
    .unwrap();
    let math = doc.elements().next().unwrap();
    let reparsed = parse(&math.to_markup().unwrap()).unwrap();
    assert!(reparsed.is(MATHML_NS, "math"));
    assert_eq!("y", reparsed.elements().next().unwrap().text());
}
