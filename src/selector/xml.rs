//! HTML-to-XML re-serialization for XPath evaluation
//!
//! The XPath backend operates on well-formed XML documents, while the
//! fragments this crate extracts from are parsed HTML. This module walks a
//! parsed element tree and emits an equivalent XML document: void elements
//! self-closed, text and attribute values escaped, comments and
//! non-XML-safe attributes dropped.

use scraper::ElementRef;

/// HTML void elements that never carry children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Serializes an element subtree as a well-formed XML string.
///
/// The result always has a single root element (the given element), so it
/// can be handed directly to an XML parser.
pub fn element_to_xml(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_element(root, &mut out);
    out
}

fn write_element(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if !is_xml_name(name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in el.value().attrs() {
        if !is_xml_name(attr) {
            continue;
        }
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        escape_into(value, true, out);
        out.push('"');
    }

    let mut children = el.children().peekable();
    if children.peek().is_none() || VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');

    for child in children {
        if let Some(child_el) = ElementRef::wrap(child) {
            write_element(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            escape_into(text, false, out);
        }
        // Comments, doctypes, and processing instructions are dropped.
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Escapes a string for use as XML text content or an attribute value.
///
/// Control characters outside tab/newline/carriage-return are not valid in
/// XML 1.0 and are dropped rather than escaped.
fn escape_into(value: &str, in_attribute: bool, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
}

/// Checks whether a name is safe to emit as an XML element/attribute name.
///
/// Namespace-prefixed names (`xlink:href` and friends) are rejected because
/// the emitted document declares no namespaces.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
