//! Reference `xml` module (§10.6): a small, dependency-free structural parser restricted to
//! well-formedness checking and element/attribute extraction. Stateless — no handle registry
//! interaction, since an XML document fits in one request/response round trip.

use crate::error::{Error, Result};
use crate::handler::{HandlerFn, HandlerModule, SimpleModule};
use async_trait::async_trait;
use std::sync::Arc;

pub const MODULE_NAME: &str = "xml";
pub const FUNCTIONS: &[&str] = &["parse", "well_formed"];

pub fn build() -> Arc<dyn HandlerModule> {
    let module = SimpleModule::new(MODULE_NAME)
        .with_function("parse", Arc::new(ParseFn))
        .with_function("well_formed", Arc::new(WellFormedFn));
    Arc::new(module)
}

struct ParseFn;

#[async_trait]
impl HandlerFn for ParseFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        _handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let xml = required_str(&params, "xml")?;
        match parse_document(&xml) {
            Ok(node) => Ok(serde_json::json!({"success": true, "root": node})),
            Err(message) => Ok(serde_json::json!({"success": false, "error": message})),
        }
    }
}

struct WellFormedFn;

#[async_trait]
impl HandlerFn for WellFormedFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        _handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let xml = required_str(&params, "xml")?;
        match parse_document(&xml) {
            Ok(_) => Ok(serde_json::json!({"well_formed": true})),
            Err(message) => Ok(serde_json::json!({"well_formed": false, "error": message})),
        }
    }
}

fn required_str(params: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Handler(format!("missing required parameter: {key}")))
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Text(text) => serde_json::json!({"text": text}),
            Node::Element(element) => {
                let attributes: serde_json::Map<String, serde_json::Value> = element
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::json!(v)))
                    .collect();
                serde_json::json!({
                    "tag": element.tag,
                    "attributes": attributes,
                    "children": element.children.iter().map(Node::to_json).collect::<Vec<_>>(),
                })
            }
        }
    }
}

/// Parse the single root element of an XML document, rejecting anything that isn't a single
/// well-formed element tree (mismatched tags, unclosed tags, unquoted attribute values).
/// Processing instructions (`<?xml ... ?>`) and comments are skipped but not validated beyond
/// their own delimiters.
fn parse_document(input: &str) -> std::result::Result<serde_json::Value, String> {
    let mut chars = input.char_indices().peekable();
    skip_prologue(input, &mut chars);
    let (node, rest) = parse_element(input, &mut chars)?;
    skip_whitespace_and_comments(input, &mut chars);
    if chars.peek().is_some() {
        return Err("trailing content after root element".to_string());
    }
    let _ = rest;
    Ok(node.to_json())
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn skip_prologue(input: &str, chars: &mut Chars) {
    loop {
        skip_whitespace_and_comments(input, chars);
        match chars.peek() {
            Some(&(i, '<')) if input[i..].starts_with("<?") => {
                if let Some(end) = input[i..].find("?>") {
                    advance_to(chars, i + end + 2);
                } else {
                    return;
                }
            }
            Some(&(i, '<')) if input[i..].starts_with("<!DOCTYPE") => {
                if let Some(end) = input[i..].find('>') {
                    advance_to(chars, i + end + 1);
                } else {
                    return;
                }
            }
            _ => return,
        }
    }
}

fn skip_whitespace_and_comments(input: &str, chars: &mut Chars) {
    loop {
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }
        if let Some(&(i, '<')) = chars.peek() {
            if input[i..].starts_with("<!--") {
                if let Some(end) = input[i..].find("-->") {
                    advance_to(chars, i + end + 3);
                    continue;
                }
            }
        }
        break;
    }
}

fn advance_to(chars: &mut Chars, byte_index: usize) {
    while let Some(&(i, _)) = chars.peek() {
        if i >= byte_index {
            break;
        }
        chars.next();
    }
}

fn parse_element<'a>(
    input: &'a str,
    chars: &mut Chars<'a>,
) -> std::result::Result<(Node, ()), String> {
    skip_whitespace_and_comments(input, chars);
    let (start, c) = chars.next().ok_or("expected '<' to start element")?;
    if c != '<' {
        return Err(format!("expected '<' at byte {start}, found {c:?}"));
    }

    let tag_start = start + 1;
    let tag_end = find_tag_end(input, tag_start)?;
    let header = &input[tag_start..tag_end.0];
    let self_closing = header.trim_end().ends_with('/');
    let header = header.trim_end().trim_end_matches('/');

    let mut parts = header.splitn(2, char::is_whitespace);
    let tag = parts.next().unwrap_or("").to_string();
    if tag.is_empty() {
        return Err("empty tag name".to_string());
    }
    let attributes = parse_attributes(parts.next().unwrap_or(""))?;

    advance_to(chars, tag_end.1);

    if self_closing {
        return Ok((
            Node::Element(Element {
                tag,
                attributes,
                children: Vec::new(),
            }),
            (),
        ));
    }

    let mut children = Vec::new();
    loop {
        skip_whitespace_and_comments(input, chars);
        match chars.peek() {
            None => return Err(format!("unclosed element <{tag}>")),
            Some(&(i, '<')) if input[i..].starts_with("</") => {
                let close_end = input[i..]
                    .find('>')
                    .ok_or_else(|| "unterminated closing tag".to_string())?;
                let closing_tag = input[i + 2..i + close_end].trim();
                if closing_tag != tag {
                    return Err(format!(
                        "mismatched closing tag: expected </{tag}>, found </{closing_tag}>"
                    ));
                }
                advance_to(chars, i + close_end + 1);
                break;
            }
            Some(&(_, '<')) => {
                let (child, _) = parse_element(input, chars)?;
                children.push(child);
            }
            Some(&(i, _)) => {
                let text_end = input[i..].find('<').map(|o| i + o).unwrap_or(input.len());
                let text = input[i..text_end].to_string();
                advance_to(chars, text_end);
                if !text.trim().is_empty() {
                    children.push(Node::Text(text));
                }
            }
        }
    }

    Ok((
        Node::Element(Element {
            tag,
            attributes,
            children,
        }),
        (),
    ))
}

fn find_tag_end(input: &str, from: usize) -> std::result::Result<(usize, usize), String> {
    let mut in_quotes: Option<char> = None;
    for (i, c) in input[from..].char_indices() {
        let pos = from + i;
        match in_quotes {
            Some(q) if c == q => in_quotes = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => in_quotes = Some(c),
            None if c == '>' => return Ok((pos, pos + 1)),
            None => {}
        }
    }
    Err("unterminated tag".to_string())
}

fn parse_attributes(raw: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut attributes = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or("malformed attribute: missing '='")?;
        let name = rest[..eq].trim().to_string();
        if name.is_empty() {
            return Err("empty attribute name".to_string());
        }
        let after_eq = rest[eq + 1..].trim_start();
        let quote = after_eq
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or("attribute value must be quoted")?;
        let value_start = 1;
        let value_end = after_eq[value_start..]
            .find(quote)
            .ok_or("unterminated attribute value")?;
        let value = after_eq[value_start..value_start + value_end].to_string();
        attributes.push((name, value));
        rest = after_eq[value_start + value_end + 1..].trim_start();
    }
    Ok(attributes)
}
