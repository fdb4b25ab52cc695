// Thin helpers over the html5ever rcdom tree.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parse a document or fragment. html5ever repairs the markup and always
/// produces `html`, `head` and `body`.
pub fn parse_html(input: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(input)
}

pub fn tag_lower(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

/// An element's tag and attributes, detached from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn from_handle(node: &Handle) -> Option<Element> {
        match &node.data {
            NodeData::Element { name, attrs, .. } => Some(Element {
                tag: name.local.to_string().to_ascii_lowercase(),
                attrs: attrs
                    .borrow()
                    .iter()
                    .map(|a| (a.name.local.to_string(), a.value.to_string()))
                    .collect(),
            }),
            _ => None,
        }
    }

    pub fn new(tag: &str, attrs: &[(&str, &str)]) -> Element {
        Element {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").map(str::trim).filter(|id| !id.is_empty())
    }

    /// Classes in attribute order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }
}

pub fn has_element(dom: &RcDom) -> bool {
    dom.document
        .children
        .borrow()
        .iter()
        .any(|c| matches!(c.data, NodeData::Element { .. }))
}

pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    fn walk(node: &Handle, out: &mut String) {
        if let NodeData::Text { contents } = &node.data {
            out.push_str(&contents.borrow());
        }
        for c in node.children.borrow().iter() {
            walk(c, out);
        }
    }
    walk(node, &mut out);
    out
}

pub fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

/// A link target that is safe to put in the package. Script and inline
/// data URLs are dropped.
pub fn sanitize_href(href: &str) -> Option<String> {
    let h = href.trim();
    if h.is_empty() {
        return None;
    }
    let low = h.to_ascii_lowercase();
    if low.starts_with("javascript:") || low.starts_with("data:") || low.starts_with("vbscript:") {
        return None;
    }
    Some(h.to_string())
}

/// A stylesheet referenced by the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSource {
    Embedded(String),
    Linked(String),
}

/// Embedded `<style>` text and `<link rel=stylesheet>` hrefs, in document order.
pub fn collect_stylesheets(dom: &RcDom) -> Vec<StylesheetSource> {
    fn walk(node: &Handle, out: &mut Vec<StylesheetSource>) {
        if let Some(el) = Element::from_handle(node) {
            match el.tag.as_str() {
                "style" => {
                    out.push(StylesheetSource::Embedded(text_content(node)));
                    return;
                }
                "link" => {
                    let is_sheet = el
                        .attr("rel")
                        .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
                        .unwrap_or(false);
                    if let Some(href) = el.attr("href").map(str::trim).filter(|h| is_sheet && !h.is_empty()) {
                        out.push(StylesheetSource::Linked(href.to_string()));
                    }
                    return;
                }
                _ => {}
            }
        }
        for c in node.children.borrow().iter() {
            walk(c, out);
        }
    }
    let mut out = Vec::new();
    walk(&dom.document, &mut out);
    out
}
