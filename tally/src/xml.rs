//! A minimal XML element tree with ElementTree-style selectors.
//!
//! Layouts address hierarchical sources with selector expressions such as
//! `.//finding` or `.//cpe-item[@name='{cpe}']/title`. The supported subset:
//! `/`-separated child steps, `.//` (or a mid-path `//`) for descendant
//! searches, `*` wildcards, and `[child='v']` / `[@attr='v']` /
//! `[@attr]` / `[child]` predicates. Matches are returned in document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::Error;

/// A whole XML document, parsed once into an arena of elements.
#[derive(Debug)]
pub struct Document {
    // nodes[0] is a synthetic container above the document element; element
    // ids are assigned in document (pre-order) order.
    nodes: Vec<Node>,
}

#[derive(Debug)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<usize>,
}

/// A reference to a single element of a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: usize,
}

impl Document {
    /// Parse the given XML text into an element tree.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let mut nodes = vec![Node {
            tag: String::new(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }];
        let mut stack: Vec<usize> = vec![0];
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = push_element(&mut nodes, &stack, &e)?;
                    stack.push(id);
                }
                Event::Empty(e) => {
                    push_element(&mut nodes, &stack, &e)?;
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    if let Some(&top) = stack.last() {
                        nodes[top].text.push_str(&text);
                    }
                }
                Event::CData(t) => {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    if let Some(&top) = stack.last() {
                        nodes[top].text.push_str(&text);
                    }
                }
                Event::End(_) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if nodes[0].children.is_empty() {
            return Err(Error::EmptyXmlDocument);
        }
        Ok(Self { nodes })
    }

    /// The document element.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            doc: self,
            id: self.nodes[0].children[0],
        }
    }
}

fn push_element(
    nodes: &mut Vec<Node>,
    stack: &[usize],
    start: &BytesStart,
) -> Result<usize, Error> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    let id = nodes.len();
    nodes.push(Node {
        tag,
        attrs,
        text: String::new(),
        children: Vec::new(),
    });
    let parent = stack.last().copied().unwrap_or(0);
    nodes[parent].children.push(id);
    Ok(id)
}

impl<'a> NodeRef<'a> {
    /// The element's tag name.
    pub fn tag(&self) -> &'a str {
        &self.doc.nodes[self.id].tag
    }

    /// The element's direct text content, with surrounding whitespace
    /// trimmed away by the parser.
    pub fn text(&self) -> &'a str {
        &self.doc.nodes[self.id].text
    }

    /// The value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.doc.nodes[self.id]
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The element's direct children, in document order.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + '_ {
        let doc = self.doc;
        self.doc.nodes[self.id]
            .children
            .iter()
            .map(move |&id| NodeRef { doc, id })
    }

    /// The first element matching the selector relative to this one.
    pub fn find(&self, selector: &str) -> Result<Option<NodeRef<'a>>, Error> {
        Ok(self.find_all(selector)?.into_iter().next())
    }

    /// All elements matching the selector relative to this one, in document
    /// order.
    pub fn find_all(&self, selector: &str) -> Result<Vec<NodeRef<'a>>, Error> {
        let steps = parse_selector(selector)?;
        let doc = self.doc;
        let mut current = vec![self.id];
        for step in &steps {
            let mut candidates = Vec::new();
            for &id in &current {
                if step.descendant {
                    collect_descendants(doc, id, &mut candidates);
                } else {
                    candidates.extend_from_slice(&doc.nodes[id].children);
                }
            }
            let mut next: Vec<usize> = candidates
                .into_iter()
                .filter(|&id| step.matches(doc, id))
                .collect();
            // Element ids are assigned in pre-order, so sorting restores
            // document order and drops duplicates from overlapping
            // descendant searches.
            next.sort_unstable();
            next.dedup();
            current = next;
        }
        Ok(current.into_iter().map(|id| NodeRef { doc, id }).collect())
    }
}

fn collect_descendants(doc: &Document, id: usize, out: &mut Vec<usize>) {
    for &child in &doc.nodes[id].children {
        out.push(child);
        collect_descendants(doc, child, out);
    }
}

#[derive(Debug)]
struct Step {
    descendant: bool,
    name: String,
    preds: Vec<Pred>,
}

#[derive(Debug)]
enum Pred {
    Attr(String, Option<String>),
    Child(String, Option<String>),
}

impl Step {
    fn matches(&self, doc: &Document, id: usize) -> bool {
        let node = &doc.nodes[id];
        if self.name != "*" && node.tag != self.name {
            return false;
        }
        self.preds.iter().all(|pred| match pred {
            Pred::Attr(name, value) => {
                let attr = node.attrs.iter().find(|(key, _)| key == name);
                match (attr, value) {
                    (Some((_, actual)), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            }
            Pred::Child(name, value) => node.children.iter().any(|&child| {
                let child = &doc.nodes[child];
                child.tag == *name
                    && value.as_ref().map(|v| child.text == *v).unwrap_or(true)
            }),
        })
    }
}

fn parse_selector(selector: &str) -> Result<Vec<Step>, Error> {
    let invalid = || Error::InvalidSelector(selector.to_string());
    let mut rest = selector.trim();
    let mut descendant = false;
    if let Some(stripped) = rest.strip_prefix(".//") {
        descendant = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix("//") {
        descendant = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    let mut steps = Vec::new();
    for segment in split_steps(rest) {
        if segment.is_empty() {
            // A mid-path "//" turns the following step into a descendant
            // search.
            descendant = true;
            continue;
        }
        if segment == "." {
            continue;
        }
        steps.push(parse_step(&segment, descendant).ok_or_else(invalid)?);
        descendant = false;
    }
    if steps.is_empty() {
        return Err(invalid());
    }
    Ok(steps)
}

// Split a selector on `/`, ignoring separators inside quotes or predicate
// brackets (locator values may legitimately contain slashes).
fn split_steps(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for c in selector.chars() {
        match c {
            '\'' | '"' => {
                match quote {
                    Some(q) if q == c => quote = None,
                    None => quote = Some(c),
                    _ => {}
                }
                current.push(c);
            }
            '[' if quote.is_none() => {
                depth += 1;
                current.push(c);
            }
            ']' if quote.is_none() => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '/' if quote.is_none() && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn parse_step(segment: &str, descendant: bool) -> Option<Step> {
    let bracket = unquoted_position(segment, '[');
    let (name, mut rest) = match bracket {
        Some(i) => (&segment[..i], &segment[i..]),
        None => (segment, ""),
    };
    if name.is_empty() || name.contains(']') {
        return None;
    }
    let mut preds = Vec::new();
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return None;
        }
        let end = unquoted_position(rest, ']')?;
        preds.push(parse_pred(&rest[1..end])?);
        rest = &rest[end + 1..];
    }
    Some(Step {
        descendant,
        name: name.to_string(),
        preds,
    })
}

fn parse_pred(body: &str) -> Option<Pred> {
    let body = body.trim();
    let (is_attr, body) = match body.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let (name, value) = match unquoted_position(body, '=') {
        Some(i) => (&body[..i], Some(strip_quotes(&body[i + 1..]).to_string())),
        None => (body, None),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(if is_attr {
        Pred::Attr(name.to_string(), value)
    } else {
        Pred::Child(name.to_string(), value)
    })
}

fn unquoted_position(s: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => match quote {
                Some(q) if q == c => quote = None,
                None => quote = Some(c),
                _ => {}
            },
            _ if c == target && quote.is_none() => return Some(i),
            _ => {}
        }
    }
    None
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    let mut chars = s.chars();
    match (chars.next(), chars.last()) {
        (Some('\''), Some('\'')) | (Some('"'), Some('"')) if s.len() >= 2 => &s[1..s.len() - 1],
        _ => s,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
        <catalog>
            <item id="a">
                <title>First</title>
                <severity>high</severity>
            </item>
            <item id="b">
                <title>Second</title>
                <severity>low</severity>
            </item>
            <nested>
                <item id="c">
                    <title>Third</title>
                </item>
            </nested>
        </catalog>"#;

    #[test]
    fn child_path() {
        let doc = Document::parse(DOC).unwrap();
        assert_eq!(doc.root().tag(), "catalog");
        let titles = doc.root().find_all("item/title").unwrap();
        let texts: Vec<&str> = titles.iter().map(|n| n.text()).collect();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn children_in_document_order() {
        let doc = Document::parse(DOC).unwrap();
        let tags: Vec<&str> = doc.root().children().map(|n| n.tag()).collect();
        assert_eq!(tags, vec!["item", "item", "nested"]);
    }

    #[test]
    fn descendant_search_in_document_order() {
        let doc = Document::parse(DOC).unwrap();
        let items = doc.root().find_all(".//item").unwrap();
        let ids: Vec<&str> = items.iter().filter_map(|n| n.attr("id")).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn attribute_predicate() {
        let doc = Document::parse(DOC).unwrap();
        let item = doc.root().find(".//item[@id='b']").unwrap().unwrap();
        let title = item.find("title").unwrap().unwrap();
        assert_eq!(title.text(), "Second");
    }

    #[test]
    fn child_value_predicate() {
        let doc = Document::parse(DOC).unwrap();
        let items = doc.root().find_all(".//item[severity='high']").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].attr("id"), Some("a"));
    }

    #[test]
    fn wildcard_step() {
        let doc = Document::parse(DOC).unwrap();
        let all = doc.root().find_all("*").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn no_match_is_empty() {
        let doc = Document::parse(DOC).unwrap();
        assert!(doc.root().find("absent").unwrap().is_none());
        assert!(doc.root().find_all(".//absent").unwrap().is_empty());
    }

    #[test]
    fn value_with_slash_inside_predicate() {
        let doc =
            Document::parse("<r><e name='cpe:/a:x'><t>ok</t></e></r>").unwrap();
        let found = doc.root().find("e[@name='cpe:/a:x']/t").unwrap().unwrap();
        assert_eq!(found.text(), "ok");
    }

    #[test]
    fn invalid_selector_is_rejected() {
        let doc = Document::parse("<r/>").unwrap();
        assert!(matches!(
            doc.root().find_all(""),
            Err(Error::InvalidSelector(_))
        ));
        assert!(matches!(
            doc.root().find_all("e[unterminated"),
            Err(Error::InvalidSelector(_))
        ));
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(
            Document::parse("<?xml version=\"1.0\"?>"),
            Err(Error::EmptyXmlDocument)
        ));
    }
}
