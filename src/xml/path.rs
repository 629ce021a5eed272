//! ElementPath selectors.
//!
//! A small path language for selecting elements relative to a context node,
//! compatible with the subset of XPath that ElementTree's `findall` accepts:
//!
//! - `tag`, `{uri}tag`, `prefix:tag` - child elements with that name
//! - `*` - any child element
//! - `.` - the context node itself, `..` - its parent
//! - `//` - descendants instead of children for the following step
//! - `[@attr]`, `[@attr='v']`, `[@attr!='v']` - attribute predicates
//! - `[tag]`, `[tag='text']`, `[tag!='text']`, `[.='text']` - child/self text predicates
//! - `[2]`, `[last()]`, `[last()-1]` - position among same-named siblings
//!
//! Prefixes are resolved through a namespace map; the empty prefix, when
//! mapped, applies to unprefixed tag names.

use crate::xml::document::XmlNode;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// Error raised for an invalid selector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("cannot use absolute path on element: '{0}'")]
    Absolute(String),

    #[error("invalid path '{path}': {reason}")]
    Syntax { path: String, reason: String },

    #[error("prefix '{prefix}' not found in prefix map (path '{path}')")]
    UnknownPrefix { path: String, prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    /// `*`
    Any,
    /// A resolved element name
    Name(String),
    /// `.`
    SelfNode,
    /// `..`
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// 1-based index
    Index(usize),
    /// `last()` minus an offset
    FromLast(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    HasAttribute(String),
    AttributeEquals(String, String),
    AttributeNotEquals(String, String),
    HasChild(String),
    ChildTextEquals(String, String),
    ChildTextNotEquals(String, String),
    TextEquals(String),
    TextNotEquals(String),
    Position(Position),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    descendant: bool,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    raw: String,
    steps: Vec<Step>,
}

impl ElementPath {
    /// Compile a selector without namespace prefixes
    pub fn parse(path: &str) -> Result<Self, PathError> {
        Self::parse_with_namespaces(path, &IndexMap::new())
    }

    /// Compile a selector, resolving `prefix:tag` names through `namespaces`
    ///
    /// # Example
    ///
    /// ```
    /// use dynaload::xml::{ElementPath, XmlDocument};
    /// use indexmap::IndexMap;
    ///
    /// let doc = XmlDocument::parse_str(
    ///     r#"<c xmlns:p="urn:p"><p:item>a</p:item><p:item>b</p:item></c>"#,
    /// ).unwrap();
    ///
    /// let mut ns = IndexMap::new();
    /// ns.insert("p".to_string(), "urn:p".to_string());
    /// let path = ElementPath::parse_with_namespaces("p:item", &ns).unwrap();
    ///
    /// let texts: Vec<_> = path.find_all(doc.root()).iter().map(|n| n.text()).collect();
    /// assert_eq!(texts, vec!["a", "b"]);
    /// ```
    pub fn parse_with_namespaces(
        path: &str,
        namespaces: &IndexMap<String, String>,
    ) -> Result<Self, PathError> {
        let syntax = |reason: &str| PathError::Syntax {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.starts_with('/') {
            return Err(PathError::Absolute(path.to_string()));
        }
        if path.is_empty() {
            return Err(syntax("empty path"));
        }

        let mut steps = Vec::new();
        let mut descendant = false;
        let segments = split_steps(path).map_err(|reason| syntax(&reason))?;
        let last = segments.len() - 1;

        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                // "a//b" splits into ["a", "", "b"]
                if i == 0 || i == last || descendant {
                    return Err(syntax("empty step"));
                }
                descendant = true;
                continue;
            }

            let (test_text, predicate_texts) =
                split_predicates(segment).map_err(|reason| syntax(&reason))?;
            let test = match test_text {
                "*" => NodeTest::Any,
                "." => NodeTest::SelfNode,
                ".." => NodeTest::Parent,
                name => NodeTest::Name(resolve_name(path, name, namespaces)?),
            };
            if descendant && matches!(test, NodeTest::SelfNode | NodeTest::Parent) {
                return Err(syntax("'.' and '..' cannot follow '//'"));
            }

            let predicates = predicate_texts
                .iter()
                .map(|p| parse_predicate(path, p, namespaces))
                .collect::<Result<Vec<_>, _>>()?;

            steps.push(Step {
                descendant,
                test,
                predicates,
            });
            descendant = false;
        }

        Ok(Self {
            raw: path.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Select all matching elements relative to `context`, in document order
    /// of discovery and without duplicates.
    pub fn find_all<'a>(&self, context: XmlNode<'a>) -> Vec<XmlNode<'a>> {
        let mut current = vec![context];

        for step in &self.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();

            for node in &current {
                let candidates: Vec<XmlNode<'a>> = match (&step.test, step.descendant) {
                    (NodeTest::SelfNode, _) => vec![*node],
                    (NodeTest::Parent, _) => node.parent().into_iter().collect(),
                    (NodeTest::Any, false) => node.children().collect(),
                    (NodeTest::Any, true) => node.descendants(),
                    (NodeTest::Name(name), false) => {
                        node.children().filter(|c| c.name() == name).collect()
                    }
                    (NodeTest::Name(name), true) => node
                        .descendants()
                        .into_iter()
                        .filter(|c| c.name() == name)
                        .collect(),
                };

                for candidate in candidates {
                    if step.predicates.iter().all(|p| matches_predicate(p, candidate))
                        && seen.insert(candidate.index())
                    {
                        next.push(candidate);
                    }
                }
            }

            current = next;
            if current.is_empty() {
                break;
            }
        }

        current
    }

    /// Text of every matching element
    pub fn find_texts(&self, context: XmlNode<'_>) -> Vec<String> {
        self.find_all(context)
            .iter()
            .map(|node| node.text().to_string())
            .collect()
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Split on `/` outside of `{...}`, `[...]` and quotes.
fn split_steps(path: &str) -> Result<Vec<String>, String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut brace = 0usize;
    let mut bracket = 0usize;
    let mut quote: Option<char> = None;

    for c in path.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
                continue;
            }
            None if bracket > 0 && (c == '\'' || c == '"') => {
                quote = Some(c);
                current.push(c);
                continue;
            }
            None => {}
        }

        match c {
            '{' => brace += 1,
            '}' => brace = brace.checked_sub(1).ok_or("unbalanced '}'")?,
            '[' => bracket += 1,
            ']' => bracket = bracket.checked_sub(1).ok_or("unbalanced ']'")?,
            '/' if brace == 0 && bracket == 0 => {
                segments.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    if brace != 0 || bracket != 0 {
        return Err("unbalanced brackets".to_string());
    }
    segments.push(current);
    Ok(segments)
}

/// Split `tag[p1][p2]` into the node test and predicate bodies.
fn split_predicates(segment: &str) -> Result<(&str, Vec<String>), String> {
    let mut brace = 0usize;
    let mut start = None;
    for (i, c) in segment.char_indices() {
        match c {
            '{' => brace += 1,
            '}' => brace = brace.saturating_sub(1),
            '[' if brace == 0 => {
                start = Some(i);
                break;
            }
            _ => {}
        }
    }

    let Some(start) = start else {
        return Ok((segment, Vec::new()));
    };
    let test = &segment[..start];
    if test.is_empty() {
        return Err("predicate without node test".to_string());
    }

    let mut predicates = Vec::new();
    let mut rest = &segment[start..];
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(format!("unexpected '{}' after predicate", rest));
        }
        let end = closing_bracket(rest).ok_or("unterminated predicate")?;
        predicates.push(rest[1..end].trim().to_string());
        rest = &rest[end + 1..];
    }
    Ok((test, predicates))
}

fn closing_bracket(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn resolve_name(
    path: &str,
    name: &str,
    namespaces: &IndexMap<String, String>,
) -> Result<String, PathError> {
    if name.starts_with('{') {
        return Ok(name.to_string());
    }
    if let Some((prefix, local)) = name.split_once(':') {
        return match namespaces.get(prefix) {
            Some(uri) => Ok(format!("{{{}}}{}", uri, local)),
            None => Err(PathError::UnknownPrefix {
                path: path.to_string(),
                prefix: prefix.to_string(),
            }),
        };
    }
    match namespaces.get("") {
        Some(uri) if !uri.is_empty() => Ok(format!("{{{}}}{}", uri, name)),
        _ => Ok(name.to_string()),
    }
}

fn unquote(text: &str) -> Option<&str> {
    let text = text.trim();
    let quote = text.chars().next()?;
    if (quote == '\'' || quote == '"') && text.len() >= 2 && text.ends_with(quote) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

fn parse_predicate(
    path: &str,
    body: &str,
    namespaces: &IndexMap<String, String>,
) -> Result<Predicate, PathError> {
    let syntax = |reason: String| PathError::Syntax {
        path: path.to_string(),
        reason,
    };

    if let Ok(index) = body.parse::<usize>() {
        if index == 0 {
            return Err(syntax("positions are 1-based".to_string()));
        }
        return Ok(Predicate::Position(Position::Index(index)));
    }
    if let Some(rest) = body.strip_prefix("last()") {
        let rest = rest.trim();
        if rest.is_empty() {
            return Ok(Predicate::Position(Position::FromLast(0)));
        }
        let offset = rest
            .strip_prefix('-')
            .and_then(|n| n.trim().parse::<usize>().ok())
            .ok_or_else(|| syntax(format!("unsupported position '{}'", body)))?;
        return Ok(Predicate::Position(Position::FromLast(offset)));
    }

    // Comparisons: split on the first `!=` or `=` outside quotes.
    let (lhs, comparison) = match find_operator(body) {
        Some((idx, op)) => {
            let literal = unquote(&body[idx + op.len()..])
                .ok_or_else(|| syntax(format!("expected quoted literal in '[{}]'", body)))?;
            (body[..idx].trim(), Some((op == "=", literal.to_string())))
        }
        None => (body.trim(), None),
    };

    if let Some(attr) = lhs.strip_prefix('@') {
        let attr = resolve_attribute_name(path, attr, namespaces)?;
        return Ok(match comparison {
            None => Predicate::HasAttribute(attr),
            Some((true, value)) => Predicate::AttributeEquals(attr, value),
            Some((false, value)) => Predicate::AttributeNotEquals(attr, value),
        });
    }

    if lhs == "." {
        return match comparison {
            Some((true, value)) => Ok(Predicate::TextEquals(value)),
            Some((false, value)) => Ok(Predicate::TextNotEquals(value)),
            None => Err(syntax("'.' predicate needs a comparison".to_string())),
        };
    }

    if lhs.is_empty() {
        return Err(syntax("empty predicate".to_string()));
    }
    let child = resolve_name(path, lhs, namespaces)?;
    Ok(match comparison {
        None => Predicate::HasChild(child),
        Some((true, value)) => Predicate::ChildTextEquals(child, value),
        Some((false, value)) => Predicate::ChildTextNotEquals(child, value),
    })
}

fn resolve_attribute_name(
    path: &str,
    name: &str,
    namespaces: &IndexMap<String, String>,
) -> Result<String, PathError> {
    // Unprefixed attributes are never in the default namespace.
    match name.split_once(':') {
        Some(_) => resolve_name(path, name, namespaces),
        None => Ok(name.to_string()),
    }
}

fn find_operator(body: &str) -> Option<(usize, &'static str)> {
    let mut quote: Option<char> = None;
    let bytes: Vec<(usize, char)> = body.char_indices().collect();
    for (pos, &(i, c)) in bytes.iter().enumerate() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '!') if bytes.get(pos + 1).map(|&(_, n)| n) == Some('=') => {
                return Some((i, "!="))
            }
            (None, '=') => return Some((i, "=")),
            _ => {}
        }
    }
    None
}

fn matches_predicate(predicate: &Predicate, node: XmlNode<'_>) -> bool {
    match predicate {
        Predicate::HasAttribute(attr) => node.attribute(attr).is_some(),
        Predicate::AttributeEquals(attr, value) => node.attribute(attr) == Some(value.as_str()),
        Predicate::AttributeNotEquals(attr, value) => {
            matches!(node.attribute(attr), Some(v) if v != value)
        }
        Predicate::HasChild(name) => node.children().any(|c| c.name() == name),
        Predicate::ChildTextEquals(name, value) => node
            .children()
            .any(|c| c.name() == name && c.itertext() == *value),
        Predicate::ChildTextNotEquals(name, value) => node
            .children()
            .any(|c| c.name() == name && c.itertext() != *value),
        Predicate::TextEquals(value) => node.itertext() == *value,
        Predicate::TextNotEquals(value) => node.itertext() != *value,
        Predicate::Position(position) => {
            let Some(parent) = node.parent() else {
                return false;
            };
            let siblings: Vec<XmlNode<'_>> = parent
                .children()
                .filter(|c| c.name() == node.name())
                .collect();
            let target = match position {
                Position::Index(index) => index.checked_sub(1),
                Position::FromLast(offset) => siblings.len().checked_sub(offset + 1),
            };
            target.and_then(|t| siblings.get(t)) == Some(&node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::document::XmlDocument;

    const CATALOG: &str = r#"<catalog>
  <shelf code="A">
    <book id="1" lang="en"><title>Dune</title><year>1965</year></book>
    <book id="2" lang="fr"><title>Vendredi</title><year>1967</year></book>
  </shelf>
  <shelf code="B">
    <book id="3" lang="en"><title>Emma</title></book>
  </shelf>
</catalog>"#;

    fn texts(doc: &XmlDocument, path: &str) -> Vec<String> {
        ElementPath::parse(path).unwrap().find_texts(doc.root())
    }

    #[test]
    fn test_child_steps() {
        let doc = XmlDocument::parse_str(CATALOG).unwrap();
        assert_eq!(texts(&doc, "shelf/book/title"), vec!["Dune", "Vendredi", "Emma"]);
        assert_eq!(texts(&doc, "shelf/*/year"), vec!["1965", "1967"]);
        assert!(texts(&doc, "book").is_empty());
    }

    #[test]
    fn test_self_parent_and_descendants() {
        let doc = XmlDocument::parse_str(CATALOG).unwrap();
        let root = ElementPath::parse(".").unwrap().find_all(doc.root());
        assert_eq!(root, vec![doc.root()]);

        assert_eq!(texts(&doc, ".//title"), vec!["Dune", "Vendredi", "Emma"]);
        assert_eq!(texts(&doc, "shelf//title").len(), 3);

        let shelves = ElementPath::parse(".//book/..").unwrap().find_all(doc.root());
        assert_eq!(shelves.len(), 2);
    }

    #[test]
    fn test_attribute_predicates() {
        let doc = XmlDocument::parse_str(CATALOG).unwrap();
        assert_eq!(texts(&doc, "shelf/book[@lang='en']/title"), vec!["Dune", "Emma"]);
        assert_eq!(texts(&doc, "shelf/book[@lang!='en']/title"), vec!["Vendredi"]);
        assert_eq!(texts(&doc, "shelf[@code=\"B\"]/book/title"), vec!["Emma"]);
        assert_eq!(texts(&doc, "shelf/book[@missing]").len(), 0);
    }

    #[test]
    fn test_child_and_text_predicates() {
        let doc = XmlDocument::parse_str(CATALOG).unwrap();
        assert_eq!(texts(&doc, "shelf/book[year]/title"), vec!["Dune", "Vendredi"]);
        assert_eq!(texts(&doc, "shelf/book[year='1967']/title"), vec!["Vendredi"]);
        assert_eq!(texts(&doc, ".//title[.='Emma']"), vec!["Emma"]);
    }

    #[test]
    fn test_position_predicates() {
        let doc = XmlDocument::parse_str(CATALOG).unwrap();
        assert_eq!(texts(&doc, "shelf/book[1]/title"), vec!["Dune", "Emma"]);
        assert_eq!(texts(&doc, "shelf/book[last()]/title"), vec!["Vendredi", "Emma"]);
        assert_eq!(texts(&doc, "shelf/book[last()-1]/title"), vec!["Dune"]);
        assert_eq!(texts(&doc, "shelf[2]/book/title"), vec!["Emma"]);
    }

    #[test]
    fn test_slashes_inside_literals_and_uris() {
        let doc = XmlDocument::parse_str(r#"<r xmlns:x="http://x/ns"><x:a k="1/2">v</x:a></r>"#)
            .unwrap();
        assert_eq!(texts(&doc, "{http://x/ns}a[@k='1/2']"), vec!["v"]);
    }

    #[test]
    fn test_default_namespace_mapping() {
        let doc = XmlDocument::parse_str(r#"<r xmlns="urn:d"><a>v</a></r>"#).unwrap();
        let mut ns = IndexMap::new();
        ns.insert(String::new(), "urn:d".to_string());
        let path = ElementPath::parse_with_namespaces("a", &ns).unwrap();
        assert_eq!(path.find_texts(doc.root()), vec!["v"]);
        assert!(texts(&doc, "a").is_empty());
    }

    #[test]
    fn test_invalid_paths() {
        assert!(matches!(ElementPath::parse("/catalog"), Err(PathError::Absolute(_))));
        assert!(matches!(ElementPath::parse("a/"), Err(PathError::Syntax { .. })));
        assert!(matches!(ElementPath::parse("a[@x='1'"), Err(PathError::Syntax { .. })));
        assert!(matches!(ElementPath::parse("a[0]"), Err(PathError::Syntax { .. })));
        assert!(matches!(
            ElementPath::parse("p:a"),
            Err(PathError::UnknownPrefix { .. })
        ));
    }
}
