//! Loop-variable expansion for tree sources.
//!
//! A loop definition selects repeating nodes and, per node, a list of
//! variable paths. Each node contributes the Cartesian product of its
//! variable values as tuples; the tuples of all loop definitions are then
//! crossed into combinations, first loop outermost. The mapping's root path
//! is a [`RootTemplate`] rendered once per combination.

use crate::loader::context::{Combination, Tuple};
use crate::xml::{ElementPath, XmlNode};
use std::fmt;

/// Repeating structure scanned before the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopVariable {
    pub path: ElementPath,
    pub variable_paths: Vec<ElementPath>,
}

impl LoopVariable {
    pub fn new(path: ElementPath, variable_paths: Vec<ElementPath>) -> Self {
        Self {
            path,
            variable_paths,
        }
    }

    /// Tuples of variable values for every node matched under `root`
    pub fn expand(&self, root: XmlNode<'_>) -> Vec<Tuple> {
        let mut tuples = Vec::new();
        for node in self.path.find_all(root) {
            let per_path: Vec<Vec<String>> = self
                .variable_paths
                .iter()
                .map(|path| path.find_texts(node))
                .collect();
            tuples.extend(cartesian(&per_path));
        }
        tuples
    }
}

/// Expand every loop definition and cross the results
pub fn combinations(root: XmlNode<'_>, loops: &[LoopVariable]) -> Vec<Combination> {
    let expanded: Vec<Vec<Tuple>> = loops.iter().map(|l| l.expand(root)).collect();
    cartesian(&expanded)
}

/// Cartesian product, first list outermost. The product of no lists is a
/// single empty entry.
pub fn cartesian<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut entry = prefix.clone();
                    entry.push(item.clone());
                    entry
                })
            })
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Slot {
        loop_index: usize,
        variable_index: usize,
    },
}

/// Root path with `{i[j]}` placeholders for `combination[i][j]`
///
/// `{i}` is shorthand for `{i[0]}`, `{{` and `}}` produce literal braces, and
/// any other brace is kept verbatim so `{uri}tag` names pass through.
///
/// A placeholder inside a quoted predicate literal whose value contains that
/// quote character is rendered with the literal requoted in the other one, so
/// `[@name='{0}']` bound to `O'Brien` becomes `[@name="O'Brien"]`. A value
/// holding both quote characters cannot be expressed and fails to render.
///
/// # Example
///
/// ```
/// use dynaload::loader::RootTemplate;
///
/// let template = RootTemplate::parse("region[@name='{0}']/year[@value='{1[0]}']").unwrap();
/// let combination = vec![vec!["north".to_string()], vec!["2019".to_string()]];
/// assert_eq!(
///     template.render(Some(&combination)).unwrap(),
///     "region[@name='north']/year[@value='2019']"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTemplate {
    raw: String,
    pieces: Vec<Piece>,
}

impl RootTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            if rest.starts_with("{{") || rest.starts_with("}}") {
                literal.push(c);
                rest = &rest[2..];
                continue;
            }
            if c == '{' {
                if let Some((slot, len)) = parse_slot(rest)? {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(slot);
                    rest = &rest[len..];
                    continue;
                }
            }
            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self {
            raw: template.to_string(),
            pieces,
        })
    }

    /// `(loop_index, variable_index)` of every placeholder
    pub fn slots(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Slot {
                loop_index,
                variable_index,
            } => Some((*loop_index, *variable_index)),
            Piece::Literal(_) => None,
        })
    }

    pub fn has_slots(&self) -> bool {
        self.slots().next().is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitute the combination's values
    pub fn render(&self, combination: Option<&Combination>) -> Result<String, String> {
        let mut out = String::new();
        let mut quotes = QuoteTracker::default();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => {
                    for c in text.chars() {
                        quotes.push(&mut out, c);
                    }
                }
                Piece::Slot {
                    loop_index,
                    variable_index,
                } => {
                    let value = combination
                        .and_then(|c| c.get(*loop_index))
                        .and_then(|tuple| tuple.get(*variable_index))
                        .ok_or_else(|| {
                            format!(
                                "placeholder {{{}[{}]}} has no bound value",
                                loop_index, variable_index
                            )
                        })?;
                    quotes.requote_for(&mut out, value)?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Open predicate literal while rendering: where its opening quote sits in
/// the output, the quote the template used and the quote now in place
#[derive(Debug, Clone, Copy)]
struct OpenLiteral {
    start: usize,
    written: char,
    current: char,
}

#[derive(Debug, Default)]
struct QuoteTracker {
    bracket: usize,
    open: Option<OpenLiteral>,
}

impl QuoteTracker {
    fn push(&mut self, out: &mut String, c: char) {
        match self.open {
            Some(literal) if c == literal.written => {
                out.push(literal.current);
                self.open = None;
                return;
            }
            Some(_) => {}
            None => match c {
                '[' => self.bracket += 1,
                ']' => self.bracket = self.bracket.saturating_sub(1),
                '\'' | '"' if self.bracket > 0 => {
                    self.open = Some(OpenLiteral {
                        start: out.len(),
                        written: c,
                        current: c,
                    });
                }
                _ => {}
            },
        }
        out.push(c);
    }

    /// Switch the enclosing literal's quote when `value` contains it
    fn requote_for(&mut self, out: &mut String, value: &str) -> Result<(), String> {
        let Some(literal) = self.open.as_mut() else {
            return Ok(());
        };
        if !value.contains(literal.current) {
            return Ok(());
        }
        let other = if literal.current == '\'' { '"' } else { '\'' };
        if value.contains(other) || out[literal.start + 1..].contains(other) {
            return Err(format!(
                "value {:?} contains both quote characters and cannot be placed in a literal",
                value
            ));
        }
        out.replace_range(literal.start..literal.start + 1, other.encode_utf8(&mut [0; 4]));
        literal.current = other;
        Ok(())
    }
}

impl fmt::Display for RootTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Parse `{i}` or `{i[j]}` at the start of `text`. Returns the slot and the
/// number of bytes consumed, or `None` when the braces are not a placeholder.
fn parse_slot(text: &str) -> Result<Option<(Piece, usize)>, String> {
    let Some(end) = text.find('}') else {
        return Ok(None);
    };
    let body = &text[1..end];

    let (outer, inner) = match body.split_once('[') {
        Some((outer, rest)) => match rest.strip_suffix(']') {
            Some(inner) => (outer, Some(inner)),
            None => return Ok(None),
        },
        None => (body, None),
    };
    if outer.is_empty() || !outer.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }

    let loop_index = outer
        .parse::<usize>()
        .map_err(|e| format!("bad placeholder '{{{}}}': {}", body, e))?;
    let variable_index = match inner {
        None => 0,
        Some(inner) => inner
            .parse::<usize>()
            .map_err(|_| format!("bad placeholder '{{{}}}'", body))?,
    };

    Ok(Some((
        Piece::Slot {
            loop_index,
            variable_index,
        },
        end + 1,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    const SURVEY: &str = r#"<survey>
  <region name="north"><site>a</site><site>b</site></region>
  <region name="south"><site>c</site></region>
  <year value="2019"/>
  <year value="2020"/>
</survey>"#;

    fn path(p: &str) -> ElementPath {
        ElementPath::parse(p).unwrap()
    }

    #[test]
    fn test_cartesian_product() {
        let lists = vec![vec![1, 2], vec![3], vec![4, 5]];
        assert_eq!(
            cartesian(&lists),
            vec![vec![1, 3, 4], vec![1, 3, 5], vec![2, 3, 4], vec![2, 3, 5]]
        );
        assert_eq!(cartesian::<i32>(&[]), vec![Vec::<i32>::new()]);
        assert!(cartesian(&[vec![1], vec![]]).is_empty());
    }

    #[test]
    fn test_expand_crosses_sub_values_per_node() {
        let doc = XmlDocument::parse_str(SURVEY).unwrap();
        let sites = LoopVariable::new(path("region"), vec![path("site")]);
        assert_eq!(
            sites.expand(doc.root()),
            vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]
        );

        // A node missing one of its variable paths contributes nothing.
        let pairs = LoopVariable::new(path("region"), vec![path("site"), path("missing")]);
        assert!(pairs.expand(doc.root()).is_empty());
    }

    #[test]
    fn test_combinations_across_loops() {
        let doc = XmlDocument::parse_str(SURVEY).unwrap();
        let loops = vec![
            LoopVariable::new(path("region"), vec![path("site")]),
            LoopVariable::new(path("year"), vec![path(".")]),
        ];

        let combos = combinations(doc.root(), &loops);
        assert_eq!(combos.len(), 3 * 2);
        assert_eq!(combos[0], vec![vec!["a".to_string()], vec!["".to_string()]]);
        assert_eq!(combos[5][0], vec!["c".to_string()]);
    }

    #[test]
    fn test_template_rendering() {
        let template = RootTemplate::parse("region/site[.='{0}']").unwrap();
        let combo = vec![vec!["b".to_string()]];
        assert_eq!(template.render(Some(&combo)).unwrap(), "region/site[.='b']");
        assert_eq!(template.slots().collect::<Vec<_>>(), vec![(0, 0)]);
        assert!(template.render(None).is_err());
    }

    #[test]
    fn test_template_literals_and_escapes() {
        let template = RootTemplate::parse("{urn:x}item[@k='{{0}}']").unwrap();
        assert!(!template.has_slots());
        assert_eq!(template.render(None).unwrap(), "{urn:x}item[@k='{0}']");

        let nested = RootTemplate::parse("a[@x='{0[1]}']/b[@y='{1}']").unwrap();
        assert_eq!(nested.slots().collect::<Vec<_>>(), vec![(0, 1), (1, 0)]);
        let combo = vec![
            vec!["p".to_string(), "q".to_string()],
            vec!["r".to_string()],
        ];
        assert_eq!(nested.render(Some(&combo)).unwrap(), "a[@x='q']/b[@y='r']");
        assert!(nested.render(Some(&vec![vec!["p".to_string()]])).is_err());
    }

    #[test]
    fn test_template_requotes_values_with_quotes() {
        let template = RootTemplate::parse("person[@name='{0}']/role[.='{1}']").unwrap();
        let combo = vec![vec!["O'Brien".to_string()], vec!["clerk".to_string()]];
        let rendered = template.render(Some(&combo)).unwrap();
        assert_eq!(rendered, "person[@name=\"O'Brien\"]/role[.='clerk']");

        let doc = XmlDocument::parse_str(
            r#"<staff><person name="O'Brien"><role>clerk</role></person><person name="Obi"/></staff>"#,
        )
        .unwrap();
        let found = path(&rendered).find_texts(doc.root());
        assert_eq!(found, vec!["clerk"]);

        let double = RootTemplate::parse("q[.=\"{0}\"]").unwrap();
        let quoted = vec![vec!["say \"hi\"".to_string()]];
        assert_eq!(double.render(Some(&quoted)).unwrap(), "q[.='say \"hi\"']");

        let both = vec![vec!["it's \"x\"".to_string()]];
        assert!(template.render(Some(&vec![both[0].clone(), vec![]])).is_err());
        assert!(double.render(Some(&both)).is_err());

        // Quotes outside a predicate are left alone.
        let bare = RootTemplate::parse("{0}/item").unwrap();
        let named = vec![vec!["it's".to_string()]];
        assert_eq!(bare.render(Some(&named)).unwrap(), "it's/item");
    }
}
