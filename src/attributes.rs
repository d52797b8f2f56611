//! Attribute extraction.
//!
//! Flattens a [`DicomDataset`] into an [`AttributeMap`] keyed by tag path.
//! Extraction never fails: anything that cannot be represented is left out
//! and shows up as absent when a script asks for it.

use crate::item::{DicomDataset, ElementValue, Item, Tag};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Path to an attribute. Elements inside sequences are addressed through the
/// sequence tag, e.g. `[0040,A730]::[0008,0100]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttributePath(Vec<Tag>);

impl AttributePath {
    pub fn new(tags: Vec<Tag>) -> Self {
        AttributePath(tags)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.0
    }

    /// Dictionary keywords where known, e.g. `ContentSequence::CodeValue`.
    pub fn keywords(&self) -> String {
        self.0
            .iter()
            .map(|tag| match crate::dictionary::keyword_for(*tag) {
                Some(keyword) => keyword.to_string(),
                None => tag.to_string(),
            })
            .collect::<Vec<_>>()
            .join("::")
    }

    fn child(&self, tag: Tag) -> Self {
        let mut tags = self.0.clone();
        tags.push(tag);
        AttributePath(tags)
    }
}

impl From<Tag> for AttributePath {
    fn from(tag: Tag) -> Self {
        AttributePath(vec![tag])
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            write!(f, "{tag}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    /// Opaque reference to binary content; only its length is kept.
    Binary { length: usize },
}

impl AttrValue {
    /// String view for text operators. Binary content has none.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            AttrValue::Text(s) => Some(Cow::Borrowed(s)),
            AttrValue::Number(n) => Some(Cow::Owned(n.to_string())),
            AttrValue::Binary { .. } => None,
        }
    }

    /// Numeric view for numeric operators.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            AttrValue::Binary { .. } => None,
        }
    }
}

/// Immutable snapshot of an item's attributes.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    values: HashMap<AttributePath, AttrValue>,
}

impl AttributeMap {
    /// Looks up an attribute; `None` is the absence sentinel.
    pub fn get(&self, path: &AttributePath) -> Option<&AttrValue> {
        self.values.get(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(AttributePath, AttrValue)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (AttributePath, AttrValue)>>(iter: T) -> Self {
        AttributeMap {
            values: iter.into_iter().collect(),
        }
    }
}

pub struct AttributeExtractor {
    max_sequence_depth: usize,
}

impl Default for AttributeExtractor {
    fn default() -> Self {
        AttributeExtractor {
            max_sequence_depth: 8,
        }
    }
}

impl AttributeExtractor {
    pub fn new(max_sequence_depth: usize) -> Self {
        AttributeExtractor { max_sequence_depth }
    }

    /// Returns `None` for items that do not carry attributes.
    pub fn extract_item(&self, item: &Item) -> Option<AttributeMap> {
        item.dataset().map(|dataset| self.extract(dataset))
    }

    pub fn extract(&self, dataset: &DicomDataset) -> AttributeMap {
        let mut values = HashMap::new();
        self.flatten(dataset, &AttributePath::default(), 0, &mut values);
        AttributeMap { values }
    }

    fn flatten(
        &self,
        dataset: &DicomDataset,
        prefix: &AttributePath,
        depth: usize,
        out: &mut HashMap<AttributePath, AttrValue>,
    ) {
        for (tag, element) in dataset.iter() {
            let path = prefix.child(*tag);
            match &element.value {
                ElementValue::Text(parts) => {
                    let cleaned: Vec<&str> = parts
                        .iter()
                        .map(|p| p.trim_end_matches([' ', '\0']))
                        .collect();
                    let joined = cleaned.join("\\");
                    let number = if element.vr.is_numeric_string() && cleaned.len() == 1 {
                        joined.trim().parse::<f64>().ok().filter(|n| n.is_finite())
                    } else {
                        None
                    };
                    let value = match number {
                        Some(n) => AttrValue::Number(n),
                        None => AttrValue::Text(joined),
                    };
                    out.insert(path, value);
                }
                ElementValue::Numbers(numbers) => match numbers.as_slice() {
                    [] => {}
                    [n] => {
                        out.insert(path, AttrValue::Number(*n));
                    }
                    many => {
                        let joined = many
                            .iter()
                            .map(|n| n.to_string())
                            .collect::<Vec<_>>()
                            .join("\\");
                        out.insert(path, AttrValue::Text(joined));
                    }
                },
                ElementValue::Bytes(bytes) => {
                    out.insert(
                        path,
                        AttrValue::Binary {
                            length: bytes.len(),
                        },
                    );
                }
                ElementValue::Sequence(items) => {
                    if depth >= self.max_sequence_depth {
                        log::debug!(
                            "Skipping sequence {path}: nested deeper than {}",
                            self.max_sequence_depth
                        );
                        continue;
                    }
                    if let Some(first) = items.first() {
                        self.flatten(first, &path, depth + 1, out);
                    }
                }
            }
        }
    }
}
