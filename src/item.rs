//! Items flowing through the pipeline.
//!
//! An [`Item`] always carries the file it was read from. Only items whose
//! [`ItemKind`] is [`ItemKind::Dicom`] carry attributes; every other kind is
//! passed through filtering stages untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// DICOM data element tag, `(group, element)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u16, pub u16);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:04X},{:04X}]", self.0, self.1)
    }
}

impl FromStr for Tag {
    type Err = String;

    /// Accepts `[gggg,eeee]`, `(gggg,eeee)` or bare `gggg,eeee` / `ggggeeee`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .trim_start_matches(['[', '('])
            .trim_end_matches([']', ')']);
        let (group, element) = match inner.split_once(',') {
            Some((g, e)) => (g.trim(), e.trim()),
            None if inner.len() == 8 && inner.is_ascii() => inner.split_at(4),
            None => return Err(format!("malformed tag '{s}'")),
        };
        let is_hex = |part: &str| part.len() == 4 && part.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex(group) || !is_hex(element) {
            return Err(format!("malformed tag '{s}'"));
        }
        let group = u16::from_str_radix(group, 16).map_err(|_| format!("malformed tag '{s}'"))?;
        let element =
            u16::from_str_radix(element, 16).map_err(|_| format!("malformed tag '{s}'"))?;
        Ok(Tag(group, element))
    }
}

/// Value representations the extractor distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vr {
    AE,
    AS,
    CS,
    DA,
    DS,
    DT,
    IS,
    LO,
    LT,
    PN,
    SH,
    ST,
    TM,
    UI,
    UT,
    US,
    UL,
    SS,
    SL,
    FL,
    FD,
    OB,
    OW,
    UN,
    SQ,
}

impl Vr {
    /// Text VRs whose content is a decimal or integer string.
    pub fn is_numeric_string(&self) -> bool {
        matches!(self, Vr::DS | Vr::IS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Text(Vec<String>),
    Numbers(Vec<f64>),
    Bytes(Vec<u8>),
    Sequence(Vec<DicomDataset>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub vr: Vr,
    pub value: ElementValue,
}

impl Element {
    pub fn text(vr: Vr, value: impl Into<String>) -> Self {
        Element {
            vr,
            value: ElementValue::Text(vec![value.into()]),
        }
    }

    pub fn number(vr: Vr, value: f64) -> Self {
        Element {
            vr,
            value: ElementValue::Numbers(vec![value]),
        }
    }

    pub fn bytes(vr: Vr, value: Vec<u8>) -> Self {
        Element {
            vr,
            value: ElementValue::Bytes(value),
        }
    }

    pub fn sequence(items: Vec<DicomDataset>) -> Self {
        Element {
            vr: Vr::SQ,
            value: ElementValue::Sequence(items),
        }
    }
}

/// An ordered DICOM dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomDataset {
    elements: BTreeMap<Tag, Element>,
}

impl DicomDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag, element: Element) -> Option<Element> {
        self.elements.insert(tag, element)
    }

    /// Builder-style insert.
    pub fn with(mut self, tag: Tag, element: Element) -> Self {
        self.elements.insert(tag, element);
        self
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Element)> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Any object without attributes (zip archives, XML manifests, raw files).
    Plain,
    Dicom(DicomDataset),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    file: PathBuf,
    kind: ItemKind,
}

impl Item {
    pub fn plain(file: impl Into<PathBuf>) -> Self {
        Item {
            file: file.into(),
            kind: ItemKind::Plain,
        }
    }

    pub fn dicom(file: impl Into<PathBuf>, dataset: DicomDataset) -> Self {
        Item {
            file: file.into(),
            kind: ItemKind::Dicom(dataset),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// The attribute-bearing view of this item, if it has one.
    pub fn dataset(&self) -> Option<&DicomDataset> {
        match &self.kind {
            ItemKind::Dicom(dataset) => Some(dataset),
            ItemKind::Plain => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parse_forms() {
        assert_eq!("[0008,0060]".parse::<Tag>().unwrap(), Tag(0x0008, 0x0060));
        assert_eq!("(0010,0010)".parse::<Tag>().unwrap(), Tag(0x0010, 0x0010));
        assert_eq!("7FE00010".parse::<Tag>().unwrap(), Tag(0x7FE0, 0x0010));
        assert_eq!("[0009, 10ab]".parse::<Tag>().unwrap(), Tag(0x0009, 0x10AB));
        assert!("[008,0060]".parse::<Tag>().is_err());
        assert!("[zzzz,0060]".parse::<Tag>().is_err());
        assert!("Modality".parse::<Tag>().is_err());
        assert!("[+008,0060]".parse::<Tag>().is_err());
    }

    #[test]
    fn test_tag_display_round_trip() {
        let tag = Tag(0x0020, 0x000D);
        assert_eq!(tag.to_string(), "[0020,000D]");
        assert_eq!(tag.to_string().parse::<Tag>().unwrap(), tag);
    }

    #[test]
    fn test_item_dataset_view() {
        let plain = Item::plain("/tmp/manifest.xml");
        assert!(plain.dataset().is_none());
        assert_eq!(plain.kind(), &ItemKind::Plain);

        let dataset = DicomDataset::new().with(Tag(0x0008, 0x0060), Element::text(Vr::CS, "CT"));
        let item = Item::dicom("/tmp/image.dcm", dataset);
        assert_eq!(item.dataset().map(|d| d.len()), Some(1));
        assert_eq!(
            item.dataset().and_then(|d| d.get(Tag(0x0008, 0x0060))),
            Some(&Element::text(Vr::CS, "CT"))
        );
        assert_eq!(item.file(), Path::new("/tmp/image.dcm"));
    }
}
