//! YAML item descriptors for exercising a stage from the command line.
//!
//! ```yaml
//! file: /data/incoming/image-0001.dcm
//! dataset:
//!   Modality: CT
//!   SeriesNumber: 3
//!   ImageType: [ORIGINAL, PRIMARY, AXIAL]
//!   "[0040,A730]":
//!     - CodeValue: "121071"
//! ```
//!
//! A descriptor without `dataset` describes a plain item.

use crate::dictionary;
use crate::item::{DicomDataset, Element, ElementValue, Item, Tag, Vr};
use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct ItemDescriptor {
    pub file: PathBuf,
    #[serde(default)]
    pub dataset: Option<BTreeMap<String, Value>>,
}

impl ItemDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read item descriptor: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse item descriptor: {}", path.display()))
    }

    pub fn into_item(self) -> anyhow::Result<Item> {
        match self.dataset {
            None => Ok(Item::plain(self.file)),
            Some(entries) => Ok(Item::dicom(self.file, to_dataset(&entries)?)),
        }
    }
}

fn resolve_tag(key: &str) -> anyhow::Result<Tag> {
    if let Some(tag) = dictionary::tag_for(key) {
        return Ok(tag);
    }
    key.parse::<Tag>()
        .map_err(|_| anyhow!("unknown attribute '{key}'"))
}

fn to_dataset(entries: &BTreeMap<String, Value>) -> anyhow::Result<DicomDataset> {
    let mut dataset = DicomDataset::new();
    for (key, value) in entries {
        let tag = resolve_tag(key)?;
        let element = to_element(tag, value).with_context(|| format!("attribute '{key}'"))?;
        dataset.insert(tag, element);
    }
    Ok(dataset)
}

fn to_element(tag: Tag, value: &Value) -> anyhow::Result<Element> {
    let vr = dictionary::vr_for(tag);
    match value {
        Value::Null => Ok(Element {
            vr: vr.unwrap_or(Vr::LO),
            value: ElementValue::Text(Vec::new()),
        }),
        Value::String(s) => Ok(Element::text(vr.unwrap_or(Vr::LO), s.clone())),
        Value::Number(n) => {
            let n = n
                .as_f64()
                .ok_or_else(|| anyhow!("number {n} is out of range"))?;
            Ok(Element::number(vr.unwrap_or(Vr::FD), n))
        }
        Value::Sequence(values) if values.iter().all(Value::is_mapping) => {
            let items = values
                .iter()
                .map(|v| {
                    let entries: BTreeMap<String, Value> = serde_yaml::from_value(v.clone())?;
                    to_dataset(&entries)
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(Element::sequence(items))
        }
        Value::Sequence(values) => {
            let parts = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(anyhow!("unsupported multi-value entry {other:?}")),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(Element {
                vr: vr.unwrap_or(Vr::LO),
                value: ElementValue::Text(parts),
            })
        }
        Value::Bool(_) | Value::Mapping(_) | Value::Tagged(_) => {
            bail!("unsupported value {value:?}")
        }
    }
}
