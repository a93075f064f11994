//! Machine-readable summary of a link.

use serde::Serialize;

use crate::layout::Markers;
use crate::link::LinkOutput;
use crate::render::InsertionSnippet;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub markers: Markers,
    pub strings: Vec<StringReport>,
    pub entries: Vec<EntryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<InsertionSnippet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StringReport {
    pub offset: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryReport {
    pub name: String,
    pub offset: u32,
    pub prev: u32,
    pub index: u32,
    pub body: u32,
    pub flags: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_ref: Option<String>,
}

impl LinkReport {
    pub fn from_output(output: &LinkOutput) -> Self {
        Self {
            markers: output.markers,
            strings: output
                .strings
                .iter()
                .map(|s| StringReport {
                    offset: s.offset,
                    text: String::from_utf8_lossy(&s.string).into_owned(),
                })
                .collect(),
            entries: output
                .entries
                .iter()
                .map(|e| EntryReport {
                    name: e.name_lossy().into_owned(),
                    offset: e.offset,
                    prev: e.prev,
                    index: e.index,
                    body: e.body(),
                    flags: e.flags.labels(),
                    code_ref: e.code_ref.clone(),
                })
                .collect(),
            inserted: output.inserted.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
