use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

/// Cursor marking the newest report already imported. Dates from the feed
/// compare lexicographically, so the raw string is the ordering key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(String);

impl Watermark {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when a report dated `date` is newer than this cursor.
    pub fn admits(&self, date: &str) -> bool {
        date > self.0.as_str()
    }
}

/// One report descriptor from the history feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub summary_url: String,
    pub ioc_url: String,
    pub misp_url: String,
    pub formatted_date: String,
    pub analysis_date: String,
}

impl HistoryEntry {
    pub fn new(summary_url: String, misp_url: String, analysis_date: String) -> Self {
        let ioc_url = summary_url.replace("/summary/json", "/ioc/json");
        let formatted_date = analysis_date.replace([':', '.'], "");
        Self {
            summary_url,
            ioc_url,
            misp_url,
            formatted_date,
            analysis_date,
        }
    }

    /// Report page URL: the MISP export URL without its two trailing segments.
    pub fn report_url(&self) -> &str {
        let trimmed = self.misp_url.trim_end_matches('/');
        let mut cut = trimmed;
        for _ in 0..2 {
            match cut.rfind('/') {
                Some(idx) if idx > 0 => cut = &cut[..idx],
                _ => return trimmed,
            }
        }
        cut
    }

    pub fn report_id(&self) -> &str {
        let url = self.report_url();
        url.rsplit('/').next().unwrap_or(url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportBundle {
    pub misp_doc: Option<Value>,
    pub ioc_doc: Option<Vec<Value>>,
    pub summary_doc: Option<Value>,
    pub files_downloaded: u32,
}

/// One indicator from the sandbox IOC document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IocRecord {
    pub category: String,
    pub ioc_type: String,
    pub reputation_code: String,
    pub value: String,
    pub name: Option<String>,
}

impl IocRecord {
    /// Read a record leniently: scalars become text, missing or null fields
    /// become empty, so routing decides what to drop. `None` only when the
    /// record is not an object at all.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let text = |key: &str| match obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(v) => json_scalar_to_string(v).unwrap_or_else(|| v.to_string()),
        };
        Some(Self {
            category: text("category"),
            ioc_type: text("type"),
            reputation_code: text("reputation"),
            value: text("ioc"),
            name: obj
                .get("name")
                .and_then(json_scalar_to_string)
                .filter(|n| !n.is_empty()),
        })
    }
}

/// Render a JSON string or number without quotes.
pub fn json_scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// MISP-native attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub category: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    pub value: String,
    pub comment: String,
    #[serde(
        rename = "Tag",
        serialize_with = "tag_objects",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Value>,
}

impl Attribute {
    pub fn new(
        category: impl Into<String>,
        attr_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            attr_type: attr_type.into(),
            value: value.into(),
            comment: String::new(),
            tags: BTreeSet::new(),
            distribution: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tags.extend(tag);
        self
    }
}

fn tag_objects<S>(tags: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(tags.iter().map(|name| json!({ "name": name })))
}

/// A MISP event document (`{"Event": {...}}`) ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedEvent(Value);

impl TransformedEvent {
    pub fn from_value(doc: Value) -> Option<Self> {
        doc.get("Event")
            .map(Value::is_object)
            .unwrap_or(false)
            .then_some(Self(doc))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn event(&self) -> &Value {
        &self.0["Event"]
    }

    fn event_mut(&mut self) -> &mut Value {
        &mut self.0["Event"]
    }

    pub fn threat_level_id(&self) -> Option<String> {
        self.event()
            .get("threat_level_id")
            .and_then(json_scalar_to_string)
            .filter(|s| !s.is_empty())
    }

    pub fn published(&self) -> bool {
        self.event()
            .get("published")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn attributes(&self) -> &[Value] {
        self.event()
            .get("Attribute")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tags(&self) -> Vec<String> {
        self.event()
            .get("Tag")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn set_attributes(&mut self, attributes: Vec<Value>) {
        self.event_mut()["Attribute"] = Value::Array(attributes);
    }

    pub(crate) fn set_published(&mut self, published: bool) {
        self.event_mut()["published"] = Value::Bool(published);
    }

    /// Append a tag unless an identical one is already present.
    pub fn add_tag(&mut self, name: &str) {
        if self.tags().iter().any(|t| t == name) {
            return;
        }
        let event = self.event_mut();
        if !event.get("Tag").map(Value::is_array).unwrap_or(false) {
            event["Tag"] = Value::Array(Vec::new());
        }
        if let Some(tags) = event["Tag"].as_array_mut() {
            tags.push(json!({ "name": name }));
        }
    }
}

/// Aggregated result of one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries_total: u32,
    pub succeeded: u32,
    pub duplicates: u32,
    pub failed: u32,
    pub files_downloaded: u32,
    pub newest_date: Option<String>,
    pub watermark_saved: bool,
    pub unexpected_errors: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            entries_total: 0,
            succeeded: 0,
            duplicates: 0,
            failed: 0,
            files_downloaded: 0,
            newest_date: None,
            watermark_saved: false,
            unexpected_errors: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn files_expected(&self) -> u32 {
        self.entries_total * 3
    }

    pub fn no_updates(&self) -> bool {
        self.entries_total == 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.errors.is_empty()
    }
}
