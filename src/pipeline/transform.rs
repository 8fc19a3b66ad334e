use serde_json::Value;

use crate::core::{
    error::SyncError,
    types::{Attribute, IocRecord, ReportBundle, TransformedEvent},
};

pub const REPUTATION_TAG_PREFIX: &str = "anyrun:reputation:";

/// Sandbox verdict attached to each indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reputation {
    Unknown,
    Suspicious,
    Malicious,
    Unsafe,
}

impl Reputation {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(Reputation::Unknown),
            "1" => Some(Reputation::Suspicious),
            "2" => Some(Reputation::Malicious),
            "4" => Some(Reputation::Unsafe),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Reputation::Unknown => "unknown",
            Reputation::Suspicious => "suspicious",
            Reputation::Malicious => "malicious",
            Reputation::Unsafe => "unsafe",
        }
    }

    pub fn tag(self) -> String {
        format!("{}{}", REPUTATION_TAG_PREFIX, self.label())
    }
}

/// IOC categories that have a MISP counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IocCategory {
    MainObject,
    DroppedExecutable,
    DnsRequest,
    Connection,
    HttpRequest,
}

impl IocCategory {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Main object" => Some(IocCategory::MainObject),
            "Dropped executable file" => Some(IocCategory::DroppedExecutable),
            "DNS requests" => Some(IocCategory::DnsRequest),
            "Connections" => Some(IocCategory::Connection),
            "HTTP/HTTPS requests" => Some(IocCategory::HttpRequest),
            _ => None,
        }
    }
}

/// Turns a fetched report into the event that goes to MISP.
#[derive(Debug, Clone, Default)]
pub struct IocTransformer;

impl IocTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Returns the event plus human-readable warnings for indicators that
    /// could not be mapped. Requires both the event skeleton and IOC list.
    pub fn transform(
        &self,
        bundle: ReportBundle,
    ) -> Result<(TransformedEvent, Vec<String>), SyncError> {
        let misp_doc = bundle
            .misp_doc
            .ok_or_else(|| SyncError::MalformedReport("event skeleton missing".into()))?;
        let iocs = bundle
            .ioc_doc
            .ok_or_else(|| SyncError::MalformedReport("IOC list missing".into()))?;
        let mut event = TransformedEvent::from_value(misp_doc)
            .ok_or_else(|| SyncError::MalformedReport("event skeleton has no Event object".into()))?;

        let mut warnings = Vec::new();
        let mut attributes: Vec<Attribute> = iocs
            .iter()
            .filter_map(|raw| match IocRecord::from_value(raw) {
                Some(rec) => map_ioc(&rec, &mut warnings),
                None => {
                    warnings.push(format!("malformed_ioc: {raw}"));
                    None
                }
            })
            .collect();
        attributes.extend(reemit_links(event.attributes(), &mut warnings));

        let encoded = attributes
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        event.set_attributes(encoded);
        event.set_published(true);
        Ok((event, warnings))
    }
}

pub fn reputation_tag(rec: &IocRecord, warnings: &mut Vec<String>) -> Option<String> {
    match Reputation::from_code(&rec.reputation_code) {
        Some(rep) => Some(rep.tag()),
        None => {
            warnings.push(format!(
                "reputation_error: {} / reputation: {}",
                rec.value, rec.reputation_code
            ));
            None
        }
    }
}

/// Map one indicator; `None` means it was dropped and a warning recorded.
pub fn map_ioc(rec: &IocRecord, warnings: &mut Vec<String>) -> Option<Attribute> {
    let tag = reputation_tag(rec, warnings);
    let Some(category) = IocCategory::parse(&rec.category) else {
        warnings.push(format!(
            "undefined_category: {} / type: {} / value: {}",
            rec.category, rec.ioc_type, rec.value
        ));
        return None;
    };

    let attr = match category {
        IocCategory::MainObject => {
            Attribute::new("Payload delivery", &rec.ioc_type, &rec.value).with_comment("Main object")
        }
        IocCategory::DroppedExecutable => {
            let Some(name) = rec.name.as_deref().filter(|n| !n.is_empty()) else {
                warnings.push(format!(
                    "dropped file without name: type: {} / value: {}",
                    rec.ioc_type, rec.value
                ));
                return None;
            };
            Attribute::new(
                "Artifacts dropped",
                format!("filename|{}", rec.ioc_type),
                format!("{}|{}", name, rec.value),
            )
        }
        IocCategory::DnsRequest => Attribute::new("Network activity", &rec.ioc_type, &rec.value),
        IocCategory::Connection => Attribute::new("Network activity", "ip-dst", &rec.value),
        IocCategory::HttpRequest => Attribute::new("Network activity", "url", &rec.value),
    };
    Some(attr.with_tag(tag))
}

/// Ensure exactly one trailing slash is present.
pub fn normalize_link(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

/// Carry the skeleton's `link` attributes over as external-analysis links.
pub fn reemit_links(existing: &[Value], warnings: &mut Vec<String>) -> Vec<Attribute> {
    existing
        .iter()
        .filter(|attr| attr.get("type").and_then(Value::as_str) == Some("link"))
        .filter_map(|attr| {
            let Some(value) = attr.get("value").and_then(Value::as_str) else {
                warnings.push(format!("link attribute without a string value: {attr}"));
                return None;
            };
            let mut out = Attribute::new("External analysis", "link", normalize_link(value));
            out.distribution = attr.get("distribution").cloned();
            Some(out)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(category: &str, ioc_type: &str, reputation: &str, value: &str) -> IocRecord {
        IocRecord {
            category: category.into(),
            ioc_type: ioc_type.into(),
            reputation_code: reputation.into(),
            value: value.into(),
            name: None,
        }
    }

    #[test]
    fn reputation_mapping_covers_known_codes() {
        let mut warnings = Vec::new();
        for (code, tag) in [
            ("0", "anyrun:reputation:unknown"),
            ("1", "anyrun:reputation:suspicious"),
            ("2", "anyrun:reputation:malicious"),
            ("4", "anyrun:reputation:unsafe"),
        ] {
            let r = rec("Connections", "ip", code, "1.2.3.4");
            assert_eq!(reputation_tag(&r, &mut warnings).as_deref(), Some(tag));
        }
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_reputation_warns_without_tag() {
        let mut warnings = Vec::new();
        let attr = map_ioc(&rec("Connections", "ip", "3", "1.2.3.4"), &mut warnings).unwrap();
        assert!(attr.tags.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains('3'));
        assert!(warnings[0].contains("1.2.3.4"));
    }

    #[test]
    fn dropped_executable_combines_name_and_hash() {
        let mut r = rec("Dropped executable file", "md5", "2", "abc123");
        r.name = Some("evil.exe".into());
        let mut warnings = Vec::new();
        let attr = map_ioc(&r, &mut warnings).unwrap();
        assert_eq!(attr.category, "Artifacts dropped");
        assert_eq!(attr.attr_type, "filename|md5");
        assert_eq!(attr.value, "evil.exe|abc123");
        assert!(attr.tags.contains("anyrun:reputation:malicious"));
    }

    #[test]
    fn category_table() {
        let mut w = Vec::new();
        let main = map_ioc(&rec("Main object", "sha256", "2", "ff"), &mut w).unwrap();
        assert_eq!(
            (main.category.as_str(), main.attr_type.as_str(), main.comment.as_str()),
            ("Payload delivery", "sha256", "Main object")
        );
        let dns = map_ioc(&rec("DNS requests", "domain", "0", "x.org"), &mut w).unwrap();
        assert_eq!((dns.category.as_str(), dns.attr_type.as_str()), ("Network activity", "domain"));
        let conn = map_ioc(&rec("Connections", "ip", "1", "8.8.8.8"), &mut w).unwrap();
        assert_eq!(conn.attr_type, "ip-dst");
        let http = map_ioc(&rec("HTTP/HTTPS requests", "url", "4", "http://x/a"), &mut w).unwrap();
        assert_eq!(http.attr_type, "url");
        assert!(w.is_empty());
    }

    #[test]
    fn unknown_category_is_dropped_with_warning() {
        let mut w = Vec::new();
        assert!(map_ioc(&rec("Registry keys", "key", "0", "HKLM\\x"), &mut w).is_none());
        assert_eq!(w, vec!["undefined_category: Registry keys / type: key / value: HKLM\\x"]);
    }

    #[test]
    fn link_normalization_is_idempotent() {
        let once = normalize_link("http://x/report");
        assert_eq!(once, "http://x/report/");
        assert_eq!(normalize_link(&once), "http://x/report/");
    }

    #[test]
    fn transform_replaces_attributes_and_publishes() {
        let bundle = ReportBundle {
            misp_doc: Some(json!({
                "Event": {
                    "info": "sample.exe",
                    "published": false,
                    "threat_level_id": "1",
                    "Attribute": [
                        { "type": "md5", "value": "00", "distribution": "5" },
                        { "type": "link", "value": "https://app.any.run/tasks/r1", "distribution": "3" }
                    ]
                }
            })),
            ioc_doc: Some(vec![
                json!({ "category": "Connections", "type": "ip", "reputation": 2, "ioc": "10.0.0.1" }),
                json!({ "category": "Unknown thing", "type": "x", "reputation": null, "ioc": "v" }),
                json!(42),
            ]),
            summary_doc: None,
            files_downloaded: 2,
        };
        let (event, warnings) = IocTransformer::new().transform(bundle).unwrap();
        assert!(event.published());
        let attrs = event.attributes();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0]["type"], "ip-dst");
        assert_eq!(attrs[0]["Tag"], json!([{ "name": "anyrun:reputation:malicious" }]));
        assert_eq!(attrs[1]["category"], "External analysis");
        assert_eq!(attrs[1]["value"], "https://app.any.run/tasks/r1/");
        assert_eq!(attrs[1]["distribution"], "3");
        assert_eq!(attrs[1]["comment"], "");
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[2], "malformed_ioc: 42");
    }

    #[test]
    fn skeleton_without_event_is_malformed() {
        let bundle = ReportBundle {
            misp_doc: Some(json!({ "response": [] })),
            ioc_doc: Some(vec![]),
            summary_doc: None,
            files_downloaded: 2,
        };
        let err = IocTransformer::new().transform(bundle).unwrap_err();
        assert!(matches!(err, SyncError::MalformedReport(_)));
    }
}
