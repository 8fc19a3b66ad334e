#![allow(dead_code)]

use std::{path::Path, time::Duration};

use anyrun_misp_sync::config::AppConfig;
use anyrun_misp_sync::core::retry::Sleeper;
use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::{json, Value};

pub const API_KEY: &str = "test-key";
pub const HISTORY_PATH: &str = "/v1/analysis/";

pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

pub fn config(anyrun: &MockServer, misp: &MockServer, dir: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.anyrun.api_key = API_KEY.to_string();
    cfg.anyrun.history_url = anyrun.url(HISTORY_PATH);
    cfg.anyrun.timeout_ms = 5_000;
    cfg.misp.url = misp.base_url();
    cfg.misp.auth_key = "misp-key".to_string();
    cfg.misp.timeout_ms = 5_000;
    cfg.retry.max_attempts = 3;
    cfg.retry.delay_ms = 0;
    cfg.storage.watermark_path = dir.join("event_date_dat");
    cfg.storage.audit_dir = Some(dir.join("downloads"));
    cfg
}

pub fn task(server: &MockServer, id: &str, date: &str) -> Value {
    json!({
        "date": date,
        "json": server.url(format!("/report/{id}/summary/json")),
        "misp": server.url(format!("/report/{id}/download/misp")),
    })
}

pub fn page(tasks: Vec<Value>) -> Value {
    json!({ "data": { "tasks": tasks } })
}

pub fn mount_page(server: &MockServer, skip: u32, tasks: Vec<Value>) -> httpmock::Mock<'_> {
    let body = page(tasks);
    server.mock(move |when, then| {
        when.method(GET)
            .path(HISTORY_PATH)
            .query_param("skip", skip.to_string());
        then.status(200).json_body(body);
    })
}

pub fn skeleton(id: &str) -> Value {
    json!({
        "Event": {
            "info": format!("analysis {id}"),
            "threat_level_id": "1",
            "published": false,
            "Attribute": [
                { "type": "md5", "value": "d41d8cd98f00b204e9800998ecf8427e", "distribution": "5" },
                { "type": "link", "value": format!("https://app.any.run/tasks/{id}"), "distribution": "5" }
            ]
        }
    })
}

pub fn iocs() -> Value {
    json!([
        { "category": "Main object", "type": "sha256", "reputation": 2, "ioc": "aa11" },
        { "category": "Connections", "type": "ip", "reputation": 1, "ioc": "10.0.0.1" },
        { "category": "Dropped executable file", "type": "md5", "reputation": 2, "ioc": "abc123", "name": "evil.exe" }
    ])
}

/// Serve all three artifacts of report `id` successfully.
pub fn mount_report(server: &MockServer, id: &str) {
    let misp = skeleton(id);
    server.mock(|when, then| {
        when.method(GET).path(format!("/report/{id}/download/misp"));
        then.status(200).json_body(misp);
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/report/{id}/ioc/json"));
        then.status(200).json_body(iocs());
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/report/{id}/summary/json"));
        then.status(200).json_body(json!({ "data": { "analysis": { "uuid": id } } }));
    });
}
