// Shared fixtures: a stateful fake PLC gateway behind wiremock.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use plcsync_core::{
    BankLayout, CalendarEntry, EntryKind, RegisterBank, RetryPolicy, Schedule, TargetConfig,
    TimeRange, TlsVerification,
};

pub const PLC: &str = "172.17.85.104";

/// Register memory of one fake controller, shared with the test body.
#[derive(Clone, Default)]
pub struct FakePlc {
    registers: Arc<Mutex<HashMap<String, i64>>>,
    /// Writes to these tags are acknowledged but never applied.
    ignored: Arc<Mutex<HashSet<String>>>,
    batch_disabled: Arc<Mutex<bool>>,
    reject_auth: Arc<Mutex<bool>>,
    delay: Arc<Mutex<Duration>>,
    pub batch_calls: Arc<AtomicUsize>,
    pub single_writes: Arc<AtomicUsize>,
}

impl FakePlc {
    pub async fn start() -> (MockServer, Self) {
        let server = MockServer::start().await;
        let plc = Self::default();
        Mock::given(any())
            .respond_with(plc.clone())
            .mount(&server)
            .await;
        (server, plc)
    }

    pub fn get(&self, tag: &str) -> i64 {
        self.registers.lock().unwrap().get(tag).copied().unwrap_or(0)
    }

    pub fn set(&self, tag: &str, value: i64) {
        self.registers.lock().unwrap().insert(tag.to_owned(), value);
    }

    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.registers.lock().unwrap().clone()
    }

    pub fn ignore_writes_to(&self, tag: &str) {
        self.ignored.lock().unwrap().insert(tag.to_owned());
    }

    pub fn disable_batch(&self) {
        *self.batch_disabled.lock().unwrap() = true;
    }

    pub fn reject_credentials(&self) {
        *self.reject_auth.lock().unwrap() = true;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn apply(&self, tag: &str, value: i64) {
        if !self.ignored.lock().unwrap().contains(tag) {
            self.set(tag, value);
        }
    }
}

impl Respond for FakePlc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let delay = *self.delay.lock().unwrap();
        if *self.reject_auth.lock().unwrap() {
            return ResponseTemplate::new(401);
        }

        let path = request.url.path().to_owned();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let response = match segments.as_slice() {
            ["tag_read", _, tag] => {
                let tag = tag.replace("%253A", ":");
                ResponseTemplate::new(200).set_body_json(json!({ "valor": self.get(&tag) }))
            }
            ["tag_write", _, tag, value] => {
                self.single_writes.fetch_add(1, Ordering::SeqCst);
                let tag = tag.replace("%253A", ":");
                self.apply(&tag, value.parse().unwrap());
                ResponseTemplate::new(200).set_body_json(json!({ "sucesso": true }))
            }
            ["tag_write_batch"] => {
                self.batch_calls.fetch_add(1, Ordering::SeqCst);
                if *self.batch_disabled.lock().unwrap() {
                    return ResponseTemplate::new(404).set_body_string("Not Found");
                }
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let mut results = serde_json::Map::new();
                for op in body["operations"].as_array().unwrap() {
                    let tag = op["tag_address"].as_str().unwrap();
                    let value: i64 = op["value"].as_str().unwrap().parse().unwrap();
                    self.apply(tag, value);
                    results.insert(tag.to_owned(), json!({ "success": true }));
                }
                let total = results.len();
                ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "summary": { "total": total, "successful": total, "failed": 0 },
                    "results": results
                }))
            }
            _ => ResponseTemplate::new(404),
        };
        response.set_delay(delay)
    }
}

// ── Target fixtures ──────────────────────────────────────────────────

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn holiday(id: &str, offset: i64) -> CalendarEntry {
    CalendarEntry::holiday(id, now().date() + TimeDelta::days(offset), id)
}

pub fn event(id: &str, offset: i64, location: &str) -> CalendarEntry {
    CalendarEntry::event(
        id,
        now().date() + TimeDelta::days(offset),
        TimeRange::new(hm(14, 0), hm(17, 30)),
        id,
        location,
    )
}

pub fn plenary_target(server: &MockServer) -> TargetConfig {
    TargetConfig {
        key: "plenario".into(),
        name: "Plenário".into(),
        api_url: Url::parse(&server.uri()).unwrap(),
        plc_address: PLC.into(),
        username: "operador".into(),
        password: "s3cret".to_string().into(),
        tls: TlsVerification::SystemDefaults,
        timeout: Duration::from_secs(5),
        write_delay: Duration::ZERO,
        known_bad_hosts: Vec::new(),
        retry: RetryPolicy::none(),
        sequential_fallback: true,
        banks: vec![
            RegisterBank::new(EntryKind::Holiday, 3, BankLayout::split(["N33", "N34"])).unwrap(),
            RegisterBank::new(
                EntryKind::Event,
                4,
                BankLayout::split(["N60", "N61", "N62", "N63", "N64", "N65"]),
            )
            .unwrap(),
        ],
        locations: vec!["Plenário".into()],
        schedule: Schedule::default(),
    }
}

pub fn auditorium_target(server: &MockServer) -> TargetConfig {
    TargetConfig {
        key: "auditorio".into(),
        name: "Auditório".into(),
        plc_address: "172.17.85.123".into(),
        banks: vec![
            RegisterBank::new(
                EntryKind::Event,
                4,
                BankLayout::split(["N91", "N92", "N93", "N94", "N95", "N96"]),
            )
            .unwrap(),
        ],
        locations: vec!["Auditório Nobre".into(), "Foyer do Auditório".into()],
        ..plenary_target(server)
    }
}
