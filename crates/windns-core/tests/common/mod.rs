//! Test doubles and common utilities for reconciler contract tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use windns_core::command::{Operation, Script};
use windns_core::config::{ClientConfig, LockSettings};
use windns_core::error::{Error, Result};
use windns_core::traits::RemoteExecutor;

/// One observed remote call
#[derive(Debug, Clone)]
pub struct Call {
    pub operation: Operation,
    pub script: String,
    pub started: Instant,
    pub finished: Instant,
}

/// A remote DNS server simulated at the level of one record's presence.
///
/// It answers each script the way the real scripts behave: the probe writes
/// `RECORD_FOUND` only when the record exists, the upsert takes the modify branch
/// when it exists and the add branch otherwise, and removal of a missing record
/// reports not found.
pub struct SimulatedServer {
    present: AtomicBool,
    latency: Duration,
    fail_mutations: Mutex<Option<String>>,
    not_found_as_error: bool,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimulatedServer {
    pub fn new() -> Arc<Self> {
        Self::build(false, Duration::ZERO, false)
    }

    /// A server whose record already exists
    pub fn with_record() -> Arc<Self> {
        Self::build(true, Duration::ZERO, false)
    }

    /// A server where every call takes `latency`
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Self::build(false, latency, false)
    }

    /// A server whose executor surfaces a missing record as `Error::NotFound`
    /// instead of an empty probe result
    pub fn reporting_not_found() -> Arc<Self> {
        Self::build(false, Duration::ZERO, true)
    }

    fn build(present: bool, latency: Duration, not_found_as_error: bool) -> Arc<Self> {
        Arc::new(Self {
            present: AtomicBool::new(present),
            latency,
            fail_mutations: Mutex::new(None),
            not_found_as_error,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Make every following upsert/remove fail with `message`
    pub fn fail_mutations(&self, message: &str) {
        *self.fail_mutations.lock().unwrap() = Some(message.to_string());
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_script(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|c| c.script.clone())
    }

    /// Highest number of calls that were executing at the same instant
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, operation: Operation) -> Result<String> {
        if operation.is_mutating() {
            if let Some(message) = self.fail_mutations.lock().unwrap().clone() {
                return Err(Error::execution(message));
            }
        }

        match operation {
            Operation::Probe => {
                if self.is_present() {
                    Ok("RECORD_FOUND".to_string())
                } else if self.not_found_as_error {
                    Err(Error::not_found(
                        "Failed to get svc1 record in zone corp.local. \
                         CategoryInfo: ObjectNotFound",
                    ))
                } else {
                    Ok(String::new())
                }
            }
            Operation::Upsert => {
                if self.present.swap(true, Ordering::SeqCst) {
                    Ok("RECORD_MODIFIED".to_string())
                } else {
                    Ok("RECORD_CREATED".to_string())
                }
            }
            Operation::Remove => {
                if self.present.swap(false, Ordering::SeqCst) {
                    Ok(String::new())
                } else {
                    Err(Error::not_found("ObjectNotFound"))
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for SimulatedServer {
    async fn execute(&self, _config: &ClientConfig, script: &Script) -> Result<String> {
        let started = Instant::now();
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.respond(script.operation);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            operation: script.operation,
            script: script.text.clone(),
            started,
            finished: Instant::now(),
        });
        result
    }

    fn executor_name(&self) -> &'static str {
        "simulated"
    }
}

/// A direct-connection config whose lock marker lives in `dir`, with no lock delays
pub fn test_config(dir: &Path) -> ClientConfig {
    ClientConfig::new("admin", "dc01.corp.local")
        .with_password("secret")
        .with_lock(LockSettings::at(dir.join("dc01.lock")).without_delays())
}
