//! Shared test fixtures: an in-memory sandbox gateway that records calls.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coderun::{GatewayError, Language, RunOptions, RunOutput, SandboxGateway, SandboxHandle};

/// A call observed by [`FakeGateway`], in order of arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(Language),
    RunStart(String),
    RunEnd(String),
    Upload { sandbox: String, path: String },
    Remove(String),
}

type Runner = dyn Fn(&str, &HashMap<String, Bytes>) -> Result<RunOutput, GatewayError> + Send + Sync;

/// In-memory gateway with a per-sandbox file store.
///
/// The default runner echoes the submitted code with exit code 0.
pub struct FakeGateway {
    next_id: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    files: Mutex<HashMap<String, HashMap<String, Bytes>>>,
    runner: Box<Runner>,
    run_delay: Duration,
    remove_delay: Duration,
    pub fail_create: AtomicBool,
    pub fail_run: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_remove: AtomicBool,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight_per_sandbox: AtomicUsize,
    in_flight_total: AtomicUsize,
    max_in_flight_total: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            calls: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            runner: Box::new(|code: &str, _: &HashMap<String, Bytes>| {
                Ok(RunOutput {
                    exit_code: 0,
                    result: code.to_string(),
                })
            }),
            run_delay: Duration::ZERO,
            remove_delay: Duration::ZERO,
            fail_create: AtomicBool::new(false),
            fail_run: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight_per_sandbox: AtomicUsize::new(0),
            in_flight_total: AtomicUsize::new(0),
            max_in_flight_total: AtomicUsize::new(0),
        }
    }

    pub fn with_runner<F>(mut self, runner: F) -> Self
    where
        F: Fn(&str, &HashMap<String, Bytes>) -> Result<RunOutput, GatewayError> + Send + Sync + 'static,
    {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    pub fn with_remove_delay(mut self, delay: Duration) -> Self {
        self.remove_delay = delay;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::Create(_)))
    }

    pub fn removes(&self) -> usize {
        self.count(|c| matches!(c, Call::Remove(_)))
    }

    pub fn file(&self, sandbox: &str, path: &str) -> Option<Bytes> {
        let files = self.files.lock().unwrap();
        files.get(sandbox)?.get(path).cloned()
    }

    pub fn max_in_flight_per_sandbox(&self) -> usize {
        self.max_in_flight_per_sandbox.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_total(&self) -> usize {
        self.max_in_flight_total.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn enter(&self, sandbox: &str) {
        let per_sandbox = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(sandbox.to_string()).or_default();
            *count += 1;
            *count
        };
        self.max_in_flight_per_sandbox
            .fetch_max(per_sandbox, Ordering::SeqCst);
        let total = self.in_flight_total.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_total.fetch_max(total, Ordering::SeqCst);
    }

    fn leave(&self, sandbox: &str) {
        if let Some(count) = self.in_flight.lock().unwrap().get_mut(sandbox) {
            *count -= 1;
        }
        self.in_flight_total.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxGateway for FakeGateway {
    async fn create(&self, language: Language) -> Result<SandboxHandle, GatewayError> {
        self.record(Call::Create(language));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 503,
                body: "no capacity".to_string(),
            });
        }
        let id = format!("sandbox-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.files.lock().unwrap().insert(id.clone(), HashMap::new());
        Ok(SandboxHandle::new(id, language))
    }

    async fn run(
        &self,
        handle: &SandboxHandle,
        code: &str,
        _options: &RunOptions,
    ) -> Result<RunOutput, GatewayError> {
        let id = handle.id().to_string();
        self.record(Call::RunStart(id.clone()));
        self.enter(&id);

        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        let result = if self.fail_run.load(Ordering::SeqCst) {
            Err(GatewayError::Request("connection reset by peer".to_string()))
        } else {
            let files = self
                .files
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .unwrap_or_default();
            (self.runner)(code, &files)
        };

        self.leave(&id);
        self.record(Call::RunEnd(id));
        result
    }

    async fn upload_file(
        &self,
        handle: &SandboxHandle,
        remote_path: &str,
        bytes: Bytes,
    ) -> Result<(), GatewayError> {
        self.record(Call::Upload {
            sandbox: handle.id().to_string(),
            path: remote_path.to_string(),
        });
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 507,
                body: "disk full".to_string(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .entry(handle.id().to_string())
            .or_default()
            .insert(remote_path.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, handle: &SandboxHandle) -> Result<(), GatewayError> {
        self.record(Call::Remove(handle.id().to_string()));
        if !self.remove_delay.is_zero() {
            tokio::time::sleep(self.remove_delay).await;
        }
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout("remove took too long".to_string()));
        }
        self.files.lock().unwrap().remove(handle.id());
        Ok(())
    }
}

/// A runner that prints the contents of `path` if it was uploaded and fails
/// like a missing-file traceback otherwise.
pub fn cat_runner(
    path: &'static str,
) -> impl Fn(&str, &HashMap<String, Bytes>) -> Result<RunOutput, GatewayError> + Send + Sync {
    move |_code: &str, files: &HashMap<String, Bytes>| {
        Ok(match files.get(path) {
            Some(bytes) => RunOutput {
                exit_code: 0,
                result: String::from_utf8_lossy(bytes).into_owned(),
            },
            None => RunOutput {
                exit_code: 1,
                result: format!("FileNotFoundError: No such file or directory: '{}'", path),
            },
        })
    }
}
