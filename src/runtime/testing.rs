//! In-process [`ContainerRuntime`] that records calls, for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ContainerRuntime, ExecOutput, ProxySpec, RuntimeError, RuntimeResult};

#[derive(Default)]
struct State {
    calls: Vec<String>,
    networks: HashSet<String>,
    running: HashSet<String>,
    labelled: Vec<String>,
    subnet: Option<String>,
    fail_exec: bool,
    exec_queue: VecDeque<ExecOutput>,
}

pub(crate) struct RecordingRuntime {
    state: Mutex<State>,
}

impl RecordingRuntime {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                subnet: Some("172.30.0.0/16".to_string()),
                ..State::default()
            }),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    pub(crate) fn add_network(&self, name: &str) {
        self.state.lock().unwrap().networks.insert(name.to_string());
    }

    pub(crate) fn set_running(&self, name: &str, running: bool) {
        let mut state = self.state.lock().unwrap();
        if running {
            state.running.insert(name.to_string());
        } else {
            state.running.remove(name);
        }
    }

    pub(crate) fn set_labelled(&self, names: Vec<String>) {
        self.state.lock().unwrap().labelled = names;
    }

    pub(crate) fn set_subnet(&self, subnet: Option<String>) {
        self.state.lock().unwrap().subnet = subnet;
    }

    pub(crate) fn fail_exec(&self, fail: bool) {
        self.state.lock().unwrap().fail_exec = fail;
    }

    /// Queue the result of the next `exec` call.
    pub(crate) fn push_exec(&self, status: i32, stdout: &str) {
        self.state.lock().unwrap().exec_queue.push_back(ExecOutput {
            status,
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn exec(&self, container: &str, argv: &[String]) -> RuntimeResult<ExecOutput> {
        self.record(format!("exec {} {}", container, argv.join(" ")));
        let mut state = self.state.lock().unwrap();
        if state.fail_exec {
            return Ok(ExecOutput {
                status: 1,
                stdout: String::new(),
                stderr: "exec failed".to_string(),
            });
        }
        Ok(state.exec_queue.pop_front().unwrap_or_default())
    }

    async fn is_running(&self, container: &str) -> RuntimeResult<bool> {
        Ok(self.state.lock().unwrap().running.contains(container))
    }

    async fn network_exists(&self, network: &str) -> RuntimeResult<bool> {
        Ok(self.state.lock().unwrap().networks.contains(network))
    }

    async fn create_network(&self, network: &str, internal: bool) -> RuntimeResult<()> {
        self.record(format!("create_network {network} internal={internal}"));
        self.add_network(network);
        Ok(())
    }

    async fn network_subnet(&self, _network: &str) -> RuntimeResult<Option<String>> {
        Ok(self.state.lock().unwrap().subnet.clone())
    }

    async fn run_proxy(&self, spec: &ProxySpec) -> RuntimeResult<()> {
        self.record(format!("run_proxy {}", spec.name));
        if !spec.config_path.exists() {
            return Err(RuntimeError::UnexpectedOutput {
                cmd: "run".to_string(),
                message: "config missing".to_string(),
            });
        }
        self.set_running(&spec.name, true);
        Ok(())
    }

    async fn connect_network(&self, network: &str, container: &str) -> RuntimeResult<()> {
        self.record(format!("connect_network {network} {container}"));
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> RuntimeResult<()> {
        self.record(format!("remove_container {container}"));
        self.set_running(container, false);
        Ok(())
    }

    async fn list_running_with_label(&self, _label: &str) -> RuntimeResult<Vec<String>> {
        Ok(self.state.lock().unwrap().labelled.clone())
    }
}
