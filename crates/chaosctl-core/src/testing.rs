//! In-memory collaborators for engine tests

use crate::error::ProvisionError;
use crate::prompt::{PromptField, Prompter};
use crate::types::PlanSummary;
use async_trait::async_trait;
use chaos_rs::{
    ApplyOutput, AppliedObject, ChaosError, ClusterApi, InfraDescriptor, ManifestApplier,
    NodeSummary, PermissionCheck, PodEvent, PodEventStream, PodPhase, PodSummary,
    RegistrationToken, RegistryApi,
};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of side-effecting calls across fakes
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub fn transient(message: &str) -> ChaosError {
    ChaosError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        message.to_string(),
    ))
}

pub fn pod(name: &str, phase: PodPhase) -> PodSummary {
    PodSummary {
        name: name.to_string(),
        phase,
    }
}

/// How the fake answers one permission check
#[derive(Debug, Clone)]
pub enum Answer {
    Allow,
    Deny,
    Error(String),
}

#[derive(Default)]
pub struct FakeCluster {
    /// (plural resource, namespace) -> answer; unlisted checks are allowed
    pub permissions: Mutex<HashMap<(String, Option<String>), Answer>>,
    pub namespaces: Mutex<BTreeSet<String>>,
    /// namespace -> pods carrying the agent label
    pub agent_pods: Mutex<HashMap<String, Vec<PodSummary>>>,
    pub service_accounts: Mutex<BTreeSet<(String, String)>>,
    /// Report missing service accounts as a NotFound error instead of `Ok(false)`
    pub sa_absent_as_error: bool,
    pub sa_error: Mutex<Option<String>>,
    pub namespace_error: Mutex<Option<String>>,
    pub watch_events: Mutex<Vec<Result<PodEvent, String>>>,
    /// Keep the watch open after the scripted events
    pub watch_hangs: bool,
    pub nodes: Vec<NodeSummary>,
    pub nodes_error: Option<String>,
    pub journal: Journal,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_namespace(self, name: &str) -> Self {
        self.namespaces.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn with_agent_pod(self, namespace: &str, pod_name: &str) -> Self {
        self.agent_pods
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .push(pod(pod_name, PodPhase::Running));
        self
    }

    pub fn with_service_account(self, namespace: &str, name: &str) -> Self {
        self.service_accounts
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    pub fn answer(self, resource: &str, namespace: Option<&str>, answer: Answer) -> Self {
        self.permissions.lock().unwrap().insert(
            (resource.to_string(), namespace.map(|s| s.to_string())),
            answer,
        );
        self
    }

    pub fn with_watch(mut self, events: Vec<Result<PodEvent, String>>, hangs: bool) -> Self {
        self.watch_events = Mutex::new(events);
        self.watch_hangs = hangs;
        self
    }

    /// Watch that reports a running pod right away
    pub fn running_watch(self) -> Self {
        self.with_watch(vec![Ok(pod("subscriber-0", PodPhase::Running))], false)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn self_permission_check(&self, check: &PermissionCheck) -> Result<bool, ChaosError> {
        self.journal.record(format!("probe:{}", check));
        let key = (check.resource.clone(), check.namespace.clone());
        match self.permissions.lock().unwrap().get(&key).cloned() {
            None | Some(Answer::Allow) => Ok(true),
            Some(Answer::Deny) => Ok(false),
            Some(Answer::Error(msg)) => Err(transient(&msg)),
        }
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ChaosError> {
        if let Some(msg) = self.namespace_error.lock().unwrap().clone() {
            return Err(transient(&msg));
        }
        Ok(self.namespaces.lock().unwrap().contains(name))
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ChaosError> {
        self.journal.record(format!("create_namespace:{}", name));
        if !self.namespaces.lock().unwrap().insert(name.to_string()) {
            return Err(ChaosError::AlreadyExists {
                kind: "namespace",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ChaosError> {
        self.journal.record(format!("delete_namespace:{}", name));
        self.namespaces.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_pods_by_label(
        &self,
        namespace: &str,
        _label: &str,
    ) -> Result<Vec<PodSummary>, ChaosError> {
        Ok(self
            .agent_pods
            .lock()
            .unwrap()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn service_account_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<bool, ChaosError> {
        self.journal.record(format!("get_service_account:{}/{}", namespace, name));
        if let Some(msg) = self.sa_error.lock().unwrap().clone() {
            return Err(transient(&msg));
        }
        let exists = self
            .service_accounts
            .lock()
            .unwrap()
            .contains(&(namespace.to_string(), name.to_string()));
        if !exists && self.sa_absent_as_error {
            return Err(ChaosError::NotFound {
                kind: "serviceaccount",
                name: name.to_string(),
            });
        }
        Ok(exists)
    }

    async fn watch_pods_by_label(
        &self,
        namespace: &str,
        _label: &str,
    ) -> Result<PodEventStream, ChaosError> {
        self.journal.record(format!("watch:{}", namespace));
        let events: Vec<Result<PodEvent, ChaosError>> = self
            .watch_events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Ok(ev) => Ok(ev.clone()),
                Err(msg) => Err(ChaosError::Watch(msg.clone())),
            })
            .collect();

        let scripted = stream::iter(events);
        if self.watch_hangs {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ChaosError> {
        match &self.nodes_error {
            Some(msg) => Err(transient(msg)),
            None => Ok(self.nodes.clone()),
        }
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    /// project -> agent names
    pub agents: Mutex<HashMap<String, Vec<String>>>,
    pub list_calls: Mutex<u32>,
    /// Simulate another client registering the same name first
    pub register_conflict: bool,
    pub register_error: Option<String>,
    pub registered: Mutex<Vec<InfraDescriptor>>,
    pub journal: Journal,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_agents(self, project_id: &str, names: &[&str]) -> Self {
        self.agents.lock().unwrap().insert(
            project_id.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn list_agent_names(&self, project_id: &str) -> Result<Vec<String>, ChaosError> {
        *self.list_calls.lock().unwrap() += 1;
        Ok(self
            .agents
            .lock()
            .unwrap()
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn register_agent(
        &self,
        descriptor: &InfraDescriptor,
    ) -> Result<RegistrationToken, ChaosError> {
        self.journal.record(format!("register:{}", descriptor.name));
        if self.register_conflict {
            return Err(ChaosError::AlreadyExists {
                kind: "chaos infrastructure",
                name: descriptor.name.clone(),
            });
        }
        if let Some(msg) = &self.register_error {
            return Err(ChaosError::Registry(msg.clone()));
        }

        self.registered.lock().unwrap().push(descriptor.clone());
        self.agents
            .lock()
            .unwrap()
            .entry(descriptor.project_id.clone())
            .or_default()
            .push(descriptor.name.clone());

        Ok(RegistrationToken {
            token: format!("token-{}", descriptor.name),
            infra_id: format!("id-{}", descriptor.name),
            name: descriptor.name.clone(),
        })
    }

    async fn deregister_agent(&self, project_id: &str, infra_id: &str) -> Result<(), ChaosError> {
        self.journal.record(format!("deregister:{}/{}", project_id, infra_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeApplier {
    pub fail_with: Option<String>,
    pub journal: Journal,
}

impl FakeApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }
}

#[async_trait]
impl ManifestApplier for FakeApplier {
    async fn apply(&self, token: &RegistrationToken) -> Result<ApplyOutput, ChaosError> {
        self.journal.record(format!("apply:{}", token.token));
        if let Some(msg) = &self.fail_with {
            return Err(ChaosError::Kubectl(msg.clone()));
        }
        Ok(ApplyOutput {
            raw: "deployment.apps/subscriber created\n".to_string(),
            objects: vec![AppliedObject {
                object: "deployment.apps/subscriber".to_string(),
                action: "created".to_string(),
            }],
        })
    }

    async fn delete(&self, token: &RegistrationToken) -> Result<(), ChaosError> {
        self.journal.record(format!("delete_manifest:{}", token.token));
        Ok(())
    }
}

/// Prompter answering from per-field queues; exhausted queues yield the default
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    pub answers: HashMap<PromptField, VecDeque<String>>,
    pub confirms: VecDeque<bool>,
    pub approve: bool,
    pub interactive: bool,
    pub asked: Vec<PromptField>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
    pub reviewed: Option<PlanSummary>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self {
            approve: true,
            interactive: true,
            ..Default::default()
        }
    }

    pub fn answer(mut self, field: PromptField, values: &[&str]) -> Self {
        self.answers
            .entry(field)
            .or_default()
            .extend(values.iter().map(|v| v.to_string()));
        self
    }

    pub fn asked(&self, field: PromptField) -> usize {
        self.asked.iter().filter(|f| **f == field).count()
    }
}

impl Prompter for ScriptedPrompter {
    fn input(
        &mut self,
        field: PromptField,
        _prompt: &str,
        default: &str,
    ) -> Result<String, ProvisionError> {
        self.asked.push(field);
        let value = self
            .answers
            .get_mut(&field)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| default.to_string());
        Ok(value)
    }

    fn confirm(&mut self, _prompt: &str, default: bool) -> Result<bool, ProvisionError> {
        Ok(self.confirms.pop_front().unwrap_or(default))
    }

    fn select(
        &mut self,
        field: PromptField,
        _prompt: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ProvisionError> {
        self.asked.push(field);
        let answer = self.answers.get_mut(&field).and_then(|q| q.pop_front());
        Ok(answer
            .and_then(|a| items.iter().position(|i| *i == a))
            .unwrap_or(default))
    }

    fn review(&mut self, summary: &PlanSummary) -> Result<bool, ProvisionError> {
        self.reviewed = Some(summary.clone());
        Ok(self.approve)
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn info(&mut self, message: &str) {
        self.infos.push(message.to_string());
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}
