#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use vmflow_cloud::{
    Attributes, CloudError, ControlPlane, Environment, ErrorKind, ResourceKind, ResourceSpec,
    attrs, params,
};

pub fn env() -> Environment {
    Environment::new("demo-project", "us-central1-a", "us-central1")
}

/// In-memory control plane with scripted failures
#[derive(Default)]
pub struct FakeControlPlane {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    resources: HashSet<String>,
    bindings: HashSet<(String, String, String)>,
    addresses: HashMap<String, String>,
    /// instance -> (access config name, nat ip)
    access_configs: HashMap<String, (String, String)>,
    /// "op:id" -> queued failures, consumed one per call
    failures: HashMap<String, VecDeque<ErrorKind>>,
    /// "op:id" -> delay applied to every call
    delays: HashMap<String, Duration>,
    calls: Vec<String>,
    next_ip: u8,
}

impl Inner {
    fn enter(&mut self, op: &str, id: &str) -> Result<Option<Duration>, CloudError> {
        let key = format!("{}:{}", op, id);
        self.calls.push(key.clone());
        if let Some(kind) = self.failures.get_mut(&key).and_then(|q| q.pop_front()) {
            return Err(CloudError::from_kind(kind, format!("scripted {}", key)));
        }
        Ok(self.delays.get(&key).copied())
    }
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` on `id` fail with `kind`
    pub fn fail(&self, op: &str, id: &str, kind: ErrorKind, times: usize) {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.failures.entry(format!("{}:{}", op, id)).or_default();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    pub fn delay(&self, op: &str, id: &str, delay: Duration) {
        self.inner
            .lock()
            .unwrap()
            .delays
            .insert(format!("{}:{}", op, id), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str, id: &str) -> usize {
        let key = format!("{}:{}", op, id);
        self.calls().iter().filter(|c| **c == key).count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().unwrap().resources.contains(id)
    }

    pub fn nat_ip(&self, instance: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .access_configs
            .get(instance)
            .map(|(_, ip)| ip.clone())
    }

    pub fn address(&self, name: &str) -> Option<String> {
        self.inner.lock().unwrap().addresses.get(name).cloned()
    }

    async fn pause(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    fn name(&self) -> &str {
        "fake"
    }

    async fn exists(&self, spec: &ResourceSpec) -> vmflow_cloud::Result<bool> {
        let delay = self.inner.lock().unwrap().enter("exists", &spec.id)?;
        Self::pause(delay).await;

        let inner = self.inner.lock().unwrap();
        let exists = match spec.kind {
            ResourceKind::IamBinding => inner.bindings.contains(&(
                "demo-project".to_string(),
                spec.require_param(params::MEMBER)?.to_string(),
                spec.require_param(params::ROLE)?.to_string(),
            )),
            ResourceKind::AccessConfig => {
                let instance = spec.require_param(params::INSTANCE)?;
                let address = spec.require_param(params::ADDRESS)?;
                match (inner.access_configs.get(instance), inner.addresses.get(address)) {
                    (Some((_, nat)), Some(reserved)) => nat == reserved,
                    _ => false,
                }
            }
            _ => inner.resources.contains(&spec.id),
        };
        Ok(exists)
    }

    async fn create(&self, spec: &ResourceSpec) -> vmflow_cloud::Result<()> {
        let delay = self.inner.lock().unwrap().enter("create", &spec.id)?;
        Self::pause(delay).await;

        let mut inner = self.inner.lock().unwrap();
        if !inner.resources.insert(spec.id.clone()) {
            return Err(CloudError::AlreadyExists(spec.id.clone()));
        }
        match spec.kind {
            ResourceKind::StaticAddress => {
                inner.next_ip += 1;
                let ip = format!("203.0.113.{}", inner.next_ip);
                inner.addresses.insert(spec.id.clone(), ip);
            }
            ResourceKind::Instance => {
                // New instances get an ephemeral address
                inner.next_ip += 1;
                let ip = format!("198.51.100.{}", inner.next_ip);
                inner
                    .access_configs
                    .insert(spec.id.clone(), ("external-nat".to_string(), ip));
            }
            _ => {}
        }
        Ok(())
    }

    async fn describe(&self, kind: ResourceKind, id: &str) -> vmflow_cloud::Result<Attributes> {
        let delay = self.inner.lock().unwrap().enter("describe", id)?;
        Self::pause(delay).await;

        let inner = self.inner.lock().unwrap();
        if !inner.resources.contains(id) {
            return Err(CloudError::NotFound(id.to_string()));
        }
        let mut attributes = BTreeMap::new();
        match kind {
            ResourceKind::StaticAddress => {
                if let Some(ip) = inner.addresses.get(id) {
                    attributes.insert(attrs::ADDRESS.to_string(), serde_json::json!(ip));
                }
            }
            ResourceKind::Instance => {
                if let Some((_, ip)) = inner.access_configs.get(id) {
                    attributes.insert(attrs::NAT_IP.to_string(), serde_json::json!(ip));
                }
                attributes.insert(attrs::STATUS.to_string(), serde_json::json!("RUNNING"));
            }
            _ => {}
        }
        Ok(attributes)
    }

    async fn bind_iam(
        &self,
        resource: &str,
        principal: &str,
        role: &str,
    ) -> vmflow_cloud::Result<()> {
        let delay = self.inner.lock().unwrap().enter("bind_iam", role)?;
        Self::pause(delay).await;

        self.inner.lock().unwrap().bindings.insert((
            resource.to_string(),
            principal.to_string(),
            role.to_string(),
        ));
        Ok(())
    }

    async fn delete_access_config(&self, instance: &str, name: &str) -> vmflow_cloud::Result<()> {
        let delay = self
            .inner
            .lock()
            .unwrap()
            .enter("delete_access_config", instance)?;
        Self::pause(delay).await;

        let mut inner = self.inner.lock().unwrap();
        let attached = matches!(
            inner.access_configs.get(instance),
            Some((existing, _)) if existing == name
        );
        if !attached {
            return Err(CloudError::NotFound(format!("{}/{}", instance, name)));
        }
        inner.access_configs.remove(instance);
        Ok(())
    }

    async fn add_access_config(
        &self,
        instance: &str,
        name: &str,
        address: &str,
    ) -> vmflow_cloud::Result<()> {
        let delay = self
            .inner
            .lock()
            .unwrap()
            .enter("add_access_config", instance)?;
        Self::pause(delay).await;

        let mut inner = self.inner.lock().unwrap();
        if inner.access_configs.contains_key(instance) {
            return Err(CloudError::AlreadyExists(format!("{}/{}", instance, name)));
        }
        inner
            .access_configs
            .insert(instance.to_string(), (name.to_string(), address.to_string()));
        Ok(())
    }
}
