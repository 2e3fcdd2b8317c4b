//! Ordered, idempotent execution of a provisioning plan
//!
//! The provisioner walks the plan one step at a time:
//!
//! ```text
//! Init ─▶ Running(0) ─▶ Running(1) ─▶ … ─▶ Succeeded
//!              │              │
//!              └──────────────┴──────────▶ Halted(step, reason)
//! ```
//!
//! Every step first asks the control plane whether the resource exists and
//! only creates it when it does not, so a halted run is resumed by running
//! the same plan again. There is no resume-from-halted state.

use crate::error::{CloudError, ErrorKind};
use crate::plan::ProvisioningPlan;
use crate::provider::{ControlPlane, RetryConfig};
use crate::report::{
    ExecutionResult, HaltReason, ProvisioningReport, RunState, StepFailure, StepRecord,
};
use crate::resource::{
    DEFAULT_ACCESS_CONFIG_NAME, Environment, ResourceKind, ResourceSpec, attrs, params,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared flag used to cancel a run between steps
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failure of a control-plane call after retries
#[derive(Debug)]
struct CallError {
    kind: ErrorKind,
    message: String,
    attempts: u32,
}

impl CallError {
    fn immediate(error: CloudError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            attempts: 0,
        }
    }

    fn into_failure(self) -> StepFailure {
        StepFailure {
            kind: self.kind,
            message: self.message,
            cause: None,
            attempts: self.attempts,
        }
    }
}

/// Executes a [`ProvisioningPlan`] against a [`ControlPlane`]
pub struct Provisioner {
    control_plane: Arc<dyn ControlPlane>,
    environment: Environment,
    retry: RetryConfig,
    cancel: CancelHandle,
    state: RunState,
}

impl Provisioner {
    pub fn new(control_plane: Arc<dyn ControlPlane>, environment: Environment) -> Self {
        Self {
            control_plane,
            environment,
            retry: RetryConfig::default(),
            cancel: CancelHandle::new(),
            state: RunState::Init,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels this run before its next step
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Run the plan to a terminal state
    #[tracing::instrument(skip_all, fields(environment = %self.environment, provider = self.control_plane.name()))]
    pub async fn run(&mut self, plan: &ProvisioningPlan) -> ProvisioningReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut steps: Vec<StepRecord> = Vec::with_capacity(plan.len());
        let mut error_message = None;
        self.state = RunState::Init;

        info!(steps = plan.len(), "Starting provisioning run");

        for (index, spec) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(step = index, id = %spec.id, "Run cancelled before step");
                self.state = RunState::Halted {
                    step: index,
                    reason: HaltReason::Cancelled,
                };
                error_message = Some(format!("cancelled before {}", spec.id));
                break;
            }

            self.state = RunState::Running { step: index };
            let step_start = Instant::now();
            let result = self.execute(spec).await;

            match &result {
                ExecutionResult::Created => {
                    info!(step = index, id = %spec.id, kind = %spec.kind, "Created");
                }
                ExecutionResult::AlreadyExists => {
                    info!(step = index, id = %spec.id, kind = %spec.kind, "Already exists");
                }
                ExecutionResult::Failed(failure) => {
                    error!(
                        step = index,
                        id = %spec.id,
                        kind = %failure.kind,
                        attempts = failure.attempts,
                        "Step failed: {}",
                        failure.message
                    );
                    self.state = RunState::Halted {
                        step: index,
                        reason: HaltReason::Failed { kind: failure.kind },
                    };
                    error_message = Some(failure.message.clone());
                }
            }

            steps.push(StepRecord {
                index,
                id: spec.id.clone(),
                kind: spec.kind,
                result,
                duration_ms: step_start.elapsed().as_millis() as u64,
            });

            if self.state.is_terminal() {
                break;
            }
        }

        let mut address = None;
        if !self.state.is_terminal() {
            match self.resolve_address(plan).await {
                Ok(resolved) => {
                    if let Some(ref ip) = resolved {
                        info!(address = %ip, "Provisioning succeeded");
                    } else {
                        info!("Provisioning succeeded without an external address");
                    }
                    address = resolved;
                    self.state = RunState::Succeeded;
                }
                Err(e) => {
                    error!(kind = %e.kind, "Failed to resolve the external address: {}", e.message);
                    self.state = RunState::Halted {
                        step: plan.len(),
                        reason: HaltReason::Failed { kind: e.kind },
                    };
                    error_message = Some(e.message);
                }
            }
        }

        ProvisioningReport {
            environment: self.environment.clone(),
            steps,
            state: self.state.clone(),
            address,
            error: error_message,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn execute(&self, spec: &ResourceSpec) -> ExecutionResult {
        let cp = self.control_plane.as_ref();

        match self.call("exists", &spec.id, || cp.exists(spec)).await {
            Ok(true) => return ExecutionResult::AlreadyExists,
            Ok(false) => {}
            Err(e) => return ExecutionResult::Failed(e.into_failure()),
        }

        let created = match spec.kind {
            ResourceKind::IamBinding => self.bind_iam(spec).await,
            ResourceKind::AccessConfig => return self.rebind(spec).await,
            _ => self.call("create", &spec.id, || cp.create(spec)).await,
        };

        match created {
            Ok(()) => ExecutionResult::Created,
            Err(e) if e.kind == ErrorKind::AlreadyExists => ExecutionResult::AlreadyExists,
            Err(e) => ExecutionResult::Failed(e.into_failure()),
        }
    }

    async fn bind_iam(&self, spec: &ResourceSpec) -> Result<(), CallError> {
        let member = spec.require_param(params::MEMBER).map_err(CallError::immediate)?;
        let role = spec.require_param(params::ROLE).map_err(CallError::immediate)?;
        let resource = spec
            .param(params::INSTANCE)
            .unwrap_or(self.environment.project_id.as_str());
        let cp = self.control_plane.as_ref();

        self.call("bind_iam", &spec.id, || cp.bind_iam(resource, member, role))
            .await
    }

    /// Move the instance's external access config onto the reserved address
    ///
    /// The address reservation has already succeeded when this runs, so any
    /// failure here leaves an unattached address behind and is recorded as
    /// `PartialRebind`. The next run finds the address through its existence
    /// check and retries only the rebind.
    async fn rebind(&self, spec: &ResourceSpec) -> ExecutionResult {
        let (instance, address_name) = match (
            spec.require_param(params::INSTANCE),
            spec.require_param(params::ADDRESS),
        ) {
            (Ok(i), Ok(a)) => (i, a),
            (Err(e), _) | (_, Err(e)) => {
                return ExecutionResult::Failed(CallError::immediate(e).into_failure());
            }
        };
        let name = spec
            .param(params::ACCESS_CONFIG_NAME)
            .unwrap_or(DEFAULT_ACCESS_CONFIG_NAME);
        let cp = self.control_plane.as_ref();

        let outcome: Result<(), CallError> = async {
            let attributes = self
                .call("describe", address_name, || {
                    cp.describe(ResourceKind::StaticAddress, address_name)
                })
                .await?;
            let address = attributes
                .get(attrs::ADDRESS)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| CallError {
                    kind: ErrorKind::NotFound,
                    message: format!("static address {} has no address value", address_name),
                    attempts: 1,
                })?;

            match self
                .call("delete_access_config", instance, || {
                    cp.delete_access_config(instance, name)
                })
                .await
            {
                Ok(()) => {}
                Err(e) if e.kind == ErrorKind::NotFound => {
                    debug!(instance, name, "No access config to delete");
                }
                Err(e) => return Err(e),
            }

            self.call("add_access_config", instance, || {
                cp.add_access_config(instance, name, &address)
            })
            .await
        }
        .await;

        match outcome {
            Ok(()) => ExecutionResult::Created,
            Err(e) => {
                warn!(
                    instance,
                    address = address_name,
                    "Reserved address is not attached to the instance"
                );
                ExecutionResult::Failed(StepFailure {
                    kind: ErrorKind::PartialRebind,
                    message: format!(
                        "address {} reserved but not attached to {}: {}",
                        address_name, instance, e.message
                    ),
                    cause: Some(e.kind),
                    attempts: e.attempts,
                })
            }
        }
    }

    /// Query the externally reachable address after a successful run
    async fn resolve_address(&self, plan: &ProvisioningPlan) -> Result<Option<String>, CallError> {
        let cp = self.control_plane.as_ref();

        if let Some(instance) = plan.by_kind(ResourceKind::Instance).last() {
            let attributes = self
                .call("describe", &instance.id, || {
                    cp.describe(ResourceKind::Instance, &instance.id)
                })
                .await?;
            if let Some(ip) = attributes.get(attrs::NAT_IP).and_then(|v| v.as_str()) {
                return Ok(Some(ip.to_string()));
            }
            debug!(instance = %instance.id, "Instance has no external address");
        }

        if let Some(address) = plan.by_kind(ResourceKind::StaticAddress).last() {
            let attributes = self
                .call("describe", &address.id, || {
                    cp.describe(ResourceKind::StaticAddress, &address.id)
                })
                .await?;
            return attributes
                .get(attrs::ADDRESS)
                .and_then(|v| v.as_str())
                .map(|ip| Some(ip.to_string()))
                .ok_or_else(|| CallError {
                    kind: ErrorKind::Fatal,
                    message: format!("static address {} has no address value", address.id),
                    attempts: 1,
                });
        }

        Ok(None)
    }

    /// Run one control-plane call with a timeout, retrying transient failures
    async fn call<T, F, Fut>(&self, op: &str, id: &str, mut f: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.retry.call_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(CloudError::Timeout(format!(
                    "{} {} did not finish within {:?}",
                    op, id, self.retry.call_timeout
                ))),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.kind();
            if !kind.is_retryable() {
                return Err(CallError {
                    kind,
                    message: err.to_string(),
                    attempts: attempt,
                });
            }

            if attempt >= max_attempts {
                return Err(CallError {
                    kind: ErrorKind::Fatal,
                    message: format!("{} {} gave up after {} attempts: {}", op, id, attempt, err),
                    attempts: attempt,
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                op,
                id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying: {}",
                err
            );
            tokio::time::sleep(delay).await;
        }
    }
}
