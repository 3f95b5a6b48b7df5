//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a `ProviderService` in-process without a gRPC
//! server, and [`InMemoryFastly`] stands in for the Fastly API.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_fastly::testing::{InMemoryFastly, ProviderTester};
//! use hemmer_provider_fastly::FastlyProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_service_logging() {
//!     let api = Arc::new(InMemoryFastly::new());
//!     let tester = ProviderTester::new(FastlyProvider::with_api(api.clone()));
//!
//!     let state = tester.lifecycle_create("fastly_service_vcl", json!({
//!         "service_id": "svc",
//!         "version": 1,
//!         "logging_kafka": [{"name": "kafka", "topic": "logs", "brokers": "b:9092"}]
//!     })).await.unwrap();
//!
//!     assert_eq!(api.kafkas("svc", 1).len(), 1);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::fastly::{
    CreateKafkaInput, DeleteKafkaInput, FastlyApi, Kafka, KafkaFields, ListKafkasInput,
    UpdateKafkaInput,
};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A test harness wrapping a `ProviderService`.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns `Ok(())` if validation passes (no error diagnostics).
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    ///
    /// Returns `Ok(())` if configuration succeeds.
    /// Returns `Err` with the diagnostics if there are errors.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create → read → update → read → delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Check diagnostics and return an error if there are any errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory Fastly API
// =========================================================================

/// A call recorded by [`InMemoryFastly`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `list_kafkas`
    List(ListKafkasInput),
    /// `create_kafka`
    Create(CreateKafkaInput),
    /// `update_kafka`
    Update(UpdateKafkaInput),
    /// `delete_kafka`
    Delete(DeleteKafkaInput),
}

type VersionKey = (String, u32);

#[derive(Default)]
struct FakeState {
    endpoints: BTreeMap<VersionKey, BTreeMap<String, Kafka>>,
    calls: Vec<ApiCall>,
    fail_next: Option<ProviderError>,
}

/// An in-memory [`FastlyApi`] that behaves like the real endpoints.
///
/// Endpoints are stored per service version and keyed by name. Creating an
/// existing name answers 409, touching a missing one answers 404. Every call
/// is recorded, including failed ones.
#[derive(Default)]
pub struct InMemoryFastly {
    state: Mutex<FakeState>,
}

impl InMemoryFastly {
    /// Create an empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an endpoint on a service version.
    pub fn with_kafka(self, service_id: &str, version: u32, kafka: Kafka) -> Self {
        self.lock()
            .endpoints
            .entry((service_id.to_string(), version))
            .or_default()
            .insert(kafka.name.clone(), kafka);
        self
    }

    /// Endpoints of a service version, ordered by name.
    pub fn kafkas(&self, service_id: &str, version: u32) -> Vec<Kafka> {
        self.lock()
            .endpoints
            .get(&(service_id.to_string(), version))
            .map(|endpoints| endpoints.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A single endpoint, if it exists.
    pub fn kafka(&self, service_id: &str, version: u32, name: &str) -> Option<Kafka> {
        self.lock()
            .endpoints
            .get(&(service_id.to_string(), version))
            .and_then(|endpoints| endpoints.get(name).cloned())
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call fail with the given API status.
    pub fn fail_next(&self, status: u16, message: &str) {
        self.lock().fail_next = Some(ProviderError::api(status, message));
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A panicking test poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `call` and return the injected failure, if any.
    fn record(state: &mut FakeState, call: ApiCall) -> Result<(), ProviderError> {
        state.calls.push(call);
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found(name: &str) -> ProviderError {
    ProviderError::api(404, format!("Record not found: {}", name))
}

fn apply(kafka: &mut Kafka, fields: &KafkaFields) {
    fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            target.clone_from(value);
        }
    }

    set(&mut kafka.topic, &fields.topic);
    set(&mut kafka.brokers, &fields.brokers);
    set(&mut kafka.compression_codec, &fields.compression_codec);
    set(&mut kafka.required_acks, &fields.required_acks);
    set(&mut kafka.use_tls, &fields.use_tls.map(|b| b.0));
    set(&mut kafka.tls_ca_cert, &fields.tls_ca_cert);
    set(&mut kafka.tls_client_cert, &fields.tls_client_cert);
    set(&mut kafka.tls_client_key, &fields.tls_client_key);
    set(&mut kafka.tls_hostname, &fields.tls_hostname);
    set(&mut kafka.format, &fields.format);
    set(&mut kafka.format_version, &fields.format_version);
    set(&mut kafka.placement, &fields.placement);
    set(&mut kafka.response_condition, &fields.response_condition);
    set(&mut kafka.parse_log_keyvals, &fields.parse_log_keyvals.map(|b| b.0));
    set(&mut kafka.request_max_bytes, &fields.request_max_bytes);
    set(&mut kafka.auth_method, &fields.auth_method);
    set(&mut kafka.user, &fields.user);
    set(&mut kafka.password, &fields.password);
}

#[async_trait]
impl FastlyApi for InMemoryFastly {
    async fn list_kafkas(&self, input: &ListKafkasInput) -> Result<Vec<Kafka>, ProviderError> {
        let mut state = self.lock();
        Self::record(&mut state, ApiCall::List(input.clone()))?;
        Ok(state
            .endpoints
            .get(&(input.service_id.clone(), input.service_version))
            .map(|endpoints| endpoints.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_kafka(&self, input: &CreateKafkaInput) -> Result<Kafka, ProviderError> {
        let mut state = self.lock();
        Self::record(&mut state, ApiCall::Create(input.clone()))?;

        let endpoints = state
            .endpoints
            .entry((input.service_id.clone(), input.service_version))
            .or_default();
        if endpoints.contains_key(&input.name) {
            return Err(ProviderError::api(409, format!("Duplicate record: {}", input.name)));
        }

        let mut kafka = Kafka {
            name: input.name.clone(),
            ..Default::default()
        };
        apply(&mut kafka, &input.fields);
        endpoints.insert(input.name.clone(), kafka.clone());
        Ok(kafka)
    }

    async fn update_kafka(&self, input: &UpdateKafkaInput) -> Result<Kafka, ProviderError> {
        let mut state = self.lock();
        Self::record(&mut state, ApiCall::Update(input.clone()))?;

        let kafka = state
            .endpoints
            .get_mut(&(input.service_id.clone(), input.service_version))
            .and_then(|endpoints| endpoints.get_mut(&input.name))
            .ok_or_else(|| not_found(&input.name))?;
        apply(kafka, &input.fields);
        Ok(kafka.clone())
    }

    async fn delete_kafka(&self, input: &DeleteKafkaInput) -> Result<(), ProviderError> {
        let mut state = self.lock();
        Self::record(&mut state, ApiCall::Delete(input.clone()))?;

        state
            .endpoints
            .get_mut(&(input.service_id.clone(), input.service_version))
            .and_then(|endpoints| endpoints.remove(&input.name))
            .map(|_| ())
            .ok_or_else(|| not_found(&input.name))
    }
}
