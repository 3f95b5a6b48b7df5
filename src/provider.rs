//! The Fastly provider.
//!
//! Exposes one resource type per service flavor (`fastly_service_vcl`,
//! `fastly_service_compute`). A resource addresses a single service version;
//! its nested blocks are owned by [`ServiceAttributeHandler`]s that reconcile
//! them against the API.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::{config_diagnostics, ProviderConfig};
use crate::error::ProviderError;
use crate::fastly::{FastlyApi, FastlyClient};
use crate::logging_kafka::KafkaHandler;
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::service::{ServiceAttributeHandler, ServiceMetadata, ServiceType, ServiceVersion};
use crate::setdiff::{name_key, DiffError, SetDiff};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation::validate;

/// A service resource type and the handlers for its nested blocks.
struct ServiceDefinition {
    handlers: Vec<Box<dyn ServiceAttributeHandler>>,
}

impl ServiceDefinition {
    fn new(service_type: ServiceType) -> Self {
        let metadata = ServiceMetadata::new(service_type);
        Self {
            handlers: vec![Box::new(KafkaHandler::new(metadata))],
        }
    }

    fn schema(&self) -> Schema {
        let base = Schema::v0()
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Same as service_id"),
            )
            .with_attribute(
                "service_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the Fastly service"),
            )
            .with_attribute(
                "version",
                Attribute::required_int64()
                    .with_description("Editable service version the endpoints are written to"),
            );

        self.handlers.iter().fold(base, |schema, handler| handler.register(schema))
    }
}

/// Provider for Fastly service logging endpoints.
pub struct FastlyProvider {
    services: BTreeMap<&'static str, ServiceDefinition>,
    api: RwLock<Option<Arc<dyn FastlyApi>>>,
}

impl Default for FastlyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FastlyProvider {
    /// Create an unconfigured provider. `configure` builds the API client.
    pub fn new() -> Self {
        let services = [ServiceType::Vcl, ServiceType::Compute]
            .into_iter()
            .map(|t| (t.resource_type(), ServiceDefinition::new(t)))
            .collect();
        Self {
            services,
            api: RwLock::new(None),
        }
    }

    /// Create a provider that talks to the given API instead of configuring a client.
    pub fn with_api(api: Arc<dyn FastlyApi>) -> Self {
        Self {
            api: RwLock::new(Some(api)),
            ..Self::new()
        }
    }

    async fn api(&self) -> Result<Arc<dyn FastlyApi>, ProviderError> {
        self.api.read().await.clone().ok_or(ProviderError::NotConfigured)
    }

    fn definition(&self, resource_type: &str) -> Result<&ServiceDefinition, ProviderError> {
        self.services
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }
}

/// Records of a nested set block, or nothing when the block is absent.
fn records<'a>(state: &'a Value, key: &str) -> &'a [Value] {
    state
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// The service version a resource state addresses.
fn target(state: &Value) -> Result<ServiceVersion, ProviderError> {
    let service_id = state
        .get("service_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::Validation("service_id is required".to_string()))?;

    let version = state
        .get("version")
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            ProviderError::Validation(format!(
                "version must be a positive integer, got {}",
                state.get("version").unwrap_or(&Value::Null)
            ))
        })?;

    Ok(ServiceVersion::new(service_id, version))
}

fn with_id(mut state: Value) -> Value {
    if let Some(obj) = state.as_object_mut() {
        if let Some(service_id) = obj.get("service_id").cloned() {
            obj.insert("id".to_string(), service_id);
        }
    }
    state
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Attribute changes between two resource states.
///
/// Nested set blocks are diffed by name: whole records are reported as
/// `<block>.<name>`, field edits of a kept record as `<block>.<name>.<field>`.
fn diff_states(schema: &Schema, before: &Value, after: &Value) -> Result<Vec<AttributeChange>, ProviderError> {
    let mut changes = Vec::new();

    for name in schema.block.attributes.keys() {
        match (present(before.get(name)), present(after.get(name))) {
            (None, Some(a)) => changes.push(AttributeChange::added(name.as_str(), a.clone())),
            (Some(b), None) => changes.push(AttributeChange::removed(name.as_str(), b.clone())),
            (Some(b), Some(a)) if b != a => {
                changes.push(AttributeChange::modified(name.as_str(), b.clone(), a.clone()))
            }
            _ => {}
        }
    }

    let set_diff = SetDiff::new(name_key);
    for key in schema.block.blocks.keys() {
        let old = records(before, key);
        let new = records(after, key);
        let diff = set_diff.diff(old, new)?;

        for record in diff.deleted {
            let path = format!("{}.{}", key, name_key(record)?);
            changes.push(AttributeChange::removed(path, record.clone()));
        }
        for record in diff.added {
            let path = format!("{}.{}", key, name_key(record)?);
            changes.push(AttributeChange::added(path, record.clone()));
        }
        for record in diff.modified {
            let name = name_key(record)?;
            let previous = old
                .iter()
                .find(|r| name_key(r).as_deref() == Ok(name.as_str()))
                .unwrap_or(&Value::Null);
            for (field, value) in set_diff.filter(record, old)? {
                let path = format!("{}.{}.{}", key, name, field);
                let before = present(previous.get(&field)).cloned();
                let after = present(Some(&value)).cloned();
                changes.push(AttributeChange::new(path, before, after));
            }
        }
    }

    Ok(changes)
}

#[async_trait::async_trait]
impl ProviderService for FastlyProvider {
    fn schema(&self) -> ProviderSchema {
        self.services.iter().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, (resource_type, definition)| schema.with_resource(*resource_type, definition.schema()),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if diagnostics.is_empty() {
            diagnostics = config_diagnostics(&ProviderConfig::from_value(&config));
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = ProviderConfig::from_value(&config);
        let diagnostics = config_diagnostics(&resolved);
        let Ok(resolved) = resolved else {
            return Ok(diagnostics);
        };

        let client = FastlyClient::new(&resolved)?;
        info!(base_url = %resolved.base_url, timeout = ?resolved.timeout, "Configured Fastly client");
        *self.api.write().await = Some(Arc::new(client));
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.api.write().await.take();
        debug!("Released Fastly client");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let definition = self.definition(resource_type)?;
        let mut diagnostics = validate(&definition.schema(), &config);

        // Names are the identity of set records, so they must be unique.
        // A missing name is already reported by the schema check.
        let set_diff = SetDiff::new(name_key);
        for handler in &definition.handlers {
            if let Err(e @ DiffError::DuplicateKey { .. }) =
                set_diff.diff(&[], records(&config, handler.key()))
            {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid {} block", handler.key()))
                        .with_detail(e.to_string())
                        .with_attribute(handler.key()),
                );
            }
        }

        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.definition(resource_type)?.schema();
        let prior = prior_state.unwrap_or(Value::Null);

        let planned = if proposed_state.is_null() {
            Value::Null
        } else {
            with_id(schema.normalize(proposed_state))
        };

        let changes = diff_states(&schema, &prior, &planned)?;
        let requires_replace = !prior.is_null()
            && !planned.is_null()
            && changes.iter().any(|c| {
                schema
                    .block
                    .attributes
                    .get(&c.path)
                    .is_some_and(|attr| attr.force_new)
            });

        debug!(changes = changes.len(), requires_replace, "Planned service changes");
        if changes.is_empty() {
            Ok(PlanResult::no_change(planned))
        } else {
            Ok(PlanResult::with_changes(planned, changes, requires_replace))
        }
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let definition = self.definition(resource_type)?;
        let api = self.api().await?;
        let state = with_id(definition.schema().normalize(planned_state));
        let version = target(&state)?;

        for handler in &definition.handlers {
            handler
                .process(api.as_ref(), &version, &[], records(&state, handler.key()))
                .await?;
        }

        info!(resource_type, service = %version, "Created service resources");
        Ok(state)
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let definition = self.definition(resource_type)?;
        let api = self.api().await?;
        let version = target(&current_state)?;

        let mut state = match current_state {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        for handler in &definition.handlers {
            let records = handler.read(api.as_ref(), &version).await?;
            state.insert(handler.key().to_string(), Value::Array(records));
        }

        Ok(with_id(Value::Object(state)))
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let definition = self.definition(resource_type)?;
        let api = self.api().await?;
        let state = with_id(definition.schema().normalize(planned_state));
        let version = target(&state)?;

        for handler in &definition.handlers {
            let key = handler.key();
            handler
                .process(api.as_ref(), &version, records(&prior_state, key), records(&state, key))
                .await?;
        }

        info!(resource_type, service = %version, "Updated service resources");
        Ok(state)
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let definition = self.definition(resource_type)?;
        let api = self.api().await?;
        let version = target(&current_state)?;

        for handler in &definition.handlers {
            handler
                .process(api.as_ref(), &version, records(&current_state, handler.key()), &[])
                .await?;
        }

        info!(resource_type, service = %version, "Deleted service resources");
        Ok(())
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.definition(resource_type)?;

        let (service_id, version) = id
            .split_once('/')
            .and_then(|(service_id, version)| Some((service_id, version.parse::<u32>().ok()?)))
            .filter(|(service_id, version)| !service_id.is_empty() && *version > 0)
            .ok_or_else(|| {
                ProviderError::Validation(format!(
                    "import id must look like <service_id>/<version>, got {:?}",
                    id
                ))
            })?;

        let state = self
            .read(resource_type, json!({"service_id": service_id, "version": version}))
            .await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryFastly;

    const VCL: &str = "fastly_service_vcl";
    const COMPUTE: &str = "fastly_service_compute";

    fn kafka(name: &str, topic: &str) -> Value {
        json!({"name": name, "topic": topic, "brokers": "b:9092"})
    }

    #[test]
    fn test_schema_has_both_service_types() {
        let schema = FastlyProvider::new().schema();
        assert_eq!(
            schema.resources.keys().collect::<Vec<_>>(),
            vec![COMPUTE, VCL]
        );
        assert!(schema.provider.block.attributes["api_key"].flags.sensitive);

        let vcl = &schema.resources[VCL];
        assert!(vcl.block.attributes["service_id"].force_new);
        assert!(vcl.block.attributes["id"].flags.computed);
        assert!(vcl.block.blocks["logging_kafka"].block.attributes.contains_key("placement"));
        assert!(!schema.resources[COMPUTE].block.blocks["logging_kafka"]
            .block
            .attributes
            .contains_key("placement"));
    }

    #[test]
    fn test_target() {
        let version = target(&json!({"service_id": "svc", "version": 7})).unwrap();
        assert_eq!(version, ServiceVersion::new("svc", 7));

        assert!(target(&json!({"version": 7})).is_err());
        assert!(target(&json!({"service_id": "svc", "version": 0})).is_err());
        assert!(target(&json!({"service_id": "svc", "version": "7"})).is_err());
    }

    #[test]
    fn test_diff_states_reports_nested_paths() {
        let schema = FastlyProvider::new().definition(VCL).unwrap().schema();
        let before = json!({
            "service_id": "svc",
            "version": 1,
            "logging_kafka": [kafka("keep", "a"), kafka("drop", "b")]
        });
        let mut changed = kafka("keep", "a2");
        changed["user"] = json!("logger");
        let after = json!({
            "service_id": "svc",
            "version": 2,
            "logging_kafka": [changed, kafka("new", "c")]
        });

        let changes = diff_states(&schema, &before, &after).unwrap();
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "version",
                "logging_kafka.drop",
                "logging_kafka.new",
                "logging_kafka.keep.topic",
                "logging_kafka.keep.user",
            ]
        );
        assert_eq!(changes[4], AttributeChange::added("logging_kafka.keep.user", json!("logger")));
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = FastlyProvider::new();
        let err = provider
            .create(VCL, json!({"service_id": "svc", "version": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let provider = FastlyProvider::with_api(Arc::new(InMemoryFastly::new()));
        let err = provider.read("fastly_service_v2", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_configure() {
        let provider = FastlyProvider::new();
        let diagnostics = provider
            .configure(json!({"api_key": "k", "base_url": "http://127.0.0.1:1"}))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());
        assert!(provider.api().await.is_ok());

        provider.stop().await.unwrap();
        assert!(provider.api().await.is_err());
    }

    #[tokio::test]
    async fn test_validate_resource_config_rejects_duplicate_names() {
        let provider = FastlyProvider::new();
        let diagnostics = provider
            .validate_resource_config(
                VCL,
                json!({
                    "service_id": "svc",
                    "version": 1,
                    "logging_kafka": [kafka("dup", "a"), kafka("dup", "b")]
                }),
            )
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("logging_kafka"));
    }

    #[tokio::test]
    async fn test_validate_resource_config_reports_missing_name_once() {
        let provider = FastlyProvider::new();
        let diagnostics = provider
            .validate_resource_config(
                VCL,
                json!({
                    "service_id": "svc",
                    "version": 1,
                    "logging_kafka": [{"topic": "t", "brokers": "b"}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("logging_kafka.0.name"));
    }

    #[tokio::test]
    async fn test_plan_sets_id_and_defaults() {
        let provider = FastlyProvider::new();
        let plan = provider
            .plan(
                VCL,
                None,
                json!({"service_id": "svc", "version": 1, "logging_kafka": [kafka("k", "t")]}),
                Value::Null,
            )
            .await
            .unwrap();

        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["id"], "svc");
        assert_eq!(plan.planned_state["logging_kafka"][0]["format_version"], 2);
        assert_eq!(plan.planned_state["logging_kafka"][0]["use_tls"], false);
    }

    #[tokio::test]
    async fn test_plan_service_id_change_replaces() {
        let provider = FastlyProvider::new();
        let prior = json!({"id": "svc", "service_id": "svc", "version": 1, "logging_kafka": []});
        let plan = provider
            .plan(
                COMPUTE,
                Some(prior),
                json!({"service_id": "other", "version": 1}),
                Value::Null,
            )
            .await
            .unwrap();
        assert!(plan.requires_replace);
    }

    #[tokio::test]
    async fn test_import() {
        let api = Arc::new(InMemoryFastly::new());
        let provider = FastlyProvider::with_api(api.clone());
        provider
            .create(VCL, json!({"service_id": "svc", "version": 4, "logging_kafka": [kafka("k", "t")]}))
            .await
            .unwrap();

        let imported = provider.import_resource(VCL, "svc/4").await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].state["id"], "svc");
        assert_eq!(imported[0].state["logging_kafka"][0]["name"], "k");

        for bad in ["svc", "svc/", "/4", "svc/zero", "svc/0"] {
            let err = provider.import_resource(VCL, bad).await.unwrap_err();
            assert!(matches!(err, ProviderError::Validation(_)), "{}", bad);
        }
    }
}
