//! Server helpers for running the provider.
//!
//! This module provides the `ProviderService` trait the provider implements,
//! and the `serve` function that starts a gRPC server with the handshake
//! protocol.
//!
//! # Signal Handling
//!
//! The server handles SIGTERM and SIGINT for graceful shutdown. When a signal
//! is received, the server stops accepting new connections and waits up to
//! [`ServeOptions::shutdown_timeout`] for in-flight requests to complete. It
//! then calls the provider's `stop()` method and exits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated as proto;
use crate::schema::{Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// Trait the provider implements.
///
/// This is a higher-level API than the raw gRPC trait: configuration and
/// state arrive as decoded JSON, and failures are plain [`ProviderError`]s
/// that the server turns into error diagnostics.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.schema().resources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. `prior_state` is `None` on create.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Wrapper that implements the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

/// Decode a JSON payload. Empty bytes mean the value is absent.
fn decode(bytes: &[u8]) -> Result<Value, ProviderError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn decode_pair(first: &[u8], second: &[u8]) -> Result<(Value, Value), ProviderError> {
    Ok((decode(first)?, decode(second)?))
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| proto::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: ProviderError) -> Vec<proto::Diagnostic> {
    diagnostics_to_proto(vec![Diagnostic::error(err.to_string())])
}

/// Flatten a diagnostics-returning call into the proto list, logging the outcome.
fn report(operation: &str, result: Result<Vec<Diagnostic>, ProviderError>) -> Vec<proto::Diagnostic> {
    match result {
        Ok(diagnostics) => {
            if diagnostics.iter().any(Diagnostic::is_error) {
                warn!(diagnostics = diagnostics.len(), "{} completed with errors", operation);
            } else {
                info!("{} completed successfully", operation);
            }
            diagnostics_to_proto(diagnostics)
        }
        Err(e) => {
            error!(error = %e, "{} failed", operation);
            error_to_diagnostics(e)
        }
    }
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> proto::Block {
    proto::Block {
        attributes: block
            .attributes
            .iter()
            .map(|(name, attr)| proto::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                default_value: attr.default.as_ref().map(encode).unwrap_or_default(),
                allowed_values: if attr.allowed_values.is_empty() {
                    Vec::new()
                } else {
                    serde_json::to_vec(&attr.allowed_values).unwrap_or_default()
                },
            })
            .collect(),
        block_types: block
            .blocks
            .iter()
            .map(|(name, nested)| proto::NestedBlock {
                type_name: name.clone(),
                block: Some(block_to_proto(&nested.block)),
                nesting_mode: match nested.nesting_mode {
                    BlockNestingMode::Single => proto::nested_block::NestingMode::Single as i32,
                    BlockNestingMode::List => proto::nested_block::NestingMode::List as i32,
                    BlockNestingMode::Set => proto::nested_block::NestingMode::Set as i32,
                },
                min_items: nested.min_items as i32,
                max_items: nested.max_items as i32,
            })
            .collect(),
        description: block.description.clone().unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl<P: ProviderService> proto::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<proto::GetMetadataRequest>,
    ) -> Result<Response<proto::GetMetadataResponse>, Status> {
        let metadata = self.provider.metadata();
        info!(resources = metadata.resources.len(), "GetMetadata completed");
        Ok(Response::new(proto::GetMetadataResponse {
            server_capabilities: Some(metadata.capabilities.into()),
            resources: metadata.resources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<proto::GetSchemaRequest>,
    ) -> Result<Response<proto::GetSchemaResponse>, Status> {
        let schema = self.provider.schema();
        info!(resources = schema.resources.len(), "GetSchema completed");
        Ok(Response::new(proto::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<proto::ValidateProviderConfigRequest>,
    ) -> Result<Response<proto::ValidateProviderConfigResponse>, Status> {
        debug!("ValidateProviderConfig called");
        let result = match decode(&request.into_inner().config) {
            Ok(config) => self.provider.validate_provider_config(config).await,
            Err(e) => Err(e),
        };
        Ok(Response::new(proto::ValidateProviderConfigResponse {
            diagnostics: report("ValidateProviderConfig", result),
        }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<proto::ConfigureRequest>,
    ) -> Result<Response<proto::ConfigureResponse>, Status> {
        debug!("Configure called");
        let result = match decode(&request.into_inner().config) {
            Ok(config) => self.provider.configure(config).await,
            Err(e) => Err(e),
        };
        Ok(Response::new(proto::ConfigureResponse {
            diagnostics: report("Configure", result),
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(&self, _request: Request<proto::StopRequest>) -> Result<Response<proto::StopResponse>, Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            }
        };
        Ok(Response::new(proto::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config", fields(resource_type))]
    async fn validate_resource_config(
        &self,
        request: Request<proto::ValidateResourceConfigRequest>,
    ) -> Result<Response<proto::ValidateResourceConfigResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_resource_config(&req.resource_type, config)
                    .await
            }
            Err(e) => Err(e),
        };
        Ok(Response::new(proto::ValidateResourceConfigResponse {
            diagnostics: report("ValidateResourceConfig", result),
        }))
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(&self, request: Request<proto::PlanRequest>) -> Result<Response<proto::PlanResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, is_create = req.prior_state.is_empty(), "Plan called");

        let decoded = decode(&req.prior_state).and_then(|prior| {
            let (proposed, config) = decode_pair(&req.proposed_state, &req.config)?;
            Ok((prior, proposed, config))
        });
        let result = match decoded {
            Ok((prior, proposed, config)) => {
                let prior = if prior.is_null() { None } else { Some(prior) };
                self.provider
                    .plan(&req.resource_type, prior, proposed, config)
                    .await
            }
            Err(e) => Err(e),
        };

        let response = match result {
            Ok(plan) => {
                info!(
                    resource_type = %req.resource_type,
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                proto::PlanResponse {
                    planned_state: encode(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Plan failed");
                proto::PlanResponse {
                    diagnostics: error_to_diagnostics(e),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: Request<proto::CreateRequest>,
    ) -> Result<Response<proto::CreateResponse>, Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Create called");
        let result = match decode(&req.planned_state) {
            Ok(planned) => self.provider.create(&req.resource_type, planned).await,
            Err(e) => Err(e),
        };
        let (state, diagnostics) = state_or_diagnostics("Create", result);
        Ok(Response::new(proto::CreateResponse { state, diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(&self, request: Request<proto::ReadRequest>) -> Result<Response<proto::ReadResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Read called");
        let result = match decode(&req.current_state) {
            Ok(current) => self.provider.read(&req.resource_type, current).await,
            Err(e) => Err(e),
        };
        let (state, diagnostics) = state_or_diagnostics("Read", result);
        Ok(Response::new(proto::ReadResponse { state, diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: Request<proto::UpdateRequest>,
    ) -> Result<Response<proto::UpdateResponse>, Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Update called");
        let result = match decode_pair(&req.prior_state, &req.planned_state) {
            Ok((prior, planned)) => {
                self.provider
                    .update(&req.resource_type, prior, planned)
                    .await
            }
            Err(e) => Err(e),
        };
        let (state, diagnostics) = state_or_diagnostics("Update", result);
        Ok(Response::new(proto::UpdateResponse { state, diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Delete called");
        let result = match decode(&req.current_state) {
            Ok(current) => self.provider.delete(&req.resource_type, current).await,
            Err(e) => Err(e),
        }
        .map(|()| vec![]);
        Ok(Response::new(proto::DeleteResponse {
            diagnostics: report("Delete", result),
        }))
    }

    #[instrument(skip(self, request), name = "grpc.import_resource_state")]
    async fn import_resource_state(
        &self,
        request: Request<proto::ImportResourceStateRequest>,
    ) -> Result<Response<proto::ImportResourceStateResponse>, Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "ImportResourceState called");

        let response = match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => {
                info!(imported_count = imported.len(), "ImportResourceState completed");
                proto::ImportResourceStateResponse {
                    imported: imported.into_iter().map(Into::into).collect(),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(id = %req.id, error = %e, "ImportResourceState failed");
                proto::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_diagnostics(e),
                }
            }
        };
        Ok(Response::new(response))
    }
}

fn state_or_diagnostics(
    operation: &str,
    result: Result<Value, ProviderError>,
) -> (Vec<u8>, Vec<proto::Diagnostic>) {
    match result {
        Ok(state) => {
            debug!("{} completed successfully", operation);
            (encode(&state), vec![])
        }
        Err(e) => {
            error!(error = %e, "{} failed", operation);
            (vec![], error_to_diagnostics(e))
        }
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C on Windows).
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received CTRL+C, initiating graceful shutdown");
    }

    Ok(())
}

/// Serve a provider implementation as a gRPC server.
///
/// Binds an ephemeral port on the loopback interface, prints the handshake
/// line `HEMMER_PROVIDER|<version>|<address>` to stdout and serves until a
/// shutdown signal arrives.
///
/// For custom configuration, use [`serve_with_options`].
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options. See [`serve`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options).await
}

/// Serve a provider on a specific address instead of an ephemeral port.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Serve a provider on a specific address with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    println!("{}", handshake_line(addr));
    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let grpc_service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(proto::provider_server::ProviderServer::new(grpc_service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async {
                let _ = shutdown_rx.await;
            },
        );
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        signal = wait_for_shutdown_signal() => {
            signal?;
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(Ok(())) => info!("Server shutdown complete"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                }
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        }
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FastlyProvider;
    use crate::schema::{Attribute, NestedBlock};
    use crate::testing::InMemoryFastly;
    use proto::provider_server::Provider;
    use serde_json::json;

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        assert_eq!(handshake_line(addr), "HEMMER_PROVIDER|1|127.0.0.1:50051");
    }

    #[test]
    fn test_block_to_proto() {
        let block = Block::new()
            .with_attribute(
                "format_version",
                Attribute::optional_int64()
                    .with_default(json!(2))
                    .with_allowed_values([1, 2]),
            )
            .with_attribute("password", Attribute::optional_string().sensitive())
            .with_block("logging_kafka", NestedBlock::set(Block::new()));

        let proto = block_to_proto(&block);
        assert_eq!(proto.attributes.len(), 2);

        let version = &proto.attributes[0];
        assert_eq!(version.name, "format_version");
        assert_eq!(serde_json::from_slice::<Value>(&version.default_value).unwrap(), json!(2));
        assert_eq!(
            serde_json::from_slice::<Value>(&version.allowed_values).unwrap(),
            json!([1, 2])
        );

        let password = &proto.attributes[1];
        assert!(password.sensitive);
        assert!(password.default_value.is_empty());
        assert!(password.allowed_values.is_empty());

        assert_eq!(proto.block_types[0].type_name, "logging_kafka");
        assert_eq!(
            proto.block_types[0].nesting_mode,
            proto::nested_block::NestingMode::Set as i32
        );
    }

    #[test]
    fn test_error_to_diagnostics() {
        let diags = error_to_diagnostics(ProviderError::api(403, "Forbidden"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, proto::diagnostic::Severity::Error as i32);
        assert!(diags[0].summary.contains("Forbidden"));
    }

    #[test]
    fn test_report_keeps_warnings() {
        let diags = report(
            "Configure",
            Ok(vec![Diagnostic::warning("deprecated").with_attribute("base_url")]),
        );
        assert_eq!(diags[0].severity, proto::diagnostic::Severity::Warning as i32);
        assert_eq!(diags[0].attribute, "base_url");
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(b"").unwrap(), Value::Null);
        assert_eq!(decode(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(decode(b"not json"), Err(ProviderError::Serialization(_))));
        assert!(decode_pair(b"{}", b"{bad").is_err());
    }

    fn grpc_service() -> (Arc<InMemoryFastly>, ProviderGrpcService<FastlyProvider>) {
        let api = Arc::new(InMemoryFastly::new());
        let service = ProviderGrpcService {
            provider: Arc::new(FastlyProvider::with_api(api.clone())),
        };
        (api, service)
    }

    fn prior_state() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "svc",
            "service_id": "svc",
            "version": 1,
            "logging_kafka": [{"name": "k", "topic": "t", "brokers": "b", "use_tls": false}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_plan_rejects_malformed_proposed_state() {
        let (_, service) = grpc_service();
        let response = Provider::plan(
            &service,
            Request::new(proto::PlanRequest {
                resource_type: "fastly_service_vcl".to_string(),
                prior_state: prior_state(),
                proposed_state: b"{bad".to_vec(),
                ..Default::default()
            }),
        )
        .await
        .unwrap()
        .into_inner();

        assert!(response.changes.is_empty());
        assert!(response.planned_state.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].severity, proto::diagnostic::Severity::Error as i32);
        assert!(response.diagnostics[0].summary.contains("Serialization error"));
    }

    #[tokio::test]
    async fn test_update_rejects_malformed_prior_state() {
        let (api, service) = grpc_service();
        let response = Provider::update(
            &service,
            Request::new(proto::UpdateRequest {
                resource_type: "fastly_service_vcl".to_string(),
                prior_state: b"[".to_vec(),
                planned_state: prior_state(),
            }),
        )
        .await
        .unwrap()
        .into_inner();

        assert!(response.state.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_serve_options() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }
}
