//! Kafka logging endpoints (`logging_kafka` blocks).
//!
//! Each block is one Kafka endpoint on the service version, identified by
//! `name`. Reconciliation deletes endpoints that disappeared, creates new
//! ones, and updates changed ones with only the fields that changed.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::fastly::{
    CreateKafkaInput, DeleteKafkaInput, FastlyApi, Kafka, KafkaFields, ListKafkasInput,
    UpdateKafkaInput,
};
use crate::schema::{Attribute, Block, NestedBlock, Normalizer, Schema};
use crate::service::{ServiceAttributeHandler, ServiceMetadata, ServiceVersion};
use crate::setdiff::{name_key, SetDiff};

/// Allowed values for `placement`.
pub const PLACEMENTS: [&str; 2] = ["none", "waf_debug"];

/// Allowed values for `format_version`.
pub const FORMAT_VERSIONS: [i64; 2] = [1, 2];

/// Handler for the `logging_kafka` block of a service.
#[derive(Debug, Clone)]
pub struct KafkaHandler {
    metadata: ServiceMetadata,
}

/// How a record map is transcribed into request fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldMode {
    /// Every set field is sent; `null` and empty strings are left out.
    Create,
    /// Only the given fields are sent; `null` means "clear this field".
    Update,
}

impl KafkaHandler {
    /// Block name in the service schema.
    pub const KEY: &'static str = "logging_kafka";

    /// Create a handler for a service with the given metadata.
    pub fn new(metadata: ServiceMetadata) -> Self {
        Self { metadata }
    }

    /// Schema of a single `logging_kafka` block.
    pub fn block(&self) -> Block {
        let pem = |description: &str| {
            Attribute::optional_string()
                .sensitive()
                .with_normalizer(Normalizer::TrimSpace)
                .with_description(description)
        };

        let mut block = Block::new()
            .with_description("Kafka logging endpoints of the service version")
            .with_attribute(
                "name",
                Attribute::required_string().with_description(
                    "Unique name of the Kafka logging endpoint. Changing it deletes and recreates the endpoint",
                ),
            )
            .with_attribute(
                "topic",
                Attribute::required_string().with_description("Kafka topic to send logs to"),
            )
            .with_attribute(
                "brokers",
                Attribute::required_string()
                    .with_description("Comma-separated list of IP addresses or hostnames of Kafka brokers"),
            )
            .with_attribute(
                "compression_codec",
                Attribute::optional_string()
                    .with_allowed_values(["gzip", "snappy", "lz4"])
                    .with_description("Codec used to compress logs"),
            )
            .with_attribute(
                "required_acks",
                Attribute::optional_string()
                    .with_allowed_values(["1", "0", "-1"])
                    .with_description(
                        "Acknowledgements a leader must receive before a write succeeds: 1 (one server), 0 (none), -1 (all in-sync replicas)",
                    ),
            )
            .with_attribute(
                "use_tls",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Whether to use TLS for secure logging"),
            )
            .with_attribute(
                "tls_ca_cert",
                pem("CA certificate used to authenticate the brokers, in PEM format"),
            )
            .with_attribute(
                "tls_client_cert",
                pem("Client certificate used for authenticated requests, in PEM format"),
            )
            .with_attribute(
                "tls_client_key",
                pem("Client private key used for authenticated requests, in PEM format"),
            )
            .with_attribute(
                "tls_hostname",
                Attribute::optional_string().with_description(
                    "Hostname used to verify the brokers' certificate (Common Name or SAN)",
                ),
            )
            .with_attribute(
                "parse_log_keyvals",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description(
                        "Parse key=value tuples from the start of each log line into record headers",
                    ),
            )
            .with_attribute(
                "request_max_bytes",
                Attribute::optional_int64()
                    .with_default(json!(0))
                    .with_description("Maximum size of a log batch; 0 means unbounded"),
            )
            .with_attribute(
                "auth_method",
                Attribute::optional_string()
                    .with_allowed_values(["plain", "scram-sha-256", "scram-sha-512"])
                    .with_description("SASL authentication method"),
            )
            .with_attribute("user", Attribute::optional_string().with_description("SASL user"))
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("SASL password"),
            );

        if self.metadata.is_vcl() {
            block = block
                .with_attribute(
                    "format",
                    Attribute::optional_string().with_description("Apache style log formatting"),
                )
                .with_attribute(
                    "format_version",
                    Attribute::optional_int64()
                        .with_default(json!(2))
                        .with_allowed_values(FORMAT_VERSIONS)
                        .with_description("Version of the custom logging format, 1 or 2"),
                )
                .with_attribute(
                    "placement",
                    Attribute::optional_string()
                        .with_allowed_values(PLACEMENTS)
                        .with_description("Where in the generated VCL the logging call is placed"),
                )
                .with_attribute(
                    "response_condition",
                    Attribute::optional_string().with_description(
                        "Name of an existing condition gating the endpoint; empty to always log",
                    ),
                );
        }

        block
    }

    /// Build the create request for a new record.
    pub fn build_create(
        &self,
        record: &Value,
        version: &ServiceVersion,
    ) -> Result<CreateKafkaInput, ProviderError> {
        let fields = as_object(record)?;
        Ok(CreateKafkaInput {
            service_id: version.service_id.clone(),
            service_version: version.version,
            name: name_key(record)?,
            fields: self.fields(fields, FieldMode::Create)?,
        })
    }

    /// Build the update request for a modified record from its changed fields.
    pub fn build_update(
        &self,
        record: &Value,
        changed: &Map<String, Value>,
        version: &ServiceVersion,
    ) -> Result<UpdateKafkaInput, ProviderError> {
        Ok(UpdateKafkaInput {
            service_id: version.service_id.clone(),
            service_version: version.version,
            name: name_key(record)?,
            fields: self.fields(changed, FieldMode::Update)?,
        })
    }

    /// Build the delete request for a removed record.
    pub fn build_delete(
        &self,
        record: &Value,
        version: &ServiceVersion,
    ) -> Result<DeleteKafkaInput, ProviderError> {
        Ok(DeleteKafkaInput {
            service_id: version.service_id.clone(),
            service_version: version.version,
            name: name_key(record)?,
        })
    }

    /// Convert an API endpoint into a state record.
    ///
    /// Empty strings are pruned, and fields this service type does not
    /// register are dropped.
    pub fn flatten(&self, kafka: &Kafka) -> Value {
        let mut record = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                record.insert(key.to_string(), value);
            }
        };
        let text = |s: &Option<String>| s.clone().map(Value::String);

        put("name", Some(Value::String(kafka.name.clone())));
        put("topic", text(&kafka.topic));
        put("brokers", text(&kafka.brokers));
        put("compression_codec", text(&kafka.compression_codec));
        put("required_acks", text(&kafka.required_acks));
        put("use_tls", kafka.use_tls.map(Value::Bool));
        put("tls_ca_cert", text(&kafka.tls_ca_cert));
        put("tls_client_cert", text(&kafka.tls_client_cert));
        put("tls_client_key", text(&kafka.tls_client_key));
        put("tls_hostname", text(&kafka.tls_hostname));
        put("format", text(&kafka.format));
        put("format_version", kafka.format_version.map(Value::from));
        put("placement", text(&kafka.placement));
        put("response_condition", text(&kafka.response_condition));
        put("parse_log_keyvals", kafka.parse_log_keyvals.map(Value::Bool));
        put("request_max_bytes", kafka.request_max_bytes.map(Value::from));
        put("auth_method", text(&kafka.auth_method));
        put("user", text(&kafka.user));
        put("password", text(&kafka.password));

        let block = self.block();
        record.retain(|key, _| block.has_field(key));

        // Same normalization the plan applies to configuration; it also
        // prunes the empty strings the API returns for unset fields.
        block.normalize(Value::Object(record))
    }

    fn fields(&self, map: &Map<String, Value>, mode: FieldMode) -> Result<KafkaFields, ProviderError> {
        let mut fields = KafkaFields {
            topic: string_field(map, "topic", mode)?,
            brokers: string_field(map, "brokers", mode)?,
            compression_codec: string_field(map, "compression_codec", mode)?,
            required_acks: string_field(map, "required_acks", mode)?,
            use_tls: bool_field(map, "use_tls", mode)?.map(Into::into),
            tls_ca_cert: string_field(map, "tls_ca_cert", mode)?,
            tls_client_cert: string_field(map, "tls_client_cert", mode)?,
            tls_client_key: string_field(map, "tls_client_key", mode)?,
            tls_hostname: string_field(map, "tls_hostname", mode)?,
            parse_log_keyvals: bool_field(map, "parse_log_keyvals", mode)?.map(Into::into),
            request_max_bytes: u64_field(map, "request_max_bytes", mode)?,
            auth_method: string_field(map, "auth_method", mode)?,
            user: string_field(map, "user", mode)?,
            password: string_field(map, "password", mode)?,
            ..Default::default()
        };

        if self.metadata.is_vcl() {
            fields.format = string_field(map, "format", mode)?;
            // A cleared format_version falls back to the API default.
            fields.format_version = u64_field(map, "format_version", FieldMode::Create)?;
            fields.placement = string_field(map, "placement", mode)?;
            fields.response_condition = string_field(map, "response_condition", mode)?;
        }

        Ok(fields)
    }
}

#[async_trait]
impl ServiceAttributeHandler for KafkaHandler {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn service_metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    fn register(&self, schema: Schema) -> Schema {
        schema.with_block(Self::KEY, NestedBlock::set(self.block()))
    }

    async fn process(
        &self,
        api: &dyn FastlyApi,
        version: &ServiceVersion,
        old: &[Value],
        new: &[Value],
    ) -> Result<(), ProviderError> {
        let set_diff = SetDiff::new(name_key);
        let diff = set_diff.diff(old, new)?;

        for record in &diff.deleted {
            let input = self.build_delete(record, version)?;
            debug!(service = %version, name = %input.name, "Removing Kafka logging endpoint");
            match api.delete_kafka(&input).await {
                Err(e) if e.is_not_found() => {
                    debug!(name = %input.name, "Kafka logging endpoint already gone");
                }
                other => other?,
            }
        }

        for record in &diff.added {
            let input = self.build_create(record, version)?;
            debug!(
                service = %version,
                name = %input.name,
                fields = ?input.fields.set_fields(),
                "Adding Kafka logging endpoint"
            );
            api.create_kafka(&input).await?;
        }

        // The API keys endpoints by name, so a rename is a delete plus a create
        // and everything left here is an in-place update.
        for record in &diff.modified {
            let changed = set_diff.filter(record, old)?;
            let input = self.build_update(record, &changed, version)?;
            debug!(
                service = %version,
                name = %input.name,
                fields = ?input.fields.set_fields(),
                "Updating Kafka logging endpoint"
            );
            api.update_kafka(&input).await?;
        }

        info!(
            service = %version,
            added = diff.added.len(),
            deleted = diff.deleted.len(),
            modified = diff.modified.len(),
            "Reconciled Kafka logging endpoints"
        );
        Ok(())
    }

    async fn read(
        &self,
        api: &dyn FastlyApi,
        version: &ServiceVersion,
    ) -> Result<Vec<Value>, ProviderError> {
        debug!(service = %version, "Refreshing Kafka logging endpoints");
        let kafkas = api
            .list_kafkas(&ListKafkasInput {
                service_id: version.service_id.clone(),
                service_version: version.version,
            })
            .await?;

        let mut records: Vec<Value> = kafkas.iter().map(|k| self.flatten(k)).collect();
        records.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(records)
    }
}

fn as_object(record: &Value) -> Result<&Map<String, Value>, ProviderError> {
    record
        .as_object()
        .ok_or_else(|| ProviderError::Validation(format!("expected object record, got {}", record)))
}

fn field_type_error(key: &str, expected: &str, got: &Value) -> ProviderError {
    ProviderError::Validation(format!("{}: expected {}, got {}", key, expected, got))
}

fn string_field(
    map: &Map<String, Value>,
    key: &str,
    mode: FieldMode,
) -> Result<Option<String>, ProviderError> {
    match (map.get(key), mode) {
        (None, _) => Ok(None),
        (Some(Value::Null), FieldMode::Update) => Ok(Some(String::new())),
        (Some(Value::Null), FieldMode::Create) => Ok(None),
        (Some(Value::String(s)), FieldMode::Create) if s.is_empty() => Ok(None),
        (Some(Value::String(s)), _) => Ok(Some(s.clone())),
        (Some(other), _) => Err(field_type_error(key, "string", other)),
    }
}

fn bool_field(map: &Map<String, Value>, key: &str, mode: FieldMode) -> Result<Option<bool>, ProviderError> {
    match (map.get(key), mode) {
        (None, _) => Ok(None),
        (Some(Value::Null), FieldMode::Update) => Ok(Some(false)),
        (Some(Value::Null), FieldMode::Create) => Ok(None),
        (Some(Value::Bool(b)), _) => Ok(Some(*b)),
        (Some(other), _) => Err(field_type_error(key, "bool", other)),
    }
}

fn u64_field(map: &Map<String, Value>, key: &str, mode: FieldMode) -> Result<Option<u64>, ProviderError> {
    match (map.get(key), mode) {
        (None, _) => Ok(None),
        (Some(Value::Null), FieldMode::Update) => Ok(Some(0)),
        (Some(Value::Null), FieldMode::Create) => Ok(None),
        (Some(Value::Number(n)), _) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| field_type_error(key, "non-negative integer", &Value::Number(n.clone()))),
        (Some(other), _) => Err(field_type_error(key, "integer", other)),
    }
}
