//! Request and response shapes of the Fastly Kafka logging API.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A Kafka logging endpoint as returned by the API.
///
/// The API is loose about scalar encodings (`"1"`, `1` and `true` all show
/// up for booleans; numbers often arrive as strings), so those fields are
/// parsed leniently.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Kafka {
    /// Endpoint name, unique within a service version.
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub brokers: Option<String>,
    #[serde(default)]
    pub compression_codec: Option<String>,
    #[serde(default)]
    pub required_acks: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub use_tls: Option<bool>,
    #[serde(default)]
    pub tls_ca_cert: Option<String>,
    #[serde(default)]
    pub tls_client_cert: Option<String>,
    #[serde(default)]
    pub tls_client_key: Option<String>,
    #[serde(default)]
    pub tls_hostname: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub format_version: Option<u64>,
    #[serde(default)]
    pub placement: Option<String>,
    #[serde(default)]
    pub response_condition: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub parse_log_keyvals: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub request_max_bytes: Option<u64>,
    #[serde(default)]
    pub auth_method: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Boolean encoded the way the API expects form values: `1` or `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compatibool(pub bool);

impl Serialize for Compatibool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0 { "1" } else { "0" })
    }
}

impl From<bool> for Compatibool {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

/// Fields shared by create and update requests.
///
/// `None` fields are left out of the form body entirely.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct KafkaFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brokers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_acks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_tls: Option<Compatibool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_log_keyvals: Option<Compatibool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_max_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl KafkaFields {
    /// Field names that carry credentials or key material.
    pub const SENSITIVE: &'static [&'static str] =
        &["tls_ca_cert", "tls_client_cert", "tls_client_key", "password"];

    /// Names of the fields that are set, for logging without leaking values.
    pub fn set_fields(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut note = |name: &'static str, set: bool| {
            if set {
                names.push(name);
            }
        };
        note("topic", self.topic.is_some());
        note("brokers", self.brokers.is_some());
        note("compression_codec", self.compression_codec.is_some());
        note("required_acks", self.required_acks.is_some());
        note("use_tls", self.use_tls.is_some());
        note("tls_ca_cert", self.tls_ca_cert.is_some());
        note("tls_client_cert", self.tls_client_cert.is_some());
        note("tls_client_key", self.tls_client_key.is_some());
        note("tls_hostname", self.tls_hostname.is_some());
        note("format", self.format.is_some());
        note("format_version", self.format_version.is_some());
        note("placement", self.placement.is_some());
        note("response_condition", self.response_condition.is_some());
        note("parse_log_keyvals", self.parse_log_keyvals.is_some());
        note("request_max_bytes", self.request_max_bytes.is_some());
        note("auth_method", self.auth_method.is_some());
        note("user", self.user.is_some());
        note("password", self.password.is_some());
        names
    }
}

/// Input for `POST /service/{id}/version/{v}/logging/kafka`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateKafkaInput {
    #[serde(skip)]
    pub service_id: String,
    #[serde(skip)]
    pub service_version: u32,
    pub name: String,
    #[serde(flatten)]
    pub fields: KafkaFields,
}

/// Input for `PUT /service/{id}/version/{v}/logging/kafka/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateKafkaInput {
    #[serde(skip)]
    pub service_id: String,
    #[serde(skip)]
    pub service_version: u32,
    /// Name of the endpoint being updated; travels in the path.
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub fields: KafkaFields,
}

/// Input for `DELETE /service/{id}/version/{v}/logging/kafka/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteKafkaInput {
    pub service_id: String,
    pub service_version: u32,
    pub name: String,
}

/// Input for `GET /service/{id}/version/{v}/logging/kafka`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListKafkasInput {
    pub service_id: String,
    pub service_version: u32,
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
        Some(Value::String(s)) => match s.as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kafka_lenient_decoding() {
        let kafka: Kafka = serde_json::from_value(json!({
            "name": "kafka-logs",
            "topic": "cdn",
            "brokers": "b1:9092,b2:9092",
            "use_tls": "1",
            "parse_log_keyvals": false,
            "format_version": "2",
            "request_max_bytes": 1024,
            "tls_ca_cert": null,
            "service_id": "SU1Z0isxPaozGVKXdv0eY",
            "version": "3",
            "created_at": "2020-04-27T08:40:25Z"
        }))
        .unwrap();

        assert_eq!(kafka.name, "kafka-logs");
        assert_eq!(kafka.use_tls, Some(true));
        assert_eq!(kafka.parse_log_keyvals, Some(false));
        assert_eq!(kafka.format_version, Some(2));
        assert_eq!(kafka.request_max_bytes, Some(1024));
        assert_eq!(kafka.tls_ca_cert, None);
        assert_eq!(kafka.user, None);
    }

    #[test]
    fn test_create_input_form_encoding() {
        let input = CreateKafkaInput {
            service_id: "svc".to_string(),
            service_version: 2,
            name: "kafka".to_string(),
            fields: KafkaFields {
                topic: Some("logs".to_string()),
                use_tls: Some(true.into()),
                format_version: Some(2),
                ..Default::default()
            },
        };

        let encoded = serde_json::to_value(&input).unwrap();
        assert_eq!(
            encoded,
            json!({"name": "kafka", "topic": "logs", "use_tls": "1", "format_version": 2})
        );
    }

    #[test]
    fn test_update_input_skips_path_fields() {
        let input = UpdateKafkaInput {
            service_id: "svc".to_string(),
            service_version: 2,
            name: "kafka".to_string(),
            fields: KafkaFields {
                parse_log_keyvals: Some(false.into()),
                ..Default::default()
            },
        };

        let encoded = serde_json::to_value(&input).unwrap();
        assert_eq!(encoded, json!({"parse_log_keyvals": "0"}));
    }

    #[test]
    fn test_set_fields() {
        let fields = KafkaFields {
            brokers: Some("b".to_string()),
            password: Some("p".to_string()),
            ..Default::default()
        };
        assert_eq!(fields.set_fields(), vec!["brokers", "password"]);
        assert!(KafkaFields::SENSITIVE.contains(&"password"));
    }
}
