//! Watched document kinds.
//!
//! These are decode targets only; the informer treats documents as opaque
//! text plus an addressable sub-path and never interprets these fields
//! itself. Unknown fields are preserved nowhere and missing fields fall back
//! to their defaults, so a delete event can hand callers the zero value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A service registered in the mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSpec {
    pub name: String,
    pub register_tenant: String,
    pub load_balance: Option<LoadBalance>,
    pub observability: Option<Value>,
    pub resilience: Option<Resilience>,
    pub canary: Option<Value>,
}

/// Load-balance policy for a service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalance {
    pub policy: String,
    pub header_hash_key: Option<String>,
}

/// Resilience settings for a service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resilience {
    pub circuit_breaker: Option<Value>,
    pub rate_limiter: Option<Value>,
    pub retry: Option<Value>,
    pub time_limiter: Option<Value>,
}

/// One running instance of a service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInstanceSpec {
    pub service_name: String,
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    pub status: String,
}

/// Health report for one service instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInstanceStatus {
    pub service_name: String,
    pub instance_id: String,
    pub status: String,
    pub last_heartbeat_time: String,
}

/// A tenant grouping services.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantSpec {
    pub name: String,
    pub services: Vec<String>,
    pub description: String,
}

/// Ingress configuration routing external traffic into the mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressSpec {
    pub name: String,
    pub rules: Vec<IngressRule>,
}

/// One host/path routing rule of an ingress.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressRule {
    pub host: String,
    pub paths: Vec<IngressPath>,
}

/// One path mapping of an ingress rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressPath {
    pub path: String,
    pub backend: String,
}
