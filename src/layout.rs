//! Storage key layout for mesh resources.
//!
//! Every watched document lives under the `/mesh` namespace. The functions
//! here are the single source of truth for key and prefix derivation; the
//! informer never builds store keys by hand.

const MESH_PREFIX: &str = "/mesh";

pub fn service_spec_prefix() -> String {
    format!("{}/service-spec/", MESH_PREFIX)
}

pub fn service_spec_key(service_name: &str) -> String {
    format!("{}{}", service_spec_prefix(), service_name)
}

pub fn service_instance_spec_prefix(service_name: &str) -> String {
    format!("{}/service-instance-spec/{}/", MESH_PREFIX, service_name)
}

pub fn service_instance_spec_key(service_name: &str, instance_id: &str) -> String {
    format!("{}{}", service_instance_spec_prefix(service_name), instance_id)
}

pub fn service_instance_status_prefix(service_name: &str) -> String {
    format!("{}/service-instance-status/{}/", MESH_PREFIX, service_name)
}

pub fn service_instance_status_key(service_name: &str, instance_id: &str) -> String {
    format!("{}{}", service_instance_status_prefix(service_name), instance_id)
}

pub fn tenant_spec_prefix() -> String {
    format!("{}/tenant-spec/", MESH_PREFIX)
}

pub fn tenant_spec_key(tenant_name: &str) -> String {
    format!("{}{}", tenant_spec_prefix(), tenant_name)
}

pub fn ingress_spec_prefix() -> String {
    format!("{}/ingress-spec/", MESH_PREFIX)
}

pub fn ingress_spec_key(ingress_name: &str) -> String {
    format!("{}{}", ingress_spec_prefix(), ingress_name)
}
