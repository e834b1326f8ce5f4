//! Typed bindings: one thin adapter per watched document kind.
//!
//! Each binding supplies the storage key derivation for its kind, a decode
//! step from raw JSON into the domain type, and forwards the typed change or
//! typed snapshot to the caller's callback. Structurally identical across
//! kinds; the interesting logic lives in the engine.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tracing::error;

use crate::diff::PathExpr;
use crate::error::Result;
use crate::layout;
use crate::specs::{
    IngressSpec, ServiceInstanceSpec, ServiceInstanceStatus, ServiceSpec, TenantSpec,
};
use crate::store::Store;
use crate::types::{Change, SpecChange, WatchFlow};

use super::engine::Informer;

/// Decode one filtered change. Delete events never decode; a malformed
/// update is an invariant violation, logged and skipped so the subscription
/// keeps running.
fn decode_change<T: DeserializeOwned>(change: Change) -> Option<SpecChange<T>> {
    match change {
        Change::Delete => Some(SpecChange::Delete),
        Change::Update(record) => match serde_json::from_str(&record.value) {
            Ok(spec) => Some(SpecChange::Update {
                revision: record.mod_revision,
                spec,
            }),
            Err(e) => {
                error!("BUG: decode {:?} failed: {}", record.value, e);
                None
            }
        },
    }
}

/// Decode a raw snapshot into a typed map, dropping malformed records.
fn decode_snapshot<T: DeserializeOwned>(kvs: &HashMap<String, String>) -> HashMap<String, T> {
    kvs.iter()
        .filter_map(|(key, value)| match serde_json::from_str(value) {
            Ok(spec) => Some((key.clone(), spec)),
            Err(e) => {
                error!("BUG: decode {:?} failed: {}", value, e);
                None
            }
        })
        .collect()
}

fn service_spec_watch_key(service_name: &str, path: &PathExpr) -> String {
    format!("service-spec-{}-{}", service_name, path)
}

fn instance_spec_watch_key(service_name: &str, instance_id: &str, path: &PathExpr) -> String {
    format!(
        "service-instance-spec-{}-{}-{}",
        service_name, instance_id, path
    )
}

fn instance_status_watch_key(service_name: &str, instance_id: &str, path: &PathExpr) -> String {
    format!(
        "service-instance-status-{}-{}-{}",
        service_name, instance_id, path
    )
}

fn tenant_spec_watch_key(tenant_name: &str, path: &PathExpr) -> String {
    format!("tenant-{}-{}", tenant_name, path)
}

fn ingress_spec_watch_key(ingress_name: &str, path: &PathExpr) -> String {
    format!("ingress-{}-{}", ingress_name, path)
}

fn instance_specs_watch_key(service_name: &str) -> String {
    format!("prefix-service-instance-spec-{}", service_name)
}

fn instance_statuses_watch_key(service_name: &str) -> String {
    format!("prefix-service-instance-status-{}", service_name)
}

fn service_specs_watch_key(service_prefix: &str) -> String {
    format!("prefix-service-spec-{}", service_prefix)
}

fn tenant_specs_watch_key(tenant_prefix: &str) -> String {
    format!("prefix-tenant-{}", tenant_prefix)
}

const INGRESS_SPECS_WATCH_KEY: &str = "prefix-ingress";

impl<S: Store> Informer<S> {
    /// Watch one service's spec, notified only when `path` changes.
    pub fn on_part_of_service_spec<F>(
        &self,
        service_name: &str,
        path: PathExpr,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(SpecChange<ServiceSpec>) -> WatchFlow + Send + 'static,
    {
        let store_key = layout::service_spec_key(service_name);
        let watch_key = service_spec_watch_key(service_name, &path);
        self.on_spec_part(
            &store_key,
            watch_key,
            path,
            Box::new(move |change| match decode_change(change) {
                Some(typed) => f(typed),
                None => WatchFlow::Continue,
            }),
        )
    }

    /// Watch service specs as one live snapshot, scoped to the given name
    /// prefix. The empty prefix watches every service; differently-scoped
    /// watches are distinct subscriptions and may coexist.
    pub fn on_service_specs<F>(&self, service_prefix: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&HashMap<String, ServiceSpec>) -> WatchFlow + Send + 'static,
    {
        let store_prefix = format!("{}{}", layout::service_spec_prefix(), service_prefix);
        self.on_specs(
            &store_prefix,
            service_specs_watch_key(service_prefix),
            Box::new(move |kvs| f(&decode_snapshot(kvs))),
        )
    }

    /// Watch one service instance's spec, notified only when `path` changes.
    pub fn on_part_of_instance_spec<F>(
        &self,
        service_name: &str,
        instance_id: &str,
        path: PathExpr,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(SpecChange<ServiceInstanceSpec>) -> WatchFlow + Send + 'static,
    {
        let store_key = layout::service_instance_spec_key(service_name, instance_id);
        let watch_key = instance_spec_watch_key(service_name, instance_id, &path);
        self.on_spec_part(
            &store_key,
            watch_key,
            path,
            Box::new(move |change| match decode_change(change) {
                Some(typed) => f(typed),
                None => WatchFlow::Continue,
            }),
        )
    }

    /// Watch all instance specs of one service as one live snapshot.
    pub fn on_service_instance_specs<F>(&self, service_name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&HashMap<String, ServiceInstanceSpec>) -> WatchFlow + Send + 'static,
    {
        self.on_specs(
            &layout::service_instance_spec_prefix(service_name),
            instance_specs_watch_key(service_name),
            Box::new(move |kvs| f(&decode_snapshot(kvs))),
        )
    }

    /// Watch one service instance's status, notified only when `path` changes.
    pub fn on_part_of_instance_status<F>(
        &self,
        service_name: &str,
        instance_id: &str,
        path: PathExpr,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(SpecChange<ServiceInstanceStatus>) -> WatchFlow + Send + 'static,
    {
        let store_key = layout::service_instance_status_key(service_name, instance_id);
        let watch_key = instance_status_watch_key(service_name, instance_id, &path);
        self.on_spec_part(
            &store_key,
            watch_key,
            path,
            Box::new(move |change| match decode_change(change) {
                Some(typed) => f(typed),
                None => WatchFlow::Continue,
            }),
        )
    }

    /// Watch all instance statuses of one service as one live snapshot.
    pub fn on_service_instance_statuses<F>(&self, service_name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&HashMap<String, ServiceInstanceStatus>) -> WatchFlow + Send + 'static,
    {
        self.on_specs(
            &layout::service_instance_status_prefix(service_name),
            instance_statuses_watch_key(service_name),
            Box::new(move |kvs| f(&decode_snapshot(kvs))),
        )
    }

    /// Watch one tenant's spec, notified only when `path` changes.
    pub fn on_part_of_tenant_spec<F>(&self, tenant_name: &str, path: PathExpr, mut f: F) -> Result<()>
    where
        F: FnMut(SpecChange<TenantSpec>) -> WatchFlow + Send + 'static,
    {
        let store_key = layout::tenant_spec_key(tenant_name);
        let watch_key = tenant_spec_watch_key(tenant_name, &path);
        self.on_spec_part(
            &store_key,
            watch_key,
            path,
            Box::new(move |change| match decode_change(change) {
                Some(typed) => f(typed),
                None => WatchFlow::Continue,
            }),
        )
    }

    /// Watch tenant specs as one live snapshot, scoped to the given name
    /// prefix. The empty prefix watches every tenant.
    pub fn on_tenant_specs<F>(&self, tenant_prefix: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&HashMap<String, TenantSpec>) -> WatchFlow + Send + 'static,
    {
        let store_prefix = format!("{}{}", layout::tenant_spec_prefix(), tenant_prefix);
        self.on_specs(
            &store_prefix,
            tenant_specs_watch_key(tenant_prefix),
            Box::new(move |kvs| f(&decode_snapshot(kvs))),
        )
    }

    /// Watch one ingress's spec, notified only when `path` changes.
    pub fn on_part_of_ingress_spec<F>(
        &self,
        ingress_name: &str,
        path: PathExpr,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(SpecChange<IngressSpec>) -> WatchFlow + Send + 'static,
    {
        let store_key = layout::ingress_spec_key(ingress_name);
        let watch_key = ingress_spec_watch_key(ingress_name, &path);
        self.on_spec_part(
            &store_key,
            watch_key,
            path,
            Box::new(move |change| match decode_change(change) {
                Some(typed) => f(typed),
                None => WatchFlow::Continue,
            }),
        )
    }

    /// Watch all ingress specs as one live snapshot.
    pub fn on_ingress_specs<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&HashMap<String, IngressSpec>) -> WatchFlow + Send + 'static,
    {
        self.on_specs(
            &layout::ingress_spec_prefix(),
            INGRESS_SPECS_WATCH_KEY.to_string(),
            Box::new(move |kvs| f(&decode_snapshot(kvs))),
        )
    }

    // Explicit cancellation. Always succeeds; a no-op when the subscription
    // is already gone.

    pub fn stop_watch_service_spec(&self, service_name: &str, path: &PathExpr) {
        self.cancel(&service_spec_watch_key(service_name, path));
    }

    pub fn stop_watch_service_specs(&self, service_prefix: &str) {
        self.cancel(&service_specs_watch_key(service_prefix));
    }

    pub fn stop_watch_instance_spec(&self, service_name: &str, instance_id: &str, path: &PathExpr) {
        self.cancel(&instance_spec_watch_key(service_name, instance_id, path));
    }

    pub fn stop_watch_service_instance_specs(&self, service_name: &str) {
        self.cancel(&instance_specs_watch_key(service_name));
    }

    pub fn stop_watch_instance_status(
        &self,
        service_name: &str,
        instance_id: &str,
        path: &PathExpr,
    ) {
        self.cancel(&instance_status_watch_key(service_name, instance_id, path));
    }

    pub fn stop_watch_service_instance_statuses(&self, service_name: &str) {
        self.cancel(&instance_statuses_watch_key(service_name));
    }

    pub fn stop_watch_tenant_spec(&self, tenant_name: &str, path: &PathExpr) {
        self.cancel(&tenant_spec_watch_key(tenant_name, path));
    }

    pub fn stop_watch_tenant_specs(&self, tenant_prefix: &str) {
        self.cancel(&tenant_specs_watch_key(tenant_prefix));
    }

    pub fn stop_watch_ingress_spec(&self, ingress_name: &str, path: &PathExpr) {
        self.cancel(&ingress_spec_watch_key(ingress_name, path));
    }

    pub fn stop_watch_ingress_specs(&self) {
        self.cancel(INGRESS_SPECS_WATCH_KEY);
    }
}
