//! Object naming and name validation

use crate::labels::GRANT_DELIMITER;
use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Longest Kubernetes label value / namespace name
pub const MAX_LABEL_LENGTH: usize = 63;

static TENANT_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+$").unwrap()
});

static LABEL_SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap()
});

static DNS_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
});

static DNS_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$").unwrap()
});

static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(m|k|Ki|M|Mi|G|Gi|T|Ti|P|Pi|E|Ei)?$").unwrap()
});

/// Identity object (ServiceAccount) of a tenant
pub fn tenant_identity(tenant: &str) -> String {
    format!("{}-user", tenant)
}

pub fn tenant_default_role(tenant: &str) -> String {
    format!("{}-defaultrole", tenant)
}

pub fn tenant_default_role_binding(tenant: &str) -> String {
    format!("{}-defaultrolebinding", tenant)
}

/// Namespace of a tenant-target
pub fn tenant_target_namespace(tenant: &str, target: &str) -> String {
    format!("{}-{}", tenant, target)
}

/// Recover the tenant from a tenant-target namespace. Tenant names never contain '-'.
pub fn tenant_from_namespace(namespace: &str) -> Option<&str> {
    let (tenant, target) = namespace.split_once('-')?;
    if tenant.is_empty() || target.is_empty() {
        return None;
    }
    Some(tenant)
}

pub fn quota_name(namespace: &str) -> String {
    format!("{}-limits", namespace)
}

pub fn role_name(namespace: &str) -> String {
    format!("{}-role", namespace)
}

pub fn role_binding_name(namespace: &str) -> String {
    format!("{}-rolebinding", namespace)
}

pub fn network_policy_name(namespace: &str) -> String {
    format!("{}-network-policy", namespace)
}

/// Tenant names are lowercase alphanumerics so namespaces decode unambiguously
pub fn validate_tenant_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 40 {
        return Err(invalid(name, "must be 1-40 characters"));
    }
    if !TENANT_NAME_REGEX.is_match(name) {
        return Err(invalid(name, "only lowercase letters and digits are allowed"));
    }
    Ok(())
}

/// Target names become label key segments; the grant delimiter is refused outright
pub fn validate_target_name(name: &str) -> Result<()> {
    if name.contains(GRANT_DELIMITER) {
        return Err(Error::DelimiterConflict(name.to_string()));
    }
    if name.is_empty() || name.len() > MAX_LABEL_LENGTH {
        return Err(invalid(name, "must be 1-63 characters"));
    }
    if !LABEL_SEGMENT_REGEX.is_match(name) {
        return Err(invalid(name, "not a valid label name"));
    }
    Ok(())
}

pub fn validate_namespace_name(name: &str) -> Result<()> {
    if name.len() > MAX_LABEL_LENGTH || !DNS_LABEL_REGEX.is_match(name) {
        return Err(invalid(name, "not a valid namespace name"));
    }
    Ok(())
}

/// Pods and secrets
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.len() > 253 || !DNS_SUBDOMAIN_REGEX.is_match(name) {
        return Err(invalid(name, "not a valid object name"));
    }
    Ok(())
}

pub fn validate_quantity(field: &str, value: &str) -> Result<()> {
    if !QUANTITY_REGEX.is_match(value) {
        return Err(Error::InvalidQuantity {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
