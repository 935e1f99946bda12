use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// Tenant used when a caller does not name one
pub const DEFAULT_TENANT: &str = "default";

static TENANT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,64}$").expect("valid tenant pattern"));

static SAFE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:-]{1,128}$").expect("valid identifier pattern"));

/// Normalizes a tenant identifier; blank means the default tenant
///
/// Returns `None` for identifiers outside `[A-Za-z0-9._-]{1,64}` and for the
/// path components `.` and `..`.
pub fn normalize_tenant_id(raw: &str) -> Option<String> {
    let tenant = raw.trim();
    if tenant.is_empty() {
        return Some(DEFAULT_TENANT.to_string());
    }
    if tenant == "." || tenant == ".." || !TENANT_ID.is_match(tenant) {
        return None;
    }
    Some(tenant.to_string())
}

/// Whether `id` is safe to use as a resource identifier from user input
pub fn is_safe_identifier(id: &str) -> bool {
    id != "." && id != ".." && !id.contains("..") && SAFE_IDENTIFIER.is_match(id)
}

const REGISTRY_DATA_DIR: &str = "REGISTRY_DATA_DIR";

const DEFAULT_DATA_DIR: &str = "./data";

pub fn get_data_dir() -> PathBuf {
    let dir_from_env = std::env::var(REGISTRY_DATA_DIR);
    dir_from_env.map_or(PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from)
}

const REGISTRY_BIND_ADDR: &str = "REGISTRY_BIND_ADDR";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7655";

pub fn get_bind_addr() -> String {
    std::env::var(REGISTRY_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
}
