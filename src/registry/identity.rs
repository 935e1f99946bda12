//! Identity signals and the pairwise match rule
//!
//! Every record carries a [`ResourceIdentity`]: the hostnames, MAC and IP
//! addresses, machine and DMI identifiers it reports, its own stable keys and
//! the keys it declares links to. [`matches`] grades how strongly two
//! identities refer to the same machine.
//!
//! IP addresses are carried and fingerprinted but never matched on; private
//! ranges are reused across unrelated networks.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Identity signals for a record or a merged resource
///
/// Hostnames and MAC addresses are normalized on the way in, so comparisons
/// are plain set lookups. All sets are ordered for deterministic output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub hostnames: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub mac_addresses: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub ip_addresses: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,

    /// SMBIOS system UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dmi_uuid: Option<String>,

    /// Stable keys (`<source>:<source_id>`) of the records behind this identity
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keys: BTreeSet<String>,

    /// Keys this identity declares an explicit link to
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub linked: BTreeSet<String>,
}

/// How strongly two identities match, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStrength {
    None,
    Weak,
    Strong,
    Explicit,
}

impl ResourceIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.add_hostname(hostname);
        self
    }

    pub fn with_mac(mut self, mac: &str) -> Self {
        self.add_mac(mac);
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.add_ip(ip);
        self
    }

    pub fn with_machine_id(mut self, machine_id: &str) -> Self {
        self.set_machine_id(machine_id);
        self
    }

    pub fn with_dmi_uuid(mut self, dmi_uuid: &str) -> Self {
        self.set_dmi_uuid(dmi_uuid);
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.add_key(key);
        self
    }

    pub fn with_link(mut self, key: &str) -> Self {
        self.add_link(key);
        self
    }

    pub fn add_hostname(&mut self, hostname: &str) {
        if let Some(hostname) = normalize_hostname(hostname) {
            self.hostnames.insert(hostname);
        }
    }

    pub fn add_mac(&mut self, mac: &str) {
        if let Some(mac) = normalize_mac(mac) {
            self.mac_addresses.insert(mac);
        }
    }

    pub fn add_ip(&mut self, ip: &str) {
        if let Some(ip) = normalize_ip(ip) {
            self.ip_addresses.insert(ip);
        }
    }

    pub fn set_machine_id(&mut self, machine_id: &str) {
        let machine_id = machine_id.trim().to_ascii_lowercase();
        if !machine_id.is_empty() {
            self.machine_id = Some(machine_id);
        }
    }

    pub fn set_dmi_uuid(&mut self, dmi_uuid: &str) {
        let dmi_uuid = dmi_uuid.trim().to_ascii_lowercase();
        if !dmi_uuid.is_empty() && dmi_uuid.chars().any(|c| c != '0' && c != '-') {
            self.dmi_uuid = Some(dmi_uuid);
        }
    }

    pub fn add_key(&mut self, key: &str) {
        let key = key.trim();
        if !key.is_empty() {
            self.keys.insert(key.to_string());
        }
    }

    pub fn add_link(&mut self, key: &str) {
        let key = key.trim();
        if !key.is_empty() {
            self.linked.insert(key.to_string());
        }
    }

    /// Re-applies normalization to every field
    ///
    /// Identities decoded straight from the wire skip the builder methods, so
    /// the ingest path runs them through this once.
    pub fn normalized(self) -> Self {
        let mut out = ResourceIdentity::new();
        for hostname in &self.hostnames {
            out.add_hostname(hostname);
        }
        for mac in &self.mac_addresses {
            out.add_mac(mac);
        }
        for ip in &self.ip_addresses {
            out.add_ip(ip);
        }
        if let Some(machine_id) = &self.machine_id {
            out.set_machine_id(machine_id);
        }
        if let Some(dmi_uuid) = &self.dmi_uuid {
            out.set_dmi_uuid(dmi_uuid);
        }
        for key in &self.keys {
            out.add_key(key);
        }
        for key in &self.linked {
            out.add_link(key);
        }
        out
    }

    /// Folds `other` into `self`
    ///
    /// Sets are unioned. When both sides carry a machine or DMI identifier
    /// the smaller one is kept, so the result does not depend on fold order.
    pub fn union(&mut self, other: &ResourceIdentity) {
        self.hostnames.extend(other.hostnames.iter().cloned());
        self.mac_addresses.extend(other.mac_addresses.iter().cloned());
        self.ip_addresses.extend(other.ip_addresses.iter().cloned());
        self.keys.extend(other.keys.iter().cloned());
        self.linked.extend(other.linked.iter().cloned());
        self.machine_id = smaller(self.machine_id.take(), &other.machine_id);
        self.dmi_uuid = smaller(self.dmi_uuid.take(), &other.dmi_uuid);
    }

    /// Whether the two identities share any stable key, hostname, MAC,
    /// machine or DMI identifier
    pub fn overlaps(&self, other: &ResourceIdentity) -> bool {
        !self.keys.is_disjoint(&other.keys)
            || !self.hostnames.is_disjoint(&other.hostnames)
            || !self.mac_addresses.is_disjoint(&other.mac_addresses)
            || same_machine(self, other)
    }

    /// Fingerprint used to derive stable IDs
    ///
    /// Machine identifier first, then DMI UUID, the smallest hostname, the
    /// smallest MAC, the smallest IP and finally `fallback_key`.
    pub fn fingerprint(&self, fallback_key: &str) -> String {
        if let Some(machine_id) = &self.machine_id {
            return format!("machine:{machine_id}");
        }
        if let Some(dmi_uuid) = &self.dmi_uuid {
            return format!("dmi:{dmi_uuid}");
        }
        if let Some(hostname) = self.hostnames.iter().next() {
            return format!("hostname:{hostname}");
        }
        if let Some(mac) = self.mac_addresses.iter().next() {
            return format!("mac:{mac}");
        }
        if let Some(ip) = self.ip_addresses.iter().next() {
            return format!("ip:{ip}");
        }
        format!("key:{fallback_key}")
    }

    pub fn is_empty(&self) -> bool {
        *self == ResourceIdentity::default()
    }
}

/// Grades how strongly `a` and `b` refer to the same machine
///
/// An explicit link only counts when it is declared from both sides. The
/// result is symmetric.
pub fn matches(a: &ResourceIdentity, b: &ResourceIdentity) -> MatchStrength {
    if !a.linked.is_disjoint(&b.keys) && !b.linked.is_disjoint(&a.keys) {
        return MatchStrength::Explicit;
    }
    if !a.mac_addresses.is_disjoint(&b.mac_addresses) || same_machine(a, b) {
        return MatchStrength::Strong;
    }
    if !a.hostnames.is_disjoint(&b.hostnames) {
        return MatchStrength::Weak;
    }
    MatchStrength::None
}

fn same_machine(a: &ResourceIdentity, b: &ResourceIdentity) -> bool {
    let same = |x: &Option<String>, y: &Option<String>| {
        matches!((x, y), (Some(x), Some(y)) if x == y)
    };
    same(&a.machine_id, &b.machine_id) || same(&a.dmi_uuid, &b.dmi_uuid)
}

fn smaller(current: Option<String>, other: &Option<String>) -> Option<String> {
    match (current, other) {
        (Some(a), Some(b)) => Some(if a <= *b { a } else { b.clone() }),
        (Some(a), None) => Some(a),
        (None, b) => b.clone(),
    }
}

/// Lower-cases a hostname and strips surrounding whitespace and the trailing
/// root dot; `None` for empty names and loopback placeholders
pub fn normalize_hostname(hostname: &str) -> Option<String> {
    let hostname = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    match hostname.as_str() {
        "" | "localhost" | "localhost.localdomain" => None,
        _ => Some(hostname),
    }
}

/// Lower-cases a MAC address and uses `:` as separator; `None` for empty and
/// all-zero addresses
pub fn normalize_mac(mac: &str) -> Option<String> {
    let mac = mac.trim().to_ascii_lowercase().replace('-', ":");
    if mac.is_empty() || mac.chars().all(|c| c == '0' || c == ':') {
        return None;
    }
    Some(mac)
}

/// Canonical text form of an IP address; `None` for unparseable, loopback
/// and unspecified addresses
pub fn normalize_ip(ip: &str) -> Option<String> {
    let ip: IpAddr = ip.trim().parse().ok()?;
    if ip.is_loopback() || ip.is_unspecified() {
        return None;
    }
    Some(ip.to_string())
}
