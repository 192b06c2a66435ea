//! APN Subscription Registry
//!
//! Per-APN IP version capability, PDN address and subscribed QoS.

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use log::debug;

use crate::error::{MmeApiError, MmeApiResult};

/// Network IP version capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    Ipv4,
    Ipv6,
    Ipv4v6,
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::Ipv4 => write!(f, "IPv4"),
            IpVersion::Ipv6 => write!(f, "IPv6"),
            IpVersion::Ipv4v6 => write!(f, "IPv4v6"),
        }
    }
}

/// PDN address (assigned or requested)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PdnAddress {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl PdnAddress {
    pub fn ipv4(addr: Ipv4Addr) -> Self {
        Self {
            ipv4: Some(addr),
            ipv6: None,
        }
    }

    pub fn ipv6(addr: Ipv6Addr) -> Self {
        Self {
            ipv4: None,
            ipv6: Some(addr),
        }
    }
}

/// Bitrate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitrate {
    /// Downlink bitrate (bps)
    pub downlink: u64,
    /// Uplink bitrate (bps)
    pub uplink: u64,
}

/// EPS subscribed QoS profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosProfile {
    /// QCI (QoS Class Identifier)
    pub qci: u8,
    /// GBR (Guaranteed Bit Rate)
    pub gbr: Bitrate,
    /// MBR (Maximum Bit Rate)
    pub mbr: Bitrate,
}

/// Traffic flow template
///
/// Packet filters are not carried by the NAS API yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrafficFlowTemplate {
    #[default]
    Unspecified,
}

/// Subscription data for one APN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub apn: String,
    pub ip_version: IpVersion,
    pub pdn_addr: PdnAddress,
    pub is_emergency: bool,
    pub qos: QosProfile,
    pub tft: TrafficFlowTemplate,
}

/// Subscription registry keyed by APN
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    records: HashMap<String, SubscriptionRecord>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an APN
    ///
    /// Re-subscribing with the same IP version replaces the whole record.
    pub fn subscribe(
        &mut self,
        apn: &str,
        ip_version: IpVersion,
        pdn_addr: PdnAddress,
        is_emergency: bool,
        qos: QosProfile,
    ) -> MmeApiResult<()> {
        if let Some(existing) = self.records.get(apn) {
            if existing.ip_version != ip_version {
                return Err(MmeApiError::DuplicateSubscription {
                    apn: apn.to_string(),
                });
            }
        }

        self.records.insert(
            apn.to_string(),
            SubscriptionRecord {
                apn: apn.to_string(),
                ip_version,
                pdn_addr,
                is_emergency,
                qos,
                tft: TrafficFlowTemplate::Unspecified,
            },
        );
        debug!("APN[{}] subscribed ({}, QCI[{}])", apn, ip_version, qos.qci);
        Ok(())
    }

    /// Unsubscribe from an APN
    pub fn unsubscribe(&mut self, apn: &str) -> MmeApiResult<SubscriptionRecord> {
        let record = self
            .records
            .remove(apn)
            .ok_or_else(|| MmeApiError::NotSubscribed(apn.to_string()))?;
        debug!("APN[{}] unsubscribed", apn);
        Ok(record)
    }

    pub fn get(&self, apn: &str) -> Option<&SubscriptionRecord> {
        self.records.get(apn)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
