//! EMM/ESM Configuration
//!
//! The configuration snapshot is read once from the `mme:` and `esm:`
//! sections of the YAML configuration and is immutable afterwards.
//! Consumers get it by shared reference at call time.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::context::{EpsTai, PlmnId, MAX_NUM_OF_TAI_IN_LIST, MME_API_NB_UE_MAX};
use crate::error::{MmeApiError, MmeApiResult};

/// Maximum number of algorithms in a preference list
pub const OGS_MAX_NUM_OF_ALGORITHM: usize = 8;

fn invalid(msg: impl Into<String>) -> MmeApiError {
    MmeApiError::InvalidConfig(msg.into())
}

// ============================================================================
// Feature Set
// ============================================================================

/// Features supported by the MME
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MmeFeature {
    UnauthenticatedImsi,
    Ipv4,
    Ipv6,
    SingleAddrBearers,
    SmsSupported,
    CsfbSmsSupported,
    VolteSupported,
}

/// Set of supported features
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet(BTreeSet<MmeFeature>);

impl FeatureSet {
    pub fn contains(&self, feature: MmeFeature) -> bool {
        self.0.contains(&feature)
    }

    pub fn insert(&mut self, feature: MmeFeature) -> bool {
        self.0.insert(feature)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MmeFeature> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<MmeFeature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = MmeFeature>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Security Algorithms
// ============================================================================

/// EPS integrity algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum IntegrityAlgorithm {
    #[serde(rename = "EIA0")]
    Eia0,
    #[serde(rename = "EIA1")]
    Eia1,
    #[serde(rename = "EIA2")]
    Eia2,
    #[serde(rename = "EIA3")]
    Eia3,
}

impl IntegrityAlgorithm {
    /// Algorithm identity as carried in NAS Security Mode Command
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// EPS encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum CipheringAlgorithm {
    #[serde(rename = "EEA0")]
    Eea0,
    #[serde(rename = "EEA1")]
    Eea1,
    #[serde(rename = "EEA2")]
    Eea2,
    #[serde(rename = "EEA3")]
    Eea3,
}

impl CipheringAlgorithm {
    /// Algorithm identity as carried in NAS Security Mode Command
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Ordered algorithm preference list, at most `OGS_MAX_NUM_OF_ALGORITHM` long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmOrder<A>(Vec<A>);

impl<A: Copy + PartialEq + std::fmt::Debug> AlgorithmOrder<A> {
    /// Build a preference list; fails when too long or when an algorithm repeats
    pub fn new(order: Vec<A>) -> MmeApiResult<Self> {
        if order.len() > OGS_MAX_NUM_OF_ALGORITHM {
            return Err(invalid(format!(
                "algorithm order has {} entries, maximum is {}",
                order.len(),
                OGS_MAX_NUM_OF_ALGORITHM
            )));
        }
        for (i, algorithm) in order.iter().enumerate() {
            if order[..i].contains(algorithm) {
                return Err(invalid(format!("algorithm {:?} listed twice", algorithm)));
            }
        }
        Ok(Self(order))
    }

    /// Most preferred algorithm
    pub fn preferred(&self) -> Option<A> {
        self.0.first().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[A] {
        &self.0
    }
}

// ============================================================================
// Snapshot Types
// ============================================================================

/// GUMMEI of this MME
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gummei {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// MME Group ID
    pub mme_gid: u16,
    /// MME Code
    pub mme_code: u8,
}

/// Served TAI list (one PLMN, list of TACs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedTaiList {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// TAC list
    pub tac: Vec<u16>,
}

impl ServedTaiList {
    pub fn contains(&self, tai: &EpsTai) -> bool {
        self.plmn_id == tai.plmn_id && self.tac.contains(&tai.tac)
    }

    pub fn tais(&self) -> impl Iterator<Item = EpsTai> + '_ {
        self.tac.iter().map(|&tac| EpsTai {
            plmn_id: self.plmn_id,
            tac,
        })
    }
}

/// Largest network name coding scheme (0: GSM 7-bit default alphabet, 1: UCS2)
pub const MAX_NETWORK_NAME_CODING_SCHEME: u8 = 1;

/// Network name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkName {
    /// Name string
    pub name: String,
    /// Coding scheme (0: GSM 7-bit default alphabet, 1: UCS2)
    pub coding_scheme: u8,
    /// Add CI
    pub add_ci: bool,
}

impl NetworkName {
    fn new(name: Option<&str>, yaml: &NetworkNameYaml) -> Option<Self> {
        name.filter(|n| !n.is_empty()).map(|name| Self {
            name: name.to_string(),
            coding_scheme: yaml.coding_scheme,
            add_ci: yaml.add_ci,
        })
    }
}

/// EPS Mobility Management configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmmConfig {
    /// Supported features
    pub features: FeatureSet,
    /// EPS Globally Unique MME Identity
    pub gummei: Gummei,
    /// Integrity algorithm preference
    pub integrity_order: AlgorithmOrder<IntegrityAlgorithm>,
    /// Ciphering algorithm preference
    pub ciphering_order: AlgorithmOrder<CipheringAlgorithm>,
    /// EPS network feature support IE value
    pub eps_network_feature_support: u8,
    /// Always push PCO to the UE
    pub force_push_pco: bool,
    /// Served TAI lists
    pub served_tai: Vec<ServedTaiList>,
    pub full_network_name: Option<NetworkName>,
    pub short_network_name: Option<NetworkName>,
    /// Daylight saving time (0..=2 hours)
    pub daylight_saving_time: u8,
}

/// EPS Session Management configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EsmConfig {
    /// Supported features
    pub features: FeatureSet,
    /// Primary DNS
    pub dns_prim_ipv4: Option<Ipv4Addr>,
    /// Secondary DNS
    pub dns_sec_ipv4: Option<Ipv4Addr>,
}

/// Process-wide configuration snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub emm: EmmConfig,
    pub esm: EsmConfig,
    /// Maximum number of simultaneously live UE contexts
    pub max_ue: usize,
}

// ============================================================================
// YAML Layout
// ============================================================================

/// Root of the YAML configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct MmeYaml {
    pub mme: MmeSectionYaml,
    #[serde(default)]
    pub esm: EsmSectionYaml,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlmnIdYaml {
    pub mcc: String,
    pub mnc: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GummeiYaml {
    pub plmn_id: PlmnIdYaml,
    pub mme_gid: u16,
    pub mme_code: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaiYaml {
    pub plmn_id: PlmnIdYaml,
    pub tac: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityYaml {
    pub integrity_order: Vec<IntegrityAlgorithm>,
    pub ciphering_order: Vec<CipheringAlgorithm>,
}

impl Default for SecurityYaml {
    fn default() -> Self {
        Self {
            integrity_order: vec![
                IntegrityAlgorithm::Eia2,
                IntegrityAlgorithm::Eia1,
                IntegrityAlgorithm::Eia0,
            ],
            ciphering_order: vec![
                CipheringAlgorithm::Eea0,
                CipheringAlgorithm::Eea1,
                CipheringAlgorithm::Eea2,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkNameYaml {
    pub full: Option<String>,
    pub short: Option<String>,
    pub coding_scheme: u8,
    pub add_ci: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MmeSectionYaml {
    pub gummei: GummeiYaml,
    pub tai: Vec<TaiYaml>,
    #[serde(default)]
    pub security: SecurityYaml,
    #[serde(default)]
    pub network_name: NetworkNameYaml,
    #[serde(default)]
    pub features: Vec<MmeFeature>,
    #[serde(default)]
    pub eps_network_feature_support: u8,
    #[serde(default)]
    pub force_push_pco: bool,
    #[serde(default)]
    pub daylight_saving_time: u8,
    #[serde(default = "default_max_ue")]
    pub max_ue: usize,
}

fn default_max_ue() -> usize {
    MME_API_NB_UE_MAX
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EsmSectionYaml {
    pub features: Vec<MmeFeature>,
    pub dns: Vec<String>,
}

// ============================================================================
// Loading
// ============================================================================

fn parse_plmn_id(plmn_id: &PlmnIdYaml) -> MmeApiResult<PlmnId> {
    PlmnId::parse(&plmn_id.mcc, &plmn_id.mnc).ok_or_else(|| {
        invalid(format!(
            "invalid PLMN ID (MCC[{}] MNC[{}])",
            plmn_id.mcc, plmn_id.mnc
        ))
    })
}

/// Build the EMM configuration from the `mme:` section
pub fn load_emm_config(yaml: &MmeYaml) -> MmeApiResult<EmmConfig> {
    let mme = &yaml.mme;

    let gummei = Gummei {
        plmn_id: parse_plmn_id(&mme.gummei.plmn_id)?,
        mme_gid: mme.gummei.mme_gid,
        mme_code: mme.gummei.mme_code,
    };

    if mme.tai.is_empty() {
        return Err(invalid("no served TAI"));
    }
    let mut served_tai = Vec::with_capacity(mme.tai.len());
    for tai in &mme.tai {
        let plmn_id = parse_plmn_id(&tai.plmn_id)?;
        if tai.tac.is_empty() || tai.tac.len() > MAX_NUM_OF_TAI_IN_LIST {
            return Err(invalid(format!(
                "served TAI list for PLMN[{}] has {} TACs, expected 1..={}",
                plmn_id.to_bcd(),
                tai.tac.len(),
                MAX_NUM_OF_TAI_IN_LIST
            )));
        }
        served_tai.push(ServedTaiList {
            plmn_id,
            tac: tai.tac.clone(),
        });
    }

    if mme.network_name.coding_scheme > MAX_NETWORK_NAME_CODING_SCHEME {
        return Err(invalid(format!(
            "network name coding_scheme {} out of range 0..={}",
            mme.network_name.coding_scheme, MAX_NETWORK_NAME_CODING_SCHEME
        )));
    }

    if mme.daylight_saving_time > 2 {
        return Err(invalid(format!(
            "daylight_saving_time {} out of range 0..=2",
            mme.daylight_saving_time
        )));
    }

    Ok(EmmConfig {
        features: mme.features.iter().copied().collect(),
        gummei,
        integrity_order: AlgorithmOrder::new(mme.security.integrity_order.clone())?,
        ciphering_order: AlgorithmOrder::new(mme.security.ciphering_order.clone())?,
        eps_network_feature_support: mme.eps_network_feature_support,
        force_push_pco: mme.force_push_pco,
        served_tai,
        full_network_name: NetworkName::new(mme.network_name.full.as_deref(), &mme.network_name),
        short_network_name: NetworkName::new(mme.network_name.short.as_deref(), &mme.network_name),
        daylight_saving_time: mme.daylight_saving_time,
    })
}

/// Build the ESM configuration from the `esm:` section
pub fn load_esm_config(yaml: &MmeYaml) -> MmeApiResult<EsmConfig> {
    let esm = &yaml.esm;
    if esm.dns.len() > 2 {
        return Err(invalid(format!("{} DNS servers, at most 2", esm.dns.len())));
    }

    let mut dns = esm.dns.iter().map(|addr| {
        addr.parse::<Ipv4Addr>()
            .map_err(|e| invalid(format!("DNS[{}]: {}", addr, e)))
    });
    let dns_prim_ipv4 = dns.next().transpose()?;
    let dns_sec_ipv4 = dns.next().transpose()?;

    Ok(EsmConfig {
        features: esm.features.iter().copied().collect(),
        dns_prim_ipv4,
        dns_sec_ipv4,
    })
}

impl ConfigSnapshot {
    /// Parse and validate a YAML configuration document
    pub fn from_yaml_str(yaml_str: &str) -> MmeApiResult<Self> {
        let yaml: MmeYaml =
            serde_yaml::from_str(yaml_str).map_err(|e| invalid(format!("YAML: {}", e)))?;

        let max_ue = yaml.mme.max_ue;
        if max_ue == 0 || max_ue > MME_API_NB_UE_MAX {
            return Err(invalid(format!(
                "max_ue {} out of range 1..={}",
                max_ue, MME_API_NB_UE_MAX
            )));
        }

        let snapshot = Self {
            emm: load_emm_config(&yaml)?,
            esm: load_esm_config(&yaml)?,
            max_ue,
        };
        info!(
            "Configuration loaded: PLMN[{}] MME_GID[{}] MME_CODE[{}], {} served TAI list(s), max {} UEs",
            snapshot.emm.gummei.plmn_id.to_bcd(),
            snapshot.emm.gummei.mme_gid,
            snapshot.emm.gummei.mme_code,
            snapshot.emm.served_tai.len(),
            snapshot.max_ue
        );
        Ok(snapshot)
    }

    /// Read and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> MmeApiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
pub(crate) const TEST_CONFIG_YAML: &str = r#"
mme:
  gummei:
    plmn_id: { mcc: "001", mnc: "01" }
    mme_gid: 2
    mme_code: 1
  tai:
    - plmn_id: { mcc: "001", mnc: "01" }
      tac: [1, 2, 3]
  security:
    integrity_order: [EIA2, EIA1, EIA0]
    ciphering_order: [EEA0, EEA1, EEA2]
  network_name:
    full: NextGCore
    short: Next
  features: [ipv4, ipv6, sms_supported]
esm:
  features: [ipv4]
  dns: ["8.8.8.8", "8.8.4.4"]
"#;

#[cfg(test)]
pub(crate) fn test_snapshot() -> ConfigSnapshot {
    ConfigSnapshot::from_yaml_str(TEST_CONFIG_YAML).unwrap()
}

// ============================================================================
// Tests
// ============================================================================
