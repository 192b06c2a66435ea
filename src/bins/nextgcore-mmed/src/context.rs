//! MME UE Context Directory
//!
//! Per-subscriber mobility state keyed by MME UE S1AP ID, with secondary
//! hash tables by eNB UE key, IMSI and GUTI.

use std::collections::HashMap;
use std::fmt;

use log::{debug, info, warn};

use crate::config::EmmConfig;
use crate::error::{MmeApiError, MmeApiResult};
use crate::guti::{GutiAllocator, MTmsiSource, RandomMTmsi};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of UEs the MME may simultaneously support
pub const MME_API_NB_UE_MAX: usize = 256;
/// Invalid UE S1AP ID
pub const INVALID_UE_S1AP_ID: u32 = 0xffffffff;
/// Maximum number of TAIs carried in one TAI list IE
pub const MAX_NUM_OF_TAI_IN_LIST: usize = 16;
/// MAX IMSI BCD length
pub const OGS_MAX_IMSI_BCD_LEN: usize = 15;
/// MIN IMSI BCD length (MCC + MNC + at least one MSIN digit)
pub const OGS_MIN_IMSI_BCD_LEN: usize = 6;

// ============================================================================
// Basic Types
// ============================================================================

/// PLMN ID
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PlmnId {
    /// MCC digit 1
    pub mcc1: u8,
    /// MCC digit 2
    pub mcc2: u8,
    /// MCC digit 3
    pub mcc3: u8,
    /// MNC digit 1
    pub mnc1: u8,
    /// MNC digit 2
    pub mnc2: u8,
    /// MNC digit 3 (0xf if 2-digit MNC)
    pub mnc3: u8,
}

impl PlmnId {
    /// Parse a PLMN ID from its MCC (3 digits) and MNC (2 or 3 digits)
    pub fn parse(mcc: &str, mnc: &str) -> Option<Self> {
        let digits = |s: &str| -> Option<Vec<u8>> {
            s.chars().map(|c| c.to_digit(10).map(|d| d as u8)).collect()
        };
        let mcc = digits(mcc).filter(|d| d.len() == 3)?;
        let mnc = digits(mnc).filter(|d| d.len() == 2 || d.len() == 3)?;

        Some(Self {
            mcc1: mcc[0],
            mcc2: mcc[1],
            mcc3: mcc[2],
            mnc1: mnc[0],
            mnc2: mnc[1],
            mnc3: mnc.get(2).copied().unwrap_or(0xf),
        })
    }

    /// Convert to BCD string
    pub fn to_bcd(&self) -> String {
        if self.mnc3 == 0xf {
            format!("{}{}{}{}{}", self.mcc1, self.mcc2, self.mcc3, self.mnc1, self.mnc2)
        } else {
            format!("{}{}{}{}{}{}", self.mcc1, self.mcc2, self.mcc3, self.mnc1, self.mnc2, self.mnc3)
        }
    }
}

/// EPS TAI (Tracking Area Identity)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EpsTai {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// TAC (16 bits for EPS)
    pub tac: u16,
}

impl fmt::Display for EpsTai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.plmn_id.to_bcd(), self.tac)
    }
}

/// EPS GUTI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EpsGuti {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// MME Group ID
    pub mme_gid: u16,
    /// MME Code
    pub mme_code: u8,
    /// M-TMSI
    pub m_tmsi: u32,
}

impl fmt::Display for EpsGuti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:04x}:{:02x}:0x{:08x}",
            self.plmn_id.to_bcd(),
            self.mme_gid,
            self.mme_code,
            self.m_tmsi
        )
    }
}

/// IMSI in BCD digit form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Imsi(String);

impl Imsi {
    /// Build an IMSI from its BCD digits; `None` unless 6..=15 decimal digits
    pub fn from_bcd(bcd: &str) -> Option<Self> {
        let valid_len = (OGS_MIN_IMSI_BCD_LEN..=OGS_MAX_IMSI_BCD_LEN).contains(&bcd.len());
        if valid_len && bcd.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(bcd.to_string()))
        } else {
            None
        }
    }

    /// BCD digits
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// MME UE S1AP ID, the stable MME-side key of a UE context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MmeUeS1apId(pub u32);

impl fmt::Display for MmeUeS1apId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// eNB UE key: the transport-layer identity of one S1 UE connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnbUeKey {
    /// eNB ID
    pub enb_id: u32,
    /// eNB UE S1AP ID (24 bits, assigned by the eNB)
    pub enb_ue_s1ap_id: u32,
}

impl EnbUeKey {
    /// Create a new eNB UE key
    pub fn new(enb_id: u32, enb_ue_s1ap_id: u32) -> Self {
        Self {
            enb_id,
            enb_ue_s1ap_id: enb_ue_s1ap_id & 0x00ff_ffff,
        }
    }
}

impl fmt::Display for EnbUeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ENB_ID[0x{:x}]:ENB_UE_S1AP_ID[{}]", self.enb_id, self.enb_ue_s1ap_id)
    }
}

/// EMM registration state as seen by the NAS API
///
/// Any state may follow any state here; the transition guard lives in the
/// EMM state machine that drives these updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MmState {
    #[default]
    Unregistered,
    Registered,
}

impl fmt::Display for MmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmState::Unregistered => write!(f, "UE_UNREGISTERED"),
            MmState::Registered => write!(f, "UE_REGISTERED"),
        }
    }
}

// ============================================================================
// TAI List
// ============================================================================

/// Advertised TAI list, at most `MAX_NUM_OF_TAI_IN_LIST` entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaiList(Vec<EpsTai>);

impl TaiList {
    /// List holding a single TAI
    pub fn single(tai: EpsTai) -> Self {
        Self(vec![tai])
    }

    /// Append a TAI; returns false when the list is full or already has it
    pub fn try_push(&mut self, tai: EpsTai) -> bool {
        if self.0.len() >= MAX_NUM_OF_TAI_IN_LIST || self.0.contains(&tai) {
            return false;
        }
        self.0.push(tai);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tai: &EpsTai) -> bool {
        self.0.contains(tai)
    }

    pub fn as_slice(&self) -> &[EpsTai] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EpsTai> {
        self.0.iter()
    }
}

// ============================================================================
// UE Mobility Context
// ============================================================================

/// Mobility state of one attached or attaching UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeMobilityContext {
    /// MME UE S1AP ID (directory key)
    pub mme_ue_s1ap_id: MmeUeS1apId,
    /// eNB UE key reported when the context was created
    pub enb_ue_key: EnbUeKey,
    /// IMSI, once resolved
    pub imsi: Option<Imsi>,
    /// Current GUTI
    pub guti: Option<EpsGuti>,
    /// Previous GUTI, kept until the UE confirms the new one
    pub old_guti: Option<EpsGuti>,
    /// EMM registration state
    pub mm_state: MmState,
    /// TAI list advertised with the current GUTI
    pub tai_list: TaiList,
    /// SGs VLR reliable flag
    pub sgs_vlr_reliable: bool,
    /// SGs network-established activity flag (NEAF)
    pub sgs_neaf: bool,
}

impl UeMobilityContext {
    fn new(mme_ue_s1ap_id: MmeUeS1apId, enb_ue_key: EnbUeKey) -> Self {
        Self {
            mme_ue_s1ap_id,
            enb_ue_key,
            imsi: None,
            guti: None,
            old_guti: None,
            mm_state: MmState::Unregistered,
            tai_list: TaiList::default(),
            sgs_vlr_reliable: false,
            sgs_neaf: false,
        }
    }
}

/// Result of adding a UE context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewUe {
    /// MME UE S1AP ID of the new context
    pub mme_ue_s1ap_id: MmeUeS1apId,
    /// Context already bound to the same eNB UE key, if any. The new
    /// context stays unbound until the duplicate is resolved.
    pub duplicate_of: Option<MmeUeS1apId>,
}

// ============================================================================
// UE Context Directory
// ============================================================================

/// Directory of live UE mobility contexts
#[derive(Debug)]
pub struct UeContextDirectory<S = RandomMTmsi> {
    /// UE storage
    ue_list: HashMap<MmeUeS1apId, UeMobilityContext>,
    /// Hash tables
    enb_ue_key_hash: HashMap<EnbUeKey, MmeUeS1apId>,
    imsi_ue_hash: HashMap<Imsi, MmeUeS1apId>,
    /// Bound GUTIs keyed by M-TMSI, the unit the allocator reserves
    m_tmsi_ue_hash: HashMap<u32, (EpsGuti, MmeUeS1apId)>,
    /// MME UE S1AP ID generator
    mme_ue_s1ap_id: u32,
    /// UE capacity
    max_ue: usize,
    /// M-TMSI allocator
    allocator: GutiAllocator<S>,
}

impl UeContextDirectory<RandomMTmsi> {
    /// Create a directory holding at most `max_ue` contexts (1..=256)
    pub fn new(max_ue: usize) -> Self {
        Self::with_allocator(max_ue, GutiAllocator::new())
    }
}

impl Default for UeContextDirectory<RandomMTmsi> {
    fn default() -> Self {
        Self::new(MME_API_NB_UE_MAX)
    }
}

impl<S: MTmsiSource> UeContextDirectory<S> {
    /// Create a directory on top of a specific GUTI allocator
    ///
    /// `max_ue` is clamped to 1..=`MME_API_NB_UE_MAX`.
    pub fn with_allocator(max_ue: usize, allocator: GutiAllocator<S>) -> Self {
        let clamped = max_ue.clamp(1, MME_API_NB_UE_MAX);
        if clamped != max_ue {
            warn!("max_ue {} out of range, using {}", max_ue, clamped);
        }
        Self {
            ue_list: HashMap::new(),
            enb_ue_key_hash: HashMap::new(),
            imsi_ue_hash: HashMap::new(),
            m_tmsi_ue_hash: HashMap::new(),
            mme_ue_s1ap_id: 1,
            max_ue: clamped,
            allocator,
        }
    }

    /// Generate a MME UE S1AP ID not held by any live context
    fn next_mme_ue_s1ap_id(&mut self) -> MmeUeS1apId {
        loop {
            let id = MmeUeS1apId(self.mme_ue_s1ap_id);
            self.mme_ue_s1ap_id = match self.mme_ue_s1ap_id.wrapping_add(1) {
                0 | INVALID_UE_S1AP_ID => 1,
                next => next,
            };
            if !self.ue_list.contains_key(&id) {
                return id;
            }
        }
    }

    /// Add a UE context for an eNB UE key seen for the first time
    pub fn ue_add(&mut self, enb_ue_key: EnbUeKey) -> MmeApiResult<NewUe> {
        if self.ue_list.len() >= self.max_ue {
            return Err(MmeApiError::ResourceExhausted("UE context"));
        }

        let id = self.next_mme_ue_s1ap_id();
        let duplicate_of = self.enb_ue_key_hash.get(&enb_ue_key).copied();
        match duplicate_of {
            Some(owner) => warn!(
                "[{}] already bound to MME_UE_S1AP_ID[{}], MME_UE_S1AP_ID[{}] left unbound",
                enb_ue_key, owner, id
            ),
            None => {
                self.enb_ue_key_hash.insert(enb_ue_key, id);
            }
        }
        self.ue_list.insert(id, UeMobilityContext::new(id, enb_ue_key));

        info!("[Added] Number of MME-UEs is now {}", self.ue_list.len());
        Ok(NewUe {
            mme_ue_s1ap_id: id,
            duplicate_of,
        })
    }

    /// Remove a UE context; no-op if it is already gone
    pub fn remove(&mut self, id: MmeUeS1apId) -> Option<UeMobilityContext> {
        let ue = self.ue_list.remove(&id)?;

        if self.enb_ue_key_hash.get(&ue.enb_ue_key) == Some(&id) {
            self.enb_ue_key_hash.remove(&ue.enb_ue_key);
        }
        if let Some(imsi) = &ue.imsi {
            if self.imsi_ue_hash.get(imsi) == Some(&id) {
                self.imsi_ue_hash.remove(imsi);
            }
        }
        for guti in ue.guti.iter().chain(ue.old_guti.iter()) {
            Self::forget_guti(&mut self.m_tmsi_ue_hash, &mut self.allocator, id, guti);
        }

        info!("[Removed] Number of MME-UEs is now {}", self.ue_list.len());
        Some(ue)
    }

    /// Drop a GUTI owned by `id` from the hash and release its M-TMSI
    fn forget_guti(
        m_tmsi_ue_hash: &mut HashMap<u32, (EpsGuti, MmeUeS1apId)>,
        allocator: &mut GutiAllocator<S>,
        id: MmeUeS1apId,
        guti: &EpsGuti,
    ) {
        if m_tmsi_ue_hash.get(&guti.m_tmsi) == Some(&(*guti, id)) {
            m_tmsi_ue_hash.remove(&guti.m_tmsi);
            allocator.release(guti.m_tmsi);
        }
    }

    /// Find UE context by MME UE S1AP ID
    pub fn get(&self, id: MmeUeS1apId) -> MmeApiResult<&UeMobilityContext> {
        self.ue_list.get(&id).ok_or(MmeApiError::UnknownContext(id))
    }

    fn get_mut(&mut self, id: MmeUeS1apId) -> MmeApiResult<&mut UeMobilityContext> {
        self.ue_list.get_mut(&id).ok_or(MmeApiError::UnknownContext(id))
    }

    pub fn contains(&self, id: MmeUeS1apId) -> bool {
        self.ue_list.contains_key(&id)
    }

    /// Find the context currently bound to an eNB UE key
    pub fn find_by_enb_ue_key(&self, enb_ue_key: &EnbUeKey) -> Option<MmeUeS1apId> {
        self.enb_ue_key_hash.get(enb_ue_key).copied()
    }

    /// Find UE context by IMSI
    pub fn find_by_imsi(&self, imsi: &Imsi) -> Option<MmeUeS1apId> {
        self.imsi_ue_hash.get(imsi).copied()
    }

    /// Find UE context by current or previous GUTI
    pub fn find_by_guti(&self, guti: &EpsGuti) -> Option<MmeUeS1apId> {
        self.m_tmsi_ue_hash
            .get(&guti.m_tmsi)
            .filter(|(bound, _)| bound == guti)
            .map(|&(_, id)| id)
    }

    /// Number of live UE contexts
    pub fn len(&self) -> usize {
        self.ue_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ue_list.is_empty()
    }

    pub fn max_ue(&self) -> usize {
        self.max_ue
    }

    pub fn iter(&self) -> impl Iterator<Item = &UeMobilityContext> {
        self.ue_list.values()
    }

    pub fn allocator(&self) -> &GutiAllocator<S> {
        &self.allocator
    }

    /// Point an eNB UE key at a context, returning the previous owner
    pub(crate) fn bind_enb_ue_key(
        &mut self,
        enb_ue_key: EnbUeKey,
        id: MmeUeS1apId,
    ) -> Option<MmeUeS1apId> {
        self.enb_ue_key_hash.insert(enb_ue_key, id)
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// Record the IMSI resolved for a UE
    pub fn resolve_permanent_identity(&mut self, id: MmeUeS1apId, imsi: Imsi) -> MmeApiResult<()> {
        let ue = self.ue_list.get_mut(&id).ok_or(MmeApiError::UnknownContext(id))?;
        if ue.imsi.as_ref() == Some(&imsi) {
            return Ok(());
        }

        if let Some(previous) = ue.imsi.replace(imsi.clone()) {
            if self.imsi_ue_hash.get(&previous) == Some(&id) {
                self.imsi_ue_hash.remove(&previous);
            }
        }
        if let Some(other) = self.imsi_ue_hash.insert(imsi.clone(), id) {
            warn!(
                "IMSI[{}] moved from MME_UE_S1AP_ID[{}] to MME_UE_S1AP_ID[{}]",
                imsi, other, id
            );
        }

        debug!("[{}] IMSI[{}] resolved", id, imsi);
        Ok(())
    }

    /// Allocate a new GUTI and TAI list; the GUTI is reserved but not bound
    pub fn new_guti(
        &mut self,
        imsi: &Imsi,
        old_guti: Option<&EpsGuti>,
        originating_tai: &EpsTai,
        emm: &EmmConfig,
    ) -> MmeApiResult<(EpsGuti, TaiList)> {
        self.allocator.allocate(imsi, old_guti, originating_tai, emm)
    }

    /// Bind a newly allocated GUTI to a UE context
    ///
    /// The current GUTI becomes the old one and the previous old GUTI is
    /// released. A GUTI whose M-TMSI is already bound under another GUTI, by
    /// any context, is refused. If the context is gone, an unbound M-TMSI
    /// reservation is returned to the allocator.
    pub fn notify_new_guti(
        &mut self,
        id: MmeUeS1apId,
        guti: EpsGuti,
        tai_list: TaiList,
    ) -> MmeApiResult<()> {
        let Some(ue) = self.ue_list.get_mut(&id) else {
            if !self.m_tmsi_ue_hash.contains_key(&guti.m_tmsi)
                && self.allocator.release(guti.m_tmsi)
            {
                debug!("[{}] gone, GUTI[{}] reservation released", id, guti);
            }
            return Err(MmeApiError::UnknownContext(id));
        };
        if let Some(&(bound, owner)) = self.m_tmsi_ue_hash.get(&guti.m_tmsi) {
            if owner != id || bound != guti {
                return Err(MmeApiError::GutiConflict {
                    m_tmsi: guti.m_tmsi,
                    owner,
                });
            }
        }

        ue.tai_list = tai_list;
        if ue.guti == Some(guti) {
            return Ok(());
        }

        if let Some(stale) = ue.old_guti.take() {
            Self::forget_guti(&mut self.m_tmsi_ue_hash, &mut self.allocator, id, &stale);
        }
        ue.old_guti = ue.guti.replace(guti);
        self.m_tmsi_ue_hash.insert(guti.m_tmsi, (guti, id));
        self.allocator.reserve(guti.m_tmsi);

        debug!("[{}] GUTI[{}] assigned", id, guti);
        Ok(())
    }

    /// Release the previous GUTI once the UE has confirmed the current one
    pub fn release_old_guti(&mut self, id: MmeUeS1apId) -> MmeApiResult<Option<EpsGuti>> {
        let ue = self.ue_list.get_mut(&id).ok_or(MmeApiError::UnknownContext(id))?;
        let old = ue.old_guti.take();
        if let Some(guti) = &old {
            Self::forget_guti(&mut self.m_tmsi_ue_hash, &mut self.allocator, id, guti);
            debug!("[{}] old GUTI[{}] released", id, guti);
        }
        Ok(old)
    }

    /// Give back a GUTI that was allocated but never bound
    pub fn discard_guti(&mut self, guti: &EpsGuti) -> bool {
        if self.m_tmsi_ue_hash.contains_key(&guti.m_tmsi) {
            return false;
        }
        self.allocator.release(guti.m_tmsi)
    }

    // ------------------------------------------------------------------------
    // EMM state and SGs flags
    // ------------------------------------------------------------------------

    /// Set the EMM registration state
    pub fn set_registration_state(&mut self, id: MmeUeS1apId, state: MmState) -> MmeApiResult<()> {
        let ue = self.get_mut(id)?;
        if ue.mm_state != state {
            debug!("[{}] {} -> {}", id, ue.mm_state, state);
            ue.mm_state = state;
        }
        Ok(())
    }

    pub fn registration_state(&self, id: MmeUeS1apId) -> MmeApiResult<MmState> {
        self.get(id).map(|ue| ue.mm_state)
    }

    /// SGs VLR reliable flag; false for an unknown context
    pub fn vlr_reliable(&self, id: MmeUeS1apId) -> bool {
        self.ue_list.get(&id).is_some_and(|ue| ue.sgs_vlr_reliable)
    }

    pub fn set_vlr_reliable(&mut self, id: MmeUeS1apId, vlr_reliable: bool) -> MmeApiResult<()> {
        self.get_mut(id)?.sgs_vlr_reliable = vlr_reliable;
        Ok(())
    }

    /// SGs NEAF; false for an unknown context
    pub fn neaf(&self, id: MmeUeS1apId) -> bool {
        self.ue_list.get(&id).is_some_and(|ue| ue.sgs_neaf)
    }

    pub fn set_neaf(&mut self, id: MmeUeS1apId, neaf: bool) -> MmeApiResult<()> {
        self.get_mut(id)?.sgs_neaf = neaf;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_snapshot;

    fn imsi(bcd: &str) -> Imsi {
        Imsi::from_bcd(bcd).unwrap()
    }

    fn tai(tac: u16) -> EpsTai {
        EpsTai {
            plmn_id: PlmnId::parse("001", "01").unwrap(),
            tac,
        }
    }

    #[test]
    fn test_plmn_id_parse() {
        let plmn = PlmnId::parse("310", "410").unwrap();
        assert_eq!(plmn.to_bcd(), "310410");
        let plmn = PlmnId::parse("001", "01").unwrap();
        assert_eq!(plmn.mnc3, 0xf);
        assert_eq!(plmn.to_bcd(), "00101");

        assert!(PlmnId::parse("01", "01").is_none());
        assert!(PlmnId::parse("001", "1").is_none());
        assert!(PlmnId::parse("00a", "01").is_none());
    }

    #[test]
    fn test_imsi_from_bcd() {
        assert!(Imsi::from_bcd("001010000000001").is_some());
        assert!(Imsi::from_bcd("00101").is_none());
        assert!(Imsi::from_bcd("0010100000000011").is_none());
        assert!(Imsi::from_bcd("00101000000000x").is_none());
    }

    #[test]
    fn test_enb_ue_key_masks_24_bits() {
        let key = EnbUeKey::new(0x19b, 0x0100_0005);
        assert_eq!(key.enb_ue_s1ap_id, 5);
    }

    #[test]
    fn test_ue_add_and_lookup() {
        let mut dir = UeContextDirectory::default();
        let key = EnbUeKey::new(1, 1);
        let new_ue = dir.ue_add(key).unwrap();
        assert!(new_ue.duplicate_of.is_none());
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.find_by_enb_ue_key(&key), Some(new_ue.mme_ue_s1ap_id));

        let ue = dir.get(new_ue.mme_ue_s1ap_id).unwrap();
        assert_eq!(ue.mm_state, MmState::Unregistered);
        assert!(ue.imsi.is_none());
        assert!(ue.tai_list.is_empty());
    }

    #[test]
    fn test_ue_add_reports_duplicate_key() {
        let mut dir = UeContextDirectory::default();
        let key = EnbUeKey::new(1, 7);
        let old = dir.ue_add(key).unwrap();
        let new = dir.ue_add(key).unwrap();
        assert_eq!(new.duplicate_of, Some(old.mme_ue_s1ap_id));
        assert_ne!(old.mme_ue_s1ap_id, new.mme_ue_s1ap_id);
        assert_eq!(dir.find_by_enb_ue_key(&key), Some(old.mme_ue_s1ap_id));
    }

    #[test]
    fn test_ue_add_capacity() {
        let mut dir = UeContextDirectory::new(2);
        dir.ue_add(EnbUeKey::new(1, 1)).unwrap();
        dir.ue_add(EnbUeKey::new(1, 2)).unwrap();
        assert_eq!(
            dir.ue_add(EnbUeKey::new(1, 3)),
            Err(MmeApiError::ResourceExhausted("UE context"))
        );
    }

    #[test]
    fn test_mme_ue_s1ap_id_skips_live_ids_on_wrap() {
        let mut dir = UeContextDirectory::default();
        let first = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        assert_eq!(first, MmeUeS1apId(1));

        dir.mme_ue_s1ap_id = INVALID_UE_S1AP_ID - 1;
        let last = dir.ue_add(EnbUeKey::new(1, 2)).unwrap().mme_ue_s1ap_id;
        assert_eq!(last, MmeUeS1apId(INVALID_UE_S1AP_ID - 1));

        // 1 is still live, so the generator moves on to 2
        let wrapped = dir.ue_add(EnbUeKey::new(1, 3)).unwrap().mme_ue_s1ap_id;
        assert_eq!(wrapped, MmeUeS1apId(2));
    }

    #[test]
    fn test_resolve_permanent_identity() {
        let mut dir = UeContextDirectory::default();
        let id = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;

        dir.resolve_permanent_identity(id, imsi("001010000000001")).unwrap();
        dir.resolve_permanent_identity(id, imsi("001010000000001")).unwrap();
        assert_eq!(dir.find_by_imsi(&imsi("001010000000001")), Some(id));

        dir.resolve_permanent_identity(id, imsi("001010000000002")).unwrap();
        assert_eq!(dir.find_by_imsi(&imsi("001010000000001")), None);
        assert_eq!(dir.find_by_imsi(&imsi("001010000000002")), Some(id));

        let missing = MmeUeS1apId(999);
        assert_eq!(
            dir.resolve_permanent_identity(missing, imsi("001010000000003")),
            Err(MmeApiError::UnknownContext(missing))
        );
    }

    #[test]
    fn test_registration_state_is_permissive() {
        let mut dir = UeContextDirectory::default();
        let id = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;

        dir.set_registration_state(id, MmState::Registered).unwrap();
        dir.set_registration_state(id, MmState::Registered).unwrap();
        assert_eq!(dir.registration_state(id), Ok(MmState::Registered));
        dir.set_registration_state(id, MmState::Unregistered).unwrap();
        assert_eq!(dir.registration_state(id), Ok(MmState::Unregistered));
    }

    #[test]
    fn test_sgs_flags() {
        let mut dir = UeContextDirectory::default();
        let id = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;

        assert!(!dir.vlr_reliable(id));
        assert!(!dir.neaf(id));
        dir.set_vlr_reliable(id, true).unwrap();
        dir.set_neaf(id, true).unwrap();
        assert!(dir.vlr_reliable(id));
        assert!(dir.neaf(id));

        dir.set_neaf(id, false).unwrap();
        assert!(dir.vlr_reliable(id));
        assert!(!dir.neaf(id));

        let missing = MmeUeS1apId(42);
        assert!(!dir.vlr_reliable(missing));
        assert!(!dir.neaf(missing));
        assert_eq!(
            dir.set_vlr_reliable(missing, true),
            Err(MmeApiError::UnknownContext(missing))
        );
    }

    #[test]
    fn test_remove_is_final_and_idempotent() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let key = EnbUeKey::new(1, 1);
        let id = dir.ue_add(key).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");
        dir.resolve_permanent_identity(id, subscriber.clone()).unwrap();
        dir.set_vlr_reliable(id, true).unwrap();
        let (guti, tai_list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(id, guti, tai_list).unwrap();

        let removed = dir.remove(id).unwrap();
        assert_eq!(removed.guti, Some(guti));
        assert!(dir.remove(id).is_none());

        assert_eq!(dir.get(id), Err(MmeApiError::UnknownContext(id)));
        assert_eq!(
            dir.resolve_permanent_identity(id, subscriber.clone()),
            Err(MmeApiError::UnknownContext(id))
        );
        assert!(!dir.vlr_reliable(id));
        assert_eq!(dir.find_by_enb_ue_key(&key), None);
        assert_eq!(dir.find_by_imsi(&subscriber), None);
        assert_eq!(dir.find_by_guti(&guti), None);
        assert!(!dir.allocator().is_in_use(guti.m_tmsi));
    }

    #[test]
    fn test_notify_new_guti_keeps_previous() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let id = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");

        let (first, list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(id, first, list.clone()).unwrap();
        dir.notify_new_guti(id, first, list).unwrap();
        assert_eq!(dir.get(id).unwrap().old_guti, None);

        let (second, list) = dir.new_guti(&subscriber, Some(&first), &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(id, second, list).unwrap();
        let ue = dir.get(id).unwrap();
        assert_eq!(ue.guti, Some(second));
        assert_eq!(ue.old_guti, Some(first));
        assert_eq!(dir.find_by_guti(&first), Some(id));
        assert_eq!(dir.find_by_guti(&second), Some(id));

        // A third GUTI pushes out the first one for good
        let (third, list) = dir.new_guti(&subscriber, Some(&second), &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(id, third, list).unwrap();
        assert_eq!(dir.find_by_guti(&first), None);
        assert!(!dir.allocator().is_in_use(first.m_tmsi));
        assert!(dir.allocator().is_in_use(second.m_tmsi));

        assert_eq!(dir.release_old_guti(id), Ok(Some(second)));
        assert_eq!(dir.release_old_guti(id), Ok(None));
        assert_eq!(dir.find_by_guti(&second), None);
        assert!(!dir.allocator().is_in_use(second.m_tmsi));
    }

    #[test]
    fn test_notify_new_guti_conflict() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let a = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        let b = dir.ue_add(EnbUeKey::new(1, 2)).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");

        let (guti, list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(a, guti, list.clone()).unwrap();
        assert_eq!(
            dir.notify_new_guti(b, guti, list),
            Err(MmeApiError::GutiConflict {
                m_tmsi: guti.m_tmsi,
                owner: a
            })
        );
        assert_eq!(dir.get(b).unwrap().guti, None);
    }

    #[test]
    fn test_notify_new_guti_shared_m_tmsi() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let a = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        let b = dir.ue_add(EnbUeKey::new(1, 2)).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");

        let (guti, list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(a, guti, list.clone()).unwrap();

        // Same M-TMSI under another MME group
        let foreign = EpsGuti {
            mme_gid: guti.mme_gid + 1,
            ..guti
        };
        assert_eq!(
            dir.notify_new_guti(b, foreign, list.clone()),
            Err(MmeApiError::GutiConflict {
                m_tmsi: guti.m_tmsi,
                owner: a
            })
        );
        assert_eq!(
            dir.notify_new_guti(a, foreign, list),
            Err(MmeApiError::GutiConflict {
                m_tmsi: guti.m_tmsi,
                owner: a
            })
        );
        assert_eq!(dir.find_by_guti(&foreign), None);

        // Removing the refused context leaves the live code reserved
        dir.remove(b);
        assert!(dir.allocator().is_in_use(guti.m_tmsi));
        assert_eq!(dir.find_by_guti(&guti), Some(a));
    }

    #[test]
    fn test_notify_new_guti_after_remove_releases_reservation() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let id = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");

        let (guti, list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.remove(id);
        assert!(dir.allocator().is_in_use(guti.m_tmsi));

        assert_eq!(
            dir.notify_new_guti(id, guti, list),
            Err(MmeApiError::UnknownContext(id))
        );
        assert!(!dir.allocator().is_in_use(guti.m_tmsi));
        assert_eq!(dir.allocator().in_use_count(), 0);
    }

    #[test]
    fn test_notify_new_guti_unknown_keeps_bound_code() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let a = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");

        let (guti, list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(a, guti, list.clone()).unwrap();

        let missing = MmeUeS1apId(4242);
        assert_eq!(
            dir.notify_new_guti(missing, guti, list),
            Err(MmeApiError::UnknownContext(missing))
        );
        assert!(dir.allocator().is_in_use(guti.m_tmsi));
    }

    #[test]
    fn test_max_ue_clamped() {
        assert_eq!(UeContextDirectory::new(1000).max_ue(), MME_API_NB_UE_MAX);
        assert_eq!(UeContextDirectory::new(0).max_ue(), 1);
        assert_eq!(UeContextDirectory::new(8).max_ue(), 8);

        let mut dir = UeContextDirectory::new(0);
        dir.ue_add(EnbUeKey::new(1, 1)).unwrap();
        assert_eq!(
            dir.ue_add(EnbUeKey::new(1, 2)),
            Err(MmeApiError::ResourceExhausted("UE context"))
        );
    }

    #[test]
    fn test_discard_unbound_guti() {
        let config = test_snapshot();
        let mut dir = UeContextDirectory::default();
        let id = dir.ue_add(EnbUeKey::new(1, 1)).unwrap().mme_ue_s1ap_id;
        let subscriber = imsi("001010000000001");

        let (unused, _) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        assert!(dir.allocator().is_in_use(unused.m_tmsi));
        assert!(dir.discard_guti(&unused));
        assert!(!dir.allocator().is_in_use(unused.m_tmsi));

        let (bound, list) = dir.new_guti(&subscriber, None, &tai(1), &config.emm).unwrap();
        dir.notify_new_guti(id, bound, list).unwrap();
        assert!(!dir.discard_guti(&bound));
        assert!(dir.allocator().is_in_use(bound.m_tmsi));
    }
}
