//! GUTI Allocation
//!
//! M-TMSI generation under the MME's GUMMEI, and the TAI list advertised
//! together with a new GUTI in Attach/TAU Accept.

use std::collections::HashSet;

use log::{debug, warn};

use crate::config::{EmmConfig, ServedTaiList};
use crate::context::{EpsGuti, EpsTai, Imsi, TaiList};
use crate::error::{MmeApiError, MmeApiResult};

/// Number of draws tried before giving up on a free M-TMSI
pub const MAX_M_TMSI_PROBES: usize = 32;
/// M-TMSI value never handed out
pub const INVALID_M_TMSI: u32 = 0xffffffff;

/// Source of candidate M-TMSI values
pub trait MTmsiSource {
    fn next_m_tmsi(&mut self) -> u32;
}

/// Uniformly random M-TMSI candidates
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomMTmsi;

impl MTmsiSource for RandomMTmsi {
    fn next_m_tmsi(&mut self) -> u32 {
        rand::random()
    }
}

impl<F: FnMut() -> u32> MTmsiSource for F {
    fn next_m_tmsi(&mut self) -> u32 {
        self()
    }
}

/// GUTI allocator
///
/// Tracks every M-TMSI currently reserved or bound so that no two live
/// contexts can ever be handed the same GUTI. Allocation never touches the
/// UE directory; the directory releases codes when it drops a GUTI.
#[derive(Debug)]
pub struct GutiAllocator<S = RandomMTmsi> {
    source: S,
    in_use: HashSet<u32>,
}

impl GutiAllocator<RandomMTmsi> {
    pub fn new() -> Self {
        Self::with_source(RandomMTmsi)
    }
}

impl Default for GutiAllocator<RandomMTmsi> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MTmsiSource> GutiAllocator<S> {
    /// Create an allocator drawing candidates from `source`
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            in_use: HashSet::new(),
        }
    }

    /// Allocate a new GUTI for `imsi`, plus the TAI list to advertise with it
    ///
    /// `old_guti` is only reported; it stays reserved until the directory
    /// releases it.
    pub fn allocate(
        &mut self,
        imsi: &Imsi,
        old_guti: Option<&EpsGuti>,
        originating_tai: &EpsTai,
        emm: &EmmConfig,
    ) -> MmeApiResult<(EpsGuti, TaiList)> {
        let m_tmsi = self.draw_m_tmsi()?;
        let guti = EpsGuti {
            plmn_id: emm.gummei.plmn_id,
            mme_gid: emm.gummei.mme_gid,
            mme_code: emm.gummei.mme_code,
            m_tmsi,
        };
        let tai_list = build_tai_list(originating_tai, &emm.served_tai);

        match old_guti {
            Some(old) => debug!("IMSI[{}] GUTI[{}] -> GUTI[{}]", imsi, old, guti),
            None => debug!("IMSI[{}] new GUTI[{}]", imsi, guti),
        }
        Ok((guti, tai_list))
    }

    fn draw_m_tmsi(&mut self) -> MmeApiResult<u32> {
        for _ in 0..MAX_M_TMSI_PROBES {
            let candidate = self.source.next_m_tmsi();
            if candidate != INVALID_M_TMSI && self.in_use.insert(candidate) {
                return Ok(candidate);
            }
        }
        warn!(
            "No free M-TMSI after {} probes ({} in use)",
            MAX_M_TMSI_PROBES,
            self.in_use.len()
        );
        Err(MmeApiError::ResourceExhausted("M-TMSI"))
    }

    /// Mark an M-TMSI as in use; returns false if it already was
    pub fn reserve(&mut self, m_tmsi: u32) -> bool {
        self.in_use.insert(m_tmsi)
    }

    /// Return an M-TMSI to the pool; returns false if it was not in use
    pub fn release(&mut self, m_tmsi: u32) -> bool {
        self.in_use.remove(&m_tmsi)
    }

    pub fn is_in_use(&self, m_tmsi: u32) -> bool {
        self.in_use.contains(&m_tmsi)
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }
}

/// Build the TAI list for a new GUTI
///
/// The originating TAI always comes first. When it belongs to a served TAI
/// list, the rest of that list follows, up to the IE maximum.
pub fn build_tai_list(originating_tai: &EpsTai, served_tai: &[ServedTaiList]) -> TaiList {
    let mut tai_list = TaiList::single(*originating_tai);
    if let Some(served) = served_tai.iter().find(|s| s.contains(originating_tai)) {
        for tai in served.tais() {
            tai_list.try_push(tai);
        }
    }
    tai_list
}

// ============================================================================
// Tests
// ============================================================================
