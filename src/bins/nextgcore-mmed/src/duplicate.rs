//! Duplicate eNB UE S1AP ID Resolution
//!
//! When an eNB reuses an eNB UE S1AP ID for a new mobility attempt while an
//! older UE context still holds it, the S1AP layer decides which side
//! survives and the directory is updated accordingly. Timers and bearers of
//! the dropped context are released by its owner once it observes the
//! removal.

use log::{info, warn};

use crate::context::{EnbUeKey, MmeUeS1apId, UeContextDirectory};
use crate::error::{MmeApiError, MmeApiResult};
use crate::guti::MTmsiSource;

/// Keep the new context and remove the old one
pub const REMOVE_OLD_CONTEXT: bool = true;
/// Keep the old context and remove the new one
pub const REMOVE_NEW_CONTEXT: bool = false;

/// Outcome of a duplicate resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateResolution {
    /// The old context was removed and the key now belongs to the new one
    RemovedOld(MmeUeS1apId),
    /// The new context was removed; the old one keeps the key
    DiscardedNew(MmeUeS1apId),
    /// The old context was already gone; the key now belongs to the new one
    Rebound(MmeUeS1apId),
    /// No context removed
    Unchanged,
}

/// Resolve a duplicate eNB UE key in favour of one of the two contexts
///
/// `mme_ue_s1ap_id` identifies the new context. Repeating a resolution that
/// already took effect is a no-op.
pub fn resolve_duplicate<S: MTmsiSource>(
    directory: &mut UeContextDirectory<S>,
    enb_ue_key: EnbUeKey,
    mme_ue_s1ap_id: MmeUeS1apId,
    remove_old: bool,
) -> MmeApiResult<DuplicateResolution> {
    let owner = directory.find_by_enb_ue_key(&enb_ue_key);

    if owner == Some(mme_ue_s1ap_id) {
        if !remove_old {
            warn!(
                "[{}] already owned by MME_UE_S1AP_ID[{}], nothing to discard",
                enb_ue_key, mme_ue_s1ap_id
            );
        }
        return Ok(DuplicateResolution::Unchanged);
    }

    let reported_key = match directory.get(mme_ue_s1ap_id) {
        Ok(ue) => ue.enb_ue_key,
        Err(e) if remove_old => return Err(e),
        Err(_) => return Ok(DuplicateResolution::Unchanged),
    };
    if reported_key != enb_ue_key {
        warn!(
            "MME_UE_S1AP_ID[{}] was created for [{}], not [{}]",
            mme_ue_s1ap_id, reported_key, enb_ue_key
        );
        return Ok(DuplicateResolution::Unchanged);
    }

    if remove_old {
        if let Some(old) = owner {
            directory.remove(old);
        }
        directory.bind_enb_ue_key(enb_ue_key, mme_ue_s1ap_id);

        match owner {
            Some(old) => {
                info!(
                    "[{}] duplicate: MME_UE_S1AP_ID[{}] kept, old MME_UE_S1AP_ID[{}] removed",
                    enb_ue_key, mme_ue_s1ap_id, old
                );
                Ok(DuplicateResolution::RemovedOld(old))
            }
            None => {
                info!(
                    "[{}] duplicate: old context already gone, rebound to MME_UE_S1AP_ID[{}]",
                    enb_ue_key, mme_ue_s1ap_id
                );
                Ok(DuplicateResolution::Rebound(mme_ue_s1ap_id))
            }
        }
    } else {
        directory.remove(mme_ue_s1ap_id);
        info!(
            "[{}] duplicate: new MME_UE_S1AP_ID[{}] discarded",
            enb_ue_key, mme_ue_s1ap_id
        );
        Ok(DuplicateResolution::DiscardedNew(mme_ue_s1ap_id))
    }
}

// ============================================================================
// Tests
// ============================================================================
