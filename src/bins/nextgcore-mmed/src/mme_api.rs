//! MME NAS API
//!
//! Entry points used by the NAS, S1AP and SGs layers. The UE directory
//! (including the GUTI allocator's in-use set) sits behind one lock, so
//! every call is serialized and M-TMSI uniqueness holds across threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{ConfigSnapshot, EmmConfig, EsmConfig};
use crate::context::{
    EnbUeKey, EpsGuti, EpsTai, Imsi, MmState, MmeUeS1apId, NewUe, TaiList, UeContextDirectory,
    UeMobilityContext,
};
use crate::duplicate::{resolve_duplicate, DuplicateResolution};
use crate::error::MmeApiResult;
use crate::subscription::{
    IpVersion, PdnAddress, QosProfile, SubscriptionRecord, SubscriptionRegistry,
};

/// MME NAS API state
#[derive(Debug)]
pub struct MmeApi {
    config: Arc<ConfigSnapshot>,
    directory: Mutex<UeContextDirectory>,
    subscriptions: Mutex<SubscriptionRegistry>,
}

impl MmeApi {
    /// Create the API on top of a loaded configuration snapshot
    pub fn new(config: Arc<ConfigSnapshot>) -> Self {
        let directory = UeContextDirectory::new(config.max_ue);
        Self {
            config,
            directory: Mutex::new(directory),
            subscriptions: Mutex::new(SubscriptionRegistry::new()),
        }
    }

    // A panic mid-call cannot leave the maps half-updated, so a poisoned
    // lock is still safe to use.
    fn directory(&self) -> MutexGuard<'_, UeContextDirectory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn get_emm_config(&self) -> &EmmConfig {
        &self.config.emm
    }

    pub fn get_esm_config(&self) -> &EsmConfig {
        &self.config.esm
    }

    // ------------------------------------------------------------------------
    // UE contexts
    // ------------------------------------------------------------------------

    /// Create a UE context for a new eNB UE key
    pub fn ue_add(&self, enb_ue_key: EnbUeKey) -> MmeApiResult<NewUe> {
        self.directory().ue_add(enb_ue_key)
    }

    /// Remove a UE context (detach, release); no-op if already removed
    pub fn ue_remove(&self, id: MmeUeS1apId) -> Option<UeMobilityContext> {
        self.directory().remove(id)
    }

    /// Snapshot of a UE context
    pub fn ue_context(&self, id: MmeUeS1apId) -> MmeApiResult<UeMobilityContext> {
        self.directory().get(id).cloned()
    }

    pub fn find_by_imsi(&self, imsi: &Imsi) -> Option<MmeUeS1apId> {
        self.directory().find_by_imsi(imsi)
    }

    pub fn find_by_guti(&self, guti: &EpsGuti) -> Option<MmeUeS1apId> {
        self.directory().find_by_guti(guti)
    }

    pub fn find_by_enb_ue_key(&self, enb_ue_key: &EnbUeKey) -> Option<MmeUeS1apId> {
        self.directory().find_by_enb_ue_key(enb_ue_key)
    }

    pub fn num_of_ue(&self) -> usize {
        self.directory().len()
    }

    pub fn notify_imsi(&self, id: MmeUeS1apId, imsi: Imsi) -> MmeApiResult<()> {
        self.directory().resolve_permanent_identity(id, imsi)
    }

    // ------------------------------------------------------------------------
    // GUTI
    // ------------------------------------------------------------------------

    /// Allocate a GUTI and the TAI list to advertise with it
    ///
    /// The M-TMSI stays reserved until it is bound with `notify_new_guti`
    /// or given back with `discard_guti`. Binding to a context that has
    /// meanwhile been removed also gives it back.
    pub fn new_guti(
        &self,
        imsi: &Imsi,
        old_guti: Option<&EpsGuti>,
        originating_tai: &EpsTai,
    ) -> MmeApiResult<(EpsGuti, TaiList)> {
        self.directory()
            .new_guti(imsi, old_guti, originating_tai, &self.config.emm)
    }

    pub fn notify_new_guti(
        &self,
        id: MmeUeS1apId,
        guti: EpsGuti,
        tai_list: TaiList,
    ) -> MmeApiResult<()> {
        self.directory().notify_new_guti(id, guti, tai_list)
    }

    pub fn release_old_guti(&self, id: MmeUeS1apId) -> MmeApiResult<Option<EpsGuti>> {
        self.directory().release_old_guti(id)
    }

    pub fn discard_guti(&self, guti: &EpsGuti) -> bool {
        self.directory().discard_guti(guti)
    }

    // ------------------------------------------------------------------------
    // EMM state and SGs flags
    // ------------------------------------------------------------------------

    pub fn update_ue_emm_state(&self, id: MmeUeS1apId, state: MmState) -> MmeApiResult<()> {
        self.directory().set_registration_state(id, state)
    }

    pub fn get_ue_emm_state(&self, id: MmeUeS1apId) -> MmeApiResult<MmState> {
        self.directory().registration_state(id)
    }

    pub fn get_ue_sgs_vlr_reliable(&self, id: MmeUeS1apId) -> bool {
        self.directory().vlr_reliable(id)
    }

    pub fn update_ue_sgs_vlr_reliable(&self, id: MmeUeS1apId, vlr_reliable: bool) -> MmeApiResult<()> {
        self.directory().set_vlr_reliable(id, vlr_reliable)
    }

    pub fn get_ue_sgs_neaf(&self, id: MmeUeS1apId) -> bool {
        self.directory().neaf(id)
    }

    pub fn update_ue_sgs_neaf(&self, id: MmeUeS1apId, neaf: bool) -> MmeApiResult<()> {
        self.directory().set_neaf(id, neaf)
    }

    // ------------------------------------------------------------------------
    // S1AP
    // ------------------------------------------------------------------------

    /// Duplicate eNB UE S1AP ID reported by the S1AP layer
    pub fn duplicate_enb_ue_s1ap_id_detected(
        &self,
        enb_ue_key: EnbUeKey,
        id: MmeUeS1apId,
        remove_old: bool,
    ) -> MmeApiResult<DuplicateResolution> {
        let mut directory = self.directory();
        resolve_duplicate(&mut *directory, enb_ue_key, id, remove_old)
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    pub fn subscribe(
        &self,
        apn: &str,
        ip_version: IpVersion,
        pdn_addr: PdnAddress,
        is_emergency: bool,
        qos: QosProfile,
    ) -> MmeApiResult<()> {
        self.subscriptions()
            .subscribe(apn, ip_version, pdn_addr, is_emergency, qos)
    }

    pub fn unsubscribe(&self, apn: &str) -> MmeApiResult<()> {
        self.subscriptions().unsubscribe(apn).map(|_| ())
    }

    pub fn subscription(&self, apn: &str) -> Option<SubscriptionRecord> {
        self.subscriptions().get(apn).cloned()
    }
}
