//! NextGCore MME NAS API
//!
//! UE mobility context directory, GUTI allocation, duplicate eNB UE S1AP ID
//! resolution and APN subscriptions, as used by the MME's NAS layer.

pub mod config;
pub mod context;
pub mod duplicate;
pub mod error;
pub mod guti;
pub mod mme_api;
pub mod subscription;


pub use config::{
    load_emm_config, load_esm_config, AlgorithmOrder, CipheringAlgorithm, ConfigSnapshot,
    EmmConfig, EsmConfig, FeatureSet, Gummei, IntegrityAlgorithm, MmeFeature, NetworkName,
    ServedTaiList,
};
pub use context::{
    EnbUeKey, EpsGuti, EpsTai, Imsi, MmState, MmeUeS1apId, NewUe, PlmnId, TaiList,
    UeContextDirectory, UeMobilityContext, MME_API_NB_UE_MAX,
};
pub use duplicate::{resolve_duplicate, DuplicateResolution, REMOVE_NEW_CONTEXT, REMOVE_OLD_CONTEXT};
pub use error::{MmeApiError, MmeApiResult};
pub use guti::{GutiAllocator, MTmsiSource, RandomMTmsi};
pub use mme_api::MmeApi;
pub use subscription::{
    Bitrate, IpVersion, PdnAddress, QosProfile, SubscriptionRecord, SubscriptionRegistry,
    TrafficFlowTemplate,
};
