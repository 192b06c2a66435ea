//! MME API error types

use thiserror::Error;

use crate::context::MmeUeS1apId;

/// MME API error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MmeApiError {
    /// No live UE context for this MME UE S1AP ID
    #[error("Unknown UE context: MME_UE_S1AP_ID[{0}]")]
    UnknownContext(MmeUeS1apId),

    /// A bounded resource (M-TMSI space, UE capacity) could not be served
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// APN already subscribed with another IP version capability
    #[error("Duplicate subscription for APN[{apn}]")]
    DuplicateSubscription { apn: String },

    /// APN not subscribed
    #[error("APN[{0}] not subscribed")]
    NotSubscribed(String),

    /// Configuration missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// GUTI already held by another live UE context
    #[error("GUTI M-TMSI[0x{m_tmsi:08x}] already bound to MME_UE_S1AP_ID[{owner}]")]
    GutiConflict { m_tmsi: u32, owner: MmeUeS1apId },
}

/// MME API result type
pub type MmeApiResult<T> = Result<T, MmeApiError>;
