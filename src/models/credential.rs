use serde::{Deserialize, Serialize};

/// One stored calendar credential per owning identity. The blob is the
/// serialized OAuth material (access + refresh token, client info); its
/// shape is owned by the calendar mirror, the store treats it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialToken {
    pub owner_id: String,
    pub token_blob: String,
}
