//! Caller-supplied configuration for bill ingestion.

use serde::{Deserialize, Serialize};

/// Maximum number of keys inspected per repository before the scan gives
/// up. Users sometimes store bills in a bucket shared with unrelated
/// objects; this bounds how much listing we pay for before concluding the
/// bills must live elsewhere. It is the caller's responsibility to place
/// bills under a prefix where this budget is sufficient.
pub const MAX_CHECKED_KEYS_PER_REPOSITORY: usize = 1000;

/// Fixed size of the manifest download buffer. Manifest objects larger
/// than this arrive truncated and fail to parse, dropping that manifest
/// only.
pub const MAX_MANIFEST_SIZE: usize = 0x8000;

/// Session purpose passed to the credential provider when reading bills.
pub const READ_BILLS_SESSION_NAME: &str = "read-bills";

/// A location where one account's billing exports are delivered:
/// a bucket, a key prefix within it, and the owning account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRepository {
    /// Bucket the exports are delivered to.
    pub bucket: String,
    /// Key prefix under which the exports live.
    pub prefix: String,
    /// Identifier of the account this repository belongs to.
    pub account_id: String,
}

/// Account identity handed to the credential provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsAccount {
    /// Account identifier, matching `BillRepository::account_id`.
    pub id: String,
    /// Role assumed to read the account's bill repository.
    pub role_arn: String,
    /// External id required by some cross-account trust policies.
    #[serde(default)]
    pub external_id: Option<String>,
}
