//! Skip-or-upload decision from local and remote checksums

use super::checksum::ContentDigest;

/// Outcome of comparing a file against its remote copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    /// The remote object already holds identical content
    Skip,
    /// The remote object is missing, unlabelled, or stale
    Upload,
}

/// Skip only when the remote checksum is present and exactly equal to the
/// local one. Missing metadata always means upload; there is no special
/// handling of placeholder strings such as `"None"`.
pub fn decide(local: &ContentDigest, remote: Option<&str>) -> UploadDecision {
    match remote {
        Some(remote) if remote == local.as_str() => UploadDecision::Skip,
        _ => UploadDecision::Upload,
    }
}
