//! Per-candidate verdicts over a completed authorization set.

use tracing::{debug, info};

use crate::collaborators::PackageInspector;
use crate::fingerprint::{matches, FingerprintPolicy};
use crate::types::{
    AuthorizationSet, CandidateApp, InstalledIdentity, RejectReason, Verdict, VerdictStatus,
};

/// Produce exactly one verdict per candidate, in candidate order.
pub fn aggregate(
    candidates: &[CandidateApp],
    authorizations: &AuthorizationSet,
    inspector: &dyn PackageInspector,
    policy: FingerprintPolicy,
) -> Vec<Verdict> {
    candidates
        .iter()
        .map(|candidate| {
            let status = match inspector.installed_identity(&candidate.package_id) {
                Some(installed) => evaluate(candidate, &installed, authorizations, policy),
                None => VerdictStatus::Invalid(RejectReason::NotInstalled),
            };

            match &status {
                VerdictStatus::Valid => {
                    info!(package = %candidate.package_id, "payment app authorized")
                }
                VerdictStatus::Invalid(reason) => {
                    info!(package = %candidate.package_id, reason = %reason, "payment app rejected")
                }
            }

            Verdict {
                candidate: candidate.clone(),
                status,
            }
        })
        .collect()
}

/// Verdict for one installed candidate.
///
/// When no entry matches, the reason reflects the closest entry: a version
/// shortfall is only reported if some entry's fingerprints would have
/// matched.
pub fn evaluate(
    candidate: &CandidateApp,
    installed: &InstalledIdentity,
    authorizations: &AuthorizationSet,
    policy: FingerprintPolicy,
) -> VerdictStatus {
    let mut listed = false;
    let mut version_shortfall: Option<i64> = None;

    for entry in authorizations.entries_for(&candidate.package_id) {
        listed = true;
        if matches(installed, entry, policy) {
            return VerdictStatus::Valid;
        }

        let fingerprints_ok = matches(
            &InstalledIdentity {
                version_code: entry.min_version,
                fingerprints: installed.fingerprints.clone(),
            },
            entry,
            policy,
        );
        if fingerprints_ok {
            version_shortfall = Some(match version_shortfall {
                Some(required) => required.min(entry.min_version),
                None => entry.min_version,
            });
        }
    }

    debug!(
        package = %candidate.package_id,
        listed,
        installed_version = installed.version_code,
        "no authorization entry matched"
    );

    match (listed, version_shortfall) {
        (false, _) => VerdictStatus::Invalid(RejectReason::NotListed),
        (true, Some(required)) => VerdictStatus::Invalid(RejectReason::VersionTooOld {
            installed: installed.version_code,
            required,
        }),
        (true, None) => VerdictStatus::Invalid(RejectReason::FingerprintMismatch),
    }
}
