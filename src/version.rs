//! Version comparison between the running executable and a candidate.
//!
//! Release tags are usually spelled `vX.Y.Z`; both sides are parsed as
//! semantic versions after stripping that prefix. When either side does not
//! parse, any textual difference counts as an update.

use semver::{BuildMetadata, Version};
use tracing::debug;

/// Parse a version string, accepting an optional `v`/`V` prefix.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(bare).ok()
}

/// Build metadata does not take part in precedence.
fn precedence(mut version: Version) -> Version {
    version.build = BuildMetadata::EMPTY;
    version
}

/// Decide whether `candidate` should replace `current`.
///
/// - Both parse as semver: update only when `candidate` has higher
///   precedence than `current` (build metadata is ignored).
/// - Otherwise: update whenever the trimmed strings differ.
#[must_use]
pub fn needs_update(current: &str, candidate: &str) -> bool {
    match (parse_version(current), parse_version(candidate)) {
        (Some(current_v), Some(candidate_v)) => {
            let newer = precedence(candidate_v.clone()) > precedence(current_v.clone());
            debug!("semver compare {current_v} -> {candidate_v}: newer={newer}");
            newer
        }
        _ => {
            let differs = current.trim() != candidate.trim();
            debug!("string compare '{current}' -> '{candidate}': differs={differs}");
            differs
        }
    }
}

/// Pick the tag with the greatest semantic version.
///
/// Tags that do not parse are ignored. Ties keep the first tag seen.
pub fn highest<'a, I>(tags: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(Version, &'a str)> = None;
    for tag in tags {
        let Some(version) = parse_version(tag).map(precedence) else {
            continue;
        };
        let replace = best.as_ref().map_or(true, |(current, _)| version > *current);
        if replace {
            best = Some((version, tag));
        }
    }
    best.map(|(_, tag)| tag)
}
