use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Normalized identity of a conflict instance.
///
/// Two conflicts with the same digest are the same conflict class no matter
/// which commits produced them: the digest covers the (rename-normalized)
/// file path plus a canonical form of the conflicting regions from both
/// sides, independent of surrounding unchanged context, whitespace and line
/// endings. `shape` hashes the regions alone, so the same semantic conflict
/// matches across files; project-level patterns key on that identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConflictFingerprint {
    pub digest: String,
    pub shape: String,
}

impl ConflictFingerprint {
    /// Fingerprint a conflict from the full contents of both sides.
    /// `path` should be the rename-normalized path when rename detection
    /// reported one.
    pub fn from_conflict(path: &str, ours: &str, theirs: &str) -> Self {
        let canonical = canonical_regions(ours, theirs);

        let shape = hex_digest(&[canonical.as_bytes()]);
        let digest = hex_digest(&[path.as_bytes(), b"\x00", canonical.as_bytes()]);

        Self { digest, shape }
    }

    /// Short form for logs and display
    pub fn short(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

fn hex_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let out = hasher.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

/// Canonical representation of the conflicting regions: common leading and
/// trailing lines (the unchanged context) are stripped, and both sides are
/// whitespace- and line-ending-normalized.
fn canonical_regions(ours: &str, theirs: &str) -> String {
    let ours: Vec<String> = normalized_lines(ours);
    let theirs: Vec<String> = normalized_lines(theirs);

    let common_prefix = ours
        .iter()
        .zip(theirs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let max_suffix = ours.len().min(theirs.len()) - common_prefix;
    let common_suffix = ours
        .iter()
        .rev()
        .zip(theirs.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let our_region = ours[common_prefix..ours.len() - common_suffix].join("\n");
    let their_region = theirs[common_prefix..theirs.len() - common_suffix].join("\n");

    format!("<<<\n{our_region}\n===\n{their_region}\n>>>")
}

fn normalized_lines(content: &str) -> Vec<String> {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect()
}
