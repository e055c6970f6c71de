// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity fingerprint for fetch caches.
//!
//! Links the cache to the person whose records were fetched rather than to the
//! app account, so a relink with different credentials never serves stale data.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Inputs available when resolving an identity.
#[derive(Debug, Clone, Default)]
pub struct IdentityInput<'a> {
    pub app_user_id: &'a str,
    pub login_org_cd: Option<&'a str>,
    pub name: Option<&'a str>,
    /// Birth date, `YYYYMMDD` after stripping non-digits.
    pub birth: Option<&'a str>,
    pub mobile: Option<&'a str>,
    pub stored_identity_hash: Option<&'a str>,
}

/// Which input produced the identity hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentitySource {
    Pii,
    Stored,
    AppUser,
}

pub(crate) fn salted_sha256(salt: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"|");
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

fn digits(value: Option<&str>) -> String {
    value
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

/// Resolve the identity hash from, in order: complete PII, the hash stored on
/// the link, or the app user id.
pub fn resolve_identity_hash(input: &IdentityInput<'_>, salt: &str) -> (String, IdentitySource) {
    let org = input.login_org_cd.unwrap_or_default().trim().to_lowercase();
    let name: String = input
        .name
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let birth = digits(input.birth);
    let mobile = digits(input.mobile);

    if !org.is_empty()
        && !name.is_empty()
        && birth.len() == 8
        && (10..=11).contains(&mobile.len())
    {
        let hash = salted_sha256(salt, &format!("pii|{org}|{name}|{birth}|{mobile}"));
        return (hash, IdentitySource::Pii);
    }

    if let Some(stored) = input
        .stored_identity_hash
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return (stored.to_string(), IdentitySource::Stored);
    }

    (
        salted_sha256(salt, &format!("app-user|{}", input.app_user_id)),
        IdentitySource::AppUser,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &str = "test-salt";

    #[test]
    fn complete_pii_wins() {
        let input = IdentityInput {
            app_user_id: "user-1",
            login_org_cd: Some(" KAKAO "),
            name: Some("Hong Gil Dong"),
            birth: Some("1990-01-02"),
            mobile: Some("010-1234-5678"),
            stored_identity_hash: Some("stored"),
        };
        let (hash, source) = resolve_identity_hash(&input, SALT);
        assert_eq!(source, IdentitySource::Pii);
        assert_eq!(
            hash,
            salted_sha256(SALT, "pii|kakao|honggildong|19900102|01012345678")
        );
    }

    #[test]
    fn incomplete_pii_falls_back_to_stored() {
        let input = IdentityInput {
            app_user_id: "user-1",
            login_org_cd: Some("kakao"),
            name: Some("Hong"),
            birth: Some("900102"),
            mobile: Some("01012345678"),
            stored_identity_hash: Some("  abc123 "),
        };
        assert_eq!(
            resolve_identity_hash(&input, SALT),
            ("abc123".to_string(), IdentitySource::Stored)
        );
    }

    #[test]
    fn app_user_is_last_resort() {
        let input = IdentityInput {
            app_user_id: "user-9",
            ..Default::default()
        };
        let (hash, source) = resolve_identity_hash(&input, SALT);
        assert_eq!(source, IdentitySource::AppUser);
        assert_eq!(hash, salted_sha256(SALT, "app-user|user-9"));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn salt_changes_hash() {
        let input = IdentityInput {
            app_user_id: "user-9",
            ..Default::default()
        };
        let (a, _) = resolve_identity_hash(&input, "one");
        let (b, _) = resolve_identity_hash(&input, "two");
        assert_ne!(a, b);
    }
}
