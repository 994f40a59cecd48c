use std::collections::HashSet;

use url::Url;

use super::ServerConfig;
use super::credentials::CredentialSeed;
use crate::auth::credential::is_credential_digest;
use crate::core::store::TrialLimits;

/// Validate the whole configuration after merging
pub fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_provider_url(&config.deepgram_url)?;
    validate_session_limits(
        config.handshake_timeout_seconds,
        config.dashboard_max_session_seconds,
        config.metered_max_session_seconds,
    )?;
    validate_trial_limits(&config.trial_limits)?;
    validate_credential_seeds(&config.credentials)?;
    Ok(())
}

/// The provider endpoint must be a WebSocket URL
pub fn validate_provider_url(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Url::parse(url).map_err(|e| format!("DEEPGRAM_URL is not a valid URL: {e}"))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!("DEEPGRAM_URL must use ws:// or wss://, got '{other}://'").into()),
    }
}

/// Handshake timeout and session ceilings must all be positive
pub fn validate_session_limits(
    handshake_timeout_seconds: u64,
    dashboard_max_session_seconds: u64,
    metered_max_session_seconds: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if handshake_timeout_seconds == 0 {
        return Err("UPSTREAM_HANDSHAKE_TIMEOUT_SECONDS must be greater than 0".into());
    }
    if dashboard_max_session_seconds == 0 {
        return Err("DASHBOARD_MAX_SESSION_SECONDS must be greater than 0".into());
    }
    if metered_max_session_seconds == Some(0) {
        return Err("METERED_MAX_SESSION_SECONDS must be greater than 0 when set".into());
    }
    Ok(())
}

/// Every trial limit must be strictly positive
pub fn validate_trial_limits(limits: &TrialLimits) -> Result<(), Box<dyn std::error::Error>> {
    let checks = [
        ("TRIAL_MAX_DURATION_SECONDS", limits.max_duration_seconds),
        ("TRIAL_MAX_SESSIONS", limits.max_sessions),
        (
            "TRIAL_MAX_SESSION_DURATION_SECONDS",
            limits.max_session_duration_seconds,
        ),
        ("TRIAL_EXPIRY_DAYS", u64::from(limits.expiry_days)),
    ];

    for (name, value) in checks {
        if value == 0 {
            return Err(format!("{name} must be greater than 0").into());
        }
    }
    Ok(())
}

/// Validate seeded credentials
///
/// Each seed needs a SHA-256 hex digest, an owner that fits its kind, and a
/// digest not used by another seed.
pub fn validate_credential_seeds(
    seeds: &[CredentialSeed],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();

    for (index, seed) in seeds.iter().enumerate() {
        let digest = seed.key_hash.trim().to_lowercase();
        if !is_credential_digest(&digest) {
            return Err(format!(
                "credentials[{index}]: key_hash must be a 64 character SHA-256 hex digest"
            )
            .into());
        }
        if seed.subject().is_none() {
            return Err(format!(
                "credentials[{index}]: owner '{}' is not valid for a {} key",
                seed.owner, seed.kind
            )
            .into());
        }
        if !seen.insert(digest) {
            return Err(format!("credentials[{index}]: duplicate key_hash").into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::CredentialKind;

    const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn seed(kind: CredentialKind, key_hash: &str, owner: &str) -> CredentialSeed {
        CredentialSeed {
            kind,
            key_hash: key_hash.to_string(),
            owner: owner.to_string(),
            key_prefix: None,
            expires_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_provider_url_scheme() {
        assert!(validate_provider_url("wss://api.deepgram.com/v1/listen").is_ok());
        assert!(validate_provider_url("ws://127.0.0.1:9000/v1/listen").is_ok());

        let err = validate_provider_url("https://api.deepgram.com").unwrap_err();
        assert!(err.to_string().contains("ws:// or wss://"));
        assert!(validate_provider_url("not a url").is_err());
    }

    #[test]
    fn test_session_limits() {
        assert!(validate_session_limits(10, 300, None).is_ok());
        assert!(validate_session_limits(10, 300, Some(3600)).is_ok());
        assert!(validate_session_limits(0, 300, None).is_err());
        assert!(validate_session_limits(10, 0, None).is_err());
        assert!(validate_session_limits(10, 300, Some(0)).is_err());
    }

    #[test]
    fn test_trial_limits_must_be_positive() {
        assert!(validate_trial_limits(&TrialLimits::default()).is_ok());

        let limits = TrialLimits {
            max_sessions: 0,
            ..TrialLimits::default()
        };
        let err = validate_trial_limits(&limits).unwrap_err();
        assert!(err.to_string().contains("TRIAL_MAX_SESSIONS"));

        let limits = TrialLimits {
            expiry_days: 0,
            ..TrialLimits::default()
        };
        assert!(validate_trial_limits(&limits).is_err());
    }

    #[test]
    fn test_credential_seeds() {
        let user = uuid::Uuid::new_v4().to_string();
        let valid = vec![
            seed(CredentialKind::Metered, DIGEST, &user),
            seed(
                CredentialKind::Trial,
                &"a".repeat(64),
                "fingerprint-1",
            ),
        ];
        assert!(validate_credential_seeds(&valid).is_ok());

        let short = vec![seed(CredentialKind::Trial, "abc123", "fp")];
        assert!(
            validate_credential_seeds(&short)
                .unwrap_err()
                .to_string()
                .contains("64 character")
        );

        let wrong_owner = vec![seed(CredentialKind::Metered, DIGEST, "fingerprint-1")];
        assert!(validate_credential_seeds(&wrong_owner).is_err());

        let duplicate = vec![
            seed(CredentialKind::Trial, DIGEST, "fp-1"),
            seed(CredentialKind::Trial, &DIGEST.to_uppercase(), "fp-2"),
        ];
        assert!(
            validate_credential_seeds(&duplicate)
                .unwrap_err()
                .to_string()
                .contains("duplicate")
        );
    }
}
