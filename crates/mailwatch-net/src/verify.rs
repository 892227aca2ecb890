//! Certificate verification policy.
//!
//! Chains are verified by webpki against the Mozilla root set. Weaker
//! verification levels accept selected chain failures through an
//! [`IgnoreMask`]; the server name is checked at every level.

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::warn;

use crate::config::VerifyLevel;
use crate::{Error, Result};

/// Set of certificate failures to tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgnoreMask(u8);

impl IgnoreMask {
    /// Tolerate nothing.
    pub const NONE: Self = Self(0);
    /// Revoked or unknown revocation status.
    pub const REVOCATION: Self = Self(1);
    /// Certificate issued for another purpose.
    pub const WRONG_USAGE: Self = Self(1 << 1);
    /// Expired or not yet valid.
    pub const DATE_INVALID: Self = Self(1 << 2);
    /// Chain does not end at a known root.
    pub const UNKNOWN_CA: Self = Self(1 << 3);

    /// Returns the mask for a verification level.
    #[must_use]
    pub const fn for_level(level: VerifyLevel) -> Self {
        match level.get() {
            0 => Self::NONE,
            1 => Self::REVOCATION.union(Self::WRONG_USAGE),
            _ => Self::REVOCATION
                .union(Self::WRONG_USAGE)
                .union(Self::DATE_INVALID)
                .union(Self::UNKNOWN_CA),
        }
    }

    /// Returns the union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if this mask tolerates `err`.
    #[must_use]
    pub const fn covers(self, err: &CertificateError) -> bool {
        let needed = match err {
            CertificateError::Revoked
            | CertificateError::UnknownRevocationStatus
            | CertificateError::ExpiredRevocationList
            | CertificateError::ExpiredRevocationListContext { .. } => Self::REVOCATION,
            CertificateError::InvalidPurpose | CertificateError::InvalidPurposeContext { .. } => {
                Self::WRONG_USAGE
            }
            CertificateError::Expired
            | CertificateError::ExpiredContext { .. }
            | CertificateError::NotValidYet
            | CertificateError::NotValidYetContext { .. } => Self::DATE_INVALID,
            CertificateError::UnknownIssuer => Self::UNKNOWN_CA,
            _ => return false,
        };
        self.contains(needed)
    }
}

/// Server certificate verifier applying an [`IgnoreMask`] on top of webpki.
#[derive(Debug)]
pub struct PolicyVerifier {
    inner: Arc<WebPkiServerVerifier>,
    ignore: IgnoreMask,
}

impl PolicyVerifier {
    /// Creates a verifier over `roots`.
    ///
    /// # Errors
    ///
    /// Returns an error if the webpki verifier cannot be built.
    pub fn new(roots: Arc<RootCertStore>, ignore: IgnoreMask) -> Result<Self> {
        let inner = WebPkiServerVerifier::builder(roots)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { inner, ignore })
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(err)) if self.ignore.covers(&err) => {
                // the name is still required to match
                let cert = ParsedCertificate::try_from(end_entity)?;
                rustls::client::verify_server_name(&cert, server_name)?;
                warn!(
                    server = ?server_name,
                    error = ?err,
                    "accepting certificate despite verification failure"
                );
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Creates a client configuration trusting the bundled roots.
///
/// # Errors
///
/// Returns an error if the verifier cannot be built.
pub fn client_config(level: VerifyLevel) -> Result<Arc<ClientConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    client_config_with_roots(Arc::new(roots), level)
}

/// Creates a client configuration trusting `roots`.
///
/// # Errors
///
/// Returns an error if the verifier cannot be built.
pub fn client_config_with_roots(
    roots: Arc<RootCertStore>,
    level: VerifyLevel,
) -> Result<Arc<ClientConfig>> {
    let verifier = PolicyVerifier::new(roots, IgnoreMask::for_level(level))?;
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn mask(level: u8) -> IgnoreMask {
        IgnoreMask::for_level(VerifyLevel::new(level).unwrap())
    }

    #[test]
    fn test_strict_ignores_nothing() {
        let strict = mask(0);
        assert!(!strict.covers(&CertificateError::Revoked));
        assert!(!strict.covers(&CertificateError::UnknownIssuer));
        assert!(!strict.covers(&CertificateError::Expired));
    }

    #[test]
    fn test_level_one() {
        let level = mask(1);
        assert!(level.covers(&CertificateError::Revoked));
        assert!(level.covers(&CertificateError::UnknownRevocationStatus));
        assert!(level.covers(&CertificateError::InvalidPurpose));
        assert!(!level.covers(&CertificateError::Expired));
        assert!(!level.covers(&CertificateError::UnknownIssuer));
    }

    #[test]
    fn test_level_two() {
        let level = mask(2);
        assert!(level.covers(&CertificateError::Revoked));
        assert!(level.covers(&CertificateError::Expired));
        assert!(level.covers(&CertificateError::NotValidYet));
        assert!(level.covers(&CertificateError::UnknownIssuer));
    }

    #[test]
    fn test_name_mismatch_never_covered() {
        assert!(!mask(2).covers(&CertificateError::NotValidForName));
        assert!(!mask(2).covers(&CertificateError::BadSignature));
    }

    #[test]
    fn test_mask_bits() {
        let mask = IgnoreMask::REVOCATION.union(IgnoreMask::UNKNOWN_CA);
        assert!(mask.contains(IgnoreMask::REVOCATION));
        assert!(!mask.contains(IgnoreMask::DATE_INVALID));
        assert!(mask.contains(IgnoreMask::NONE));
    }

    #[test]
    fn test_client_config_builds() {
        for level in 0..=2 {
            assert!(client_config(VerifyLevel::new(level).unwrap()).is_ok());
        }
    }
}
