//! Verification contexts and the attestation classifier.
//!
//! A verification context names the credential role a certificate chain is
//! being validated for. The classifier maps attestation identifiers (mdoc
//! doctypes, SD-JWT VC `vct` values) onto the contexts they belong to.

use std::fmt;

use crate::nonempty::NonEmptyList;

/// The credential role a chain purports to serve. Closed sum; equality is
/// structural, so `Eaa { use_case: "mDL" }` and `Eaa { use_case: "eHIC" }`
/// route independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VerificationContext {
    Pid,
    PidStatus,
    WalletInstanceAttestation,
    WalletUnitAttestation,
    WalletUnitAttestationStatus,
    PubEaa,
    PubEaaStatus,
    Qeaa,
    QeaaStatus,
    Eaa { use_case: String },
    EaaStatus { use_case: String },
    WalletRelyingPartyRegistrationCertificate,
    WalletRelyingPartyAccessCertificate,
    Custom { use_case: String },
}

impl fmt::Display for VerificationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid => write!(f, "PID"),
            Self::PidStatus => write!(f, "PIDStatus"),
            Self::WalletInstanceAttestation => write!(f, "WalletInstanceAttestation"),
            Self::WalletUnitAttestation => write!(f, "WalletUnitAttestation"),
            Self::WalletUnitAttestationStatus => write!(f, "WalletUnitAttestationStatus"),
            Self::PubEaa => write!(f, "PubEAA"),
            Self::PubEaaStatus => write!(f, "PubEAAStatus"),
            Self::Qeaa => write!(f, "QEAA"),
            Self::QeaaStatus => write!(f, "QEAAStatus"),
            Self::Eaa { use_case } => write!(f, "EAA({use_case})"),
            Self::EaaStatus { use_case } => write!(f, "EAAStatus({use_case})"),
            Self::WalletRelyingPartyRegistrationCertificate => write!(f, "WRPRC"),
            Self::WalletRelyingPartyAccessCertificate => write!(f, "WRPAC"),
            Self::Custom { use_case } => write!(f, "Custom({use_case})"),
        }
    }
}

struct ClassificationRule {
    identifier: String,
    contexts: NonEmptyList<VerificationContext>,
}

/// Maps attestation identifiers to verification contexts. Identifiers are
/// matched byte-wise; unknown identifiers classify to nothing.
pub struct AttestationClassifier {
    rules: Vec<ClassificationRule>,
}

impl AttestationClassifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The well-known EUDI identifiers: PID in both encodings, mDL, the
    /// wallet attestations, and the relying-party certificates.
    pub fn eudi() -> Self {
        Self::new()
            .with_rule("eu.europa.ec.eudi.pid.1", NonEmptyList::singleton(VerificationContext::Pid))
            .with_rule("urn:eudi:pid:1", NonEmptyList::singleton(VerificationContext::Pid))
            .with_rule(
                "org.iso.18013.5.1.mDL",
                NonEmptyList::singleton(VerificationContext::Eaa {
                    use_case: "mDL".to_owned(),
                }),
            )
            .with_rule(
                "eu.europa.ec.eudi.wia.1",
                NonEmptyList::singleton(VerificationContext::WalletInstanceAttestation),
            )
            .with_rule(
                "eu.europa.ec.eudi.wua.1",
                NonEmptyList::singleton(VerificationContext::WalletUnitAttestation),
            )
            .with_rule(
                "eu.europa.ec.eudi.wrpac.1",
                NonEmptyList::singleton(VerificationContext::WalletRelyingPartyAccessCertificate),
            )
            .with_rule(
                "eu.europa.ec.eudi.wrprc.1",
                NonEmptyList::singleton(
                    VerificationContext::WalletRelyingPartyRegistrationCertificate,
                ),
            )
    }

    pub fn with_rule(
        mut self,
        identifier: impl Into<String>,
        contexts: NonEmptyList<VerificationContext>,
    ) -> Self {
        self.rules.push(ClassificationRule {
            identifier: identifier.into(),
            contexts,
        });
        self
    }

    /// Returns the contexts the identifier belongs to, first matching rule
    /// wins.
    pub fn classify(&self, identifier: &str) -> Option<&NonEmptyList<VerificationContext>> {
        self.rules
            .iter()
            .find(|rule| rule.identifier == identifier)
            .map(|rule| &rule.contexts)
    }
}

impl Default for AttestationClassifier {
    fn default() -> Self {
        Self::eudi()
    }
}
