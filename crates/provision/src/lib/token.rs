//! Compact signed tokens carrying a list payload, and the seams for
//! verifying and parsing them. Verification yields the same token string;
//! stripping the signature is the parser's job.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use lote_trust_shared::lote::TrustedEntitiesList;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedToken {
    #[error("expected 3 token segments, found {0}")]
    WrongSegmentCount(usize),
    #[error("token segment {0} is empty")]
    EmptySegment(usize),
    #[error("token segment {0} is not base64url-nopadding")]
    InvalidBase64(usize),
}

/// A compact token: three base64url-nopadding segments separated by `.`.
/// The segments are checked for shape at construction; their content stays
/// opaque until verification and parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken(String);

impl SignedToken {
    pub fn new(value: impl Into<String>) -> Result<Self, MalformedToken> {
        let value = value.into();
        let segments: Vec<&str> = value.split('.').collect();
        if segments.len() != 3 {
            return Err(MalformedToken::WrongSegmentCount(segments.len()));
        }
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(MalformedToken::EmptySegment(index));
            }
            if URL_SAFE_NO_PAD.decode(segment).is_err() {
                return Err(MalformedToken::InvalidBase64(index));
            }
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segment(&self, index: usize) -> &str {
        // Invariant: construction checked there are exactly three.
        self.0.split('.').nth(index).expect("token has three segments")
    }

    /// The bytes the signature is computed over: `header.payload`.
    pub fn signing_input(&self) -> &str {
        let end = self.segment(0).len() + 1 + self.segment(1).len();
        &self.0[..end]
    }
}

#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Verified(SignedToken),
    NotVerified { cause: Option<String> },
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &SignedToken) -> anyhow::Result<VerifyOutcome>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

/// Verifies ES256K compact tokens against a fixed scheme operator key.
pub struct EcdsaTokenVerifier {
    key: VerifyingKey,
}

impl EcdsaTokenVerifier {
    pub const ALG: &'static str = "ES256K";

    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn from_sec1_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid SEC1 verifying key: {e:#?}"))?;
        Ok(Self { key })
    }

    fn not_verified(cause: impl Into<String>) -> VerifyOutcome {
        VerifyOutcome::NotVerified {
            cause: Some(cause.into()),
        }
    }
}

#[async_trait]
impl TokenVerifier for EcdsaTokenVerifier {
    async fn verify(&self, token: &SignedToken) -> anyhow::Result<VerifyOutcome> {
        let header_bytes = match URL_SAFE_NO_PAD.decode(token.segment(0)) {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Self::not_verified(format!("Undecodable header: {e}"))),
        };
        let header: TokenHeader = match serde_json::from_slice(&header_bytes) {
            Ok(header) => header,
            Err(e) => return Ok(Self::not_verified(format!("Unparseable header: {e}"))),
        };
        if header.alg != Self::ALG {
            return Ok(Self::not_verified(format!(
                "Unsupported algorithm {}, expected {}",
                header.alg,
                Self::ALG
            )));
        }

        let signature_bytes = match URL_SAFE_NO_PAD.decode(token.segment(2)) {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Self::not_verified(format!("Undecodable signature: {e}"))),
        };
        let signature = match Signature::from_slice(&signature_bytes) {
            Ok(signature) => signature,
            Err(e) => return Ok(Self::not_verified(format!("Malformed signature: {e}"))),
        };

        match self.key.verify(token.signing_input().as_bytes(), &signature) {
            Ok(()) => Ok(VerifyOutcome::Verified(token.clone())),
            Err(e) => Ok(Self::not_verified(format!("Signature mismatch: {e}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParseOutcome<P> {
    Parsed { header: TokenHeader, payload: P },
    ParseFailed { cause: Option<String> },
}

pub struct TokenParser;

impl TokenParser {
    /// Splits the compact form, decodes header and payload, and
    /// deserialises the payload into `P`. Never panics on hostile input.
    pub fn parse<P: DeserializeOwned>(token: &SignedToken) -> ParseOutcome<P> {
        let header_bytes = match URL_SAFE_NO_PAD.decode(token.segment(0)) {
            Ok(bytes) => bytes,
            Err(e) => return Self::failed(format!("Undecodable header: {e}")),
        };
        let header: TokenHeader = match serde_json::from_slice(&header_bytes) {
            Ok(header) => header,
            Err(e) => return Self::failed(format!("Unparseable header: {e}")),
        };
        let payload_bytes = match URL_SAFE_NO_PAD.decode(token.segment(1)) {
            Ok(bytes) => bytes,
            Err(e) => return Self::failed(format!("Undecodable payload: {e}")),
        };
        let payload: P = match serde_json::from_slice(&payload_bytes) {
            Ok(payload) => payload,
            Err(e) => return Self::failed(format!("Unparseable payload: {e}")),
        };
        ParseOutcome::Parsed { header, payload }
    }

    fn failed<P>(cause: String) -> ParseOutcome<P> {
        ParseOutcome::ParseFailed { cause: Some(cause) }
    }
}

/// The parser seam the loader consumes: token in, list out.
pub trait ParseLote: Send + Sync {
    fn parse(&self, token: &SignedToken) -> ParseOutcome<TrustedEntitiesList>;
}

pub struct JsonLoteParser;

impl ParseLote for JsonLoteParser {
    fn parse(&self, token: &SignedToken) -> ParseOutcome<TrustedEntitiesList> {
        TokenParser::parse(token)
    }
}
