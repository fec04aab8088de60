#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};

use lote_trust_provision::collect::Clock;
use lote_trust_provision::fetch::{Fetch, FetchOutcome};
use lote_trust_provision::token::{SignedToken, TokenVerifier, VerifyOutcome};
use lote_trust_shared::lote::{
    DigitalIdentity, OtherLotePointer, PkiObject, SchemeInformation, ServiceInformation,
    TrustedEntitiesList, TrustedEntity, TrustedEntityService,
};
use lote_trust_shared::uri::Uri;

pub const SVC_TYPE: &str = "http://uri.etsi.org/19602/SvcType/PID/Issuance";

pub fn uri(value: &str) -> Uri {
    Uri::new(value).unwrap()
}

pub fn cert(byte: u8) -> PkiObject {
    PkiObject::from_der(vec![byte; 16])
}

pub fn service(type_identifier: &str, certificates: Vec<PkiObject>) -> TrustedEntityService {
    TrustedEntityService::new(ServiceInformation::new(
        uri(type_identifier),
        Vec::new(),
        DigitalIdentity::new(certificates),
    ))
}

/// A list with one entity per service and a pointer per location.
pub fn lote(pointers: &[&str], services: Vec<TrustedEntityService>) -> TrustedEntitiesList {
    let entities = services
        .into_iter()
        .map(|svc| TrustedEntity::new(Vec::new(), vec![svc]))
        .collect();
    let pointers = pointers
        .iter()
        .map(|location| OtherLotePointer::new(uri(location)))
        .collect();
    TrustedEntitiesList::new(SchemeInformation::new(None, Vec::new(), pointers), entities)
}

/// Wraps a list payload into an unsigned-but-well-formed compact token.
pub fn token_for(list: &TrustedEntitiesList) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"ES256K"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(list).unwrap());
    let signature = URL_SAFE_NO_PAD.encode("test-signature");
    format!("{header}.{payload}.{signature}")
}

/// What the in-memory fetcher serves for one URI.
#[derive(Clone)]
pub enum Served {
    Token(String),
    Missing,
    Failure,
}

pub struct InMemoryFetcher {
    responses: HashMap<Uri, Served>,
    pub calls: AtomicU32,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_list(mut self, location: &str, list: &TrustedEntitiesList) -> Self {
        self.responses.insert(uri(location), Served::Token(token_for(list)));
        self
    }

    pub fn with_raw(mut self, location: &str, body: &str) -> Self {
        self.responses.insert(uri(location), Served::Token(body.to_owned()));
        self
    }

    pub fn with_missing(mut self, location: &str) -> Self {
        self.responses.insert(uri(location), Served::Missing);
        self
    }

    pub fn with_failure(mut self, location: &str) -> Self {
        self.responses.insert(uri(location), Served::Failure);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for InMemoryFetcher {
    async fn fetch(&self, location: &Uri) -> anyhow::Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(location) {
            Some(Served::Token(body)) => Ok(FetchOutcome::Loaded(body.clone())),
            Some(Served::Failure) => Err(anyhow::anyhow!("backend exploded for {location}")),
            Some(Served::Missing) | None => Ok(FetchOutcome::NotFound {
                cause: Some(format!("nothing served at {location}")),
            }),
        }
    }
}

/// Accepts every well-formed token; signature checking is covered by the
/// verifier's own tests.
pub struct AcceptAllVerifier;

#[async_trait]
impl TokenVerifier for AcceptAllVerifier {
    async fn verify(&self, token: &SignedToken) -> anyhow::Result<VerifyOutcome> {
        Ok(VerifyOutcome::Verified(token.clone()))
    }
}

pub struct RejectAllVerifier;

#[async_trait]
impl TokenVerifier for RejectAllVerifier {
    async fn verify(&self, _token: &SignedToken) -> anyhow::Result<VerifyOutcome> {
        Ok(VerifyOutcome::NotVerified {
            cause: Some("rejected by test verifier".to_owned()),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0, 0).unwrap()
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
