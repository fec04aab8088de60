//! Chain validation against anchors resolved for a verification context.

use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use x509_parser::prelude::{parse_x509_certificate, ASN1Time, X509Certificate};

use lote_trust_shared::lote::PkiObject;
use lote_trust_shared::nonempty::NonEmptyList;

use crate::routed::{RoutedAnchorSource, RoutingOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainValidation<A> {
    Trusted(A),
    NotTrusted { cause: String },
}

/// Validates a presented chain against an anchor set. Implementations
/// never see an empty anchor set - that case is handled once, at the
/// source boundary.
pub trait ChainValidator<C, A>: Send + Sync {
    fn validate(&self, chain: &NonEmptyList<C>, anchors: &NonEmptyList<A>) -> ChainValidation<A>;
}

/// Turns the raw PKI material from a list into whatever anchor type the
/// chain validator consumes.
pub trait TrustAnchorFactory<A>: Send + Sync {
    fn create(&self, object: &PkiObject) -> anyhow::Result<A>;
}

/// An anchor certificate plus optional DER-encoded name constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509TrustAnchor {
    pub certificate: PkiObject,
    pub name_constraints: Option<Vec<u8>>,
}

pub struct X509TrustAnchorFactory {
    name_constraints: Option<Vec<u8>>,
}

impl X509TrustAnchorFactory {
    pub fn new() -> Self {
        Self {
            name_constraints: None,
        }
    }

    pub fn with_name_constraints(name_constraints: Vec<u8>) -> Self {
        Self {
            name_constraints: Some(name_constraints),
        }
    }
}

impl Default for X509TrustAnchorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustAnchorFactory<X509TrustAnchor> for X509TrustAnchorFactory {
    fn create(&self, object: &PkiObject) -> anyhow::Result<X509TrustAnchor> {
        parse_x509_certificate(&object.value)
            .map_err(|e| anyhow::anyhow!("Anchor material is not an X.509 certificate: {e}"))?;
        Ok(X509TrustAnchor {
            certificate: object.clone(),
            name_constraints: self.name_constraints.clone(),
        })
    }
}

fn not_trusted<A>(cause: impl Into<String>) -> ChainValidation<A> {
    ChainValidation::NotTrusted {
        cause: cause.into(),
    }
}

/// Succeeds iff the chain's leaf matches one of the anchors by subject
/// and serial number. No path building.
pub struct DirectTrustValidator;

impl ChainValidator<PkiObject, X509TrustAnchor> for DirectTrustValidator {
    fn validate(
        &self,
        chain: &NonEmptyList<PkiObject>,
        anchors: &NonEmptyList<X509TrustAnchor>,
    ) -> ChainValidation<X509TrustAnchor> {
        let leaf = chain.head();
        let leaf_cert = match parse_x509_certificate(&leaf.value) {
            Ok((_, cert)) => cert,
            Err(e) => return not_trusted(format!("Leaf is not an X.509 certificate: {e}")),
        };

        for anchor in anchors {
            let Ok((_, anchor_cert)) = parse_x509_certificate(&anchor.certificate.value) else {
                continue;
            };
            if anchor_cert.subject().as_raw() == leaf_cert.subject().as_raw()
                && anchor_cert.raw_serial() == leaf_cert.raw_serial()
            {
                tracing::debug!("Leaf matches anchor {} directly", anchor_cert.subject());
                return ChainValidation::Trusted(anchor.clone());
            }
        }
        not_trusted("Leaf matches no anchor by subject and serial number")
    }
}

/// Path validation: validity windows at the validation date, issuer links
/// and signatures along the chain, termination in one of the anchors.
pub struct PkixValidator {
    check_revocation: bool,
    validation_time: Option<DateTime<Utc>>,
}

impl PkixValidator {
    pub fn new() -> Self {
        Self {
            check_revocation: false,
            validation_time: None,
        }
    }

    pub fn with_revocation(mut self, check_revocation: bool) -> Self {
        self.check_revocation = check_revocation;
        self
    }

    /// Overrides the validation date; defaults to now.
    pub fn with_validation_time(mut self, at: DateTime<Utc>) -> Self {
        self.validation_time = Some(at);
        self
    }

    fn terminates_at<'a>(
        &self,
        last: &X509Certificate<'a>,
        last_bytes: &[u8],
        anchor: &X509TrustAnchor,
    ) -> bool {
        if anchor.certificate.value == last_bytes {
            return true;
        }
        let Ok((_, anchor_cert)) = parse_x509_certificate(&anchor.certificate.value) else {
            return false;
        };
        anchor_cert.subject().as_raw() == last.issuer().as_raw()
            && last.verify_signature(Some(anchor_cert.public_key())).is_ok()
    }
}

impl Default for PkixValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainValidator<PkiObject, X509TrustAnchor> for PkixValidator {
    fn validate(
        &self,
        chain: &NonEmptyList<PkiObject>,
        anchors: &NonEmptyList<X509TrustAnchor>,
    ) -> ChainValidation<X509TrustAnchor> {
        let mut certs: Vec<X509Certificate<'_>> = Vec::with_capacity(chain.len());
        for object in chain {
            match parse_x509_certificate(&object.value) {
                Ok((_, cert)) => certs.push(cert),
                Err(e) => return not_trusted(format!("Chain element is not an X.509 certificate: {e}")),
            }
        }

        let at = self.validation_time.unwrap_or_else(Utc::now);
        let validation_time = match ASN1Time::from_timestamp(at.timestamp()) {
            Ok(time) => time,
            Err(e) => return not_trusted(format!("Validation date out of range: {e}")),
        };
        for cert in &certs {
            if !cert.validity().is_valid_at(validation_time) {
                return not_trusted(format!(
                    "Certificate {} is outside its validity window at {at}",
                    cert.subject()
                ));
            }
        }

        for pair in certs.windows(2) {
            let (child, issuer) = (&pair[0], &pair[1]);
            if child.issuer().as_raw() != issuer.subject().as_raw() {
                return not_trusted(format!(
                    "Chain breaks between {} and {}",
                    child.subject(),
                    issuer.subject()
                ));
            }
            if let Err(e) = child.verify_signature(Some(issuer.public_key())) {
                return not_trusted(format!(
                    "Signature of {} does not verify under {}: {e}",
                    child.subject(),
                    issuer.subject()
                ));
            }
        }

        if self.check_revocation {
            // TODO: resolve CRL distribution points here once Fetch grows
            // a binary response path.
            tracing::debug!("Revocation checking requested; CRL retrieval is not wired yet");
        }

        let last = certs.last().expect("chain is non-empty");
        let last_bytes = &chain.as_slice()[chain.len() - 1].value;
        for anchor in anchors {
            if self.terminates_at(last, last_bytes, anchor) {
                return ChainValidation::Trusted(anchor.clone());
            }
        }
        not_trusted("No trust anchor terminates the chain")
    }
}

type RecoverFn<Q> = Arc<dyn Fn(&str) -> Option<RoutedAnchorSource<Q, PkiObject>> + Send + Sync>;

/// Binds a routed anchor source to a chain validator. `validate` answers
/// `None` when no anchors are provisioned for the context, otherwise it
/// passes the validator's verdict through, with an optional one-shot
/// recovery attempt on `NotTrusted`.
pub struct ChainValidatorFacade<Q, C, A> {
    source: RoutedAnchorSource<Q, PkiObject>,
    factory: Arc<dyn TrustAnchorFactory<A>>,
    validator: Arc<dyn ChainValidator<C, A>>,
    recover: Option<RecoverFn<Q>>,
}

impl<Q, C, A> ChainValidatorFacade<Q, C, A>
where
    Q: Clone + Eq + Hash + Send + Sync + 'static,
    C: Send + Sync,
    A: Send + Sync,
{
    pub fn new(
        source: RoutedAnchorSource<Q, PkiObject>,
        factory: Arc<dyn TrustAnchorFactory<A>>,
        validator: Arc<dyn ChainValidator<C, A>>,
    ) -> Self {
        Self {
            source,
            factory,
            validator,
            recover: None,
        }
    }

    /// On `NotTrusted`, `recover` may provide an alternative routed
    /// source; validation is retried once against it and the source is
    /// closed afterwards.
    pub fn with_recovery(
        mut self,
        recover: impl Fn(&str) -> Option<RoutedAnchorSource<Q, PkiObject>> + Send + Sync + 'static,
    ) -> Self {
        self.recover = Some(Arc::new(recover));
        self
    }

    pub async fn validate(
        &self,
        chain: &NonEmptyList<C>,
        context: &Q,
    ) -> anyhow::Result<Option<ChainValidation<A>>> {
        let outcome = match self.source.get(context).await? {
            RoutingOutcome::QueryNotSupported => {
                tracing::debug!("No route for the verification context");
                return Ok(None);
            }
            RoutingOutcome::NotFound => {
                tracing::debug!("Route exists but no anchors are provisioned");
                return Ok(None);
            }
            RoutingOutcome::Found(objects) => self.run_validator(chain, objects)?,
        };

        let cause = match &outcome {
            ChainValidation::Trusted(_) => return Ok(Some(outcome)),
            ChainValidation::NotTrusted { cause } => cause.clone(),
        };
        let Some(recover) = &self.recover else {
            return Ok(Some(outcome));
        };
        let Some(alternative) = recover(&cause) else {
            return Ok(Some(outcome));
        };

        tracing::info!("Chain not trusted, retrying against recovery source");
        let retry = match alternative.get(context).await {
            Ok(RoutingOutcome::Found(objects)) => self.run_validator(chain, objects).map(Some),
            Ok(_) => Ok(None),
            Err(error) => Err(error),
        };
        alternative.close().await;
        Ok(Some(retry?.unwrap_or(outcome)))
    }

    fn run_validator(
        &self,
        chain: &NonEmptyList<C>,
        objects: NonEmptyList<PkiObject>,
    ) -> anyhow::Result<ChainValidation<A>> {
        let mut anchors = Vec::with_capacity(objects.len());
        for object in &objects {
            anchors.push(self.factory.create(object)?);
        }
        // The factory maps each object to exactly one anchor, so the
        // non-emptiness of `objects` carries over.
        let anchors = NonEmptyList::from_vec(anchors).expect("anchor set stays non-empty");
        Ok(self.validator.validate(chain, &anchors))
    }
}
