use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

use lote_trust_provision::routed::RoutedAnchorSource;
use lote_trust_provision::source::{FixedAnchorSource, SharedAnchorSource};
use lote_trust_provision::validate::{
    ChainValidation, ChainValidator, ChainValidatorFacade, DirectTrustValidator, PkixValidator,
    TrustAnchorFactory, X509TrustAnchor, X509TrustAnchorFactory,
};
use lote_trust_shared::context::VerificationContext;
use lote_trust_shared::lote::PkiObject;
use lote_trust_shared::nonempty::NonEmptyList;

mod test_utils;
use test_utils::cert;

fn ca(common_name: &str) -> (rcgen::Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

fn issued_by(
    issuer: &rcgen::Certificate,
    issuer_key: &KeyPair,
    common_name: &str,
    is_ca: bool,
) -> (rcgen::Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    if is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }
    let cert = params.signed_by(&key, issuer, issuer_key).unwrap();
    (cert, key)
}

fn der(cert: &rcgen::Certificate) -> PkiObject {
    PkiObject::from_der(cert.der().to_vec())
}

fn anchor(object: &PkiObject) -> X509TrustAnchor {
    X509TrustAnchorFactory::new().create(object).unwrap()
}

mod direct_trust {
    use super::*;

    #[test]
    fn accepts_a_leaf_matching_an_anchor() {
        let (ca_cert, _) = ca("Direct Root");
        let object = der(&ca_cert);
        let chain = NonEmptyList::singleton(object.clone());
        let anchors = NonEmptyList::singleton(anchor(&object));

        match DirectTrustValidator.validate(&chain, &anchors) {
            ChainValidation::Trusted(matched) => assert_eq!(matched.certificate, object),
            ChainValidation::NotTrusted { cause } => panic!("not trusted: {cause}"),
        }
    }

    #[test]
    fn rejects_an_unrelated_leaf() {
        let (leaf_ca, _) = ca("Leaf Issuer");
        let (anchor_ca, _) = ca("Other Issuer");
        let chain = NonEmptyList::singleton(der(&leaf_ca));
        let anchors = NonEmptyList::singleton(anchor(&der(&anchor_ca)));

        assert!(matches!(
            DirectTrustValidator.validate(&chain, &anchors),
            ChainValidation::NotTrusted { .. }
        ));
    }

    #[test]
    fn rejects_garbage_leaves() {
        let (anchor_ca, _) = ca("Root");
        let chain = NonEmptyList::singleton(cert(1));
        let anchors = NonEmptyList::singleton(anchor(&der(&anchor_ca)));

        match DirectTrustValidator.validate(&chain, &anchors) {
            ChainValidation::NotTrusted { cause } => {
                assert!(cause.contains("not an X.509 certificate"))
            }
            ChainValidation::Trusted(_) => panic!("garbage must not be trusted"),
        }
    }
}

mod pkix {
    use super::*;

    #[test]
    fn accepts_a_leaf_signed_by_an_anchor() {
        let (ca_cert, ca_key) = ca("Root CA");
        let (leaf, _) = issued_by(&ca_cert, &ca_key, "Issuing Service", false);
        let chain = NonEmptyList::singleton(der(&leaf));
        let anchors = NonEmptyList::singleton(anchor(&der(&ca_cert)));

        match PkixValidator::new().validate(&chain, &anchors) {
            ChainValidation::Trusted(matched) => {
                assert_eq!(matched.certificate, der(&ca_cert))
            }
            ChainValidation::NotTrusted { cause } => panic!("not trusted: {cause}"),
        }
    }

    #[test]
    fn accepts_a_chain_through_an_intermediate() {
        let (root, root_key) = ca("Root CA");
        let (intermediate, intermediate_key) = issued_by(&root, &root_key, "Intermediate CA", true);
        let (leaf, _) = issued_by(&intermediate, &intermediate_key, "Issuing Service", false);

        let chain = NonEmptyList::new(der(&leaf), vec![der(&intermediate)]);
        let anchors = NonEmptyList::singleton(anchor(&der(&root)));

        assert!(matches!(
            PkixValidator::new().validate(&chain, &anchors),
            ChainValidation::Trusted(_)
        ));
    }

    #[test]
    fn accepts_a_chain_terminating_in_the_anchor_itself() {
        let (root, _) = ca("Root CA");
        let chain = NonEmptyList::singleton(der(&root));
        let anchors = NonEmptyList::singleton(anchor(&der(&root)));

        assert!(matches!(
            PkixValidator::new().validate(&chain, &anchors),
            ChainValidation::Trusted(_)
        ));
    }

    #[test]
    fn rejects_a_chain_to_an_unknown_anchor() {
        let (ca_cert, ca_key) = ca("Root CA");
        let (other, _) = ca("Unrelated CA");
        let (leaf, _) = issued_by(&ca_cert, &ca_key, "Issuing Service", false);

        let chain = NonEmptyList::singleton(der(&leaf));
        let anchors = NonEmptyList::singleton(anchor(&der(&other)));

        match PkixValidator::new().validate(&chain, &anchors) {
            ChainValidation::NotTrusted { cause } => {
                assert!(cause.contains("No trust anchor"))
            }
            ChainValidation::Trusted(_) => panic!("unknown anchor must not be trusted"),
        }
    }

    #[test]
    fn rejects_a_broken_issuer_link() {
        let (ca_one, ca_one_key) = ca("CA One");
        let (ca_two, _) = ca("CA Two");
        let (leaf, _) = issued_by(&ca_one, &ca_one_key, "Issuing Service", false);

        let chain = NonEmptyList::new(der(&leaf), vec![der(&ca_two)]);
        let anchors = NonEmptyList::singleton(anchor(&der(&ca_two)));

        match PkixValidator::new().validate(&chain, &anchors) {
            ChainValidation::NotTrusted { cause } => assert!(cause.contains("Chain breaks")),
            ChainValidation::Trusted(_) => panic!("broken link must not be trusted"),
        }
    }

    #[test]
    fn honours_the_validation_date_override() {
        let (mut_ca_cert, ca_key) = {
            let key = KeyPair::generate().unwrap();
            let mut params = CertificateParams::new(Vec::new()).unwrap();
            params.distinguished_name.push(DnType::CommonName, "Expired CA");
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.not_before = rcgen::date_time_ymd(2020, 1, 1);
            params.not_after = rcgen::date_time_ymd(2021, 1, 1);
            (params.self_signed(&key).unwrap(), key)
        };
        let leaf = {
            let key = KeyPair::generate().unwrap();
            let mut params = CertificateParams::new(Vec::new()).unwrap();
            params.distinguished_name.push(DnType::CommonName, "Expired Service");
            params.not_before = rcgen::date_time_ymd(2020, 1, 1);
            params.not_after = rcgen::date_time_ymd(2021, 1, 1);
            params.signed_by(&key, &mut_ca_cert, &ca_key).unwrap()
        };

        let chain = NonEmptyList::singleton(der(&leaf));
        let anchors = NonEmptyList::singleton(anchor(&der(&mut_ca_cert)));

        let within = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            PkixValidator::new()
                .with_validation_time(within)
                .validate(&chain, &anchors),
            ChainValidation::Trusted(_)
        ));

        match PkixValidator::new().validate(&chain, &anchors) {
            ChainValidation::NotTrusted { cause } => {
                assert!(cause.contains("validity window"))
            }
            ChainValidation::Trusted(_) => panic!("expired chain must not be trusted"),
        }
    }

    #[test]
    fn factory_rejects_non_certificates() {
        assert!(X509TrustAnchorFactory::new().create(&cert(1)).is_err());
    }
}

mod facade {
    use super::*;

    struct PassthroughFactory;

    impl TrustAnchorFactory<PkiObject> for PassthroughFactory {
        fn create(&self, object: &PkiObject) -> anyhow::Result<PkiObject> {
            Ok(object.clone())
        }
    }

    /// Trusts a chain iff the anchor set contains the marker anchor.
    struct MarkerValidator {
        marker: PkiObject,
    }

    impl ChainValidator<PkiObject, PkiObject> for MarkerValidator {
        fn validate(
            &self,
            _chain: &NonEmptyList<PkiObject>,
            anchors: &NonEmptyList<PkiObject>,
        ) -> ChainValidation<PkiObject> {
            if anchors.contains(&self.marker) {
                ChainValidation::Trusted(self.marker.clone())
            } else {
                ChainValidation::NotTrusted {
                    cause: "marker anchor missing".to_owned(),
                }
            }
        }
    }

    fn routed(byte: u8) -> RoutedAnchorSource<VerificationContext, PkiObject> {
        let source: SharedAnchorSource<VerificationContext, PkiObject> =
            Arc::new(FixedAnchorSource::new(NonEmptyList::singleton(cert(byte))));
        RoutedAnchorSource::single([VerificationContext::Pid], source).unwrap()
    }

    fn facade(
        source: RoutedAnchorSource<VerificationContext, PkiObject>,
        marker: u8,
    ) -> ChainValidatorFacade<VerificationContext, PkiObject, PkiObject> {
        ChainValidatorFacade::new(
            source,
            Arc::new(PassthroughFactory),
            Arc::new(MarkerValidator { marker: cert(marker) }),
        )
    }

    fn chain() -> NonEmptyList<PkiObject> {
        NonEmptyList::singleton(cert(0))
    }

    #[tokio::test]
    async fn unsupported_context_yields_none() {
        let facade = facade(routed(1), 1);
        let verdict = facade
            .validate(&chain(), &VerificationContext::Qeaa)
            .await
            .unwrap();
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn owned_context_without_anchors_yields_none() {
        struct EmptySource;

        #[async_trait::async_trait]
        impl lote_trust_provision::source::TrustAnchorSource<VerificationContext, PkiObject>
            for EmptySource
        {
            async fn get(
                &self,
                _query: &VerificationContext,
            ) -> anyhow::Result<Option<NonEmptyList<PkiObject>>> {
                Ok(None)
            }
        }

        let empty: SharedAnchorSource<VerificationContext, PkiObject> = Arc::new(EmptySource);
        let source = RoutedAnchorSource::single([VerificationContext::Pid], empty).unwrap();
        let facade = facade(source, 1);
        let verdict = facade
            .validate(&chain(), &VerificationContext::Pid)
            .await
            .unwrap();
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn trusted_verdict_passes_through() {
        let facade = facade(routed(1), 1);
        match facade
            .validate(&chain(), &VerificationContext::Pid)
            .await
            .unwrap()
        {
            Some(ChainValidation::Trusted(matched)) => assert_eq!(matched, cert(1)),
            other => panic!("expected Trusted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_trusted_verdict_passes_through_without_recovery() {
        let facade = facade(routed(2), 1);
        match facade
            .validate(&chain(), &VerificationContext::Pid)
            .await
            .unwrap()
        {
            Some(ChainValidation::NotTrusted { cause }) => {
                assert!(cause.contains("marker anchor missing"))
            }
            other => panic!("expected NotTrusted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovery_source_rescues_a_not_trusted_verdict() {
        let facade = facade(routed(2), 1).with_recovery(|_cause| Some(routed(1)));
        match facade
            .validate(&chain(), &VerificationContext::Pid)
            .await
            .unwrap()
        {
            Some(ChainValidation::Trusted(matched)) => assert_eq!(matched, cert(1)),
            other => panic!("expected Trusted after recovery, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn declined_recovery_returns_the_original_verdict() {
        let facade = facade(routed(2), 1).with_recovery(|_cause| None);
        assert!(matches!(
            facade
                .validate(&chain(), &VerificationContext::Pid)
                .await
                .unwrap(),
            Some(ChainValidation::NotTrusted { .. })
        ));
    }

    #[tokio::test]
    async fn failed_recovery_returns_the_original_verdict() {
        // Recovery source still lacks the marker anchor.
        let facade = facade(routed(2), 1).with_recovery(|_cause| Some(routed(3)));
        assert!(matches!(
            facade
                .validate(&chain(), &VerificationContext::Pid)
                .await
                .unwrap(),
            Some(ChainValidation::NotTrusted { .. })
        ));
    }
}
