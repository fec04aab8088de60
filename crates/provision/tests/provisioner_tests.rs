use lote_trust_provision::loader::{LoaderConstraints, LoteLoader};
use lote_trust_provision::provisioner::{ProvisionEntry, Provisioner};
use lote_trust_provision::routed::RoutingOutcome;
use lote_trust_provision::token::JsonLoteParser;
use lote_trust_shared::context::VerificationContext;
use lote_trust_shared::supported::{service_type, SupportedLists};

mod test_utils;
use test_utils::{arc, cert, lote, service, uri, AcceptAllVerifier, InMemoryFetcher};

fn provisioner(fetcher: InMemoryFetcher) -> Provisioner {
    let loader = LoteLoader::new(
        arc(fetcher),
        arc(AcceptAllVerifier),
        arc(JsonLoteParser),
        LoaderConstraints::default(),
    );
    Provisioner::new(loader)
}

fn wua() -> VerificationContext {
    VerificationContext::WalletUnitAttestation
}

fn entry(location: &str, svc_type: &str) -> ProvisionEntry {
    ProvisionEntry::new(uri(location), uri(svc_type))
}

#[tokio::test]
async fn provisions_disjoint_routes_per_context() {
    let pid_list = lote(&[], vec![service(service_type::PID_ISSUANCE, vec![cert(1)])]);
    let wallet_list = lote(
        &[],
        vec![service(service_type::WALLET_ISSUANCE, vec![cert(2)])],
    );
    let provisioner = provisioner(
        InMemoryFetcher::new()
            .with_list("http://lists/pid", &pid_list)
            .with_list("http://lists/wallet", &wallet_list),
    );

    let outcome = provisioner
        .provision(vec![
            (
                VerificationContext::Pid,
                entry("http://lists/pid", service_type::PID_ISSUANCE),
            ),
            (
                wua(),
                entry("http://lists/wallet", service_type::WALLET_ISSUANCE),
            ),
        ])
        .await
        .unwrap()
        .expect("both contexts should survive");

    match outcome.source.get(&VerificationContext::Pid).await.unwrap() {
        RoutingOutcome::Found(anchors) => assert_eq!(anchors.head().value[0], 1),
        other => panic!("expected Found, got {other:?}"),
    }
    match outcome.source.get(&wua()).await.unwrap() {
        RoutingOutcome::Found(anchors) => assert_eq!(anchors.head().value[0], 2),
        other => panic!("expected Found, got {other:?}"),
    }
    assert!(matches!(
        outcome
            .source
            .get(&VerificationContext::WalletRelyingPartyAccessCertificate)
            .await
            .unwrap(),
        RoutingOutcome::QueryNotSupported
    ));
    assert!(outcome.direct_trust_contexts.is_empty());
}

#[tokio::test]
async fn contexts_without_anchors_are_dropped() {
    let pid_list = lote(&[], vec![service(service_type::PID_ISSUANCE, vec![cert(1)])]);
    // The wallet list exists but carries no wallet services.
    let wallet_list = lote(&[], vec![service(service_type::PID_ISSUANCE, vec![cert(9)])]);
    let provisioner = provisioner(
        InMemoryFetcher::new()
            .with_list("http://lists/pid", &pid_list)
            .with_list("http://lists/wallet", &wallet_list),
    );

    let outcome = provisioner
        .provision(vec![
            (
                VerificationContext::Pid,
                entry("http://lists/pid", service_type::PID_ISSUANCE),
            ),
            (
                wua(),
                entry("http://lists/wallet", service_type::WALLET_ISSUANCE),
            ),
        ])
        .await
        .unwrap()
        .expect("the PID context should survive");

    assert!(matches!(
        outcome.source.get(&VerificationContext::Pid).await.unwrap(),
        RoutingOutcome::Found(_)
    ));
    assert!(matches!(
        outcome.source.get(&wua()).await.unwrap(),
        RoutingOutcome::QueryNotSupported
    ));
}

#[tokio::test]
async fn contexts_whose_list_fails_to_load_are_dropped() {
    let provisioner = provisioner(InMemoryFetcher::new().with_missing("http://lists/pid"));

    let outcome = provisioner
        .provision(vec![(
            VerificationContext::Pid,
            entry("http://lists/pid", service_type::PID_ISSUANCE),
        )])
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn direct_trust_entries_are_reported() {
    let wallet_list = lote(
        &[],
        vec![service(service_type::WALLET_ISSUANCE, vec![cert(2)])],
    );
    let provisioner =
        provisioner(InMemoryFetcher::new().with_list("http://lists/wallet", &wallet_list));

    let outcome = provisioner
        .provision(vec![(
            wua(),
            entry("http://lists/wallet", service_type::WALLET_ISSUANCE).with_direct_trust(),
        )])
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.direct_trust_contexts.contains(&wua()));
}

#[tokio::test]
async fn duplicate_contexts_are_a_configuration_fault() {
    let pid_list = lote(&[], vec![service(service_type::PID_ISSUANCE, vec![cert(1)])]);
    let provisioner = provisioner(InMemoryFetcher::new().with_list("http://lists/pid", &pid_list));

    let result = provisioner
        .provision(vec![
            (
                VerificationContext::Pid,
                entry("http://lists/pid", service_type::PID_ISSUANCE),
            ),
            (
                VerificationContext::Pid,
                entry("http://lists/pid", service_type::PID_ISSUANCE),
            ),
        ])
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn eu_preset_resolves_table_service_types() {
    // The EU preset supplies the service type per context; the table only
    // adds locations.
    let eu = SupportedLists::eu();
    let pid_svc = eu.service_type_for(&VerificationContext::Pid).unwrap();
    let pid_list = lote(&[], vec![service(pid_svc.as_str(), vec![cert(5)])]);
    let provisioner = provisioner(InMemoryFetcher::new().with_list("http://lists/pid", &pid_list));

    let outcome = provisioner
        .provision(vec![(
            VerificationContext::Pid,
            ProvisionEntry::new(uri("http://lists/pid"), pid_svc),
        )])
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        outcome.source.get(&VerificationContext::Pid).await.unwrap(),
        RoutingOutcome::Found(_)
    ));
}
