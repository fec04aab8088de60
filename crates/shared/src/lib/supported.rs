//! Per-role provider tables and the well-known EU service types.

use std::collections::BTreeMap;

use crate::context::VerificationContext;
use crate::uri::Uri;

/// Service type identifiers expected in the EU lists.
pub mod service_type {
    pub const PID_ISSUANCE: &str = "http://uri.etsi.org/19602/SvcType/PID/Issuance";
    pub const PID_REVOCATION: &str = "http://uri.etsi.org/19602/SvcType/PID/Revocation";
    pub const WALLET_ISSUANCE: &str = "http://uri.etsi.org/19602/SvcType/WalletSolution/Issuance";
    pub const WALLET_REVOCATION: &str =
        "http://uri.etsi.org/19602/SvcType/WalletSolution/Revocation";
    pub const WRPAC_ISSUANCE: &str = "http://uri.etsi.org/19602/SvcType/WRPAC/Issuance";
    pub const WRPRC_ISSUANCE: &str = "http://uri.etsi.org/19602/SvcType/WRPRC/Issuance";
    pub const PUB_EAA_ISSUANCE: &str = "http://uri.etsi.org/19602/SvcType/PubEAA/Issuance";
    pub const PUB_EAA_REVOCATION: &str = "http://uri.etsi.org/19602/SvcType/PubEAA/Revocation";
    pub const MDL_ISSUANCE: &str = "http://trust.ec.europa.eu/lists/mDL/SvcType/Issuance";
    pub const MDL_REVOCATION: &str = "http://trust.ec.europa.eu/lists/mDL/SvcType/Revocation";
}

fn well_known(value: &str) -> Uri {
    Uri::new(value).expect("well-known service type URIs are non-blank")
}

/// Identifies one slot of a [`SupportedLists`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderRole {
    PidProviders,
    WalletProviders,
    WrpacProviders,
    WrprcProviders,
    PubEaaProviders,
    QeaProviders,
    EaaProviders(String),
}

/// The issuance and (where the scheme publishes one) revocation service
/// types for one provider role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleServiceTypes {
    pub issuance: Uri,
    pub revocation: Option<Uri>,
}

impl RoleServiceTypes {
    pub fn new(issuance: Uri, revocation: Option<Uri>) -> Self {
        Self {
            issuance,
            revocation,
        }
    }
}

/// A record with one optional slot per well-known provider role plus a
/// use-case keyed map for sectoral EAA providers. Iteration yields the
/// populated slots in a fixed order: pid, wallet, wrpac, wrprc, pubEaa,
/// qea, then EAA use-cases in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedLists<T> {
    pub pid_providers: Option<T>,
    pub wallet_providers: Option<T>,
    pub wrpac_providers: Option<T>,
    pub wrprc_providers: Option<T>,
    pub pub_eaa_providers: Option<T>,
    pub qea_providers: Option<T>,
    pub eaa_providers: BTreeMap<String, T>,
}

impl<T> Default for SupportedLists<T> {
    fn default() -> Self {
        Self {
            pid_providers: None,
            wallet_providers: None,
            wrpac_providers: None,
            wrprc_providers: None,
            pub_eaa_providers: None,
            qea_providers: None,
            eaa_providers: BTreeMap::new(),
        }
    }
}

impl<T> SupportedLists<T> {
    pub fn iter(&self) -> impl Iterator<Item = (ProviderRole, &T)> {
        let fixed = [
            (ProviderRole::PidProviders, self.pid_providers.as_ref()),
            (ProviderRole::WalletProviders, self.wallet_providers.as_ref()),
            (ProviderRole::WrpacProviders, self.wrpac_providers.as_ref()),
            (ProviderRole::WrprcProviders, self.wrprc_providers.as_ref()),
            (ProviderRole::PubEaaProviders, self.pub_eaa_providers.as_ref()),
            (ProviderRole::QeaProviders, self.qea_providers.as_ref()),
        ];
        let eaa = self
            .eaa_providers
            .iter()
            .map(|(use_case, value)| (ProviderRole::EaaProviders(use_case.clone()), value));
        fixed
            .into_iter()
            .filter_map(|(role, value)| value.map(|v| (role, v)))
            .collect::<Vec<_>>()
            .into_iter()
            .chain(eaa)
    }

    /// Intersects the populated slots of two records and lifts `f` over
    /// the pairs. A slot populated on one side only is dropped.
    pub fn combine<U, V>(
        self,
        mut other: SupportedLists<U>,
        f: impl Fn(T, U) -> V,
    ) -> SupportedLists<V> {
        fn both<A, B, C>(a: Option<A>, b: Option<B>, f: impl FnOnce(A, B) -> C) -> Option<C> {
            match (a, b) {
                (Some(a), Some(b)) => Some(f(a, b)),
                _ => None,
            }
        }

        let eaa_providers = self
            .eaa_providers
            .into_iter()
            .filter_map(|(use_case, left)| {
                other
                    .eaa_providers
                    .remove(&use_case)
                    .map(|right| (use_case, f(left, right)))
            })
            .collect();

        SupportedLists {
            pid_providers: both(self.pid_providers, other.pid_providers, &f),
            wallet_providers: both(self.wallet_providers, other.wallet_providers, &f),
            wrpac_providers: both(self.wrpac_providers, other.wrpac_providers, &f),
            wrprc_providers: both(self.wrprc_providers, other.wrprc_providers, &f),
            pub_eaa_providers: both(self.pub_eaa_providers, other.pub_eaa_providers, &f),
            qea_providers: both(self.qea_providers, other.qea_providers, &f),
            eaa_providers,
        }
    }
}

impl SupportedLists<RoleServiceTypes> {
    /// The EU scheme's published service types. QEA providers have no
    /// service type registered yet, so their slot stays unset.
    pub fn eu() -> Self {
        let mut eaa_providers = BTreeMap::new();
        eaa_providers.insert(
            "mDL".to_owned(),
            RoleServiceTypes::new(
                well_known(service_type::MDL_ISSUANCE),
                Some(well_known(service_type::MDL_REVOCATION)),
            ),
        );
        Self {
            pid_providers: Some(RoleServiceTypes::new(
                well_known(service_type::PID_ISSUANCE),
                Some(well_known(service_type::PID_REVOCATION)),
            )),
            wallet_providers: Some(RoleServiceTypes::new(
                well_known(service_type::WALLET_ISSUANCE),
                Some(well_known(service_type::WALLET_REVOCATION)),
            )),
            wrpac_providers: Some(RoleServiceTypes::new(
                well_known(service_type::WRPAC_ISSUANCE),
                None,
            )),
            wrprc_providers: Some(RoleServiceTypes::new(
                well_known(service_type::WRPRC_ISSUANCE),
                None,
            )),
            pub_eaa_providers: Some(RoleServiceTypes::new(
                well_known(service_type::PUB_EAA_ISSUANCE),
                Some(well_known(service_type::PUB_EAA_REVOCATION)),
            )),
            qea_providers: None,
            eaa_providers,
        }
    }

    /// Resolves the service type a verification context maps to, or `None`
    /// when the record carries no list for that role.
    pub fn service_type_for(&self, context: &VerificationContext) -> Option<Uri> {
        use VerificationContext as Ctx;
        let (slot, revocation) = match context {
            Ctx::Pid => (self.pid_providers.as_ref(), false),
            Ctx::PidStatus => (self.pid_providers.as_ref(), true),
            Ctx::WalletInstanceAttestation | Ctx::WalletUnitAttestation => {
                (self.wallet_providers.as_ref(), false)
            }
            Ctx::WalletUnitAttestationStatus => (self.wallet_providers.as_ref(), true),
            Ctx::PubEaa => (self.pub_eaa_providers.as_ref(), false),
            Ctx::PubEaaStatus => (self.pub_eaa_providers.as_ref(), true),
            Ctx::Qeaa => (self.qea_providers.as_ref(), false),
            Ctx::QeaaStatus => (self.qea_providers.as_ref(), true),
            Ctx::Eaa { use_case } => (self.eaa_providers.get(use_case), false),
            Ctx::EaaStatus { use_case } => (self.eaa_providers.get(use_case), true),
            Ctx::WalletRelyingPartyAccessCertificate => (self.wrpac_providers.as_ref(), false),
            Ctx::WalletRelyingPartyRegistrationCertificate => {
                (self.wrprc_providers.as_ref(), false)
            }
            Ctx::Custom { .. } => (None, false),
        };
        let role = slot?;
        if revocation {
            role.revocation.clone()
        } else {
            Some(role.issuance.clone())
        }
    }
}
