//! Value objects for a List of Trusted Entities (LoTE) following the
//! ETSI TS 119 612 / 119 602 JSON profile.
//!
//! Deserialization goes through raw forms so that the construction
//! invariants hold for every value that exists: a list attribute that is
//! present is non-empty, and human-readable strings pass the hygiene
//! checks in [`crate::multilang`]. All types are immutable after
//! construction.

use serde::{Deserialize, Serialize};

use crate::multilang::{MalformedText, MultiLangString};
use crate::uri::{InvalidUri, Uri};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoteConstructionError {
    #[error("list attribute `{0}` is present but empty")]
    EmptyListAttribute(&'static str),
    #[error(transparent)]
    MalformedText(#[from] MalformedText),
    #[error(transparent)]
    InvalidUri(#[from] InvalidUri),
}

fn present_non_empty<T>(
    field: &'static str,
    value: Option<Vec<T>>,
) -> Result<Vec<T>, LoteConstructionError> {
    match value {
        None => Ok(Vec::new()),
        Some(items) if items.is_empty() => Err(LoteConstructionError::EmptyListAttribute(field)),
        Some(items) => Ok(items),
    }
}

/// A certificate or other PKI material carried in a digital identity.
/// `value` holds the raw encoded bytes; two objects are the same anchor
/// material iff their encoded bytes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiObject {
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Uri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_reference: Option<String>,
}

impl PkiObject {
    pub fn from_der(value: Vec<u8>) -> Self {
        Self {
            value,
            encoding: None,
            spec_reference: None,
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDigitalIdentity")]
pub struct DigitalIdentity {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub x509_certificates: Vec<PkiObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDigitalIdentity {
    #[serde(default)]
    x509_certificates: Option<Vec<PkiObject>>,
}

impl DigitalIdentity {
    pub fn new(x509_certificates: Vec<PkiObject>) -> Self {
        Self { x509_certificates }
    }
}

impl TryFrom<RawDigitalIdentity> for DigitalIdentity {
    type Error = LoteConstructionError;

    fn try_from(raw: RawDigitalIdentity) -> Result<Self, Self::Error> {
        Ok(Self {
            x509_certificates: present_non_empty("x509Certificates", raw.x509_certificates)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawServiceInformation")]
pub struct ServiceInformation {
    pub type_identifier: Uri,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_name: Vec<MultiLangString>,
    pub digital_identity: DigitalIdentity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServiceInformation {
    type_identifier: Uri,
    #[serde(default)]
    service_name: Option<Vec<MultiLangString>>,
    digital_identity: DigitalIdentity,
}

impl ServiceInformation {
    pub fn new(
        type_identifier: Uri,
        service_name: Vec<MultiLangString>,
        digital_identity: DigitalIdentity,
    ) -> Self {
        Self {
            type_identifier,
            service_name,
            digital_identity,
        }
    }
}

impl TryFrom<RawServiceInformation> for ServiceInformation {
    type Error = LoteConstructionError;

    fn try_from(raw: RawServiceInformation) -> Result<Self, Self::Error> {
        Ok(Self {
            type_identifier: raw.type_identifier,
            service_name: present_non_empty("serviceName", raw.service_name)?,
            digital_identity: raw.digital_identity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedEntityService {
    pub information: ServiceInformation,
}

impl TrustedEntityService {
    pub fn new(information: ServiceInformation) -> Self {
        Self { information }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTrustedEntity")]
pub struct TrustedEntity {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<MultiLangString>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<TrustedEntityService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrustedEntity {
    #[serde(default)]
    name: Option<Vec<MultiLangString>>,
    #[serde(default)]
    services: Option<Vec<TrustedEntityService>>,
}

impl TrustedEntity {
    pub fn new(name: Vec<MultiLangString>, services: Vec<TrustedEntityService>) -> Self {
        Self { name, services }
    }
}

impl TryFrom<RawTrustedEntity> for TrustedEntity {
    type Error = LoteConstructionError;

    fn try_from(raw: RawTrustedEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            name: present_non_empty("name", raw.name)?,
            services: present_non_empty("services", raw.services)?,
        })
    }
}

/// A reference from one list to a sibling list published elsewhere.
/// Only `location` drives traversal; the identities and qualifiers are
/// carried through for callers that inspect them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawOtherLotePointer")]
pub struct OtherLotePointer {
    pub location: Uri,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service_digital_identities: Vec<DigitalIdentity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<Uri>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOtherLotePointer {
    location: Uri,
    #[serde(default)]
    service_digital_identities: Option<Vec<DigitalIdentity>>,
    #[serde(default)]
    qualifiers: Option<Vec<Uri>>,
}

impl OtherLotePointer {
    pub fn new(location: Uri) -> Self {
        Self {
            location,
            service_digital_identities: Vec::new(),
            qualifiers: Vec::new(),
        }
    }
}

impl TryFrom<RawOtherLotePointer> for OtherLotePointer {
    type Error = LoteConstructionError;

    fn try_from(raw: RawOtherLotePointer) -> Result<Self, Self::Error> {
        Ok(Self {
            location: raw.location,
            service_digital_identities: present_non_empty(
                "serviceDigitalIdentities",
                raw.service_digital_identities,
            )?,
            qualifiers: present_non_empty("qualifiers", raw.qualifiers)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSchemeInformation")]
pub struct SchemeInformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme_territory: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scheme_operator_name: Vec<MultiLangString>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pointers_to_other_lists: Vec<OtherLotePointer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchemeInformation {
    #[serde(default)]
    scheme_territory: Option<String>,
    #[serde(default)]
    scheme_operator_name: Option<Vec<MultiLangString>>,
    #[serde(default)]
    pointers_to_other_lists: Option<Vec<OtherLotePointer>>,
}

impl SchemeInformation {
    pub fn new(
        scheme_territory: Option<String>,
        scheme_operator_name: Vec<MultiLangString>,
        pointers_to_other_lists: Vec<OtherLotePointer>,
    ) -> Self {
        Self {
            scheme_territory,
            scheme_operator_name,
            pointers_to_other_lists,
        }
    }
}

impl TryFrom<RawSchemeInformation> for SchemeInformation {
    type Error = LoteConstructionError;

    fn try_from(raw: RawSchemeInformation) -> Result<Self, Self::Error> {
        Ok(Self {
            scheme_territory: raw.scheme_territory,
            scheme_operator_name: present_non_empty("schemeOperatorName", raw.scheme_operator_name)?,
            pointers_to_other_lists: present_non_empty(
                "pointersToOtherLists",
                raw.pointers_to_other_lists,
            )?,
        })
    }
}

/// A complete List of Trusted Entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTrustedEntitiesList")]
pub struct TrustedEntitiesList {
    pub scheme_information: SchemeInformation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<TrustedEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrustedEntitiesList {
    scheme_information: SchemeInformation,
    #[serde(default)]
    entities: Option<Vec<TrustedEntity>>,
}

impl TrustedEntitiesList {
    pub fn new(scheme_information: SchemeInformation, entities: Vec<TrustedEntity>) -> Self {
        Self {
            scheme_information,
            entities,
        }
    }

    pub fn pointers(&self) -> &[OtherLotePointer] {
        &self.scheme_information.pointers_to_other_lists
    }
}

impl TryFrom<RawTrustedEntitiesList> for TrustedEntitiesList {
    type Error = LoteConstructionError;

    fn try_from(raw: RawTrustedEntitiesList) -> Result<Self, Self::Error> {
        Ok(Self {
            scheme_information: raw.scheme_information,
            entities: present_non_empty("entities", raw.entities)?,
        })
    }
}
