//! Projecting a loaded list tree onto the anchor material for one
//! service type.

use lote_trust_shared::lote::PkiObject;
use lote_trust_shared::nonempty::NonEmptyList;
use lote_trust_shared::uri::Uri;

use crate::collect::LoadedLote;

/// Collects, in order, every certificate of every service whose type
/// identifier equals `service_type` - main list first, then the sibling
/// lists in load order. Duplicates are kept; anchor factories downstream
/// may dedupe by encoded bytes if they care.
pub fn extract_anchors(loaded: &LoadedLote, service_type: &Uri) -> Option<NonEmptyList<PkiObject>> {
    let certificates: Vec<PkiObject> = std::iter::once(&loaded.list)
        .chain(loaded.other_lists.iter())
        .flat_map(|list| list.entities.iter())
        .flat_map(|entity| entity.services.iter())
        .filter(|service| &service.information.type_identifier == service_type)
        .flat_map(|service| service.information.digital_identity.x509_certificates.iter())
        .cloned()
        .collect();

    match NonEmptyList::from_vec(certificates) {
        Ok(anchors) => {
            tracing::debug!(
                service_type = %service_type,
                anchors = anchors.len(),
                "Extracted trust anchors"
            );
            Some(anchors)
        }
        Err(_) => {
            tracing::debug!(service_type = %service_type, "No anchors for service type");
            None
        }
    }
}
