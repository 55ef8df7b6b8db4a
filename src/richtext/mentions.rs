//! Mention resolution for compiled text.

use std::collections::BTreeMap;

use tracing::debug;

use super::{CompiledText, FacetFeature};
use crate::client::AtpClient;
use crate::identity::{resolve_identifier, Did, Handle, IdentityError, Identifier};

/// Fill in the DID of every unresolved mention facet.
///
/// Each distinct handle is resolved once, in order of first appearance.
/// Stops at the first failure and leaves `text` untouched in that case.
///
/// # Errors
///
/// Returns [`IdentityError::ResolutionFailed`] for the first handle that
/// cannot be resolved.
pub async fn resolve_mentions<C>(text: &mut CompiledText, client: &C) -> Result<(), IdentityError>
where
    C: AtpClient + ?Sized,
{
    let mut resolved: BTreeMap<Handle, Did> = BTreeMap::new();
    for handle in text.unresolved_mentions() {
        if resolved.contains_key(handle) {
            continue;
        }
        let identity = resolve_identifier(&Identifier::Handle(handle.clone()), client).await?;
        resolved.insert(handle.clone(), identity.into_did());
    }

    if resolved.is_empty() {
        return Ok(());
    }

    for facet in &mut text.facets {
        if let FacetFeature::Mention(mention) = &mut facet.feature {
            if mention.did.is_none() {
                mention.did = resolved.get(&mention.handle).cloned();
            }
        }
    }
    debug!(count = resolved.len(), "resolved mentions");
    Ok(())
}
