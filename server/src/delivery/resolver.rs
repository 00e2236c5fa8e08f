use std::collections::HashSet;

use futures_util::future::join_all;

use crate::registry::SessionRegistry;

/// Expand target identities into the union of their live connection IDs.
///
/// Lookups run concurrently. An identity that is unknown, or whose lookup
/// failed, contributes nothing.
pub async fn resolve(registry: &SessionRegistry, targets: &[String]) -> HashSet<String> {
    let lookups = targets.iter().map(|identity| registry.lookup(identity));
    let resolved: HashSet<String> = join_all(lookups).await.into_iter().flatten().collect();

    tracing::debug!(
        targets = targets.len(),
        connections = resolved.len(),
        "Resolved delivery targets"
    );
    resolved
}
