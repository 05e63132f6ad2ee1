/// Roster loading: the addressable user list from the REST collaborator.
/// Runs once at client start and is independent of the live channel.
use crate::api::Backend;
use crate::error::Result;
use crate::types::Peer;
use tracing::debug;

/// Fetch the user list, preserving server order and excluding the local user.
pub async fn load_roster<B: Backend>(backend: &B, local_user: &str) -> Result<Vec<Peer>> {
    let users = backend.fetch_users().await?;
    let roster: Vec<Peer> = users.into_iter().filter(|u| u.id != local_user).collect();
    debug!("Roster loaded: {} peers", roster.len());
    Ok(roster)
}
