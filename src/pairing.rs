//! Pairing directory: the external account mapping from a user to their
//! linked partner. Consumed read-only; the static implementation covers
//! deployments where the account service pushes the pair list at boot.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::session::UserId;

/// Read-only view of the account pairing directory.
#[async_trait]
pub trait PairingDirectory: Send + Sync {
    /// The partner linked to `user`, if any.
    async fn partner_of(&self, user: &str) -> Option<UserId>;
}

/// Directory backed by a fixed pair list.
#[derive(Debug, Clone, Default)]
pub struct StaticPairingDirectory {
    partners: HashMap<UserId, UserId>,
}

impl StaticPairingDirectory {
    /// Builds a directory from symmetric pairs. Each entry links both
    /// directions; later pairs overwrite earlier ones for the same user.
    #[instrument(skip(pairs))]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (UserId, UserId)>) -> Self {
        let mut partners = HashMap::new();
        for (a, b) in pairs {
            partners.insert(a.clone(), b.clone());
            partners.insert(b, a);
        }
        debug!(users = partners.len(), "Pairing directory built");
        Self { partners }
    }
}

#[async_trait]
impl PairingDirectory for StaticPairingDirectory {
    async fn partner_of(&self, user: &str) -> Option<UserId> {
        self.partners.get(user).cloned()
    }
}
