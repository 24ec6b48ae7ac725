//! Hard block of an actor class.

use super::actor::ActorContext;
use super::target::RestrictionTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Removes access for every actor matching `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRestriction {
    pub id: String,
    pub restriction_set_id: String,
    pub target: RestrictionTarget,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BlockRestriction {
    /// Whether this restriction blocks the actor.
    #[must_use]
    pub fn is_blocking(&self, actor: &ActorContext) -> bool {
        self.target.matches(actor)
    }

    #[must_use]
    pub fn is_user_allowed(&self, actor: &ActorContext) -> bool {
        !self.is_blocking(actor)
    }
}

/// Whether any restriction in `blocks` blocks the actor.
pub fn any_blocking<'a>(
    blocks: impl IntoIterator<Item = &'a BlockRestriction>,
    actor: &ActorContext,
) -> bool {
    blocks.into_iter().any(|block| block.is_blocking(actor))
}
