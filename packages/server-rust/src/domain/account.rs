//! Handler for account lifecycle events from the register topic.
//!
//! | event    | profile exists           | profile missing        |
//! |----------|--------------------------|------------------------|
//! | `create` | no-op                    | create default profile |
//! | `update` | overwrite with defaults  | `ProfileNotFound`      |
//! | `delete` | remove                   | `ProfileNotFound`      |

use std::sync::Arc;

use async_trait::async_trait;
use profile_core::{AccountEvent, CodecError, CreateProfile, EventType};
use tracing::{debug, info};
use uuid::Uuid;

use super::profile::ProfileStore;
use crate::broker::MessageHandler;

pub const DEFAULT_FIRST_NAME: &str = "Иван";
pub const DEFAULT_LAST_NAME: &str = "Иванов";
const BLANK: &str = " ";

/// Fields given to a profile created or reset from an account event.
#[must_use]
pub fn default_profile(user_uuid: &str) -> CreateProfile {
    CreateProfile {
        user_uuid: user_uuid.to_string(),
        first_name: DEFAULT_FIRST_NAME.to_string(),
        last_name: DEFAULT_LAST_NAME.to_string(),
        occupation: Some(BLANK.to_string()),
        status: Some(BLANK.to_string()),
        bio: Some(BLANK.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountEventError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no profile for user {user_uuid}")]
    ProfileNotFound { user_uuid: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What an event did to the profile store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    Created(Uuid),
    AlreadyExists(Uuid),
    Updated(Uuid),
    Deleted(Uuid),
}

/// Applies [`AccountEvent`]s to a [`ProfileStore`].
pub struct AccountEventHandler {
    store: Arc<dyn ProfileStore>,
}

impl AccountEventHandler {
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Decodes a raw message body and applies it.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply); also [`AccountEventError::Codec`] for an
    /// undecodable body.
    pub async fn handle_bytes(&self, bytes: &[u8]) -> Result<AccountOutcome, AccountEventError> {
        self.apply(AccountEvent::from_bytes(bytes)?).await
    }

    /// Applies one event.
    ///
    /// # Errors
    ///
    /// Returns [`AccountEventError::ProfileNotFound`] for `update` or
    /// `delete` of an unknown user and [`AccountEventError::Store`] when the
    /// store fails.
    pub async fn apply(&self, event: AccountEvent) -> Result<AccountOutcome, AccountEventError> {
        let AccountEvent {
            event_type,
            user_uuid,
        } = event;
        let existing = self.store.get_by_user_uuid(&user_uuid).await?;

        let outcome = match (event_type, existing) {
            (EventType::Create, Some(profile)) => {
                debug!(user_uuid = %user_uuid, "profile already exists, create ignored");
                AccountOutcome::AlreadyExists(profile.uuid)
            }
            (EventType::Create, None) => {
                let profile = self.store.create(default_profile(&user_uuid)).await?;
                AccountOutcome::Created(profile.uuid)
            }
            (EventType::Update, Some(profile)) => {
                self.store
                    .update(profile.uuid, default_profile(&user_uuid))
                    .await?;
                AccountOutcome::Updated(profile.uuid)
            }
            (EventType::Delete, Some(profile)) => {
                self.store.delete(profile.uuid).await?;
                AccountOutcome::Deleted(profile.uuid)
            }
            (EventType::Update | EventType::Delete, None) => {
                return Err(AccountEventError::ProfileNotFound { user_uuid });
            }
        };

        info!(
            event = event_type.as_str(),
            user_uuid = %user_uuid,
            outcome = ?outcome,
            "account event applied"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl MessageHandler for AccountEventHandler {
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let event = AccountEvent::from_value(payload).map_err(AccountEventError::from)?;
        self.apply(event).await?;
        Ok(())
    }
}
