use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields supplied when creating or overwriting a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProfile {
    pub user_uuid: String,
    pub first_name: String,
    pub last_name: String,
    pub occupation: Option<String>,
    pub status: Option<String>,
    pub bio: Option<String>,
}

/// A stored user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Primary key.
    pub uuid: Uuid,
    /// Owning account, unique across profiles.
    pub user_uuid: String,
    pub first_name: String,
    pub last_name: String,
    pub occupation: Option<String>,
    pub status: Option<String>,
    pub bio: Option<String>,
    /// Identifier of the profile photo in the file store, if any.
    pub file_uuid: Option<String>,
}

impl Profile {
    /// Builds a new profile with a fresh primary key.
    #[must_use]
    pub fn from_create(cmd: CreateProfile) -> Self {
        Self::with_uuid(Uuid::new_v4(), cmd)
    }

    /// Builds a profile with the given primary key, e.g. when overwriting.
    #[must_use]
    pub fn with_uuid(uuid: Uuid, cmd: CreateProfile) -> Self {
        Self {
            uuid,
            user_uuid: cmd.user_uuid,
            first_name: cmd.first_name,
            last_name: cmd.last_name,
            occupation: cmd.occupation,
            status: cmd.status,
            bio: cmd.bio,
            file_uuid: None,
        }
    }
}

/// A post authored by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub uuid: Uuid,
    pub header: String,
    pub hashtag: Option<String>,
    pub body: Option<String>,
    pub likes: u32,
    pub profile_id: Uuid,
}

/// Directed friendship edge between two profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub uuid: Uuid,
    pub profile_id: Uuid,
    pub friend_id: Uuid,
}
