//! Profile domain: the repository boundary, its cached read path and the
//! account-event handler fed by the register topic consumer.

pub mod account;
pub mod profile;

pub use account::{default_profile, AccountEventError, AccountEventHandler, AccountOutcome};
pub use profile::{CachedProfileReader, MemoryProfileStore, ProfileStore};
