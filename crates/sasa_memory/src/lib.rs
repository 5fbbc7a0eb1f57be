pub mod manager;
pub mod models;
pub mod prompt;
pub mod store;

pub use manager::{MemoryManager, UserSummary};
pub use models::{
    Counters, LtmEntry, Personality, Profile, Relation, StmMeta, StmRole, StmTurn, UserRecord,
};
pub use store::{JsonStore, MemoryBackend, StoreError};
