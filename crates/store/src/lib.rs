pub mod persist;
pub mod store;

pub use persist::{
    JsonFilePersister, MemoryPersister, PersistedState, StatePersister, StoreError,
    STATE_SCHEMA_VERSION,
};
pub use store::{MappingStore, MappingUpdate};

pub type Result<T> = std::result::Result<T, StoreError>;
