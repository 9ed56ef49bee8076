pub mod error;
pub mod placeholder;
pub mod store;
pub mod vault;

pub use error::{Result, VaultError};
pub use store::{KvStore, MemoryStore, RedisStore};
pub use vault::Vault;
