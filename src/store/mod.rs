pub mod cache;
pub mod memory;
pub mod mongo;
pub mod remote;

pub use memory::MemoryStore;
pub use mongo::MongoRemoteStore;
pub use remote::{RemoteStore, Source};
