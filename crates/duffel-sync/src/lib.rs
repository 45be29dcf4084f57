//! duffel-sync: server-side synchronization engine
//!
//! Four pieces compose the data path:
//!
//! - [`store::UserStore`]: the flat per-user ciphertext namespace on disk
//! - [`engine::TransferEngine`]: upload/download pipelines gluing codec,
//!   keys, and storage together
//! - [`bus::NotificationBus`]: broadcast fan-out of namespace changes to
//!   subscribed sessions
//! - [`watcher::StorageWatcher`]: filesystem observer feeding the bus

pub mod bus;
pub mod engine;
pub mod store;
pub mod watcher;

pub use bus::{NotificationBus, UpdateAction, UpdateEvent};
pub use engine::{EngineError, TransferEngine, DOWNLOAD_CHUNK_SIZE};
pub use store::{base_name, StoreError, UserStore, ENC_SUFFIX};
pub use watcher::{watch_storage, StorageWatcher};
