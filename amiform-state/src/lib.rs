//! amiform State Management
//!
//! Persists the images amiform manages between runs.
//!
//! - **StateFile**: every managed resource with its identifier and last
//!   known attributes
//! - **StateBackend**: storage for the state file, with locking
//! - **LockInfo**: who holds the state lock and until when
//!
//! # Example
//!
//! ```ignore
//! use amiform_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::default())?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... record the outcome of each operation ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::create_backend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
