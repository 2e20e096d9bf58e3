pub mod backend;
pub mod cache;
pub mod coinjoin;
pub mod error;
pub mod graph;
pub mod transport;
pub mod types;
pub mod version;

#[cfg(test)]
pub(crate) mod test_util;

pub use backend::BackendClient;
pub use cache::TxCache;
pub use coinjoin::OutputRegistrationClient;
pub use error::CoreError;
pub use types::{ActiveOutput, RegistrationOutcome, TxNode};
