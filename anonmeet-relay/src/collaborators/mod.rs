//! External collaborators: profile storage, compatibility scoring and the
//! chat transport. The core only sees the traits; adapters live alongside.

pub mod gateway;
pub mod oracle;
pub mod profile_store;
pub mod slack;

pub use gateway::{GatewayError, TransportGateway};
pub use oracle::{Compatibility, CompatibilityOracle, OpenAiOracle, OracleError};
pub use profile_store::{InMemoryProfileStore, ProfileStore, SqliteProfileStore};
pub use slack::SlackGateway;
