pub mod gateway;
pub mod postgres;
pub mod snapshot;

pub use gateway::Gateway;
pub use postgres::{ApartmentRepository, PgRepository, RepoError};
pub use snapshot::SnapshotWriter;
