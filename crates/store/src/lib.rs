//! Persistence layer.
//!
//! Every status write goes through a guarded conditional update: the caller
//! passes the status it loaded the aggregate in, and the write applies only
//! if the stored row still carries that status. In-memory this is a
//! lock-held check-and-swap; on Postgres it is a single `UPDATE ... WHERE
//! status = $expected`. A `false` return means another caller got there
//! first — reload and re-apply (the aggregate's guarded transitions make the
//! re-application converge).

mod error;
mod memory;
mod postgres;
mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use traits::{OfferStore, OrderStore, ReturnStore};
