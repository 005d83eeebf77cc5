mod cancel;
mod error;
mod sqlite;
mod traits;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use sqlite::SqliteStore;
pub use traits::{SessionHint, Store};
