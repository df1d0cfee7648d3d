//! `userlimit-users`: the user table the retention policy trims.
//!
//! [`UserStore`] is the narrow interface the eviction run needs: list the
//! oldest N ids, delete everything else. [`SqliteUserStore`] implements it
//! and adds the account management used by the CLI.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, UserError};
pub use store::{SqliteUserStore, UserStore};
pub use types::{NewUser, User};
