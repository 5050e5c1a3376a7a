// Application layer: use cases on top of the repository.
// Identity resolution, account operations and statements all live here;
// the CLI only parses input and renders output.

pub mod error;
pub mod identity;
pub mod service;
pub mod statement;

pub use error::*;
pub use identity::*;
pub use service::BankService;
pub use statement::*;
