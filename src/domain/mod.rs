mod account;
mod ledger;
mod money;
mod transaction;
mod user;

pub use account::*;
pub use ledger::*;
pub use money::*;
pub use transaction::*;
pub use user::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to the microsecond precision the store keeps, so a
/// freshly built record compares equal to the same record read back.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
