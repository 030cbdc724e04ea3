//! API request handlers.

mod decide;
mod health;
mod ledger;
mod rules;

pub use decide::decide;
pub use health::health_check;
pub use ledger::{export_ledger, verify_ledger};
pub use rules::reload_rules;
