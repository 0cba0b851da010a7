//! Profile system — materialization, the lock guard, and the append-only
//! version ledger.

pub mod ledger;
pub mod materializer;
pub mod model;
pub mod routes;

pub use ledger::{ProfileLedger, ProfileUpdate};
pub use materializer::ProfileMaterializer;
pub use model::{Profile, ProfileAttributes, ProfileVersion};
pub use routes::{ProfileRouteState, profile_routes};
