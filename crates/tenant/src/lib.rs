pub mod error;
pub mod lifecycle;

pub use error::{Result, TenantError};
pub use lifecycle::{Relocation, TenantLifecycle, UpdateOrganization, UpdateOutcome};
