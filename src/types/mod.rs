pub mod api;
pub mod names;
pub mod state;

pub use names::{DatabaseName, GroupRole, RoleGroups, RoleName};
pub use state::DatabaseState;
