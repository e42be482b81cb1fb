//! Multihost coordination: role and host mappings derived from the
//! connected guests, and the task that publishes them.

mod context;
mod task;

pub use context::{HostMapping, RoleMapping, build_host_mapping, build_role_mapping};
pub use task::{HOSTS_KEY, METHOD, MultihostTask, ROLES_KEY, multihost_config};
pub(crate) use task::method;
