//! Role and host mappings built fresh on every run.

use indexmap::IndexMap;

use crate::guest::Guest;

/// Role name to guest names, in guest order.
pub type RoleMapping = IndexMap<String, Vec<String>>;

/// Guest name to reachable address.
pub type HostMapping = IndexMap<String, String>;

/// Groups guest names by role. Guests without a role, or with a blank one,
/// are left out, so every role present has at least one member.
#[must_use]
pub fn build_role_mapping<G: Guest>(guests: &[G]) -> RoleMapping {
    let mut roles = RoleMapping::new();
    for guest in guests {
        if let Some(role) = guest.role().filter(|role| !role.trim().is_empty()) {
            roles
                .entry(role.to_owned())
                .or_default()
                .push(guest.name().to_owned());
        }
    }
    roles
}

/// Maps guest names to addresses. Guests without a resolvable address are
/// omitted.
#[must_use]
pub fn build_host_mapping<G: Guest>(guests: &[G]) -> HostMapping {
    guests
        .iter()
        .filter_map(|guest| {
            guest
                .address()
                .filter(|address| !address.trim().is_empty())
                .map(|address| (guest.name().to_owned(), address.to_owned()))
        })
        .collect()
}
