//! Hierarchical visibility and permission resolution.
//!
//! | Module   | Responsibility                                              |
//! |----------|-------------------------------------------------------------|
//! | `roles`  | Static `Role` → `Capability` table                          |
//! | `scope`  | `ScopeResolver`, `Scope`, `Directory`, `can_write`          |
//! | `nav`    | Navigation catalog filtering and path substitution          |
//!
//! Callers never compare roles directly; every screen asks `ScopeResolver`
//! for a `Scope` and `nav::filter` for its menu.

pub mod nav;
pub mod roles;
pub mod scope;

pub use nav::NavEntry;
pub use roles::{Capability, capabilities, has_capability};
pub use scope::{Directory, NavContext, NavRequest, Scope, ScopeResolver, Selector};
