/// Router Module Index
///
/// Routes are grouped by the gate class of their path. The gate middleware in
/// `lib.rs` runs in front of all of them; handlers in the scoped groups still
/// extract `AuthUser` and check the role themselves.

/// Login, sign-up, verification, OAuth and health: reachable without a session.
pub mod public;

/// `/user` and everything under it. Any signed-in user.
pub mod user;

/// `/admin` and everything under it. `ADMIN` role only.
pub mod admin;
