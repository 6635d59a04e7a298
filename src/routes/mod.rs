/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules,
/// enforcing a Defense-in-Depth strategy. Access control is applied explicitly
/// at the module level (via Axum layers) and again inside each handler through
/// the declared access policies.

/// Routes accessible to all clients (anonymous, read-only, plus login).
pub mod public;

/// Routes protected by the authentication gate. Requires a valid bearer token.
pub mod authenticated;

/// Routes whose policies require the `admin` capability. They share the
/// authentication gate with the authenticated module; the capability check
/// itself runs in the handlers through `authorize`.
pub mod admin;
