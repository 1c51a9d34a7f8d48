/// Router Module Index
///
/// Splits the API by the gate in front of it. Public routes take an optional
/// identity, authenticated routes sit behind `auth_middleware`, and admin routes
/// share that gate while the policy rejects every role but Admin.

/// Routes reachable anonymously (registration, login, visibility-filtered reads).
pub mod public;

/// Routes behind the authentication layer.
pub mod authenticated;

/// Audit trail routes, Admin only.
pub mod admin;
