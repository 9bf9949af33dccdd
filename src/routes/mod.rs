/// Router Module Index
///
/// Routes are split by who may call them. Access control is applied per router with a
/// layer in `create_router`, never inside the individual handlers.

/// Anonymous routes: registration, login, token refresh, password reset and note browsing.
pub mod public;

/// Routes behind the role gate with every role admitted. Any valid access token works.
pub mod authenticated;

/// Hierarchy administration, user placement and the audit log. Super admins only.
pub mod admin;
