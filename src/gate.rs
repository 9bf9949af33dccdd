use axum::{
    extract::{FromRequestParts, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{AppState, auth::AuthUser, error::AppError, models::Role};

/// RoleGate
///
/// State of the `role_gate` middleware: the application state (to resolve the caller) and the
/// roles admitted to the wrapped routes.
#[derive(Clone)]
pub struct RoleGate {
    pub state: AppState,
    pub allowed: &'static [Role],
}

impl RoleGate {
    pub fn new(state: AppState, allowed: &'static [Role]) -> Self {
        Self { state, allowed }
    }

    fn denial(&self) -> AppError {
        match self.allowed {
            [Role::SuperAdmin] => AppError::Forbidden("Super admin access required".to_string()),
            _ => AppError::Forbidden("Insufficient role for this operation".to_string()),
        }
    }
}

/// role_gate
///
/// Runs before any handler of the wrapped router. Resolves the caller from the access token,
/// rejects roles outside the capability set and stores the identity in the request extensions
/// for the handler's `AuthUser` extractor. CORS pre-flight requests pass through untouched.
pub async fn role_gate(State(gate): State<RoleGate>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let user = match AuthUser::from_request_parts(&mut parts, &gate.state).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    if !gate.allowed.contains(&user.role) {
        tracing::warn!(user_id = user.id, role = %user.role, "role gate rejected caller");
        return gate.denial().into_response();
    }

    parts.extensions.insert(user);
    next.run(Request::from_parts(parts, body)).await
}
