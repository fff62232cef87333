//! Caller identity extracted from request headers.
//!
//! Authentication itself happens upstream; the gateway trusts the
//! `x-user-id` and `x-user-role` headers set by the auth proxy.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::{Operator, OperatorRole, UserId};
use crate::error::GatewayError;

/// Header carrying the authenticated user's UUID.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the gateway role (`operator` or `admin`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Reads an [`Operator`] from the identity headers.
///
/// # Errors
///
/// [`GatewayError::Unauthenticated`] when the user id is missing or not a
/// UUID, or the role is unknown. A missing role means `operator`.
pub fn operator_from_headers(headers: &HeaderMap) -> Result<Operator, GatewayError> {
    let raw_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
    let user_id = raw_id
        .trim()
        .parse::<UserId>()
        .map_err(|_| GatewayError::Unauthenticated(format!("invalid {USER_ID_HEADER}: {raw_id}")))?;

    let role = match headers.get(USER_ROLE_HEADER).map(|v| v.to_str()) {
        None => OperatorRole::Operator,
        Some(Ok(role)) if role.eq_ignore_ascii_case("operator") => OperatorRole::Operator,
        Some(Ok(role)) if role.eq_ignore_ascii_case("admin") => OperatorRole::Admin,
        Some(_) => {
            return Err(GatewayError::Unauthenticated(format!(
                "invalid {USER_ROLE_HEADER} header"
            )));
        }
    };
    Ok(Operator { user_id, role })
}

impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        operator_from_headers(&parts.headers)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(id: &str, role: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(id) {
            map.insert(USER_ID_HEADER, v);
        }
        if let Some(role) = role
            && let Ok(v) = HeaderValue::from_str(role)
        {
            map.insert(USER_ROLE_HEADER, v);
        }
        map
    }

    #[test]
    fn operator_defaults_to_operator_role() {
        let id = UserId::new();
        let Ok(op) = operator_from_headers(&headers(&id.to_string(), None)) else {
            panic!("headers should parse");
        };
        assert_eq!(op, Operator::new(id));
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        let id = UserId::new();
        let Ok(op) = operator_from_headers(&headers(&id.to_string(), Some("ADMIN"))) else {
            panic!("headers should parse");
        };
        assert!(op.is_admin());
    }

    #[test]
    fn bad_identity_is_unauthenticated() {
        assert!(matches!(
            operator_from_headers(&HeaderMap::new()),
            Err(GatewayError::Unauthenticated(_))
        ));
        assert!(matches!(
            operator_from_headers(&headers("not-a-uuid", None)),
            Err(GatewayError::Unauthenticated(_))
        ));
        assert!(matches!(
            operator_from_headers(&headers(&UserId::new().to_string(), Some("root"))),
            Err(GatewayError::Unauthenticated(_))
        ));
    }
}
