// Caller identity as resolved by the authenticating proxy in front of us.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::{self, Header};
use axum_extra::TypedHeader;
use http::header::{HeaderName, HeaderValue};

use crate::error::ApiError;
use crate::models::ValidationError;

static X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// `X-User-Id`: the stable id of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XUserId(pub String);

impl Header for XUserId {
    fn name() -> &'static HeaderName {
        &X_USER_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let id = value
            .to_str()
            .map_err(|_| headers::Error::invalid())?
            .trim();
        if id.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(Self(id.to_owned()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

/// The authenticated caller of a request; extraction fails with 401.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    /// The user a core operation acts for: always the caller.
    ///
    /// A `userId` named by the request must be the caller's own; it may be
    /// omitted where the request shape allows.
    pub fn acting_as(&self, named: Option<&str>) -> Result<&str, ValidationError> {
        match named {
            Some(named) if named.trim() != self.user_id => Err(ValidationError::new(
                "userId does not match the authenticated caller",
            )),
            _ => Ok(&self.user_id),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(XUserId(user_id)) =
            TypedHeader::<XUserId>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::Unauthenticated)?;
        Ok(Self { user_id })
    }
}
