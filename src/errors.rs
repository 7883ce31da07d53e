//! Error kinds surfaced by the core. They travel as `failure::Context`
//! attached to the underlying error, so the original message stays in the chain.
use failure::{Context, Error as FailureError, Fail};
use validator::ValidationErrors;

#[derive(Debug, Clone, Fail, PartialEq)]
pub enum Error {
    #[fail(display = "Not found")]
    NotFound,
    #[fail(display = "Caller is not the owner")]
    NotOwner,
    #[fail(display = "Server is refusing to fullfil the request")]
    Forbidden,
    #[fail(display = "Validation error: {}", _0)]
    Validate(ValidationErrors),
    #[fail(display = "Category is required")]
    CategoryRequired,
    #[fail(display = "Not enough points")]
    NotEnoughPoints,
    #[fail(display = "Points delta must not be zero")]
    InvalidDelta,
    #[fail(display = "User not found")]
    UserNotFound,
    #[fail(display = "Listing is already featured")]
    AlreadyFeatured,
    #[fail(display = "Unknown featured package")]
    InvalidPackage,
    #[fail(display = "Listing can not be changed while featured")]
    LockedWhileFeatured,
    #[fail(display = "Chatting with yourself is forbidden")]
    SelfChatForbidden,
    #[fail(display = "Caller is not a participant of the conversation")]
    NotParticipant,
    #[fail(display = "Message is empty")]
    EmptyMessage,
    #[fail(display = "Too many requests")]
    RateLimited,
    #[fail(display = "Invalid or expired code")]
    InvalidCode,
    #[fail(display = "External service is unavailable")]
    Transient,
    #[fail(display = "R2D2 connection error")]
    Connection,
    #[fail(display = "Parse error")]
    Parse,
}

impl Error {
    /// Returns the first error kind found in the cause chain
    pub fn kind_of(err: &FailureError) -> Option<Error> {
        err.iter_chain()
            .filter_map(|cause| {
                cause
                    .downcast_ref::<Context<Error>>()
                    .map(|ctx| ctx.get_context().clone())
                    .or_else(|| cause.downcast_ref::<Error>().cloned())
            })
            .next()
    }

    /// Checks whether the chain carries this error kind
    pub fn is(&self, err: &FailureError) -> bool {
        err.iter_chain().any(|cause| {
            cause
                .downcast_ref::<Context<Error>>()
                .map(|ctx| ctx.get_context() == self)
                .or_else(|| cause.downcast_ref::<Error>().map(|e| e == self))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_survives_outer_context() {
        let err: FailureError = format_err!("User 1 has 10 points, needs 60").context(Error::NotEnoughPoints).into();
        let err: FailureError = err.context("Service Promotions, purchase_featured endpoint error occurred.").into();

        assert_eq!(Error::kind_of(&err), Some(Error::NotEnoughPoints));
        assert!(Error::NotEnoughPoints.is(&err));
        assert!(!Error::AlreadyFeatured.is(&err));
    }

    #[test]
    fn test_plain_error_has_no_kind() {
        let err = format_err!("boom");
        assert_eq!(Error::kind_of(&err), None);
    }
}
