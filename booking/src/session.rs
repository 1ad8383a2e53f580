//! Visitor identity for the session
//!
//! A hold belongs to whoever took it: a signed-in user, or an anonymous
//! visitor identified by a guest token minted lazily and kept for the whole
//! session. Signing in or out never discards the guest token, so holds taken
//! while anonymous stay releasable.

use crate::types::{GuestToken, OwnerRef, UserId};

/// Tracks who the current visitor is
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    user: Option<UserId>,
    guest_token: Option<GuestToken>,
}

impl SessionContext {
    /// A fresh anonymous session
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user: None,
            guest_token: None,
        }
    }

    /// A session for a signed-in user
    #[must_use]
    pub const fn authenticated(user: UserId) -> Self {
        Self {
            user: Some(user),
            guest_token: None,
        }
    }

    /// Record a sign-in
    pub const fn sign_in(&mut self, user: UserId) {
        self.user = Some(user);
    }

    /// Record a sign-out; the visitor continues anonymously
    pub const fn sign_out(&mut self) {
        self.user = None;
    }

    /// The signed-in user, if any
    #[must_use]
    pub const fn user(&self) -> Option<UserId> {
        self.user
    }

    /// The identity to take holds under
    ///
    /// Authenticated identity wins; otherwise a guest token is minted on
    /// first use and reused for the rest of the session.
    pub fn owner_ref(&mut self) -> OwnerRef {
        if let Some(id) = self.user {
            return OwnerRef::Authenticated { id };
        }
        let token = *self.guest_token.get_or_insert_with(GuestToken::new);
        OwnerRef::Guest { token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_token_is_stable_across_calls() {
        let mut session = SessionContext::anonymous();
        let first = session.owner_ref();
        let second = session.owner_ref();
        assert_eq!(first, second);
    }

    #[test]
    fn authenticated_identity_wins() {
        let user = UserId::new();
        let mut session = SessionContext::authenticated(user);
        assert_eq!(session.owner_ref(), OwnerRef::Authenticated { id: user });
        assert_eq!(session.owner_ref().guest_token(), None);
    }

    #[test]
    fn guest_token_survives_sign_in_and_out() {
        let mut session = SessionContext::anonymous();
        let before = session.owner_ref();

        session.sign_in(UserId::new());
        assert!(session.owner_ref().is_authenticated());

        session.sign_out();
        assert_eq!(session.owner_ref(), before);
    }
}
