use stagecraft_core::UserId;

/// Authenticated caller identity for a request.
///
/// Inserted by the caller middleware; every admin route requires it.
/// Authentication itself (sessions, tokens) lives in front of this service;
/// the gateway forwards the verified identity in a header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    user_id: UserId,
}

impl CallerContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
