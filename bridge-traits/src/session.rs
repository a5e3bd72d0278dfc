//! Session Abstraction
//!
//! Resolves the currently authenticated user.

/// Provider of the current signed-in user.
///
/// Returns `None` when no user is authenticated; the core treats missing
/// identity as a fast-fail condition for verification work.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current authenticated user id, if any.
    async fn current_user_id(&self) -> Option<String>;
}
