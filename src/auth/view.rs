//! Login rendering boundary

use crate::models::{LoginPhase, UserId};

/// Rendering collaborator for the login form.
///
/// The controller never touches a rendering surface itself; it reports every
/// completed transition through this trait, after the transition has been
/// applied. Implementations are fire-and-forget - nothing they do can fail a
/// flow.
pub trait LoginView: Send + Sync {
    /// The form moved to a new phase; show exactly that phase.
    fn show_phase(&self, phase: LoginPhase);

    /// A flow failed; present the message inline, next to its form.
    fn show_error(&self, message: &str);

    /// The session's user became known.
    fn show_user(&self, user_id: &UserId);

    /// The server asked the browser (or host shell) to navigate to an
    /// external URL, e.g. to continue a provider login.
    fn navigate(&self, url: &str);
}
