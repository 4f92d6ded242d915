//! Teardown of a context and a session
//!
//! One entry point for every exit path. Handles are taken out of their
//! `Option`s, so a second call finds nothing left to release.

use crate::tls::{SecureSession, SessionContext};

/// Release `session` (if present) and then `context` (if present)
///
/// The session is shut down and released together with its socket before the
/// context goes, so no connection outlives the session that uses it and no
/// context is freed while a session derived from it is still open.
pub fn cleanup(context: &mut Option<SessionContext>, session: &mut Option<SecureSession>) {
    if let Some(mut session) = session.take() {
        session.close();
    }
    if let Some(context) = context.take() {
        drop(context);
    }
}
