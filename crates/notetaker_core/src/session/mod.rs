//! UI edit session state.

pub mod edit_session;
