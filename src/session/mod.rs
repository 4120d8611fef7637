//! Session resources: naming, locking, resume and rollover.

pub mod manager;

pub use manager::{
    parse_session_name, rebuild_index, session_name, Session, SessionManager, SessionState,
};
