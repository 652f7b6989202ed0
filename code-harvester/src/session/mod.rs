//! Session blob storage and naming.

mod locks;
mod naming;
mod store;

pub use locks::AccountLocks;
pub use naming::{
    canonical_phone, default_session_name, is_temp_session_name, mask_phone, normalize_phone,
    temp_session_name, user_session_name,
};
pub use store::{FileSessionStore, SessionStore};
