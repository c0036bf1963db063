//! Signed content objects
//!
//! Everything published to the store is a [`ContentObject`]: application
//! segments as well as the ACLs, wrapped keys and group records the access
//! control layer keeps in the namespace.

mod object;

pub use object::{ContentError, ContentObject, ContentType, KeyLocator, KeyRef, SignedInfo};
