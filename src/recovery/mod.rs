//! Recovery from a failed primary fetch: bounded retries, a nearby cached file,
//! or a terminal abort, chosen by a [`policy::RecoveryPolicy`].

pub mod controller;
pub mod error;
pub mod policy;
