//! Security primitives: password hashing and opaque-token/credential
//! generation, shared by the auth, machine, and notification services.

pub mod password;
pub mod tokens;
