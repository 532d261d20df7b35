use serde::{Deserialize, Serialize};

/// Identity record. Credentials and sessions are owned by the identity
/// subsystem; everything else only ever references the opaque id.
#[derive(Serialize, Deserialize, Default, Clone)]
pub struct User {
    /// Opaque identity id, stable for the lifetime of the account
    pub id: String,
    /// Unique email, used as the display label and for invites
    pub email: String,
}
