use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{store::Store, user::User},
    storage::{Storage, StorageError},
};

#[derive(Debug, Error)]
pub enum RegisterUserError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("A user with email '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct RegisterUserParameters {
    pub email: String,
}

/// Stand-in for the identity collaborator: mint a stable opaque id for an
/// email. Credential handling lives outside this core.
pub fn register_user(
    store: &mut Store,
    storage: &impl Storage,
    parameters: RegisterUserParameters,
) -> Result<User, RegisterUserError> {
    let email = parameters.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(RegisterUserError::InvalidEmail(parameters.email));
    }

    if store.get_user_by_email(&email).is_some() {
        return Err(RegisterUserError::AlreadyRegistered(email));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
    };

    store.add_user(user.clone());
    storage.save(store)?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::RecordingStorage;

    #[test]
    fn test_register_and_resolve_by_email() {
        let mut store = Store::default();
        let storage = RecordingStorage::new();

        let user = register_user(
            &mut store,
            &storage,
            RegisterUserParameters {
                email: String::from("  alice@example.com "),
            },
        )
        .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(
            store.get_user_by_email("ALICE@example.com").unwrap().id,
            user.id
        );
        assert_eq!(storage.saves.get(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_and_duplicate() {
        let mut store = Store::default();
        let storage = RecordingStorage::new();

        assert!(matches!(
            register_user(
                &mut store,
                &storage,
                RegisterUserParameters {
                    email: String::from("not-an-email")
                }
            ),
            Err(RegisterUserError::InvalidEmail(_))
        ));

        register_user(
            &mut store,
            &storage,
            RegisterUserParameters {
                email: String::from("alice@example.com"),
            },
        )
        .unwrap();

        assert!(matches!(
            register_user(
                &mut store,
                &storage,
                RegisterUserParameters {
                    email: String::from("alice@example.com")
                }
            ),
            Err(RegisterUserError::AlreadyRegistered(_))
        ));
    }
}
