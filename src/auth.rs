//! Admin password gate

use crate::storage::LocalStorage;

pub const AUTH_KEY: &str = "tvdeck_admin_auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidPassword,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidPassword => write!(f, "Incorrect password"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct AuthGate {
    storage: LocalStorage,
    password: String,
    authenticated: bool,
}

impl AuthGate {
    /// Restore the persisted flag; anything but a stored `true` means signed out
    pub fn new(storage: LocalStorage, password: &str) -> Self {
        let authenticated = storage
            .get(AUTH_KEY)
            .and_then(|raw| serde_json::from_str::<bool>(&raw).ok())
            .unwrap_or(false);
        Self {
            storage,
            password: password.to_string(),
            authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn login(&mut self, candidate: &str) -> Result<(), AuthError> {
        if candidate != self.password {
            tracing::info!("Rejected admin login attempt");
            return Err(AuthError::InvalidPassword);
        }
        self.authenticated = true;
        self.persist();
        Ok(())
    }

    /// Change the expected password; an existing session stays signed in
    pub fn set_password(&mut self, password: &str) {
        self.password = password.to_string();
    }

    pub fn logout(&mut self) {
        self.authenticated = false;
        self.persist();
    }

    fn persist(&self) {
        let value = if self.authenticated { "true" } else { "false" };
        if let Err(e) = self.storage.set(AUTH_KEY, value) {
            tracing::warn!("Failed to persist admin session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(dir: &std::path::Path) -> AuthGate {
        AuthGate::new(LocalStorage::open(dir).unwrap(), "letmein")
    }

    #[test]
    fn test_correct_password_authenticates() {
        let dir = tempfile::tempdir().unwrap();
        let mut auth = gate(dir.path());
        assert!(!auth.is_authenticated());
        assert!(auth.login("letmein").is_ok());
        assert!(auth.is_authenticated());
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut auth = gate(dir.path());
        for attempt in ["", "LETMEIN", "letmein ", "admin"] {
            assert_eq!(auth.login(attempt), Err(AuthError::InvalidPassword));
            assert!(!auth.is_authenticated());
        }
    }

    #[test]
    fn test_flag_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        gate(dir.path()).login("letmein").unwrap();
        assert!(gate(dir.path()).is_authenticated());

        let mut auth = gate(dir.path());
        auth.logout();
        assert!(!gate(dir.path()).is_authenticated());
    }

    #[test]
    fn test_garbage_flag_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        LocalStorage::open(dir.path()).unwrap().set(AUTH_KEY, "yes please").unwrap();
        assert!(!gate(dir.path()).is_authenticated());
    }
}
