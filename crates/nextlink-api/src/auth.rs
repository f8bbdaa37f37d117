use secrecy::SecretString;

/// Which authentication scheme a set of credentials produces.
///
/// Marker enum (no data) -- the actual secrets live in [`Credentials`].
/// Useful for branching and logging without carrying secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Username + password (HTTP Basic header, or URL user-info).
    Basic,
    /// Opaque access token (`Authorization: Bearer`).
    Bearer,
}

/// Credentials for authenticating with a Nextcloud server.
///
/// Each variant carries the secret material needed for its scheme.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Login name and password (regular password or app password).
    Basic {
        username: String,
        password: SecretString,
    },
    /// OAuth2 access token.
    Bearer { token: SecretString },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: SecretString::from(token.into()),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            Self::Basic { .. } => AuthScheme::Basic,
            Self::Bearer { .. } => AuthScheme::Bearer,
        }
    }

    /// The login name, if these are Basic credentials.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } => Some(username),
            Self::Bearer { .. } => None,
        }
    }
}
