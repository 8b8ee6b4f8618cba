//! Remote endpoint and credential types.

use std::{fmt, str::FromStr};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Authentication mechanism used by the remoting transport.
///
/// Variant names render exactly as `New-PSSession -Authentication` expects them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthenticationMechanism {
    Default,
    #[default]
    Basic,
    Negotiate,
    NegotiateWithImplicitCredential,
    Credssp,
    Digest,
    Kerberos,
}

impl AuthenticationMechanism {
    /// PowerShell name of the mechanism.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Basic => "Basic",
            Self::Negotiate => "Negotiate",
            Self::NegotiateWithImplicitCredential => "NegotiateWithImplicitCredential",
            Self::Credssp => "Credssp",
            Self::Digest => "Digest",
            Self::Kerberos => "Kerberos",
        }
    }
}

impl fmt::Display for AuthenticationMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown authentication mechanism.
#[derive(Debug, thiserror::Error)]
#[error("Unknown authentication mechanism: {0}")]
pub struct ParseAuthenticationError(String);

impl FromStr for AuthenticationMechanism {
    type Err = ParseAuthenticationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Self::Default,
            Self::Basic,
            Self::Negotiate,
            Self::NegotiateWithImplicitCredential,
            Self::Credssp,
            Self::Digest,
            Self::Kerberos,
        ];
        all.into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseAuthenticationError(s.to_string()))
    }
}

/// Username plus secret password, passed to the execution environment as a live credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: SecretString,
}

/// Target host of a remoting session.
///
/// Immutable after construction. The password never appears in `Debug` output.
#[derive(Debug, Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    authentication: AuthenticationMechanism,
}

impl Endpoint {
    /// Create a new endpoint.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: SecretString,
        authentication: AuthenticationMechanism,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
            authentication,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub const fn authentication(&self) -> AuthenticationMechanism {
        self.authentication
    }

    /// Build the credential object handed to `New-PSSession`.
    #[must_use]
    pub fn credential(&self) -> Credential {
        Credential {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
