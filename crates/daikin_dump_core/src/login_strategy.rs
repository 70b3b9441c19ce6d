//! Selection of the login path from positional command-line arguments.
//!
//! Two arguments whose first looks like an email address (contains `@`)
//! select a direct credential login. Anything else selects the interactive
//! proxy login; when arguments were given but the first one is not an email
//! address they are ignored and the caller is told so it can warn.

use crate::entities::{Credentials, LoginMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStrategy {
    DirectCredentials(Credentials),
    Interactive {
        /// Arguments were supplied but discarded
        args_ignored: bool,
    },
}

impl LoginStrategy {
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        match args {
            [email, password] if email.as_ref().contains('@') => {
                LoginStrategy::DirectCredentials(Credentials::new(
                    email.as_ref().to_string(),
                    password.as_ref().to_string(),
                ))
            }
            [first, ..] => LoginStrategy::Interactive {
                args_ignored: !first.as_ref().contains('@'),
            },
            [] => LoginStrategy::Interactive {
                args_ignored: false,
            },
        }
    }

    pub fn mode(&self) -> LoginMode {
        match self {
            LoginStrategy::DirectCredentials(_) => LoginMode::Direct,
            LoginStrategy::Interactive { .. } => LoginMode::ProxyInteractive,
        }
    }
}
