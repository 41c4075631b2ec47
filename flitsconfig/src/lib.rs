#![allow(clippy::multiple_crate_versions)]

use flitsmeister::Auth;
use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

pub const APP_NAME: &str = "flitsmeister";

/// Where the password comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Literal(String),
    Env { env: String },
    Cmd { cmd: String },
}

impl Default for Secret {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

/// Session and access token kept from the last login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_token: String,
    pub access_token: String,
}

impl StoredSession {
    /// Rebuilds the credentials, re-reading the access token claims.
    ///
    /// # Errors
    /// Returns an error if the stored access token is unreadable.
    pub fn to_auth(&self) -> std::result::Result<Auth, flitsmeister::Error> {
        Auth::new(self.session_token.as_str(), self.access_token.as_str())
    }
}

impl From<&Auth> for StoredSession {
    fn from(auth: &Auth) -> Self {
        Self {
            session_token: auth.session_token().to_string(),
            access_token: auth.access_token().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlitsConfig {
    pub username: Option<String>,
    #[serde(default)]
    pub password: Secret,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub session: Option<StoredSession>,
}

impl Default for FlitsConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: Secret::default(),
            request_timeout_secs: default_request_timeout_secs(),
            session: None,
        }
    }
}

const fn default_request_timeout_secs() -> u64 {
    10
}

/// Username and resolved password, ready for a login call.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FlitsConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("missing username in config; set `username` in the flitsmeister config file")]
    MissingUsername,
    #[error("missing password in config; set `password` in the flitsmeister config file")]
    MissingPassword,
    #[error("environment variable '{env}' not found")]
    MissingEnv { env: String },
    #[error("password command failed: {cmd}: {message}")]
    CommandFailed { cmd: String, message: String },
    #[error("failed to execute password command '{cmd}': {source}")]
    CommandExec { cmd: String, source: io::Error },
    #[error("password command returned empty output: {cmd}")]
    CommandEmpty { cmd: String },
    #[error(
        "credentials required but stdin is not interactive; set `username` and `password` in {path} (example: password = {{ env = \"FLITSMEISTER_PASSWORD\" }})",
        path = .path.display()
    )]
    NonInteractive { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, FlitsConfigError>;

impl FlitsConfig {
    /// Loads the config file from the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized.
    pub fn load() -> Result<Self> {
        Ok(confy::load(APP_NAME, None)?)
    }

    /// Loads config or prompts for whichever credential is missing.
    ///
    /// # Errors
    /// Returns an error if the config cannot be loaded, the password cannot be
    /// resolved, or onboarding fails (including non-interactive stdin).
    pub fn load_or_onboard() -> Result<Self> {
        let config = Self::load()?;
        if !config.needs_onboarding() {
            config.password.resolve()?;
            return Ok(config);
        }
        config.onboard_credentials()
    }

    /// Stores the config to the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn store(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    /// Resolves username and password from the configured sources.
    ///
    /// # Errors
    /// Returns an error if either is missing or the password cannot be resolved.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|username| !username.is_empty())
            .ok_or(FlitsConfigError::MissingUsername)?;
        Ok(Credentials {
            username: username.to_string(),
            password: self.password.resolve()?,
        })
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Remembers the tokens of a fresh login.
    pub fn remember(&mut self, auth: &Auth) {
        self.session = Some(StoredSession::from(auth));
    }

    pub fn forget(&mut self) {
        self.session = None;
    }

    fn has_username(&self) -> bool {
        self.username
            .as_deref()
            .is_some_and(|username| !username.trim().is_empty())
    }

    /// Whether a username or literal password still has to be asked for.
    fn needs_onboarding(&self) -> bool {
        !self.has_username() || self.password.is_empty_literal()
    }

    fn onboard_credentials(mut self) -> Result<Self> {
        let config_path = confy::get_configuration_file_path(APP_NAME, None)?;
        if !io::stdin().is_terminal() {
            return Err(FlitsConfigError::NonInteractive { path: config_path });
        }

        if !config_path.as_os_str().is_empty() {
            eprintln!(
                "Flitsmeister credentials not found. They will be stored at: {}",
                config_path.display()
            );
        }

        if !self.has_username() {
            let username = prompt("Flitsmeister username: ")?;
            if username.is_empty() {
                return Err(FlitsConfigError::MissingUsername);
            }
            self.username = Some(username);
        }

        if self.password.is_empty_literal() {
            let password = prompt("Flitsmeister password: ")?;
            if password.is_empty() {
                return Err(FlitsConfigError::MissingPassword);
            }
            self.password = Secret::Literal(password);
        }

        self.store()?;
        Ok(self)
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

impl Secret {
    fn is_empty_literal(&self) -> bool {
        matches!(self, Self::Literal(value) if value.trim().is_empty())
    }

    fn resolve(&self) -> Result<String> {
        match self {
            Self::Literal(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(FlitsConfigError::MissingPassword);
                }
                Ok(trimmed.to_string())
            }
            Self::Env { env } => {
                let value = std::env::var(env)
                    .map_err(|_| FlitsConfigError::MissingEnv { env: env.clone() })?;
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(FlitsConfigError::MissingPassword);
                }
                Ok(trimmed.to_string())
            }
            Self::Cmd { cmd } => {
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .map_err(|e| FlitsConfigError::CommandExec {
                        cmd: cmd.clone(),
                        source: e,
                    })?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(FlitsConfigError::CommandFailed {
                        cmd: cmd.clone(),
                        message: stderr.trim().to_string(),
                    });
                }

                let stdout = String::from_utf8_lossy(&output.stdout);
                let trimmed = stdout.trim();
                if trimmed.is_empty() {
                    return Err(FlitsConfigError::CommandEmpty { cmd: cmd.clone() });
                }
                Ok(trimmed.to_string())
            }
        }
    }
}
