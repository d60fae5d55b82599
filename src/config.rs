use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::notify::channel::ChannelConfig;

const DEFAULT_CONTACTS_FILE: &str = "contacts.json";
const DEFAULT_OUTPUT_DIR: &str = "result";
const DEFAULT_SEND_PAUSE_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read contacts file {path}: {source}")]
    ContactsRead { path: PathBuf, source: std::io::Error },
    #[error("contacts file {path} is not a valid contact list: {source}")]
    ContactsParse { path: PathBuf, source: serde_json::Error },
    #[error("credentials missing: set username and password (or SURVEI_USERNAME / SURVEI_PASSWORD)")]
    MissingCredentials,
    #[error("invalid reminder offset {0:?}: offsets must be positive whole days")]
    InvalidOffset(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone: String,
    pub name: String,
    // contact files tag administrators with `"type": "admin"`; anything else is a member
    #[serde(rename = "type", default = "member", deserialize_with = "role_from_tag")]
    pub role: Role,
}

fn member() -> Role { Role::Member }

fn role_from_tag<'de, D: Deserializer<'de>>(de: D) -> Result<Role, D::Error> {
    let tag: Option<String> = Option::deserialize(de)?;
    Ok(match tag.as_deref() {
        Some(t) if t.eq_ignore_ascii_case("admin") => Role::Admin,
        _ => Role::Member,
    })
}

impl Contact {
    pub fn new(phone: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self { phone: phone.into(), name: name.into(), role }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Process-wide configuration, built once in `main` and passed down explicitly.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub channel: ChannelConfig,
    pub contacts: Vec<Contact>,
    pub output_dir: PathBuf,
    pub send_pause: Duration,
}

impl AppConfig {
    pub fn from_env(output_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let contacts_path = env::var("SURVEI_CONTACTS_FILE").unwrap_or_else(|_| DEFAULT_CONTACTS_FILE.to_string());
        let contacts = load_contacts(Path::new(&contacts_path))?;
        let output_dir = output_dir
            .or_else(|| env::var("SURVEI_OUTPUT_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let send_pause = env::var("SURVEI_SEND_PAUSE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_SEND_PAUSE_MS));
        Ok(Self { channel: ChannelConfig::from_env(), contacts, output_dir, send_pause })
    }

    pub fn admins(&self) -> Vec<Contact> {
        self.contacts.iter().filter(|c| c.is_admin()).cloned().collect()
    }
}

pub fn load_contacts(path: &Path) -> Result<Vec<Contact>, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ContactsRead { path: path.to_path_buf(), source })?;
    parse_contacts(&raw).map_err(|source| ConfigError::ContactsParse { path: path.to_path_buf(), source })
}

pub fn parse_contacts(raw: &str) -> Result<Vec<Contact>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let pick = |a: &str, b: &str| env::var(a).or_else(|_| env::var(b)).ok().filter(|v| !v.is_empty());
        match (pick("SURVEI_USERNAME", "username"), pick("SURVEI_PASSWORD", "password")) {
            (Some(username), Some(password)) => Ok(Self { username, password }),
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).field("password", &"***").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_type_tag_maps_to_role() {
        let raw = r#"[
            {"phone": "6281234567890", "name": "John"},
            {"phone": "6289876543210", "name": "Jane", "type": "admin"},
            {"phone": "6280000000000", "name": "Budi", "type": "staff"}
        ]"#;
        let contacts = parse_contacts(raw).unwrap();
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[0].role, Role::Member);
        assert_eq!(contacts[1].role, Role::Admin);
        assert_eq!(contacts[2].role, Role::Member);
    }

    #[test]
    fn admins_keeps_list_order() {
        let cfg = AppConfig {
            channel: ChannelConfig::default(),
            contacts: vec![
                Contact::new("1", "a", Role::Admin),
                Contact::new("2", "b", Role::Member),
                Contact::new("3", "c", Role::Admin),
            ],
            output_dir: PathBuf::from("result"),
            send_pause: Duration::ZERO,
        };
        let phones: Vec<_> = cfg.admins().into_iter().map(|c| c.phone).collect();
        assert_eq!(phones, vec!["1", "3"]);
    }

    #[test]
    fn missing_contacts_file_is_reported_with_path() {
        let err = load_contacts(Path::new("/nonexistent/contacts.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/contacts.json"));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let c = Credentials { username: "mitra".into(), password: "hunter2".into() };
        let s = format!("{:?}", c);
        assert!(s.contains("mitra"));
        assert!(!s.contains("hunter2"));
    }
}
