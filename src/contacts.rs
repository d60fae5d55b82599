use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::config::{AppConfig, Contact};
use crate::telemetry::{self};
use crate::telemetry::ops::contacts::Phase as ContactsPhase;

/// survei contacts: show who receives reminders and notices
#[derive(Args)]
pub struct ContactsCmd {
    /// Only list administrative recipients
    #[arg(long, default_value_t = false)]
    pub admins: bool,
}

#[derive(Serialize)]
pub struct ContactList<'a> {
    pub total: usize,
    pub admins: usize,
    pub contacts: Vec<&'a Contact>,
}

pub fn list<'a>(cfg: &'a AppConfig, admins_only: bool) -> ContactList<'a> {
    let contacts: Vec<&Contact> = cfg.contacts.iter().filter(|c| !admins_only || c.is_admin()).collect();
    ContactList { total: cfg.contacts.len(), admins: cfg.contacts.iter().filter(|c| c.is_admin()).count(), contacts }
}

pub fn run(cfg: &AppConfig, args: ContactsCmd) -> Result<()> {
    let log = telemetry::contacts();
    let _g = log.root_span_kv([("admins", args.admins.to_string())]).entered();
    let _s = log.span(&ContactsPhase::List).entered();
    let listed = list(cfg, args.admins);
    log.info(format!("📇 Contacts ({} total, {} admin):", listed.total, listed.admins));
    for c in &listed.contacts {
        log.info(format!("  {} ({}) {}", c.name, c.phone, if c.is_admin() { "admin" } else { "" }));
    }
    if telemetry::config::json_mode() {
        log.result(&listed, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::notify::channel::ChannelConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn admin_filter_keeps_counts_of_everyone() {
        let cfg = AppConfig {
            channel: ChannelConfig::default(),
            contacts: vec![Contact::new("1", "John", Role::Member), Contact::new("2", "Jane", Role::Admin)],
            output_dir: PathBuf::from("result"),
            send_pause: Duration::ZERO,
        };
        let listed = list(&cfg, true);
        assert_eq!((listed.total, listed.admins), (2, 1));
        assert_eq!(listed.contacts.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["Jane"]);
        let v = serde_json::to_value(list(&cfg, false)).unwrap();
        assert_eq!(v["contacts"][1]["type"], "admin");
        assert_eq!(v["contacts"][0]["type"], "member");
    }
}
