//! `roster import` - adopt an existing remote entity into state

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Address, Kind, Record, observe};
use directory::Client;

use crate::Context;
use crate::cli::ImportArgs;
use crate::config::RosterConfig;
use crate::state::RosterState;
use crate::ui;

/// Read the entity and track it at `kind.name`
pub fn adopt(
    client: &Client,
    state: &mut RosterState,
    kind: Kind,
    name: &str,
    id: &str,
) -> Result<Record> {
    let address = Address::new(kind, name);
    if state.get(&address).is_some() {
        anyhow::bail!("{address} is already tracked; run `roster state rm {address}` first");
    }

    let record = observe::import(client, kind, id)
        .with_context(|| format!("Failed to import {kind} '{id}'"))?;
    log::info!("Imported {kind} '{id}' as {address}");
    state.set(name, record.clone());
    Ok(record)
}

/// Whether the config declares `address`
fn declared(config: &RosterConfig, address: &Address) -> bool {
    let name = &address.name;
    match address.kind {
        Kind::Group => config.groups.contains_key(name),
        Kind::Member => config.members.contains_key(name),
        Kind::Identity => config.identities.contains_key(name),
        Kind::IdentitySet => config.identity_sets.contains_key(name),
    }
}

pub fn run(ctx: &Context, args: &ImportArgs) -> Result<()> {
    let config = ctx.load_config()?;
    let client = ctx.client(&config)?;
    let (mut state, path) = ctx.load_state()?;

    adopt(&client, &mut state, args.kind, &args.name, &args.id)?;
    state.touch(&path)?;

    let address = Address::new(args.kind, args.name.as_str());
    ui::success(&format!("Imported {} as {address}", args.id));
    if !declared(&config, &address) {
        ui::warn(&format!(
            "{address} is not declared in {}; the next apply will remove it",
            ctx.config_path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory::MemoryGateway;

    fn client() -> (MemoryGateway, Client) {
        let remote = MemoryGateway::new();
        remote.insert_group("admins", "d", "Admins");
        remote.insert_member("admins", "alice");
        let client = Client::with_gateway(Box::new(remote.clone()));
        (remote, client)
    }

    #[test]
    fn test_adopt_group_and_member() {
        let (_remote, client) = client();
        let mut state = RosterState::default();

        adopt(&client, &mut state, Kind::Group, "admins", "admins").unwrap();
        adopt(&client, &mut state, Kind::Member, "alice", "admins,alice").unwrap();

        assert_eq!(state.groups["admins"].name, "Admins");
        assert_eq!(state.members["alice"].group_alias, "admins");
    }

    #[test]
    fn test_adopt_refuses_tracked_address() {
        let (_remote, client) = client();
        let mut state = RosterState::default();
        adopt(&client, &mut state, Kind::Group, "admins", "admins").unwrap();

        let err = adopt(&client, &mut state, Kind::Group, "admins", "admins").unwrap_err();
        assert!(err.to_string().contains("already tracked"));
    }

    #[test]
    fn test_adopt_missing_entity() {
        let (_remote, client) = client();
        let mut state = RosterState::default();

        let err = adopt(&client, &mut state, Kind::Member, "bob", "admins,bob").unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_declared() {
        let config = RosterConfig::parse(
            r#"
[groups.admins]
alias = "admins"
"#,
        )
        .unwrap();
        assert!(declared(&config, &Address::new(Kind::Group, "admins")));
        assert!(!declared(&config, &Address::new(Kind::Member, "admins")));
    }
}
