//! `roster state` - inspect or edit tracked state without touching the remote

use anyhow::Result;
use colored::Colorize;
use declarative::{Address, Kind};

use crate::Context;
use crate::state::RosterState;
use crate::ui;

pub fn list(ctx: &Context) -> Result<()> {
    let (state, path) = ctx.load_state()?;

    if state.is_empty() {
        ui::info(&format!("Nothing tracked in {}", path.display()));
        return Ok(());
    }

    for address in state.addresses() {
        println!("{address}");
    }
    if !ctx.quiet {
        ui::dim(&format!(
            "{} tracked, last updated {}",
            state.len(),
            state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    Ok(())
}

pub fn show(ctx: &Context, address: &Address) -> Result<()> {
    let (state, _) = ctx.load_state()?;

    match state.render(address)? {
        Some(rendered) => {
            println!("{} {}", "#".dimmed(), address.to_string().bold());
            print!("{rendered}");
            Ok(())
        }
        None => anyhow::bail!("{address} is not tracked"),
    }
}

pub fn rm(ctx: &Context, address: &Address) -> Result<()> {
    let (mut state, path) = ctx.load_state()?;

    forget(&mut state, address)?;
    state.touch(&path)?;

    ui::success(&format!("Stopped tracking {address}"));
    if address.kind != Kind::Group {
        ui::dim("The remote entity is unchanged");
    }
    Ok(())
}

fn forget(state: &mut RosterState, address: &Address) -> Result<()> {
    if !state.remove(address) {
        anyhow::bail!("{address} is not tracked");
    }
    log::info!("Removed {address} from state");
    Ok(())
}
