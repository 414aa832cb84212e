//! Client command implementation

use anyhow::Result;

use super::{find_client, owner_change, short_id};
use crate::store::{ClientUpdate, Store};

pub fn create(store: &mut Store, name: String, owner: Option<String>, actor: Option<&str>) -> Result<()> {
    let client = store.create_client(&name, owner.as_deref(), actor)?;
    println!("Client '{}' created with ID: {}", client.name, client.id);
    Ok(())
}

pub fn list(store: &Store) -> Result<()> {
    let clients = store.list_clients()?;
    if clients.is_empty() {
        println!("No clients found.");
        return Ok(());
    }

    println!("{:<10} {:<30} {:<20}", "ID", "Name", "Owner");
    println!("{}", "-".repeat(62));
    for c in clients {
        println!(
            "{:<10} {:<30} {:<20}",
            short_id(&c.id),
            c.name,
            c.owner_user_id.unwrap_or_default()
        );
    }
    Ok(())
}

pub fn update(
    store: &mut Store,
    client_query: String,
    name: Option<String>,
    owner: Option<String>,
    clear_owner: bool,
    actor: Option<&str>,
) -> Result<()> {
    let client = find_client(store, &client_query)?;
    let updated = store.update_client(
        &client.id,
        &ClientUpdate {
            name: name.as_deref(),
            owner_user_id: owner_change(owner.as_deref(), clear_owner),
        },
        actor,
    )?;
    println!("Client '{}' updated ({})", updated.name, short_id(&updated.id));
    Ok(())
}

pub fn delete(store: &mut Store, client_query: String, actor: Option<&str>) -> Result<()> {
    let client = find_client(store, &client_query)?;
    store.delete_client(&client.id, actor)?;
    println!("Client '{}' deleted with its projects", client.name);
    Ok(())
}
