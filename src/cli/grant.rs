//! Grant command implementation

use anyhow::Result;

use super::{find_client, find_project};
use crate::store::{Role, Store};

pub fn client(store: &mut Store, user_id: String, client_query: String, actor: Option<&str>) -> Result<()> {
    let client = find_client(store, &client_query)?;
    if store.grant_client_membership(&user_id, &client.id, actor)? {
        println!("Granted '{}' access to client '{}'", user_id, client.name);
    } else {
        println!("'{}' is already a member of client '{}'", user_id, client.name);
    }
    Ok(())
}

pub fn project(store: &mut Store, user_id: String, project_query: String, actor: Option<&str>) -> Result<()> {
    let project = find_project(store, &project_query)?;
    if store.grant_project_membership(&user_id, &project.id, actor)? {
        println!("Granted '{}' access to project '{}'", user_id, project.name);
    } else {
        println!("'{}' is already a member of project '{}'", user_id, project.name);
    }
    Ok(())
}

pub fn role(store: &mut Store, user_id: String, role: Role, actor: Option<&str>) -> Result<()> {
    store.set_user_role(&user_id, role, actor)?;
    println!("Role of '{}' set to {}", user_id, role.as_str());
    Ok(())
}
