//! Project command implementation

use anyhow::Result;

use super::{find_client, find_project, owner_change, short_id};
use crate::store::{NewProject, ProjectScope, ProjectUpdate, Store};

pub fn create(
    store: &mut Store,
    client_query: String,
    name: String,
    scope: ProjectScope,
    owner: Option<String>,
    inbox: bool,
    actor: Option<&str>,
) -> Result<()> {
    let client = find_client(store, &client_query)?;
    let project = store.create_project(
        &NewProject {
            client_id: &client.id,
            name: &name,
            scope,
            owner_user_id: owner.as_deref(),
            is_inbox: inbox,
        },
        actor,
    )?;
    println!(
        "Project '{}' created for client '{}' with ID: {}",
        project.name, client.name, project.id
    );
    Ok(())
}

pub fn list(store: &Store, client_query: Option<String>) -> Result<()> {
    let client_id = match client_query {
        Some(query) => Some(find_client(store, &query)?.id),
        None => None,
    };

    let projects = store.list_projects(client_id.as_deref())?;
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }

    println!(
        "{:<10} {:<25} {:<10} {:<10} {:<6} {:<20}",
        "ID", "Name", "Client", "Scope", "Inbox", "Owner"
    );
    println!("{}", "-".repeat(85));
    for p in projects {
        println!(
            "{:<10} {:<25} {:<10} {:<10} {:<6} {:<20}",
            short_id(&p.id),
            p.name,
            short_id(&p.client_id),
            p.scope,
            if p.is_inbox { "yes" } else { "" },
            p.owner_user_id.unwrap_or_default()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    store: &mut Store,
    project_query: String,
    client_query: Option<String>,
    name: Option<String>,
    scope: Option<ProjectScope>,
    owner: Option<String>,
    clear_owner: bool,
    inbox: Option<bool>,
    actor: Option<&str>,
) -> Result<()> {
    let project = find_project(store, &project_query)?;
    let client_id = match client_query {
        Some(query) => Some(find_client(store, &query)?.id),
        None => None,
    };
    let updated = store.update_project(
        &project.id,
        &ProjectUpdate {
            client_id: client_id.as_deref(),
            name: name.as_deref(),
            scope,
            owner_user_id: owner_change(owner.as_deref(), clear_owner),
            is_inbox: inbox,
        },
        actor,
    )?;
    println!(
        "Project '{}' updated (scope {}, inbox {})",
        updated.name,
        updated.scope,
        if updated.is_inbox { "yes" } else { "no" }
    );
    Ok(())
}

pub fn delete(store: &mut Store, project_query: String, actor: Option<&str>) -> Result<()> {
    let project = find_project(store, &project_query)?;
    store.delete_project(&project.id, actor)?;
    println!("Project '{}' deleted; its transcripts are unrouted", project.name);
    Ok(())
}

pub fn add_domain(store: &mut Store, project_query: String, domain: String, actor: Option<&str>) -> Result<()> {
    let project = find_project(store, &project_query)?;
    let id = store.add_project_domain(&project.id, &domain, actor)?;
    println!("Added domain '{}' to project '{}' (rule {})", domain, project.name, id);
    Ok(())
}

pub fn remove_domain(store: &mut Store, id: i64, actor: Option<&str>) -> Result<()> {
    store.remove_project_domain(id, actor)?;
    println!("Removed domain rule {}", id);
    Ok(())
}

pub fn add_alias(store: &mut Store, project_query: String, alias: String, actor: Option<&str>) -> Result<()> {
    let project = find_project(store, &project_query)?;
    let id = store.add_project_alias(&project.id, &alias, actor)?;
    println!("Added alias '{}' to project '{}' (rule {})", alias, project.name, id);
    Ok(())
}

pub fn remove_alias(store: &mut Store, id: i64, actor: Option<&str>) -> Result<()> {
    store.remove_project_alias(id, actor)?;
    println!("Removed alias rule {}", id);
    Ok(())
}
