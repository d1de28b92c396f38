//! Model-invokable tools over the project store.
//!
//! Each tool validates its structured input before touching the database,
//! re-applies the ownership scope to every read, and returns a
//! deterministically formatted summary string alongside the structured
//! result. Tool failures become error tool-results in the conversation,
//! never a crashed stream.

use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::client::ToolDef;
use crate::models::{NewProject, Project, ProjectStatus, User};
use crate::policy::{AccessPolicy, Operation};
use crate::query::search::{parse_flexible_date, SearchPlan, TextTerm};
use crate::query::{self, AuthorIdError, ProjectWithAuthors, TOOL_SEARCH_LIMIT};
use crate::schema::projects;

pub const CREATE_PROJECT: &str = "createProject";
pub const FIND_PROJECTS: &str = "findProjects";
pub const PROJECT_DETAILS: &str = "projectDetails";

/// Structured result plus a human-readable summary built by string
/// formatting over the result rows (never model-generated).
#[derive(Debug)]
pub struct ToolOutcome {
    pub value: serde_json::Value,
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Authentication required to create a project.")]
    AuthRequired,
    #[error("Not authorized.")]
    Denied,
    #[error("{0}")]
    Validation(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Tool contracts exposed to the model. The wire names (`titre`,
/// `date_de_echeance`, `authorIds`, `inputOfSearch`) are a compatibility
/// surface and must not change.
pub fn definitions() -> Vec<ToolDef> {
    let status_values = ProjectStatus::ALL.map(|s| s.as_str());

    vec![
        ToolDef {
            name: CREATE_PROJECT.to_string(),
            description: "Create a project with a title, description, status, due date and \
                          associated authors."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "titre": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Project title (non-empty)"
                    },
                    "description": {
                        "type": ["string", "null"],
                        "description": "Project description"
                    },
                    "status": {
                        "type": "string",
                        "enum": status_values,
                        "description": "Initial status, defaults to IDEA"
                    },
                    "date_de_echeance": {
                        "type": ["string", "null"],
                        "description": "Due date in 'YYYY-MM-DD' format"
                    },
                    "authorIds": {
                        "type": "array",
                        "items": {"type": "string", "format": "uuid"},
                        "description": "Ids of existing authors to associate (optional)"
                    }
                },
                "required": ["titre"]
            }),
        },
        ToolDef {
            name: FIND_PROJECTS.to_string(),
            description: "Search, list or summarize projects, filtered by free text, status \
                          and/or author name."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Free search text (title, description, or a date)"
                    },
                    "status": {
                        "type": "string",
                        "enum": status_values,
                        "description": "Exact status filter"
                    },
                    "authorName": {
                        "type": "string",
                        "description": "Filter by author (partial name)"
                    }
                }
            }),
        },
        ToolDef {
            name: PROJECT_DETAILS.to_string(),
            description: "Look up one project by full or partial title, description or date \
                          and return its complete details."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "inputOfSearch": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Full or partial title, description or date"
                    }
                },
                "required": ["inputOfSearch"]
            }),
        },
    ]
}

/// Dispatches a model tool call. `actor` is the resolved authenticated
/// user, if any; read tools degrade gracefully without one, the mutating
/// tool fails.
pub fn dispatch(
    conn: &mut PgConnection,
    policy: &AccessPolicy,
    actor: Option<&User>,
    name: &str,
    input: &serde_json::Value,
) -> Result<ToolOutcome, ToolError> {
    match name {
        CREATE_PROJECT => create_project(conn, policy, actor, input),
        FIND_PROJECTS => find_projects(conn, actor, input),
        PROJECT_DETAILS => project_details(conn, actor, input),
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct CreateProjectInput {
    titre: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<ProjectStatus>,
    #[serde(default)]
    date_de_echeance: Option<String>,
    #[serde(default, rename = "authorIds")]
    author_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, PartialEq)]
struct ValidatedCreate {
    title: String,
    description: Option<String>,
    status: ProjectStatus,
    due_date: Option<chrono::NaiveDate>,
    author_ids: Vec<Uuid>,
}

fn validate_create_input(input: &serde_json::Value) -> Result<ValidatedCreate, ToolError> {
    let parsed: CreateProjectInput = serde_json::from_value(input.clone())
        .map_err(|e| ToolError::Validation(format!("Invalid input: {}", e)))?;

    let title = parsed.titre.trim().to_string();
    if title.is_empty() {
        return Err(ToolError::Validation(
            "Title must not be empty.".to_string(),
        ));
    }

    let due_date = match parsed.date_de_echeance.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_flexible_date(raw).ok_or_else(|| {
            ToolError::Validation(format!(
                "Unparseable due date \"{}\"; expected YYYY-MM-DD.",
                raw
            ))
        })?),
    };

    let description = parsed
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(ValidatedCreate {
        title,
        description,
        status: parsed.status.unwrap_or(ProjectStatus::Idea),
        due_date,
        author_ids: parsed.author_ids.unwrap_or_default(),
    })
}

fn create_project(
    conn: &mut PgConnection,
    policy: &AccessPolicy,
    actor: Option<&User>,
    input: &serde_json::Value,
) -> Result<ToolOutcome, ToolError> {
    let validated = validate_create_input(input)?;

    let actor = actor.ok_or(ToolError::AuthRequired)?;
    if !policy.authorize(actor.role, Operation::CreateProject) {
        return Err(ToolError::Denied);
    }

    let author_ids = query::resolve_author_ids(conn, &validated.author_ids, policy.author_id_validation)
        .map_err(|e| match e {
            AuthorIdError::Unknown(ids) => ToolError::Validation(format!(
                "Unknown author ids: {}",
                ids.iter()
                    .map(Uuid::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            AuthorIdError::Db(e) => ToolError::Db(e),
        })?;

    let project: Project = conn.transaction(|conn| {
        let project: Project = diesel::insert_into(projects::table)
            .values(&NewProject {
                title: validated.title.clone(),
                description: validated.description.clone(),
                status: validated.status,
                due_date: validated.due_date,
                owner_id: actor.id,
            })
            .get_result(conn)?;

        query::replace_authors(conn, project.id, &author_ids)?;

        Ok::<_, diesel::result::Error>(project)
    })?;

    tracing::info!(
        project_id = %project.id,
        user_id = %actor.id,
        "Assistant created project"
    );

    let detailed = query::with_authors(conn, vec![project])?
        .pop()
        .ok_or_else(|| ToolError::Serde("created project vanished".to_string()))?;

    let summary = format!(
        "Created project \"{}\" — {} — {} — authors: {}.",
        detailed.project.title,
        detailed.project.status,
        due_date_label(&detailed.project),
        author_names_label(&detailed, usize::MAX),
    );

    let value = serde_json::to_value(&detailed)
        .map(|project| json!({ "project": project }))
        .map_err(|e| ToolError::Serde(e.to_string()))?;

    Ok(ToolOutcome { value, summary })
}

#[derive(Debug, Deserialize)]
struct FindProjectsInput {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    status: Option<ProjectStatus>,
    #[serde(default, rename = "authorName")]
    author_name: Option<String>,
}

fn find_projects(
    conn: &mut PgConnection,
    actor: Option<&User>,
    input: &serde_json::Value,
) -> Result<ToolOutcome, ToolError> {
    let parsed: FindProjectsInput = serde_json::from_value(input.clone())
        .map_err(|e| ToolError::Validation(format!("Invalid input: {}", e)))?;

    let Some(actor) = actor else {
        // Read tools degrade to an empty result with an explanatory
        // summary instead of failing the conversation.
        return Ok(ToolOutcome {
            value: json!({ "projects": [], "counts": {} }),
            summary: "Error: authentication required to run this search.".to_string(),
        });
    };

    let plan = SearchPlan::compose(
        parsed.query.as_deref(),
        parsed.status,
        parsed.author_name.as_deref(),
    );

    let rows = query::search_visible(conn, actor.id, &plan, TOOL_SEARCH_LIMIT)?;
    let detailed = query::with_authors(conn, rows)?;
    let counts = query::status_counts(conn, actor.id)?;

    let counts_map: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), json!(count)))
        .collect();

    let summary = find_summary(&actor.name, &parsed, &detailed);

    let value = serde_json::to_value(&detailed)
        .map(|projects| json!({ "projects": projects, "counts": counts_map }))
        .map_err(|e| ToolError::Serde(e.to_string()))?;

    Ok(ToolOutcome { value, summary })
}

fn find_summary(actor_name: &str, input: &FindProjectsInput, rows: &[ProjectWithAuthors]) -> String {
    let mut lines = vec![format!("Projects matching your request ({}).", actor_name)];

    if let Some(status) = input.status {
        lines.push(format!("Status filter: {}.", status));
    }
    if let Some(author) = &input.author_name {
        lines.push(format!("Author filter: {}.", author));
    }
    lines.push(format!(
        "Results: {} project(s) shown (limit {}).",
        rows.len(),
        TOOL_SEARCH_LIMIT
    ));

    for row in rows {
        lines.push(project_line(row));
    }

    lines.join("\n")
}

fn project_line(row: &ProjectWithAuthors) -> String {
    format!(
        "• {} — {} — {} — authors: {} — {}",
        row.project.title,
        row.project.status,
        due_date_label(&row.project),
        author_names_label(row, 3),
        description_label(&row.project),
    )
}

fn due_date_label(project: &Project) -> String {
    project
        .due_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "no due date".to_string())
}

fn author_names_label(row: &ProjectWithAuthors, max: usize) -> String {
    if row.authors.is_empty() {
        return "—".to_string();
    }
    row.authors
        .iter()
        .take(max)
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn description_label(project: &Project) -> String {
    match &project.description {
        None => "—".to_string(),
        Some(description) if description.chars().count() > 120 => {
            let truncated: String = description.chars().take(120).collect();
            format!("{}...", truncated)
        }
        Some(description) => description.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct ProjectLookupInput {
    #[serde(rename = "inputOfSearch")]
    input_of_search: String,
}

fn project_details(
    conn: &mut PgConnection,
    actor: Option<&User>,
    input: &serde_json::Value,
) -> Result<ToolOutcome, ToolError> {
    let parsed: ProjectLookupInput = serde_json::from_value(input.clone())
        .map_err(|e| ToolError::Validation(format!("Invalid input: {}", e)))?;

    let needle = parsed.input_of_search.trim().to_string();
    if needle.is_empty() {
        return Err(ToolError::Validation(
            "inputOfSearch must not be empty.".to_string(),
        ));
    }

    let Some(actor) = actor else {
        return Ok(ToolOutcome {
            value: json!({ "project": null }),
            summary: "Authentication required.".to_string(),
        });
    };

    // Title/description containment first; a date-only lookup as a
    // fallback when the text reads as a date.
    let text_plan = SearchPlan {
        text: Some(TextTerm::Free {
            text: needle.clone(),
            as_date: None,
        }),
        status: None,
        author_name: None,
    };

    let mut found = query::search_visible(conn, actor.id, &text_plan, 1)?.pop();

    if found.is_none() {
        if let Some(date) = parse_flexible_date(&needle) {
            found = query::find_visible_due_on(conn, actor.id, date)?;
        }
    }

    let Some(project) = found else {
        return Ok(ToolOutcome {
            value: json!({ "project": null }),
            summary: format!(
                "No project found for \"{}\" among the projects you own.",
                needle
            ),
        });
    };

    let detailed = query::with_authors(conn, vec![project])?
        .pop()
        .ok_or_else(|| ToolError::Serde("project vanished during load".to_string()))?;

    let summary = details_summary(&detailed);

    let value = serde_json::to_value(&detailed)
        .map(|project| json!({ "project": project }))
        .map_err(|e| ToolError::Serde(e.to_string()))?;

    Ok(ToolOutcome { value, summary })
}

fn details_summary(row: &ProjectWithAuthors) -> String {
    format!(
        "Project \"{}\" — status: {} — due: {} — authors: {}. Description: {}",
        row.project.title,
        row.project.status,
        due_date_label(&row.project),
        author_names_label(row, usize::MAX),
        row.project
            .description
            .as_deref()
            .unwrap_or("—"),
    )
}
