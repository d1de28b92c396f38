//! Authorization-scoped project queries.
//!
//! Everything the search endpoint and the assistant tools read goes through
//! this module: the ownership scope is ANDed onto every query built here,
//! results are capped at fixed page sizes, and ordering is always
//! most-recently-updated first.

pub mod scope;
pub mod search;

use std::collections::HashMap;

use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Nullable};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Author, NewProjectAuthor, Project, ProjectStatus};
use crate::policy::AuthorIdValidation;
use crate::schema::{authors, project_authors, projects, users};
use search::{SearchPlan, TextTerm};

/// Result caps are a fixed contract, not caller-configurable.
pub const TOOL_SEARCH_LIMIT: i64 = 20;
pub const REST_SEARCH_LIMIT: i64 = 100;
pub const LISTING_LIMIT: i64 = 50;

/// A boxed predicate over the projects table. All predicates are
/// normalized to `Nullable<Bool>` so text, date, and subquery clauses
/// compose uniformly.
pub type ProjectPredicate =
    Box<dyn BoxableExpression<projects::table, Pg, SqlType = Nullable<Bool>>>;

/// A project together with its owner's display name and associated authors.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectWithAuthors {
    pub project: Project,
    #[schema(example = "Amina Diop")]
    pub owner: String,
    pub authors: Vec<Author>,
}

/// Lowers a search plan into a boxed query scoped to the owner. Clauses are
/// combined with AND; an empty plan matches all of the owner's projects.
pub fn visible_query(
    owner_id: Uuid,
    plan: &SearchPlan,
    limit: i64,
) -> projects::BoxedQuery<'static, Pg> {
    let mut query = projects::table.into_boxed();

    query = query.filter(scope::owned_by(owner_id));

    if let Some(term) = &plan.text {
        query = query.filter(text_predicate(term));
    }
    if let Some(status) = plan.status {
        query = query.filter(projects::status.eq(status).nullable());
    }
    if let Some(name) = &plan.author_name {
        query = query.filter(author_predicate(name));
    }

    query
        .order(projects::updated_at.desc())
        .limit(limit.min(REST_SEARCH_LIMIT))
}

fn text_predicate(term: &TextTerm) -> ProjectPredicate {
    match term {
        // A status keyword is an implicit status filter; no substring
        // matching happens in that case.
        TextTerm::StatusKeyword(status) => Box::new(projects::status.eq(*status).nullable()),
        TextTerm::Free { text, as_date } => {
            let pattern = format!("%{}%", text);
            let mut group: ProjectPredicate = Box::new(
                projects::title
                    .ilike(pattern.clone())
                    .nullable()
                    .or(projects::description.ilike(pattern).nullable()),
            );
            if let Some(date) = as_date {
                group = Box::new(group.or(projects::due_date.eq(Some(*date)).nullable()));
            }
            group
        }
    }
}

fn author_predicate(name: &str) -> ProjectPredicate {
    let pattern = format!("%{}%", name);

    let matching_author_ids = authors::table
        .filter(authors::name.ilike(pattern.clone()))
        .select(authors::id);
    let via_association = projects::id.eq_any(
        project_authors::table
            .filter(project_authors::author_id.eq_any(matching_author_ids))
            .select(project_authors::project_id),
    );

    let via_owner = projects::owner_id.eq_any(
        users::table
            .filter(users::name.ilike(pattern))
            .select(users::id),
    );

    Box::new(via_association.nullable().or(via_owner.nullable()))
}

pub fn search_visible(
    conn: &mut PgConnection,
    owner_id: Uuid,
    plan: &SearchPlan,
    limit: i64,
) -> QueryResult<Vec<Project>> {
    visible_query(owner_id, plan, limit).load(conn)
}

pub fn list_visible(conn: &mut PgConnection, owner_id: Uuid) -> QueryResult<Vec<Project>> {
    search_visible(conn, owner_id, &SearchPlan::empty(), LISTING_LIMIT)
}

pub fn find_visible_by_id(
    conn: &mut PgConnection,
    owner_id: Uuid,
    project_id: Uuid,
) -> QueryResult<Option<Project>> {
    projects::table
        .filter(projects::owner_id.eq(owner_id))
        .filter(projects::id.eq(project_id))
        .first(conn)
        .optional()
}

pub fn find_visible_due_on(
    conn: &mut PgConnection,
    owner_id: Uuid,
    date: chrono::NaiveDate,
) -> QueryResult<Option<Project>> {
    projects::table
        .filter(projects::owner_id.eq(owner_id))
        .filter(projects::due_date.eq(Some(date)).nullable())
        .order(projects::updated_at.desc())
        .first(conn)
        .optional()
}

/// Per-status counts of the owner's projects.
pub fn status_counts(
    conn: &mut PgConnection,
    owner_id: Uuid,
) -> QueryResult<Vec<(ProjectStatus, i64)>> {
    projects::table
        .filter(projects::owner_id.eq(owner_id))
        .group_by(projects::status)
        .select((projects::status, count_star()))
        .load(conn)
}

/// Loads owner names and associated authors for a page of projects.
pub fn with_authors(
    conn: &mut PgConnection,
    projects_list: Vec<Project>,
) -> QueryResult<Vec<ProjectWithAuthors>> {
    let project_ids: Vec<Uuid> = projects_list.iter().map(|p| p.id).collect();
    let owner_ids: Vec<Uuid> = projects_list.iter().map(|p| p.owner_id).collect();

    let association_rows: Vec<(Uuid, Author)> = project_authors::table
        .inner_join(authors::table)
        .filter(project_authors::project_id.eq_any(&project_ids))
        .select((project_authors::project_id, Author::as_select()))
        .load(conn)?;

    let owner_rows: Vec<(Uuid, String)> = users::table
        .filter(users::id.eq_any(&owner_ids))
        .select((users::id, users::name))
        .load(conn)?;

    let owners: HashMap<Uuid, String> = owner_rows.into_iter().collect();
    let mut by_project: HashMap<Uuid, Vec<Author>> = HashMap::new();
    for (project_id, author) in association_rows {
        by_project.entry(project_id).or_default().push(author);
    }

    Ok(projects_list
        .into_iter()
        .map(|project| {
            let authors = by_project.remove(&project.id).unwrap_or_default();
            let owner = owners.get(&project.owner_id).cloned().unwrap_or_default();
            ProjectWithAuthors {
                project,
                owner,
                authors,
            }
        })
        .collect())
}

/// Checks requested author ids against existing rows. Under the lenient
/// policy unknown ids are dropped; under the strict policy they are an
/// error carrying the offending ids. Duplicates are collapsed either way
/// to satisfy the unique (project, author) constraint.
pub fn resolve_author_ids(
    conn: &mut PgConnection,
    requested: &[Uuid],
    validation: AuthorIdValidation,
) -> Result<Vec<Uuid>, AuthorIdError> {
    let mut unique: Vec<Uuid> = requested.to_vec();
    unique.sort();
    unique.dedup();

    if unique.is_empty() {
        return Ok(Vec::new());
    }

    let existing: Vec<Uuid> = authors::table
        .filter(authors::id.eq_any(&unique))
        .select(authors::id)
        .load(conn)
        .map_err(AuthorIdError::Db)?;

    match validation {
        AuthorIdValidation::Lenient => Ok(existing),
        AuthorIdValidation::Strict => {
            let unknown: Vec<Uuid> = unique
                .iter()
                .filter(|id| !existing.contains(id))
                .copied()
                .collect();
            if unknown.is_empty() {
                Ok(existing)
            } else {
                Err(AuthorIdError::Unknown(unknown))
            }
        }
    }
}

#[derive(Debug)]
pub enum AuthorIdError {
    Unknown(Vec<Uuid>),
    Db(diesel::result::Error),
}

/// Full replacement of a project's author associations: delete-all then
/// insert-all, no diffing.
pub fn replace_authors(
    conn: &mut PgConnection,
    project_id: Uuid,
    author_ids: &[Uuid],
) -> QueryResult<()> {
    diesel::delete(project_authors::table.filter(project_authors::project_id.eq(project_id)))
        .execute(conn)?;

    if !author_ids.is_empty() {
        let rows: Vec<NewProjectAuthor> = author_ids
            .iter()
            .map(|&author_id| NewProjectAuthor {
                project_id,
                author_id,
            })
            .collect();
        diesel::insert_into(project_authors::table)
            .values(&rows)
            .execute(conn)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_of(plan: &SearchPlan, limit: i64) -> String {
        let query = visible_query(Uuid::nil(), plan, limit);
        diesel::debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn test_every_query_is_ownership_scoped() {
        let plans = [
            SearchPlan::empty(),
            SearchPlan::compose(Some("portal"), None, None),
            SearchPlan::compose(Some("DONE"), None, None),
            SearchPlan::compose(None, Some(ProjectStatus::Review), Some("amina")),
        ];

        for plan in &plans {
            let sql = sql_of(plan, TOOL_SEARCH_LIMIT);
            assert!(sql.contains("owner_id"), "missing ownership scope: {sql}");
            assert!(sql.contains("updated_at"), "missing fixed ordering: {sql}");
        }
    }

    #[test]
    fn test_free_text_uses_case_insensitive_containment() {
        let sql = sql_of(&SearchPlan::compose(Some("portal"), None, None), 20);
        assert!(sql.contains("ILIKE"), "expected ILIKE in: {sql}");
        assert!(sql.contains("title"));
        assert!(sql.contains("description"));
    }

    #[test]
    fn test_status_keyword_suppresses_substring_search() {
        let sql = sql_of(&SearchPlan::compose(Some("done"), None, None), 20);
        assert!(!sql.contains("ILIKE"), "unexpected substring match: {sql}");
        assert!(sql.contains("status"));
    }

    #[test]
    fn test_date_text_adds_due_date_branch() {
        let sql = sql_of(&SearchPlan::compose(Some("2025-03-01"), None, None), 20);
        assert!(sql.contains("ILIKE"));
        assert!(sql.contains("due_date"));
    }

    #[test]
    fn test_unparseable_date_text_has_no_due_date_branch() {
        let sql = sql_of(&SearchPlan::compose(Some("2025-13-40"), None, None), 20);
        assert!(sql.contains("ILIKE"));
        assert!(!sql.contains("due_date"));
    }

    #[test]
    fn test_author_filter_reaches_associations_and_owner() {
        let sql = sql_of(&SearchPlan::compose(None, None, Some("amina")), 20);
        assert!(sql.contains("project_authors"));
        assert!(sql.contains("users"));
    }

    #[test]
    fn test_limit_never_exceeds_rest_cap() {
        // The bound value is clamped before it reaches the query.
        let sql = sql_of(&SearchPlan::empty(), 5000);
        assert!(sql.contains("LIMIT"));
        assert!(sql.contains("100"), "limit not clamped: {sql}");
        assert!(!sql.contains("5000"));
    }
}
