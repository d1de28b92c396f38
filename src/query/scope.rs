//! Ownership filter builder.
//!
//! Visibility of projects in the search/tool layer is scoped to the acting
//! user: only projects whose `owner_id` references that user are readable.
//! The predicate is side-effect-free and must only ever be combined with
//! other predicates via AND — OR would widen visibility. It is applied to
//! every read, including for ADMIN.

use diesel::prelude::*;
use uuid::Uuid;

use super::ProjectPredicate;
use crate::schema::projects;

/// Predicate restricting projects to those owned by `owner_id`.
pub fn owned_by(owner_id: Uuid) -> ProjectPredicate {
    Box::new(projects::owner_id.eq(owner_id).nullable())
}
