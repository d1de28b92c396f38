use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Privilege level of a user account. The ordering is total:
/// `User < Manager < Admin`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsExpression,
    FromSqlRow,
    ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    User,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Manager => "MANAGER",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(UserRole::User),
            "MANAGER" => Ok(UserRole::Manager),
            "ADMIN" => Ok(UserRole::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Pg> for UserRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for UserRole {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        UserRole::from_str(&value).map_err(Into::into)
    }
}

/// Lifecycle stage of a project. Any status may be set at update time;
/// no transition graph is enforced.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsExpression,
    FromSqlRow,
    ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Idea,
    InProgress,
    Review,
    Done,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Idea,
        ProjectStatus::InProgress,
        ProjectStatus::Review,
        ProjectStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Idea => "IDEA",
            ProjectStatus::InProgress => "IN_PROGRESS",
            ProjectStatus::Review => "REVIEW",
            ProjectStatus::Done => "DONE",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IDEA" => Ok(ProjectStatus::Idea),
            "IN_PROGRESS" => Ok(ProjectStatus::InProgress),
            "REVIEW" => Ok(ProjectStatus::Review),
            "DONE" => Ok(ProjectStatus::Done),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Pg> for ProjectStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ProjectStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        ProjectStatus::from_str(&value).map_err(Into::into)
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

/// A contributor record, distinct from a user account. Registration also
/// creates a matching author row with the same name and email.
#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::authors)]
pub struct Author {
    pub id: Uuid,
    #[schema(example = "Amina Diop")]
    pub name: String,
    #[schema(example = "amina@example.com")]
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::authors)]
pub struct NewAuthor {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: Uuid,
    #[schema(example = "Portail de paiement local")]
    pub title: String,
    #[schema(example = "Mobile-money integration for intra-team transfers")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub due_date: Option<NaiveDate>,
    pub owner_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::projects)]
pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub due_date: Option<NaiveDate>,
    pub owner_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_authors)]
pub struct NewProjectAuthor {
    pub project_id: Uuid,
    pub author_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering_is_total() {
        assert!(UserRole::User < UserRole::Manager);
        assert!(UserRole::Manager < UserRole::Admin);
        assert!(UserRole::Admin >= UserRole::Admin);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::User, UserRole::Manager, UserRole::Admin] {
            assert_eq!(UserRole::from_str(role.as_str()).unwrap(), role);
        }
        assert_eq!(UserRole::from_str("manager").unwrap(), UserRole::Manager);
        assert!(UserRole::from_str("SUPERADMIN").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in ProjectStatus::ALL {
            assert_eq!(ProjectStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert_eq!(
            ProjectStatus::from_str("in_progress").unwrap(),
            ProjectStatus::InProgress
        );
        assert!(ProjectStatus::from_str("CANCELLED").is_err());
    }

    #[test]
    fn test_status_serde_wire_format() {
        let json = serde_json::to_string(&ProjectStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");

        let parsed: ProjectStatus = serde_json::from_str("\"DONE\"").unwrap();
        assert_eq!(parsed, ProjectStatus::Done);

        assert!(serde_json::from_str::<ProjectStatus>("\"BOGUS\"").is_err());
    }
}
