//! Seeds the database with sample authors, an admin account, and two
//! sample projects.

use chrono::{Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use atelier::auth::password::PasswordService;
use atelier::models::{NewAuthor, NewProject, NewUser, ProjectStatus, UserRole};
use atelier::schema::{authors, projects, users};

fn main() {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let mut conn = PgConnection::establish(&database_url)
        .unwrap_or_else(|e| panic!("Failed to connect to {}: {}", database_url, e));

    seed(&mut conn).expect("Seeding failed");

    println!("Seed complete");
}

fn seed(conn: &mut PgConnection) -> Result<(), diesel::result::Error> {
    let sample_authors = [
        ("Amina Diop", "amina@example.com"),
        ("Jean Paul", "jean@example.com"),
        ("Fatou K.", "fatou@example.com"),
    ];

    for (name, email) in sample_authors {
        let exists: Option<Uuid> = authors::table
            .filter(authors::email.eq(email))
            .select(authors::id)
            .first(conn)
            .optional()?;

        if exists.is_none() {
            diesel::insert_into(authors::table)
                .values(&NewAuthor {
                    name: name.to_string(),
                    email: email.to_string(),
                })
                .execute(conn)?;
            println!("Created author {}", name);
        }
    }

    // Admin account: admin@example.com / admin123
    let admin_id: Uuid = match users::table
        .filter(users::email.eq("admin@example.com"))
        .select(users::id)
        .first(conn)
        .optional()?
    {
        Some(id) => id,
        None => {
            let password_hash = PasswordService::hash_password("admin123")
                .expect("Password hashing should succeed");

            let id = diesel::insert_into(users::table)
                .values(&NewUser {
                    name: "Admin".to_string(),
                    email: "admin@example.com".to_string(),
                    password_hash,
                    role: UserRole::Admin,
                })
                .returning(users::id)
                .get_result(conn)?;
            println!("Created admin user");
            id
        }
    };

    let sample_projects = [
        NewProject {
            title: "Portail de paiement local".to_string(),
            description: Some(
                "Intégration mobile-money + stablecoin pour transferts intra-Afrique.".to_string(),
            ),
            status: ProjectStatus::InProgress,
            due_date: Some((Utc::now() + Duration::days(30)).date_naive()),
            owner_id: admin_id,
        },
        NewProject {
            title: "Dashboard RH".to_string(),
            description: Some(
                "Tableau de bord pour la gestion des congés et des paies.".to_string(),
            ),
            status: ProjectStatus::Idea,
            due_date: None,
            owner_id: admin_id,
        },
    ];

    for project in sample_projects {
        let exists: Option<Uuid> = projects::table
            .filter(projects::title.eq(&project.title))
            .select(projects::id)
            .first(conn)
            .optional()?;

        if exists.is_none() {
            diesel::insert_into(projects::table)
                .values(&project)
                .execute(conn)?;
            println!("Created project {}", project.title);
        }
    }

    Ok(())
}
