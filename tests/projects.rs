//! Project management integration tests.
//!
//! These tests verify role-gated mutations, ownership-scoped reads, search
//! disambiguation, and the full-replacement update semantics.

mod common;

use common::{create_test_user, TestApp, TestUser};
use serde_json::json;
use serial_test::serial;

use atelier::models::UserRole;

async fn create_simple_project(
    app: &TestApp,
    user: &TestUser,
    title: &str,
    body_extra: serde_json::Value,
) -> serde_json::Value {
    let mut body = json!({ "title": title });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), body_extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let response = app.create_project(user, body).await;
    assert_eq!(response.status().as_u16(), 200, "project creation failed");
    response.json().await.expect("Failed to parse response")
}

// ============================================================================
// Creation Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn create_project_defaults_status_and_owner() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    // Act
    let body = create_simple_project(&app, &user, "Portail", json!({})).await;

    // Assert: status defaults to IDEA, no authors, owner is the creator.
    assert_eq!(body["project"]["title"].as_str().unwrap(), "Portail");
    assert_eq!(body["project"]["status"].as_str().unwrap(), "IDEA");
    assert!(body["authors"].as_array().unwrap().is_empty());
    assert_eq!(body["owner"].as_str().unwrap(), user.name);
    assert_eq!(
        body["project"]["owner_id"].as_str().unwrap(),
        user.id.to_string()
    );
}

#[tokio::test]
#[serial]
async fn create_project_rejects_empty_title() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let response = app.create_project(&user, json!({"title": "   "})).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[serial]
async fn create_project_requires_authentication() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public("/projects", json!({"title": "Test Project"}))
        .await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn create_project_drops_unknown_author_ids_under_lenient_policy() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let body = create_simple_project(
        &app,
        &user,
        "Projet auteurs",
        json!({"author_ids": [uuid::Uuid::new_v4().to_string()]}),
    )
    .await;

    assert!(body["authors"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn create_project_associates_existing_authors() {
    // Arrange: registration mirrors users into the authors table.
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let authors_response = app.get("/authors", &user.access_token).await;
    let authors: serde_json::Value = authors_response.json().await.unwrap();
    let author_id = authors["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["email"].as_str() == Some(user.email.as_str()))
        .expect("registration should have created an author row")["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Act
    let body = create_simple_project(
        &app,
        &user,
        "Projet avec auteur",
        json!({"author_ids": [author_id]}),
    )
    .await;

    // Assert
    let listed = body["authors"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["email"].as_str().unwrap(), user.email);
}

// ============================================================================
// Role Policy Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn create_is_rejected_below_minimum_role_without_mutation() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;
    let downgraded = app.set_user_role(&user, UserRole::User).await;

    // Act
    let response = app
        .create_project(&downgraded, json!({"title": "Interdit"}))
        .await;

    // Assert: denied, and nothing was created.
    assert_eq!(response.status().as_u16(), 403);

    let listing = app.get("/projects", &downgraded.access_token).await;
    let body: serde_json::Value = listing.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn delete_requires_admin() {
    // Arrange
    let app = TestApp::spawn().await;
    let manager = create_test_user(&app).await;
    let created = create_simple_project(&app, &manager, "A supprimer", json!({})).await;
    let project_id = created["project"]["id"].as_str().unwrap().to_string();

    // Act: a MANAGER may create but not delete.
    let denied = app
        .delete(&format!("/projects/{}", project_id), &manager.access_token)
        .await;
    assert_eq!(denied.status().as_u16(), 403);

    // An ADMIN may.
    let admin = app.set_user_role(&manager, UserRole::Admin).await;
    let allowed = app
        .delete(&format!("/projects/{}", project_id), &admin.access_token)
        .await;
    assert_eq!(allowed.status().as_u16(), 204);
}

#[tokio::test]
#[serial]
async fn update_is_role_gated_not_ownership_gated() {
    // Arrange: two managers; B edits A's project.
    let app = TestApp::spawn().await;
    let user_a = create_test_user(&app).await;
    let user_b = create_test_user(&app).await;

    let created = create_simple_project(&app, &user_a, "Projet de A", json!({})).await;
    let project_id = created["project"]["id"].as_str().unwrap().to_string();

    // Act
    let response = app
        .put(
            &format!("/projects/{}", project_id),
            &user_b.access_token,
            json!({"title": "Modifié par B", "status": "REVIEW"}),
        )
        .await;

    // Assert: write authorization is role-based.
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["project"]["title"].as_str().unwrap(), "Modifié par B");
    // Ownership is assigned once at creation and never reassigned.
    assert_eq!(
        body["project"]["owner_id"].as_str().unwrap(),
        user_a.id.to_string()
    );
}

// ============================================================================
// Update Semantics Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn update_replaces_fields_and_author_list() {
    // Arrange
    let app = TestApp::spawn().await;
    let user_a = create_test_user(&app).await;
    let user_b = create_test_user(&app).await;

    let authors_response = app.get("/authors", &user_a.access_token).await;
    let authors: serde_json::Value = authors_response.json().await.unwrap();
    let find_author = |email: &str| {
        authors["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["email"].as_str() == Some(email))
            .expect("author row missing")["id"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let author_a = find_author(&user_a.email);
    let author_b = find_author(&user_b.email);

    let created = create_simple_project(
        &app,
        &user_a,
        "Avant",
        json!({"author_ids": [author_a], "due_date": "2025-03-01", "status": "IN_PROGRESS"}),
    )
    .await;
    let project_id = created["project"]["id"].as_str().unwrap().to_string();

    // Act: full replacement, old associations not re-supplied.
    let response = app
        .put(
            &format!("/projects/{}", project_id),
            &user_a.access_token,
            json!({"title": "Après", "status": "DONE", "author_ids": [author_b]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    // Assert: immediate read returns the new values only.
    let detail = app
        .get(&format!("/projects/{}", project_id), &user_a.access_token)
        .await;
    let body: serde_json::Value = detail.json().await.unwrap();

    assert_eq!(body["project"]["title"].as_str().unwrap(), "Après");
    assert_eq!(body["project"]["status"].as_str().unwrap(), "DONE");
    assert!(body["project"]["due_date"].is_null());

    let listed = body["authors"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["email"].as_str().unwrap(), user_b.email);
}

#[tokio::test]
#[serial]
async fn any_status_transition_is_allowed() {
    // DONE back to IDEA is fine; no transition graph is enforced.
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let created =
        create_simple_project(&app, &user, "Cycle", json!({"status": "DONE"})).await;
    let project_id = created["project"]["id"].as_str().unwrap().to_string();

    let response = app
        .put(
            &format!("/projects/{}", project_id),
            &user.access_token,
            json!({"title": "Cycle", "status": "IDEA"}),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["project"]["status"].as_str().unwrap(), "IDEA");
}

#[tokio::test]
#[serial]
async fn update_missing_project_returns_404() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let response = app
        .put(
            &format!("/projects/{}", uuid::Uuid::new_v4()),
            &user.access_token,
            json!({"title": "Fantôme"}),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
}

// ============================================================================
// Deletion Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn delete_is_idempotent_via_not_found() {
    // Arrange: a project with one author association.
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;
    let admin = app.set_user_role(&user, UserRole::Admin).await;

    let authors_response = app.get("/authors", &admin.access_token).await;
    let authors: serde_json::Value = authors_response.json().await.unwrap();
    let author_id = authors["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["email"].as_str() == Some(admin.email.as_str()))
        .expect("author row missing")["id"]
        .as_str()
        .unwrap()
        .to_string();

    let created = create_simple_project(
        &app,
        &admin,
        "Ephémère",
        json!({"author_ids": [author_id]}),
    )
    .await;
    let project_id = created["project"]["id"].as_str().unwrap().to_string();
    let project_uuid: uuid::Uuid = project_id.parse().unwrap();
    assert_eq!(app.count_project_authors(project_uuid), 1);

    // Act
    let first = app
        .delete(&format!("/projects/{}", project_id), &admin.access_token)
        .await;
    assert_eq!(first.status().as_u16(), 204);

    // The association rows are gone with the project.
    assert_eq!(app.count_project_authors(project_uuid), 0);

    // A subsequent lookup reports not-found...
    let lookup = app
        .get(&format!("/projects/{}", project_id), &admin.access_token)
        .await;
    assert_eq!(lookup.status().as_u16(), 404);

    // ...and so does a second delete.
    let second = app
        .delete(&format!("/projects/{}", project_id), &admin.access_token)
        .await;
    assert_eq!(second.status().as_u16(), 404);
}

// ============================================================================
// Ownership Isolation Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn users_only_see_their_own_projects() {
    // Arrange
    let app = TestApp::spawn().await;
    let user_a = create_test_user(&app).await;
    let user_b = create_test_user(&app).await;

    create_simple_project(&app, &user_a, "Projet de A", json!({})).await;
    create_simple_project(&app, &user_b, "Projet de B", json!({})).await;

    // Act / Assert: listings are disjoint.
    let listing_a = app.get("/projects", &user_a.access_token).await;
    let body_a: serde_json::Value = listing_a.json().await.unwrap();
    let titles_a: Vec<&str> = body_a["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["project"]["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles_a, vec!["Projet de A"]);

    // And search as A never surfaces B's project.
    let search = app
        .get("/projects/search?search=Projet", &user_a.access_token)
        .await;
    let results: serde_json::Value = search.json().await.unwrap();
    let titles: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["project"]["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"Projet de A"));
    assert!(!titles.contains(&"Projet de B"));
}

// ============================================================================
// Search Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn search_status_keyword_filters_without_substring_matching() {
    // Arrange: one DONE project, and one whose TITLE contains "done".
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    create_simple_project(&app, &user, "Livré", json!({"status": "DONE"})).await;
    create_simple_project(&app, &user, "done deal draft", json!({"status": "IDEA"})).await;

    // Act: free text "done" (case-insensitive keyword).
    let response = app
        .get("/projects/search?search=done", &user.access_token)
        .await;
    assert_eq!(response.status().as_u16(), 200);

    // Assert: exactly the DONE project; no title substring matching.
    let results: serde_json::Value = response.json().await.unwrap();
    let titles: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["project"]["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Livré"]);
}

#[tokio::test]
#[serial]
async fn search_date_text_matches_due_date_and_substrings() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    create_simple_project(
        &app,
        &user,
        "Echéance mars",
        json!({"due_date": "2025-03-01"}),
    )
    .await;
    create_simple_project(&app, &user, "Note 2025-03-01 dans le titre", json!({})).await;
    create_simple_project(&app, &user, "Sans rapport", json!({})).await;

    // Act
    let response = app
        .get("/projects/search?search=2025-03-01", &user.access_token)
        .await;
    assert_eq!(response.status().as_u16(), 200);

    // Assert: due-date match and substring match, nothing else.
    let results: serde_json::Value = response.json().await.unwrap();
    let titles: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["project"]["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"Echéance mars"));
    assert!(titles.contains(&"Note 2025-03-01 dans le titre"));
    assert!(!titles.contains(&"Sans rapport"));
}

#[tokio::test]
#[serial]
async fn search_explicit_status_filter_is_scoped_and_sorted() {
    // Arrange
    let app = TestApp::spawn().await;
    let user_a = create_test_user(&app).await;
    let user_b = create_test_user(&app).await;

    create_simple_project(&app, &user_a, "Ancien", json!({"status": "IN_PROGRESS"})).await;
    let recent =
        create_simple_project(&app, &user_a, "Récent", json!({"status": "IN_PROGRESS"})).await;
    create_simple_project(&app, &user_a, "Autre statut", json!({"status": "DONE"})).await;
    create_simple_project(&app, &user_b, "De B", json!({"status": "IN_PROGRESS"})).await;

    // Touch the recent project so it sorts first.
    let recent_id = recent["project"]["id"].as_str().unwrap().to_string();
    app.put(
        &format!("/projects/{}", recent_id),
        &user_a.access_token,
        json!({"title": "Récent", "status": "IN_PROGRESS"}),
    )
    .await;

    // Act
    let response = app
        .get(
            "/projects/search?status=IN_PROGRESS",
            &user_a.access_token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    // Assert: only A's IN_PROGRESS projects, most recently updated first.
    let results: serde_json::Value = response.json().await.unwrap();
    let titles: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["project"]["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Récent", "Ancien"]);
}

#[tokio::test]
#[serial]
async fn search_rejects_unknown_status() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    let response = app
        .get("/projects/search?status=CANCELLED", &user.access_token)
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[serial]
async fn search_status_all_means_unfiltered() {
    let app = TestApp::spawn().await;
    let user = create_test_user(&app).await;

    create_simple_project(&app, &user, "Un", json!({"status": "IDEA"})).await;
    create_simple_project(&app, &user, "Deux", json!({"status": "DONE"})).await;

    let response = app
        .get("/projects/search?status=all", &user.access_token)
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let results: serde_json::Value = response.json().await.unwrap();
    assert_eq!(results.as_array().unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn search_requires_authentication() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/projects/search?search=portail").await;
    assert_eq!(response.status().as_u16(), 401);
}
