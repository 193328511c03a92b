use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use opsdesk_auth::{JwtClaims, UserRole};
use opsdesk_core::{TenantId, UserId};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = opsdesk_api::app::build_app(jwt_secret.to_string());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, tenant_id: TenantId, sub: UserId, role: UserRole) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        tenant_id,
        role,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_jwt(jwt_secret: &str, tenant_id: TenantId) -> String {
    mint_jwt(jwt_secret, tenant_id, UserId::new(), UserRole::Admin)
}

/// The command path and projection update are intentionally decoupled, so
/// reads lag writes by a beat. Poll briefly until the projection catches up.
async fn get_json_eventually(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> serde_json::Value {
    for _ in 0..50 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();
        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("resource did not become visible in projection within timeout: {url}");
}

async fn wait_for_status(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    expected: StatusCode,
) {
    for _ in 0..50 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();
        if res.status() == expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("{url} never reached status {expected}");
}

/// Fetch a user once a given direct permission has landed in the read model.
async fn get_user_with_grant(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    user_id: &str,
    codename: &str,
) -> serde_json::Value {
    for _ in 0..50 {
        let user =
            get_json_eventually(client, &format!("{base_url}/users/{user_id}"), token).await;
        let granted = user["direct_permissions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == codename);
        if granted {
            return user;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("grant {codename} never became visible for user {user_id}");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("test-secret").await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn whoami_reflects_token_claims() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let user_id = UserId::new();
    let token = mint_jwt(jwt_secret, tenant_id, user_id, UserRole::Manager);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert_eq!(body["user_id"].as_str().unwrap(), user_id.to_string());
    assert_eq!(body["role"].as_str().unwrap(), "manager");
}

#[tokio::test]
async fn user_lifecycle_create_update_grant_delete() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = admin_jwt(jwt_secret, tenant_id);
    let client = reqwest::Client::new();

    // Create
    let res = client
        .post(format!("{}/users", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "email": "Alice@Example.COM ",
            "first_name": "Alice",
            "last_name": "Smith",
            "role": "employee",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // Email normalization is visible through the read model, and role
    // defaults materialize as direct grants (published just after create,
    // so poll for both).
    let user = get_user_with_grant(&client, &srv.base_url, &token, &id, "view_user").await;
    assert_eq!(user["email"].as_str().unwrap(), "alice@example.com");

    // Partial update
    let res = client
        .patch(format!("{}/users/{}", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "first_name": "Alicia" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Explicit grant
    let res = client
        .post(format!("{}/users/{}/permissions/grant", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "permissions": ["change_vendor"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let user = get_user_with_grant(&client, &srv.base_url, &token, &id, "change_vendor").await;
    assert_eq!(user["first_name"].as_str().unwrap(), "Alicia");

    // Delete removes the user from the directory.
    let res = client
        .delete(format!("{}/users/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    wait_for_status(
        &client,
        &format!("{}/users/{}", srv.base_url, id),
        &token,
        StatusCode::NOT_FOUND,
    )
    .await;
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    // No directory record: the employee role's default set applies, and it
    // does not include add_user.
    let token = mint_jwt(jwt_secret, tenant_id, UserId::new(), UserRole::Employee);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/users", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "email": "bob@example.com",
            "first_name": "Bob",
            "last_name": "Jones",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn employees_cannot_inspect_other_users_permissions() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let employee = mint_jwt(jwt_secret, tenant_id, UserId::new(), UserRole::Employee);

    let client = reqwest::Client::new();

    // Own permissions always work.
    let res = client
        .get(format!("{}/users/my-permissions", srv.base_url))
        .bearer_auth(&employee)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Someone else's do not.
    let other = UserId::new();
    let res = client
        .get(format!("{}/users/{}/permissions", srv.base_url, other))
        .bearer_auth(&employee)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cross_tenant_access_is_not_found() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();
    let token_a = admin_jwt(jwt_secret, tenant_a);
    let token_b = admin_jwt(jwt_secret, tenant_b);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/vendors", srv.base_url))
        .bearer_auth(&token_a)
        .json(&json!({ "display_name": "Acme Supplies" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    get_json_eventually(
        &client,
        &format!("{}/vendors/{}", srv.base_url, id),
        &token_a,
    )
    .await;

    // Same id, other tenant: 404 rather than 403, so existence never leaks.
    let res = client
        .get(format!("{}/vendors/{}", srv.base_url, id))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .patch(format!("{}/vendors/{}", srv.base_url, id))
        .bearer_auth(&token_b)
        .json(&json!({ "display_name": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn source_of_truth_reports_provenance() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = admin_jwt(jwt_secret, tenant_id);
    let client = reqwest::Client::new();

    // Employee user: role defaults become direct grants.
    let res = client
        .post(format!("{}/users", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "email": "carol@example.com",
            "first_name": "Carol",
            "last_name": "Reed",
            "role": "employee",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let user_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    get_user_with_grant(&client, &srv.base_url, &token, &user_id, "view_vendor").await;

    // Department granting change_vendor, with Carol as a member.
    let res = client
        .post(format!("{}/departments", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Procurement" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let dept_id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(format!(
            "{}/departments/{}/permissions/grant",
            srv.base_url, dept_id
        ))
        .bearer_auth(&token)
        .json(&json!({ "permissions": ["change_vendor"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!(
            "{}/departments/{}/members/add",
            srv.base_url, dept_id
        ))
        .bearer_auth(&token)
        .json(&json!({ "user_ids": [user_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Wait for membership to land in the projection.
    for _ in 0..50 {
        let dept = get_json_eventually(
            &client,
            &format!("{}/departments/{}", srv.base_url, dept_id),
            &token,
        )
        .await;
        if dept["members"].as_array().unwrap().iter().any(|m| m == user_id.as_str()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let report = get_json_eventually(
        &client,
        &format!(
            "{}/permissions/source-of-truth?user={}",
            srv.base_url, user_id
        ),
        &token,
    )
    .await;

    // Every declared category appears, with full model coverage.
    for category in ["accounting", "organisation", "purchase"] {
        assert!(report.get(category).is_some(), "missing category {category}");
    }

    let vendor_entries = report["purchase"]["vendor"].as_array().unwrap();
    let status_of = |codename: &str| {
        vendor_entries
            .iter()
            .find(|s| s["perm"]["codename"] == codename)
            .unwrap_or_else(|| panic!("codename {codename} not in report"))
    };

    // view_vendor: direct (employee default grant), active, not inherited.
    let view = status_of("view_vendor");
    assert_eq!(view["active"], true);
    assert_eq!(view["inherited"], false);

    // change_vendor: reaches the user only through the department.
    let change = status_of("change_vendor");
    assert_eq!(change["active"], true);
    assert_eq!(change["inherited"], true);

    // delete_vendor: declared but dormant.
    let delete = status_of("delete_vendor");
    assert_eq!(delete["active"], false);
    assert_eq!(delete["inherited"], false);
}

#[tokio::test]
async fn organisation_bulk_membership_counts_sum_to_batch() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    // Creating an organisation provisions a fresh tenant.
    let bootstrap = admin_jwt(jwt_secret, TenantId::new());
    let res = client
        .post(format!("{}/organisations", srv.base_url))
        .bearer_auth(&bootstrap)
        .json(&json!({ "name": "Acme Widgets Ltd" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let org_id = created["id"].as_str().unwrap().to_string();
    let tenant_id: TenantId = created["tenant_id"].as_str().unwrap().parse().unwrap();

    // Work inside the new tenant from here on.
    let token = admin_jwt(jwt_secret, tenant_id);
    let org = get_json_eventually(
        &client,
        &format!("{}/organisations/{}", srv.base_url, org_id),
        &token,
    )
    .await;
    assert_eq!(org["slug"].as_str().unwrap(), "acme-widgets-ltd");

    // Two real users in the tenant.
    let mut user_ids = Vec::new();
    for (email, first) in [("dora@example.com", "Dora"), ("eli@example.com", "Eli")] {
        let res = client
            .post(format!("{}/users", srv.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "email": email,
                "first_name": first,
                "last_name": "Test",
                "role": "employee",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let id = res.json::<serde_json::Value>().await.unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();
        get_json_eventually(&client, &format!("{}/users/{}", srv.base_url, id), &token).await;
        user_ids.push(id);
    }

    // Duplicates in the batch collapse: added + exist = deduplicated size.
    let res = client
        .post(format!("{}/organisations/add-users", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "user_ids": [user_ids[0], user_ids[1], user_ids[0]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["added"], 2);
    assert_eq!(body["exist"], 0);

    // Wait until membership is visible, then re-add.
    for _ in 0..50 {
        let org = get_json_eventually(
            &client,
            &format!("{}/organisations/{}", srv.base_url, org_id),
            &token,
        )
        .await;
        if org["members"].as_array().unwrap().iter().any(|m| m == user_ids[0].as_str()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let res = client
        .post(format!("{}/organisations/add-users", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "user_ids": [user_ids[0]] }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["added"], 0);
    assert_eq!(body["exist"], 1);

    // Remove one member and one stranger.
    let stranger = UserId::new().to_string();
    let res = client
        .post(format!("{}/organisations/remove-users", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "user_ids": [user_ids[0], stranger] }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["removed"], 1);
    assert_eq!(body["nonexistent"], 1);
}

#[tokio::test]
async fn organisation_rename_resyncs_tenant_name_and_slug() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let bootstrap = admin_jwt(jwt_secret, TenantId::new());
    let res = client
        .post(format!("{}/organisations", srv.base_url))
        .bearer_auth(&bootstrap)
        .json(&json!({ "name": "Acme Widgets" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let org_id = created["id"].as_str().unwrap().to_string();
    let tenant_id: TenantId = created["tenant_id"].as_str().unwrap().parse().unwrap();

    let token = admin_jwt(jwt_secret, tenant_id);
    let org_url = format!("{}/organisations/{}", srv.base_url, org_id);
    let org = get_json_eventually(&client, &org_url, &token).await;
    assert_eq!(org["slug"].as_str().unwrap(), "acme-widgets");

    let res = client
        .put(&org_url)
        .bearer_auth(&token)
        .json(&json!({ "name": "Acme Holdings Ltd" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The tenant record follows the rename: new name, recomputed slug.
    let mut renamed = serde_json::Value::Null;
    for _ in 0..50 {
        let org = get_json_eventually(&client, &org_url, &token).await;
        if org["name"].as_str() == Some("Acme Holdings Ltd") {
            renamed = org;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(renamed["name"].as_str().unwrap(), "Acme Holdings Ltd");
    assert_eq!(renamed["slug"].as_str().unwrap(), "acme-holdings-ltd");
}

#[tokio::test]
async fn organisation_listing_needs_custom_permission() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    // Managers hold view_organisation but not the cross-tenant custom
    // codename, so the listing stays closed to them.
    let manager = mint_jwt(jwt_secret, tenant_id, UserId::new(), UserRole::Manager);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/organisations", srv.base_url))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let admin = admin_jwt(jwt_secret, tenant_id);
    let res = client
        .get(format!("{}/organisations", srv.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn expense_validation_rejects_bad_amounts() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = admin_jwt(jwt_secret, tenant_id);
    let client = reqwest::Client::new();

    let account = uuid::Uuid::now_v7();
    let paid_through = uuid::Uuid::now_v7();

    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "amount_minor": 0,
            "tax_inclusive": false,
            "date": "2026-08-30",
            "account_id": account,
            "paid_through_id": paid_through,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/expenses", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "amount_minor": 12_500,
            "tax_inclusive": true,
            "date": "2026-08-30",
            "notes": "Office chairs",
            "account_id": account,
            "paid_through_id": paid_through,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let expense = get_json_eventually(
        &client,
        &format!("{}/expenses/{}", srv.base_url, id),
        &token,
    )
    .await;
    assert_eq!(expense["amount_minor"], 12_500);
    assert_eq!(expense["tax_inclusive"], true);

    let res = client
        .delete(format!("{}/expenses/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}
