mod common;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::StatusCode;
use serde_json::{json, Value};

use huachuca_auth::{AccessClaims, Permission, PermissionModel, Principal, Role, RoleTable};
use huachuca_core::OrganizationId;

use common::{login_settings, TestServer};

fn state_param(location: &str) -> String {
    location
        .split("state=")
        .nth(1)
        .expect("redirect carries a state")
        .split('&')
        .next()
        .unwrap()
        .to_string()
}

/// Run the login redirect, then the callback with `code`.
async fn login(srv: &TestServer, code: &str) -> reqwest::Response {
    let res = srv.client.get(srv.url("/auth/login/google")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = res.headers()["location"].to_str().unwrap().to_string();

    srv.client
        .get(srv.url("/auth/callback/google"))
        .query(&[("state", state_param(&location).as_str()), ("code", code)])
        .send()
        .await
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Public endpoints
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_healthy() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"][0]["name"], "session_store");
}

#[tokio::test]
async fn jwks_verifies_issued_tokens() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/.well-known/jwks.json")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["cache-control"], "public, max-age=3600");

    let body: Value = res.json().await.unwrap();
    let key = &body["keys"][0];
    assert_eq!(key["kid"], "default-key");
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["use"], "sig");

    // An external verifier needs nothing but the published key.
    let (p, token) = srv.seed_role(OrganizationId::new(), "ext@example.com", Role::Admin);
    let decoding =
        DecodingKey::from_rsa_components(key["n"].as_str().unwrap(), key["e"].as_str().unwrap())
            .unwrap();
    let claims = jsonwebtoken::decode::<AccessClaims>(&token, &decoding, &Validation::new(Algorithm::RS256))
        .unwrap()
        .claims;
    assert_eq!(claims.user_id, p.id);
    assert_eq!(claims.organization_id, p.organization_id);
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication gate
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_or_malformed_bearer_is_unauthorized() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.seed_role(OrganizationId::new(), "a@example.com", Role::Owner);

    for header in [None, Some("Bearer".to_string()), Some(format!("Token {token}")), Some(format!("Bearer {token} extra"))] {
        let mut req = srv.client.get(srv.url("/whoami"));
        if let Some(h) = header {
            req = req.header("authorization", h);
        }
        let res = req.send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "error": "unauthorized" }));
    }
}

#[tokio::test]
async fn whoami_reflects_loaded_principal() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let (p, token) = srv.seed(
        Principal::new(org, "sub@example.com", Role::SubAccount).with_override("invite:user"),
    );

    let res = srv.client.get(srv.url("/whoami")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], p.id.to_string());
    assert_eq!(body["organization_id"], org.to_string());
    assert_eq!(body["role"], "sub_account");
    assert_eq!(body["permissions"], json!(["read:org", "invite:user"]));
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let srv = TestServer::spawn().await;
    let p = Principal::new(OrganizationId::new(), "late@example.com", Role::Owner);
    srv.users.insert(p.clone()).unwrap();
    let token = srv
        .state
        .tokens
        .issue_at(&p, Utc::now() - ChronoDuration::minutes(20))
        .unwrap();

    let res = srv.client.get(srv.url("/whoami")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn symmetric_token_is_unauthorized() {
    let srv = TestServer::spawn().await;
    let (p, _) = srv.seed_role(OrganizationId::new(), "hs@example.com", Role::Owner);
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &AccessClaims::for_principal(&p, Utc::now()),
        &EncodingKey::from_secret(b"secret"),
    )
    .unwrap();

    let res = srv.client.get(srv.url("/whoami")).bearer_auth(forged).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

// ─────────────────────────────────────────────────────────────────────────────
// Organization-scoped route
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn members_listed_for_own_organization_only() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let (_, owner_token) = srv.seed_role(org, "owner@example.com", Role::Owner);
    let (_, sub_token) = srv.seed_role(org, "sub@example.com", Role::SubAccount);
    let (_, outsider_token) = srv.seed_role(OrganizationId::new(), "out@example.com", Role::Owner);

    let path = srv.url(&format!("/organizations/{org}/users"));

    let res = srv.client.get(&path).bearer_auth(&owner_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["organization_id"], org.to_string());
    assert_eq!(body["users"].as_array().unwrap().len(), 2);

    let res = srv.client.get(&path).bearer_auth(&sub_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(&path).bearer_auth(&outsider_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "forbidden" }));

    let res = srv.client.get(&path).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_organization_id_is_bad_request() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.seed_role(OrganizationId::new(), "o@example.com", Role::Owner);

    let res = srv
        .client
        .get(srv.url("/organizations/not-a-uuid/users"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn override_grants_access_a_role_lacks() {
    // Sub-accounts hold nothing by default in this table.
    let srv = TestServer::spawn_with(|mut state| {
        state.permissions = Arc::new(PermissionModel::new(RoleTable::from_grants([
            (Role::Owner, Permission::ALL.to_vec()),
            (Role::SubAccount, vec![]),
        ])));
        state
    })
    .await;

    let org = OrganizationId::new();
    let (_, plain) = srv.seed_role(org, "plain@example.com", Role::SubAccount);
    let (_, granted) =
        srv.seed(Principal::new(org, "granted@example.com", Role::SubAccount).with_override("read:org"));

    let path = srv.url(&format!("/organizations/{org}/users"));
    let res = srv.client.get(&path).bearer_auth(plain).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv.client.get(&path).bearer_auth(granted).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ─────────────────────────────────────────────────────────────────────────────
// Organization writes
// ─────────────────────────────────────────────────────────────────────────────

async fn create_org(srv: &TestServer, token: &str, body: Value) -> reqwest::Response {
    srv.client
        .post(srv.url("/organizations"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn create_organization_needs_create_permission() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let (_, owner) = srv.seed_role(org, "root@example.com", Role::Owner);
    let (_, plain) = srv.seed_role(org, "plain@example.com", Role::SubAccount);
    let (_, granted) =
        srv.seed(Principal::new(org, "granted@example.com", Role::SubAccount).with_override("create:org"));

    let body = json!({ "name": "Acme", "owner_email": "acme@example.com", "owner_name": "Ada" });
    let res = create_org(&srv, &owner, body).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["organization"]["name"], "Acme");
    assert_eq!(created["organization"]["max_sub_accounts"], 5);
    assert_eq!(created["owner"]["email"], "acme@example.com");
    assert_eq!(created["owner"]["role"], "owner");
    assert_eq!(created["organization"]["owner_id"], created["owner"]["id"]);

    let body = json!({ "name": "Nope", "owner_email": "nope@example.com", "owner_name": "N" });
    let res = create_org(&srv, &plain, body).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "error": "forbidden" }));

    let body = json!({ "name": "Side", "owner_email": "side@example.com", "owner_name": "S" });
    assert_eq!(create_org(&srv, &granted, body).await.status(), StatusCode::CREATED);

    let res = srv.client.post(srv.url("/organizations")).json(&json!({})).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_organization_validates_and_rejects_taken_email() {
    let srv = TestServer::spawn().await;
    let (_, owner) = srv.seed_role(OrganizationId::new(), "root@example.com", Role::Owner);

    let taken = json!({ "name": "Dup", "owner_email": "root@example.com", "owner_name": "R" });
    assert_eq!(create_org(&srv, &owner, taken).await.status(), StatusCode::CONFLICT);

    for bad in [
        json!({ "name": "", "owner_email": "a@example.com", "owner_name": "A" }),
        json!({ "name": "X", "owner_email": "not-an-email", "owner_name": "A" }),
        json!({ "name": "X", "owner_email": "a@example.com", "owner_name": "" }),
        json!({ "name": "X" }),
    ] {
        assert_eq!(create_org(&srv, &owner, bad).await.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn add_user_is_gated_and_capped() {
    let srv = TestServer::spawn().await;
    let org = OrganizationId::new();
    let (_, owner) = srv.seed_role(org, "boss@example.com", Role::Owner);
    let (_, sub) = srv.seed_role(org, "sub0@example.com", Role::SubAccount);
    let (_, outsider) = srv.seed_role(OrganizationId::new(), "out@example.com", Role::Owner);

    let path = srv.url(&format!("/organizations/{org}/users"));
    let add = |token: String, email: &str| {
        srv.client
            .post(&path)
            .bearer_auth(token)
            .json(&json!({ "email": email, "name": "Member" }))
            .send()
    };

    assert_eq!(add(sub.clone(), "x@example.com").await.unwrap().status(), StatusCode::FORBIDDEN);
    assert_eq!(add(outsider, "y@example.com").await.unwrap().status(), StatusCode::FORBIDDEN);

    // sub0 already counts toward the default cap of five.
    for i in 1..5 {
        let res = add(owner.clone(), &format!("sub{i}@example.com")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let member: Value = res.json().await.unwrap();
        assert_eq!(member["role"], "sub_account");
    }

    let res = add(owner.clone(), "sub5@example.com").await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "max_sub_accounts");

    let res = add(owner.clone(), "sub1@example.com").await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = add(owner.clone(), "bad address").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv.client.get(&path).bearer_auth(&owner).send().await.unwrap();
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed["users"].as_array().unwrap().len(), 6);
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuth login flow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn callback_issues_tokens_and_state_is_single_use() {
    let srv = TestServer::spawn().await;
    srv.seed_role(OrganizationId::new(), "dana@example.com", Role::Admin);

    let res = srv.client.get(srv.url("/auth/login/google")).send().await.unwrap();
    let location = res.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("https://accounts.example.com/"));
    let state = state_param(&location);

    let callback = |state: String| {
        srv.client
            .get(srv.url("/auth/callback/google"))
            .query(&[("state", state), ("code", "dana".to_string())])
            .send()
    };

    let res = callback(state.clone()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["token_type"], "Bearer");

    let access = body["access_token"].as_str().unwrap();
    let res = srv.client.get(srv.url("/whoami")).bearer_auth(access).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let replay = callback(state).await.unwrap();
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_rejects_missing_or_forged_state() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(srv.url("/auth/callback/google?code=dana"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .get(srv.url("/auth/callback/google?state=forged&code=dana"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_email_is_rejected_unless_provisioning() {
    let srv = TestServer::spawn().await;
    let res = login(&srv, "newcomer").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let srv = TestServer::spawn_with(|state| {
        state
            .with_identity_provider(Arc::new(common::StubProvider))
            .with_login_settings(login_settings(true))
    })
    .await;
    let res = login(&srv, "newcomer").await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth(body["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["role"], "owner");
    assert_eq!(me["email"], "newcomer@example.com");
}

#[tokio::test]
async fn failed_code_exchange_is_unauthorized() {
    let srv = TestServer::spawn().await;
    let res = login(&srv, "bad").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_without_provider_is_unavailable() {
    let srv = TestServer::spawn_with(|state| state).await;
    let res = srv.client.get(srv.url("/auth/login/google")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh / logout
// ─────────────────────────────────────────────────────────────────────────────

async fn refresh(srv: &TestServer, refresh_token: &str) -> reqwest::Response {
    srv.client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn refresh_rotates_and_old_secret_dies() {
    let srv = TestServer::spawn().await;
    srv.seed_role(OrganizationId::new(), "rot@example.com", Role::Owner);

    let tokens: Value = login(&srv, "rot").await.json().await.unwrap();
    let first = tokens["refresh_token"].as_str().unwrap().to_string();

    let res = refresh(&srv, &first).await;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated: Value = res.json().await.unwrap();
    let second = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(first, second);
    assert_eq!(rotated["expires_in"], 900);

    assert_eq!(refresh(&srv, &first).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(refresh(&srv, &second).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn new_login_invalidates_previous_refresh_token() {
    let srv = TestServer::spawn().await;
    srv.seed_role(OrganizationId::new(), "twice@example.com", Role::Admin);

    let first: Value = login(&srv, "twice").await.json().await.unwrap();
    let second: Value = login(&srv, "twice").await.json().await.unwrap();

    let res = refresh(&srv, first["refresh_token"].as_str().unwrap()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = refresh(&srv, second["refresh_token"].as_str().unwrap()).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rejects_bad_bodies() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .post(srv.url("/auth/refresh"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(refresh(&srv, "never-issued").await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let srv = TestServer::spawn().await;
    srv.seed_role(OrganizationId::new(), "bye@example.com", Role::SubAccount);

    let tokens: Value = login(&srv, "bye").await.json().await.unwrap();
    let secret = tokens["refresh_token"].as_str().unwrap();

    for _ in 0..2 {
        let res = srv
            .client
            .post(srv.url("/auth/logout"))
            .json(&json!({ "refresh_token": secret }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    assert_eq!(refresh(&srv, secret).await.status(), StatusCode::UNAUTHORIZED);
}
