// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::Role,
    authority::{NewAuthMethod, NewUser, OrganizationUpdate, UserUpdate},
    derivation::{AccountSpec, AddressFormat, Curve, PathFormat, SeedValidation},
    enclave::EnclaveInfo,
    models::{
        Activity, ActivityStatus, ActivityType, AuthMethod, AuthMethodType, Intent,
        Organization, Proof, ProofType, Quorum, QuorumMember, User, Wallet, WalletAccount,
    },
    service::{
        CreatedOrganization, DeleteWalletParams, LoginOutcome, MemberParams, ThresholdParams,
        UpdateUserParams,
    },
    session::{IssuedSession, SessionData},
    state::AppState,
    wallet::CreateWalletRequest,
};

pub mod activities;
pub mod enclave;
pub mod health;
pub mod organizations;
pub mod session;
pub mod users;
pub mod wallets;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/organizations", post(organizations::create_organization))
        .route(
            "/organizations/{organization_id}",
            get(organizations::get_organization).patch(organizations::update_organization),
        )
        .route(
            "/organizations/{organization_id}/users",
            get(organizations::list_users),
        )
        .route(
            "/organizations/{organization_id}/quorum",
            get(organizations::get_quorum),
        )
        .route("/users/me", get(users::get_current_user))
        .route(
            "/users/{user_id}",
            get(users::get_user).patch(users::update_user),
        )
        .route(
            "/users/{user_id}/auth-methods",
            get(users::list_auth_methods),
        )
        .route(
            "/auth-methods/{auth_method_id}",
            delete(users::deactivate_auth_method),
        )
        .route(
            "/activities",
            get(activities::list_activities).post(activities::submit_activity),
        )
        .route("/activities/{activity_id}", get(activities::get_activity))
        .route(
            "/activities/{activity_id}/approve",
            post(activities::approve_activity),
        )
        .route(
            "/activities/{activity_id}/reject",
            post(activities::reject_activity),
        )
        .route(
            "/activities/{activity_id}/proofs",
            get(activities::list_proofs),
        )
        .route("/wallets", get(wallets::list_wallets))
        .route("/wallets/{wallet_id}", get(wallets::get_wallet))
        .route("/wallets/{wallet_id}/accounts", get(wallets::list_accounts))
        .route("/seeds/validate", post(enclave::validate_seed))
        .route("/enclave/info", get(enclave::enclave_info))
        .route(
            "/session",
            get(session::get_session).delete(session::logout),
        )
        .route("/session/login", post(session::login))
        .route("/session/refresh", post(session::refresh_session));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAuth),
    paths(
        health::health,
        health::liveness,
        health::readiness,
        organizations::create_organization,
        organizations::get_organization,
        organizations::update_organization,
        organizations::list_users,
        organizations::get_quorum,
        users::get_current_user,
        users::get_user,
        users::update_user,
        users::list_auth_methods,
        users::deactivate_auth_method,
        activities::submit_activity,
        activities::list_activities,
        activities::get_activity,
        activities::approve_activity,
        activities::reject_activity,
        activities::list_proofs,
        wallets::list_wallets,
        wallets::get_wallet,
        wallets::list_accounts,
        enclave::validate_seed,
        enclave::enclave_info,
        session::login,
        session::get_session,
        session::refresh_session,
        session::logout
    ),
    components(
        schemas(
            Organization,
            Quorum,
            QuorumMember,
            User,
            AuthMethod,
            AuthMethodType,
            Activity,
            ActivityType,
            ActivityStatus,
            Intent,
            Proof,
            ProofType,
            Wallet,
            WalletAccount,
            AccountSpec,
            Curve,
            PathFormat,
            AddressFormat,
            SeedValidation,
            EnclaveInfo,
            Role,
            SessionData,
            IssuedSession,
            LoginOutcome,
            CreatedOrganization,
            OrganizationUpdate,
            UserUpdate,
            UpdateUserParams,
            NewUser,
            NewAuthMethod,
            MemberParams,
            ThresholdParams,
            CreateWalletRequest,
            DeleteWalletParams
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Organizations", description = "Tenant bootstrap and root quorum"),
        (name = "Users", description = "Users and their credentials"),
        (name = "Activities", description = "Quorum-approved privileged requests and their proofs"),
        (name = "Wallets", description = "HD wallets and derived accounts"),
        (name = "Enclave", description = "Secure enclave utilities"),
        (name = "Session", description = "Sign-in and bearer sessions")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::assertion::testing::{claims, sign, sign_with};
    use crate::state::testing::test_state;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Bootstrap an organization and return its id and root session token.
    async fn bootstrap(app: &Router) -> (String, String) {
        let response = send(
            app,
            "POST",
            "/v1/organizations",
            None,
            Some(json!({
                "name": "Acme",
                "initial_user_email": "admin@acme.com",
                "initial_user_public_key": "pk1",
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        (
            body["organization"]["id"].as_str().unwrap().to_string(),
            body["session"]["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let (state, _dir) = test_state();
        let app = router(state);

        let response = send(&app, "GET", "/health/live", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = send(&app, "GET", "/health/ready", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["store"], "ok");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (state, _dir) = test_state();
        let app = router(state);

        let response = send(&app, "GET", "/api-doc/openapi.json", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["paths"]["/v1/activities"].is_object());
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let (state, _dir) = test_state();
        let app = router(state);

        let response = send(&app, "GET", "/v1/wallets", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&app, "GET", "/v1/wallets", Some("bogus"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "session_expired");
    }

    #[tokio::test]
    async fn wallet_lifecycle_over_http() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (organization_id, token) = bootstrap(&app).await;

        let response = send(
            &app,
            "POST",
            "/v1/activities",
            Some(&token),
            Some(json!({
                "type": "ACTIVITY_TYPE_CREATE_WALLET",
                "parameters": {
                    "name": "W1",
                    "accounts": [{
                        "curve": "CURVE_SECP256K1",
                        "path_format": "PATH_FORMAT_BIP32",
                        "path": "m/44'/60'/0'/0/0",
                        "address_format": "ADDRESS_FORMAT_ETHEREUM",
                    }],
                    "mnemonic_length": 12,
                },
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let activity = json_body(response).await;
        assert_eq!(activity["status"], "ACTIVITY_STATUS_COMPLETED");
        let wallet_id = activity["result"]["wallet_id"].as_str().unwrap().to_string();
        let address = activity["result"]["addresses"][0].as_str().unwrap().to_string();
        assert!(address.starts_with("0x"));

        let response = send(&app, "GET", &format!("/v1/wallets/{wallet_id}/accounts"), Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let accounts = json_body(response).await;
        assert_eq!(accounts["total"], 1);
        assert_eq!(accounts["accounts"][0]["address"], address.as_str());

        let response = send(
            &app,
            "POST",
            "/v1/activities",
            Some(&token),
            Some(json!({
                "type": "ACTIVITY_TYPE_DELETE_WALLET",
                "parameters": { "wallet_id": wallet_id },
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let response = send(
            &app,
            "GET",
            &format!("/v1/organizations/{organization_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(json_body(response).await["name"], "Acme");
    }

    #[tokio::test]
    async fn invalid_activities_are_bad_requests() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (_, token) = bootstrap(&app).await;

        let response = send(
            &app,
            "POST",
            "/v1/activities",
            Some(&token),
            Some(json!({ "type": "ACTIVITY_TYPE_MINT_MONEY", "parameters": {} })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            "POST",
            "/v1/activities",
            Some(&token),
            Some(json!({ "type": "ACTIVITY_TYPE_ENROLL_USER", "parameters": {} })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_then_logout() {
        let (state, _dir) = test_state();
        let app = router(state);

        let login = json!({ "assertion": sign(&claims("sub-1", "ada@example.com")) });
        let response = send(&app, "POST", "/v1/session/login", None, Some(login.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let token = json_body(response).await["session"]["token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = send(&app, "POST", "/v1/session/login", None, Some(login)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", "/v1/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["role"], "root");

        let response = send(&app, "DELETE", "/v1/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", "/v1/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unverified_assertions_cannot_sign_in() {
        let (state, _dir) = test_state();
        let app = router(state);

        let forged = sign_with(b"attacker-chosen-secret-0123456789abcdef", &claims("sub-1", "ada@example.com"));
        let response = send(&app, "POST", "/v1/session/login", None, Some(json!({ "assertion": forged }))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "invalid_assertion");

        // The old unsigned profile body is no longer accepted.
        let unsigned = json!({
            "provider": "google",
            "identity": { "subject_id": "sub-1", "email": "ada@example.com", "display_name": "Ada" },
        });
        let response = send(&app, "POST", "/v1/session/login", None, Some(unsigned)).await;
        assert!(response.status().is_client_error());

        let response = send(
            &app,
            "POST",
            "/v1/session/login",
            None,
            Some(json!({ "assertion": "e30.e30." })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn sign_in_is_refused_without_a_secret() {
        let (state, _dir) = test_state();
        let state = AppState {
            identity_verifier: None,
            ..state
        };
        let app = router(state);

        let login = json!({ "assertion": sign(&claims("sub-1", "ada@example.com")) });
        let response = send(&app, "POST", "/v1/session/login", None, Some(login)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "sign_in_disabled");
    }

    #[tokio::test]
    async fn user_updates_go_through_the_ledger() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (organization_id, token) = bootstrap(&app).await;

        let response = send(&app, "GET", "/v1/users/me", Some(&token), None).await;
        let root_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = send(
            &app,
            "PATCH",
            &format!("/v1/users/{root_id}"),
            Some(&token),
            Some(json!({ "is_active": false })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            "PATCH",
            &format!("/v1/users/{root_id}"),
            Some(&token),
            Some(json!({ "tags": ["ops"] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let activity = json_body(response).await;
        assert_eq!(activity["activity_type"], "ACTIVITY_TYPE_UPDATE_USER");
        assert_eq!(activity["status"], "ACTIVITY_STATUS_COMPLETED");
        assert_eq!(activity["result"]["user"]["tags"], json!(["ops"]));

        let response = send(
            &app,
            "GET",
            &format!("/v1/organizations/{organization_id}/quorum"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
