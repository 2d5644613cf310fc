mod common;

use common::{Harness, bearer, mint};
use session_client::{
    CredentialStore, ErrorKind, LoginRequest, SessionMetadata, StoreKey, UserClass,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn staff_login_persists_credentials_and_metadata() {
    let harness = Harness::start().await;
    let access = mint("staff-7", 3600);

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(serde_json::json!({ "email": "ana@school.test", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": access,
            "refreshToken": "r1",
            "user": { "id": 7, "name": "Ana" },
            "organization": { "id": "org-1", "name": "North School" },
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let metadata = harness
        .manager
        .login(LoginRequest::password(UserClass::Staff, "ana@school.test", "pw"))
        .await
        .unwrap();

    assert_eq!(metadata.user_class, UserClass::Staff);
    assert_eq!(metadata.user_id.as_deref(), Some("7"));
    assert_eq!(metadata.display_name.as_deref(), Some("Ana"));
    assert!(harness.manager.is_authenticated());
    assert_eq!(harness.manager.metadata(), Some(metadata));
    assert_eq!(harness.store.get(StoreKey::RefreshToken).unwrap().as_deref(), Some("r1"));

    let organization: serde_json::Value = serde_json::from_str(
        &harness.store.get(StoreKey::OrganizationContext).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(organization["id"], "org-1");
}

#[tokio::test]
async fn examinee_session_renews_through_examinee_endpoint() {
    let harness = Harness::start().await;
    let t1 = mint("examinee-3", 3600);
    let t2 = mint("examinee-3-renewed", 3600);

    Mock::given(method("POST"))
        .and(path("/examinee/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": t1,
            "refreshToken": "r1",
            "user": { "id": "e-3", "isExaminee": true },
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exam/current"))
        .and(header("authorization", bearer(&t1).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exam/current"))
        .and(header("authorization", bearer(&t2).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 11 })))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/examinee/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "accessToken": t2 })),
        )
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.server)
        .await;

    let metadata = harness
        .manager
        .login(LoginRequest::new(
            UserClass::Examinee,
            serde_json::json!({ "accessCode": "X7Q2" }),
        ))
        .await
        .unwrap();
    assert!(metadata.is_examinee());

    let response = harness.manager.get("/exam/current").await.unwrap();
    assert_eq!(response.body["id"], 11);
    // Refresh token was not rotated.
    assert_eq!(harness.store.get(StoreKey::RefreshToken).unwrap().as_deref(), Some("r1"));
    assert_eq!(
        SessionMetadata::renewal_class(harness.store.as_ref()),
        UserClass::Examinee
    );
}

#[tokio::test]
async fn rejected_login_is_terminal_and_never_renews() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({ "message": "invalid credentials" })),
        )
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let err = harness
        .manager
        .login(LoginRequest::password(UserClass::Staff, "ana@school.test", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::TerminalAuth);
    assert_eq!(err.status, Some(401));
    assert_eq!(err.message, "invalid credentials");
    assert!(!harness.manager.is_authenticated());
    assert_eq!(harness.manager.coordinator().exchanges_started(), 0);
}

#[tokio::test]
async fn logout_clears_session_and_redirects() {
    let harness = Harness::start().await;
    harness.seed(&mint("user-1", 3600), Some("r1"));
    harness.store.set(StoreKey::UserData, r#"{"user_class":"staff"}"#).unwrap();
    assert!(harness.manager.is_authenticated());

    harness.manager.logout();
    harness.manager.logout();

    assert!(harness.store.is_empty());
    assert!(!harness.manager.is_authenticated());
    assert_eq!(harness.navigator.visits(), vec!["/login", "/login"]);
}

#[tokio::test]
async fn expired_credential_is_not_authenticated() {
    let harness = Harness::start().await;
    harness.seed(&mint("user-1", 20), Some("r1"));
    assert!(!harness.manager.is_authenticated());

    harness.seed(&mint("user-1", 120), None);
    assert!(harness.manager.is_authenticated());
}
