use chrono::Utc;
use validator::Validate;
use yanblog::models::{
    CreateUserRequest, EditUserRequest, LoginResponse, Role, User, UserQuery, UserView,
};

fn user(username: &str, role: Role) -> User {
    User {
        id: 1,
        username: username.to_string(),
        password_hash: "$argon2id$secret".to_string(),
        role,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// --- Role ---

#[test]
fn test_role_serializes_as_tier_number() {
    assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "1");
    assert_eq!(serde_json::to_string(&Role::NormalUser).unwrap(), "3");
    assert_eq!(serde_json::from_str::<Role>("2").unwrap(), Role::Admin);
}

#[test]
fn test_role_rejects_values_outside_the_hierarchy() {
    for raw in ["0", "4", "-1", "\"admin\""] {
        assert!(
            serde_json::from_str::<Role>(raw).is_err(),
            "{raw} must not parse as a role"
        );
    }
    assert!(Role::try_from(7i16).is_err());
}

#[test]
fn test_role_ordering_follows_tier() {
    assert!(Role::SuperAdmin < Role::Admin);
    assert!(Role::Admin < Role::NormalUser);
}

// --- Output schemas ---

#[test]
fn test_user_view_never_exposes_password_hash() {
    let view = UserView::from(user("admin", Role::SuperAdmin));
    let json_output = serde_json::to_string(&view).unwrap();

    assert!(!json_output.contains("password"));
    assert!(!json_output.contains("argon2"));
    assert!(json_output.contains(r#""role":1"#));
}

#[test]
fn test_login_response_shape() {
    let response = LoginResponse {
        token: "t".into(),
        username: "admin".into(),
        role: Role::Admin,
    };
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["token"], "t");
    assert_eq!(value["username"], "admin");
    assert_eq!(value["role"], 2);
    assert_eq!(value.as_object().unwrap().len(), 3);
}

// --- Request payloads ---

#[test]
fn test_create_request_length_limits() {
    let valid = CreateUserRequest {
        username: "abcd".into(),
        password: "123456".into(),
        role: Role::NormalUser,
    };
    assert!(valid.validate().is_ok());

    let long_name = CreateUserRequest {
        username: "abcdefghijklm".into(),
        ..valid.clone()
    };
    assert!(long_name.validate().is_err());

    let long_password = CreateUserRequest {
        password: "x".repeat(21),
        ..valid
    };
    assert!(long_password.validate().is_err());
}

#[test]
fn test_create_request_requires_role() {
    let parsed =
        serde_json::from_str::<CreateUserRequest>(r#"{"username":"abcd","password":"123456"}"#);
    assert!(parsed.is_err());
}

#[test]
fn test_edit_request_optional_fields() {
    let parsed: EditUserRequest = serde_json::from_str(r#"{"username":"abcd"}"#).unwrap();
    assert_eq!(parsed.role, None);
    assert_eq!(parsed.password, None);
    assert!(parsed.validate().is_ok());

    let with_empty: EditUserRequest =
        serde_json::from_str(r#"{"username":"abcd","password":""}"#).unwrap();
    let normalized = with_empty.normalized();
    assert_eq!(normalized.password, None);
    assert!(normalized.validate().is_ok());

    let with_short: EditUserRequest =
        serde_json::from_str(r#"{"username":"abcd","password":"123"}"#).unwrap();
    assert!(with_short.normalized().validate().is_err());
}

// --- Listing filter ---

#[test]
fn test_user_query_matches() {
    let query = UserQuery {
        min_visible: Role::Admin,
        keyword: Some("Ed".into()),
        role: None,
    };

    assert!(query.matches(&user("editor", Role::Admin)));
    assert!(query.matches(&user("RedHat", Role::NormalUser)));
    assert!(!query.matches(&user("editor", Role::SuperAdmin)));
    assert!(!query.matches(&user("reader", Role::NormalUser)));

    let by_role = UserQuery {
        role: Some(Role::NormalUser),
        ..UserQuery::visible_from(Role::SuperAdmin)
    };
    assert!(by_role.matches(&user("anyone", Role::NormalUser)));
    assert!(!by_role.matches(&user("anyone", Role::Admin)));
}
