//! Dashboard Flow Tests
//!
//! One signed-in accountant opening a school: role lookup, module lists,
//! and the unread badge, all through a single client context under
//! row-level security.

mod common;

use std::sync::Arc;

use campusdesk::access::{require_admin, resolve_role, AccessError, Role};
use campusdesk::backend::{MemoryBackend, RlsPolicy, UserIdentity};
use campusdesk::config::ClientConfig;
use campusdesk::counter::{CounterSpec, CounterState, LiveCounter};
use campusdesk::views::{ModuleView, ViewError, ViewLoader};
use common::{gated_client, memory_client, message, settle, GatedQuery};
use serde_json::json;
use uuid::Uuid;

fn accountant_backend() -> (Arc<MemoryBackend>, Uuid) {
    let backend = Arc::new(MemoryBackend::new());
    let user = Uuid::new_v4();
    backend.sign_in(UserIdentity::new(user).with_email("accounts@school.test"));

    let owned = [
        ("user_roles", "user_id"),
        ("admins", "user_id"),
        ("messages", "recipient_id"),
    ];
    for (table, owner) in owned {
        backend.create_table(table);
        backend.set_policy(
            table,
            RlsPolicy::Ownership {
                owner_field: owner.into(),
            },
        );
    }
    backend
        .seed(
            "user_roles",
            vec![json!({"user_id": user.to_string(), "school_id": "s1", "role": "accountant"})],
        )
        .unwrap();
    backend
        .seed(
            "fee_payments",
            vec![
                json!({
                    "school_id": "s1", "student_id": "st1", "amount": 200,
                    "status": "paid", "paid_at": "2026-10-01"
                }),
                json!({
                    "school_id": "s1", "student_id": "st2", "amount": 150,
                    "status": "late", "paid_at": "2026-10-03"
                }),
            ],
        )
        .unwrap();
    backend
        .seed(
            "messages",
            vec![
                message("s1", user, false),
                // Hidden by row-level security
                message("s1", Uuid::new_v4(), false),
            ],
        )
        .unwrap();
    (backend, user)
}

#[tokio::test]
async fn test_accountant_opens_school() {
    let (backend, user) = accountant_backend();
    let client = memory_client(&backend);

    assert_eq!(resolve_role(&client, "s1").await, Ok(Role::Accountant));
    assert!(matches!(
        require_admin(&client).await,
        Err(AccessError::NotAuthorized(_))
    ));

    let fees = ViewLoader::new(client.clone(), ModuleView::fee_payments())
        .load("s1")
        .await
        .unwrap();
    assert!(fees.error.is_none());
    assert_eq!(fees.rows.len(), 2);
    assert_eq!(fees.rows[0]["student_id"], "st2");

    let staff = ViewLoader::new(client.clone(), ModuleView::staff_directory())
        .load("s1")
        .await
        .unwrap();
    assert!(matches!(staff.error, Some(ViewError::NotAuthorized(_))));

    let config = ClientConfig::default();
    let mut badge = LiveCounter::new(client, CounterSpec::unread(&config.unread, "public"));
    badge.set_scope(Some("s1".into())).await;
    assert_eq!(badge.state(), CounterState::ready(1));

    backend.insert("messages", message("s1", user, false)).unwrap();
    settle().await;
    assert_eq!(badge.state(), CounterState::ready(2));

    badge.shutdown();
    assert_eq!(backend.registration_count(), 0);
}

#[tokio::test]
async fn test_superseded_view_load_returns_none() {
    let (backend, _user) = accountant_backend();
    backend
        .seed("announcements", vec![json!({"school_id": "s1", "title": "Sports day"})])
        .unwrap();
    let query = Arc::new(GatedQuery::new(Arc::clone(&backend)));
    query.close();
    let loader = ViewLoader::new(gated_client(&backend, &query), ModuleView::announcements());

    // Both loads are held at the query; the second one supersedes the first
    let (first, second, ()) = tokio::join!(loader.load("s1"), loader.load("s1"), async {
        query.release(2);
    });

    assert!(first.is_none());
    let second = second.unwrap();
    assert_eq!(second.rows.len(), 1);
    assert_eq!(loader.state(), second);
}
