use agenthub::connection_manager::ConnectionManager;
use std::sync::Arc;

#[test]
fn add_then_remove_is_a_round_trip() {
    let manager = ConnectionManager::new();
    manager.add_connection("c1", "alice");
    assert_eq!(manager.get_user_id("c1"), Some("alice".to_string()));
    assert!(manager.is_user_online("alice"));

    manager.remove_connection("c1");
    assert_eq!(manager.get_user_id("c1"), None);
    assert!(!manager.is_user_online("alice"));
    assert!(manager.get_connection_ids("alice").is_empty());
    assert_eq!(manager.connection_count(), 0);
}

#[test]
fn re_adding_the_same_pair_is_idempotent() {
    let manager = ConnectionManager::new();
    manager.add_connection("c1", "alice");
    manager.add_connection("c1", "alice");
    assert_eq!(manager.connection_count(), 1);
    assert_eq!(manager.get_connection_ids("alice").len(), 1);
}

#[test]
fn re_adding_with_a_different_user_replaces_the_mapping() {
    let manager = ConnectionManager::new();
    manager.add_connection("c1", "alice");
    manager.add_connection("c1", "bob");

    assert_eq!(manager.get_user_id("c1"), Some("bob".to_string()));
    assert!(!manager.is_user_online("alice"));
    assert!(manager.is_user_online("bob"));
}

#[test]
fn session_membership_tracks_joins_and_leaves() {
    let manager = ConnectionManager::new();
    manager.add_connection("c1", "alice");
    manager.add_connection("c2", "bob");

    assert!(manager.add_user_to_session("c1", "s1"));
    assert!(manager.add_user_to_session("c2", "s1"));
    assert!(manager.add_user_to_session("c1", "s2"));

    // Unknown connections cannot join.
    assert!(!manager.add_user_to_session("ghost", "s1"));

    assert_eq!(manager.get_session_users("s1").len(), 2);
    assert_eq!(manager.get_user_sessions("c1").len(), 2);

    assert!(manager.remove_user_from_session("c1", "s1"));
    assert!(!manager.remove_user_from_session("c1", "s1"));
    assert!(!manager.get_session_users("s1").contains("c1"));
}

#[test]
fn removing_a_connection_clears_its_session_memberships() {
    let manager = ConnectionManager::new();
    manager.add_connection("c1", "alice");
    manager.add_user_to_session("c1", "s1");
    manager.add_user_to_session("c1", "s2");

    manager.remove_connection("c1");
    assert!(manager.get_session_users("s1").is_empty());
    assert!(manager.get_session_users("s2").is_empty());
    assert!(manager.get_user_sessions("c1").is_empty());
}

#[test]
fn queries_on_missing_keys_return_empty_not_errors() {
    let manager = ConnectionManager::new();
    assert_eq!(manager.get_user_id("nope"), None);
    assert!(manager.get_connection_ids("nope").is_empty());
    assert!(manager.get_user_sessions("nope").is_empty());
    assert!(manager.get_session_users("nope").is_empty());
    assert!(!manager.is_user_online("nope"));
    // Removing something that was never added is a no-op.
    manager.remove_connection("nope");
}

#[test]
fn one_user_many_connections() {
    let manager = ConnectionManager::new();
    manager.add_connection("c1", "alice");
    manager.add_connection("c2", "alice");
    manager.add_connection("c3", "alice");

    assert_eq!(manager.get_connection_ids("alice").len(), 3);
    manager.remove_connection("c2");
    assert_eq!(manager.get_connection_ids("alice").len(), 2);
    assert!(manager.is_user_online("alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn survives_a_connect_disconnect_storm() {
    let manager = Arc::new(ConnectionManager::new());
    let mut handles = Vec::new();

    for worker in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..100 {
                let conn = format!("c{}-{}", worker, round);
                let user = format!("u{}", worker % 3);
                manager.add_connection(&conn, &user);
                manager.add_user_to_session(&conn, "shared");
                if round % 2 == 0 {
                    manager.remove_connection(&conn);
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Exactly the odd-round connections survive: 50 per worker.
    assert_eq!(manager.connection_count(), 8 * 50);
    assert_eq!(manager.get_session_users("shared").len(), 8 * 50);
}
