use super::*;
use crate::services::fanout;
use crate::state::test_helpers::{drain, register_conn, test_app_state};
use crate::state::AppState;
use tokio::sync::mpsc;

async fn connect(state: &AppState) -> (ConnContext, mpsc::Receiver<String>) {
    let (conn_id, queue, rx) = register_conn(state, None).await;
    (ConnContext::new(conn_id, queue), rx)
}

/// Dispatch one raw frame and execute the resulting actions, exactly as
/// the connection read loop does.
async fn send(state: &AppState, ctx: &mut ConnContext, raw: &str) {
    let actions = dispatch(state, ctx, raw).await;
    fanout::execute(state, actions).await;
}

fn json(payload: &str) -> serde_json::Value {
    serde_json::from_str(payload).expect("payload must be JSON")
}

fn types(payloads: &[String]) -> Vec<String> {
    crate::state::test_helpers::types_of(payloads)
}

#[tokio::test]
async fn set_username_replies_with_filtered_room_list() {
    let state = test_app_state();
    let (mut ctx, mut rx) = connect(&state).await;

    send(&state, &mut ctx, r#"{"type":"setUsername","username":"alice"}"#).await;

    let msgs = drain(&mut rx);
    assert_eq!(types(&msgs), vec!["roomList"]);
    assert_eq!(json(&msgs[0])["rooms"].as_array().map(Vec::len), Some(0));
    assert_eq!(ctx.username.as_deref(), Some("alice"));

    // The registry entry now carries the username for multicast lookups.
    let connections = state.connections.read().await;
    assert_eq!(
        connections.get(&ctx.conn_id).and_then(|e| e.username.as_deref()),
        Some("alice")
    );
}

#[tokio::test]
async fn public_room_scenario_create_draw_join_replay() {
    let state = test_app_state();

    // C1 connects and identifies.
    let (mut c1, mut c1_rx) = connect(&state).await;
    send(&state, &mut c1, r#"{"type":"setUsername","username":"alice"}"#).await;
    drain(&mut c1_rx);

    // A second, idle client watches the announcements.
    let (mut c3, mut c3_rx) = connect(&state).await;
    send(&state, &mut c3, r#"{"type":"setUsername","username":"watcher"}"#).await;
    drain(&mut c3_rx);

    // C1 creates a public room.
    send(&state, &mut c1, r#"{"type":"createRoom","roomName":"R","isPublic":true}"#).await;
    let c1_msgs = drain(&mut c1_rx);
    assert_eq!(types(&c1_msgs), vec!["roomCreated", "newPublicRoom", "roomList"]);
    let created = json(&c1_msgs[0]);
    assert_eq!(created["roomName"], "R");
    assert_eq!(created["isPublic"], true);
    let room_id = created["roomId"].as_str().unwrap().to_owned();

    // The other client saw the announcement and the refreshed list.
    let c3_msgs = drain(&mut c3_rx);
    assert_eq!(types(&c3_msgs), vec!["newPublicRoom", "roomList"]);
    assert_eq!(json(&c3_msgs[0])["roomId"].as_str(), Some(room_id.as_str()));
    assert_eq!(json(&c3_msgs[1])["rooms"][0]["participants"], 1);

    // C1 draws.
    let draw = r##"{"type":"draw","x1":0,"y1":0,"x2":10,"y2":10,"color":"#000000","size":2}"##;
    send(&state, &mut c1, draw).await;
    assert!(drain(&mut c1_rx).is_empty(), "drawer does not echo its own stroke");

    // C2 connects, identifies, joins: ack, then the stroke, then nothing.
    let (mut c2, mut c2_rx) = connect(&state).await;
    send(&state, &mut c2, r#"{"type":"setUsername","username":"bob"}"#).await;
    drain(&mut c2_rx);
    send(&state, &mut c2, &format!(r#"{{"type":"joinRoom","roomId":"{room_id}"}}"#)).await;

    let c2_msgs = drain(&mut c2_rx);
    assert_eq!(types(&c2_msgs), vec!["roomJoined", "draw", "roomList"]);
    assert_eq!(c2_msgs[1], draw, "replay is the verbatim stroke envelope");

    // C1 heard the join and got a refreshed list.
    let c1_msgs = drain(&mut c1_rx);
    assert_eq!(types(&c1_msgs), vec!["userJoined", "roomList"]);
    assert_eq!(json(&c1_msgs[0])["username"], "bob");

    // Both now see each other's subsequent strokes.
    let draw2 = r##"{"type":"draw","x1":1,"y1":1,"x2":2,"y2":2,"color":"#FF0000","size":3}"##;
    send(&state, &mut c2, draw2).await;
    assert_eq!(drain(&mut c1_rx), vec![draw2.to_string()]);
    assert!(drain(&mut c2_rx).is_empty());
}

#[tokio::test]
async fn private_room_scenario_invite_password_join() {
    let state = test_app_state();

    // Alice creates a private, password-protected room inviting bob.
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    send(
        &state,
        &mut alice,
        r#"{"type":"createRoom","roomName":"P","isPublic":false,"password":"s3cret","invitedUsers":["bob"]}"#,
    )
    .await;
    let room_id = {
        let msgs = drain(&mut alice_rx);
        let created = msgs.iter().find(|m| json(m)["type"] == "roomCreated").unwrap();
        json(created)["roomId"].as_str().unwrap().to_owned()
    };

    // Bob's room list includes P.
    let (mut bob, mut bob_rx) = connect(&state).await;
    send(&state, &mut bob, r#"{"type":"setUsername","username":"bob"}"#).await;
    let bob_list = drain(&mut bob_rx);
    assert_eq!(json(&bob_list[0])["rooms"][0]["roomName"], "P");
    assert_eq!(json(&bob_list[0])["rooms"][0]["hasPassword"], true);

    // Carol's room list must not include P.
    let (mut carol, mut carol_rx) = connect(&state).await;
    send(&state, &mut carol, r#"{"type":"setUsername","username":"carol"}"#).await;
    let carol_list = drain(&mut carol_rx);
    assert_eq!(json(&carol_list[0])["rooms"].as_array().map(Vec::len), Some(0));

    // Carol cannot join.
    send(&state, &mut carol, &format!(r#"{{"type":"joinRoom","roomId":"{room_id}"}}"#)).await;
    let refusal = drain(&mut carol_rx);
    assert_eq!(types(&refusal), vec!["error"]);
    assert!(json(&refusal[0])["message"].as_str().unwrap().starts_with("You are not invited"));
    assert!(carol.room_id.is_none());

    // Bob without the password.
    send(&state, &mut bob, &format!(r#"{{"type":"joinRoom","roomId":"{room_id}"}}"#)).await;
    let refusal = drain(&mut bob_rx);
    assert_eq!(json(&refusal[0])["message"], "Incorrect password");

    // Bob with the password.
    send(
        &state,
        &mut bob,
        &format!(r#"{{"type":"joinRoom","roomId":"{room_id}","password":"s3cret"}}"#),
    )
    .await;
    let joined = drain(&mut bob_rx);
    assert_eq!(types(&joined), vec!["roomJoined", "roomList"]);
    assert_eq!(bob.room_id.as_deref(), Some(room_id.as_str()));
}

#[tokio::test]
async fn get_rooms_lists_public_rooms_only() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"Hidden","isPublic":false}"#).await;
    drain(&mut alice_rx);

    let (mut anon, mut anon_rx) = connect(&state).await;
    send(&state, &mut anon, r#"{"type":"getRooms"}"#).await;
    let msgs = drain(&mut anon_rx);
    assert_eq!(types(&msgs), vec!["roomList"]);
    assert_eq!(json(&msgs[0])["rooms"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn get_active_users_lists_identified_connections() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    drain(&mut alice_rx);
    let (_anon, _q, _anon_rx) = register_conn(&state, None).await;

    let (mut asker, mut asker_rx) = connect(&state).await;
    send(&state, &mut asker, r#"{"type":"getActiveUsers"}"#).await;
    let msgs = drain(&mut asker_rx);
    assert_eq!(types(&msgs), vec!["activeUsers"]);
    assert_eq!(json(&msgs[0])["users"], serde_json::json!(["alice"]));
}

#[tokio::test]
async fn create_room_requires_a_username() {
    let state = test_app_state();
    let (mut ctx, mut rx) = connect(&state).await;
    send(&state, &mut ctx, r#"{"type":"createRoom","roomName":"R"}"#).await;
    let msgs = drain(&mut rx);
    assert_eq!(json(&msgs[0])["type"], "error");
    assert!(ctx.room_id.is_none());
    assert!(state.rooms.read().await.is_empty());
}

#[tokio::test]
async fn room_events_before_join_answer_an_error() {
    let state = test_app_state();
    let (mut ctx, mut rx) = connect(&state).await;
    send(&state, &mut ctx, r#"{"type":"setUsername","username":"alice"}"#).await;
    drain(&mut rx);

    for raw in [
        r##"{"type":"draw","x1":0,"y1":0,"x2":1,"y2":1,"color":"#000000","size":1}"##,
        r#"{"type":"addShape","id":"s1","shapeType":"rectangle"}"#,
        r#"{"type":"deleteShape","id":"s1"}"#,
        r#"{"type":"clear"}"#,
        r#"{"type":"leaveRoom"}"#,
    ] {
        send(&state, &mut ctx, raw).await;
        let msgs = drain(&mut rx);
        assert_eq!(types(&msgs), vec!["error"], "event {raw} must answer an error");
    }
}

#[tokio::test]
async fn unknown_type_is_ignored_and_bad_json_errors() {
    let state = test_app_state();
    let (mut ctx, mut rx) = connect(&state).await;

    send(&state, &mut ctx, r#"{"type":"timeTravel","to":"1985"}"#).await;
    assert!(drain(&mut rx).is_empty(), "unknown types are dropped silently");

    send(&state, &mut ctx, "this is not json").await;
    let msgs = drain(&mut rx);
    assert_eq!(json(&msgs[0])["type"], "error");
    assert_eq!(json(&msgs[0])["message"], "Invalid message format");
}

#[tokio::test]
async fn leave_room_notifies_peers() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"R"}"#).await;
    let room_id = alice.room_id.clone().unwrap();

    let (mut bob, mut bob_rx) = connect(&state).await;
    send(&state, &mut bob, r#"{"type":"setUsername","username":"bob"}"#).await;
    send(&state, &mut bob, &format!(r#"{{"type":"joinRoom","roomId":"{room_id}"}}"#)).await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    send(&state, &mut bob, r#"{"type":"leaveRoom"}"#).await;
    assert!(bob.room_id.is_none());

    let msgs = drain(&mut alice_rx);
    assert_eq!(types(&msgs), vec!["userLeft", "roomList"]);
    assert_eq!(json(&msgs[0])["username"], "bob");
}

#[tokio::test]
async fn disconnect_cleans_membership_and_registry() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"R"}"#).await;
    let room_id = alice.room_id.clone().unwrap();

    let (mut bob, mut bob_rx) = connect(&state).await;
    send(&state, &mut bob, r#"{"type":"setUsername","username":"bob"}"#).await;
    send(&state, &mut bob, &format!(r#"{{"type":"joinRoom","roomId":"{room_id}"}}"#)).await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    disconnect(&state, &bob).await;

    // Alice hears the departure and gets a fresh list.
    let msgs = drain(&mut alice_rx);
    assert_eq!(types(&msgs), vec!["userLeft", "roomList"]);
    assert_eq!(json(&msgs[0])["username"], "bob");

    // Bob is gone from the room and the connection table.
    let rooms = state.rooms.read().await;
    assert_eq!(rooms.get(&room_id).unwrap().participants(), vec!["alice".to_string()]);
    drop(rooms);
    assert!(!state.connections.read().await.contains_key(&bob.conn_id));
}

#[tokio::test]
async fn clear_scenario_truncates_for_fresh_joiners() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"R"}"#).await;
    let room_id = alice.room_id.clone().unwrap();
    drain(&mut alice_rx);

    for i in 0..3 {
        send(
            &state,
            &mut alice,
            &format!(r##"{{"type":"draw","x1":{i},"y1":0,"x2":1,"y2":1,"color":"#000000","size":1}}"##),
        )
        .await;
    }
    send(&state, &mut alice, r#"{"type":"addShape","id":"s1","shapeType":"rectangle","x":0,"y":0}"#).await;
    send(&state, &mut alice, r#"{"type":"addShape","id":"s2","shapeType":"circle","x":5,"y":5}"#).await;

    send(&state, &mut alice, r#"{"type":"clear"}"#).await;
    let msgs = drain(&mut alice_rx);
    assert_eq!(types(&msgs), vec!["clear"], "sender receives the clear too");
    assert_eq!(json(&msgs[0])["username"], "alice");

    // A new joiner sees zero replay events between the ack and live events.
    let (mut bob, mut bob_rx) = connect(&state).await;
    send(&state, &mut bob, r#"{"type":"setUsername","username":"bob"}"#).await;
    drain(&mut bob_rx);
    send(&state, &mut bob, &format!(r#"{{"type":"joinRoom","roomId":"{room_id}"}}"#)).await;
    assert_eq!(types(&drain(&mut bob_rx)), vec!["roomJoined", "roomList"]);
}

#[tokio::test]
async fn chat_flow_records_and_replies_history() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;

    // Chat requires a room.
    send(&state, &mut alice, r#"{"type":"chatMessage","message":"early"}"#).await;
    let msgs = drain(&mut alice_rx);
    assert_eq!(json(&msgs[0])["type"], "error");

    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"R"}"#).await;
    drain(&mut alice_rx);
    send(&state, &mut alice, r#"{"type":"chatMessage","message":"hello room"}"#).await;

    send(&state, &mut alice, r#"{"type":"getChatHistory"}"#).await;
    let msgs = drain(&mut alice_rx);
    assert_eq!(types(&msgs), vec!["chatHistory"]);
    let history = json(&msgs[0]);
    let entries = history["messages"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message"], "hello room");
    assert_eq!(entries[0]["kind"], "chat");
}

#[tokio::test]
async fn creating_a_second_room_leaves_the_first() {
    let state = test_app_state();
    let (mut alice, mut alice_rx) = connect(&state).await;
    send(&state, &mut alice, r#"{"type":"setUsername","username":"alice"}"#).await;
    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"First"}"#).await;
    let first_id = alice.room_id.clone().unwrap();
    drain(&mut alice_rx);

    send(&state, &mut alice, r#"{"type":"createRoom","roomName":"Second"}"#).await;
    let second_id = alice.room_id.clone().unwrap();
    assert_ne!(first_id, second_id);

    let rooms = state.rooms.read().await;
    // Leaving happens before the new room exists, so the keep-one GC
    // rule preserves the first room as an empty shell. Alice occupies
    // exactly one room either way.
    assert!(rooms.get(&first_id).unwrap().is_empty());
    assert_eq!(rooms.get(&second_id).unwrap().participants(), vec!["alice".to_string()]);
}
