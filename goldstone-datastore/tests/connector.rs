//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Event, LISTS, connector, context, events, subscriber};
use goldstone_datastore::{
    Config, Connector, ErrorKind, GetOptions, OperDataRequest, View,
};
use goldstone_yang::{ChangeKind, DataPath, DataTree};
use serde_json::json;
use tokio::time;

const IF_NAME: &str = "/goldstone-interfaces:interfaces/interface[name='Ethernet1/1/1']/config/name";
const IF_ADMIN: &str = "/goldstone-interfaces:interfaces/interface[name='Ethernet1/1/1']/config/admin-status";
const MOD_ADMIN: &str =
    "/goldstone-transponder:modules/module[name='piu1']/config/admin-status";
const MEMBERS: &str = "/acme-lists:lists/members";

fn strip() -> GetOptions {
    GetOptions {
        strip: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn apply_delivers_change_then_done() {
    let conn = connector();
    let interfaces = subscriber(&conn, "goldstone-interfaces", None, &[]);

    let mut sess = conn.new_session(View::Running);
    sess.set(IF_NAME, json!("Ethernet1/1/1")).unwrap();
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    sess.apply().await.unwrap();

    let events = events(&interfaces);
    assert_eq!(events.len(), 2);
    let Event::Change(req_id, changes) = &events[0] else {
        panic!("unexpected event {:?}", events[0]);
    };
    assert_eq!(events[1], Event::Done(*req_id));
    assert!(changes.iter().all(|c| c.kind == ChangeKind::Created));
    let admin = changes
        .iter()
        .find(|c| c.path.to_string() == IF_ADMIN)
        .unwrap();
    assert_eq!(admin.value, Some(json!("UP")));

    let value = conn.get(IF_ADMIN, strip(), View::Running).await.unwrap();
    assert_eq!(value, json!("UP"));
}

#[tokio::test]
async fn rejected_change_aborts_accepted_subscribers() {
    let conn = connector();
    let interfaces = subscriber(&conn, "goldstone-interfaces", None, &[]);
    let transponder =
        subscriber(&conn, "goldstone-transponder", Some("testtesttest"), &[]);

    let mut sess = conn.new_session(View::Running);
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    sess.set(MOD_ADMIN, json!("up")).unwrap();
    let error = sess.apply().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::CallbackFailed);
    assert!(error.to_string().contains("testtesttest"));

    let interfaces = events(&interfaces);
    assert!(matches!(interfaces[0], Event::Change(1, _)));
    assert_eq!(interfaces[1], Event::Abort(1));
    let transponder = events(&transponder);
    assert_eq!(transponder.len(), 1);
    assert!(matches!(transponder[0], Event::Change(1, _)));

    // Nothing was committed.
    let error = conn
        .get("/goldstone-interfaces:interfaces", strip(), View::Running)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn leaf_list_replacement_only_creates_and_deletes() {
    let conn = connector();
    let lists = subscriber(&conn, LISTS, None, &[]);

    let mut sess = conn.new_session(View::Running);
    sess.set(MEMBERS, json!(["a", "b", "c"])).unwrap();
    sess.apply().await.unwrap();
    sess.set(MEMBERS, json!(["b", "d"])).unwrap();
    sess.apply().await.unwrap();

    let events = events(&lists);
    let Event::Change(2, changes) = &events[2] else {
        panic!("unexpected event {:?}", events[2]);
    };
    let changes = changes
        .iter()
        .map(|c| (c.kind, c.path.to_string()))
        .collect::<Vec<_>>();
    assert_eq!(
        changes,
        vec![
            (ChangeKind::Deleted, format!("{MEMBERS}[.='a']")),
            (ChangeKind::Deleted, format!("{MEMBERS}[.='c']")),
            (ChangeKind::Created, format!("{MEMBERS}[.='d']")),
        ]
    );

    let value = conn.get(MEMBERS, strip(), View::Running).await.unwrap();
    assert_eq!(value, json!(["b", "d"]));
}

#[tokio::test]
async fn leaf_list_set_twice_in_one_session() {
    let conn = connector();
    let mut sess = conn.new_session(View::Running);
    sess.set(MEMBERS, json!(["a", "b"])).unwrap();
    sess.set(MEMBERS, json!(["b", "c"])).unwrap();
    sess.apply().await.unwrap();

    let value = conn.get(MEMBERS, strip(), View::Running).await.unwrap();
    assert_eq!(value, json!(["b", "c"]));
}

#[tokio::test(start_paused = true)]
async fn abandoned_apply_skips_second_phase() {
    let conn = connector();
    let interfaces = subscriber(&conn, "goldstone-interfaces", None, &[1]);

    let mut sess = conn.new_session(View::Running);
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    let result = time::timeout(Duration::from_secs(1), sess.apply()).await;
    assert!(result.is_err());

    // The next commit goes through.
    sess.set(IF_ADMIN, json!("DOWN")).unwrap();
    sess.apply().await.unwrap();

    let events = events(&interfaces);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], Event::Change(1, _)));
    assert!(matches!(events[1], Event::Change(2, _)));
    assert_eq!(events[2], Event::Done(2));
}

#[tokio::test(start_paused = true)]
async fn unanswered_change_aborts_with_timeout() {
    let config = Config {
        commit_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let conn = Connector::new(context(), config, None).unwrap();
    let interfaces = subscriber(&conn, "goldstone-interfaces", None, &[]);
    let transponder = subscriber(&conn, "goldstone-transponder", None, &[1]);

    let mut sess = conn.new_session(View::Running);
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    sess.set(MOD_ADMIN, json!("up")).unwrap();
    let error = sess.apply().await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);

    let interfaces = events(&interfaces);
    assert_eq!(interfaces.len(), 2);
    assert!(matches!(interfaces[0], Event::Change(1, _)));
    assert_eq!(interfaces[1], Event::Abort(1));
    assert_eq!(events(&transponder).len(), 1);

    let error = conn.get(IF_ADMIN, strip(), View::Running).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn discarded_changes_are_not_applied() {
    let conn = connector();
    let mut sess = conn.new_session(View::Running);
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    assert!(sess.has_changes());
    sess.discard_changes();
    sess.apply().await.unwrap();
    assert!(conn.get(IF_ADMIN, strip(), View::Running).await.is_err());
}

#[tokio::test]
async fn invalid_writes_are_rejected_immediately() {
    let conn = connector();
    let mut sess = conn.new_session(View::Running);

    let error = sess.set(IF_ADMIN, json!("SIDEWAYS")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    let state = "/goldstone-interfaces:interfaces/interface[name='e1']/state/oper-status";
    let error = sess.set(state, json!("UP")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    let error = sess.delete(IF_ADMIN).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    sess.set(MEMBERS, json!("a")).unwrap();
    let error = sess.set(MEMBERS, json!("a")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Exists);
}

#[tokio::test]
async fn delete_all_clears_module() {
    let conn = connector();
    let mut sess = conn.new_session(View::Running);
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    sess.set(MEMBERS, json!(["a"])).unwrap();
    sess.apply().await.unwrap();

    sess.delete_all("goldstone-interfaces").unwrap();
    sess.apply().await.unwrap();
    assert!(conn.get(IF_ADMIN, strip(), View::Running).await.is_err());
    assert!(conn.get(MEMBERS, strip(), View::Running).await.is_ok());
}

#[tokio::test]
async fn get_options() {
    let conn = connector();
    let mut sess = conn.new_session(View::Running);
    sess.set(IF_NAME, json!("Ethernet1/1/1")).unwrap();
    sess.apply().await.unwrap();

    // Implicit defaults.
    let options = GetOptions {
        strip: true,
        include_implicit_defaults: true,
        ..Default::default()
    };
    let value = conn.get(IF_ADMIN, options, View::Running).await.unwrap();
    assert_eq!(value, json!("DOWN"));

    // Explicit default for missing data.
    let options = GetOptions {
        default: Some(json!("UP")),
        ..strip()
    };
    let value = conn.get(IF_ADMIN, options, View::Running).await.unwrap();
    assert_eq!(value, json!("UP"));

    // Enclosing tree.
    let value = conn
        .get(IF_NAME, GetOptions::default(), View::Running)
        .await
        .unwrap();
    assert_eq!(
        value,
        json!({"goldstone-interfaces:interfaces": {"interface": [{
            "name": "Ethernet1/1/1",
            "config": {"name": "Ethernet1/1/1"},
        }]}})
    );

    // A list without keys selects every entry.
    sess.set(
        "/goldstone-interfaces:interfaces/interface[name='e2']/config/name",
        json!("e2"),
    )
    .unwrap();
    sess.apply().await.unwrap();
    let names = "/goldstone-interfaces:interfaces/interface/config/name";
    let value = conn.get(names, strip(), View::Running).await.unwrap();
    assert_eq!(value, json!(["Ethernet1/1/1", "e2"]));
    let options = GetOptions {
        one: true,
        ..Default::default()
    };
    let error = conn.get(names, options, View::Running).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn operational_read_merges_running_and_pulled_state() {
    let conn = connector();
    let mut sess = conn.new_session(View::Running);
    sess.set(
        "/goldstone-interfaces:interfaces/interface[name='e1']/config/admin-status",
        json!("UP"),
    )
    .unwrap();
    sess.apply().await.unwrap();

    let mut rx = conn
        .subscribe_oper_data_request(
            "goldstone-interfaces",
            "/goldstone-interfaces:interfaces",
        )
        .unwrap();
    let ctx = conn.context().clone();
    tokio::spawn(async move {
        while let Some(OperDataRequest { responder, .. }) = rx.recv().await {
            let data = json!({"goldstone-interfaces:interfaces": {
                "interface": [{
                    "name": "e1",
                    "state": {"oper-status": "DOWN", "admin-status": "UP"},
                }]
            }});
            let tree = DataTree::from_value(ctx.clone(), &data).unwrap();
            let _ = responder.send(Ok(Some(tree)));
        }
    });

    let value = conn
        .get(
            "/goldstone-interfaces:interfaces/interface[name='e1']",
            strip(),
            View::Operational,
        )
        .await
        .unwrap();
    assert_eq!(value["config"]["admin-status"], json!("UP"));
    assert_eq!(value["state"]["oper-status"], json!("DOWN"));
    assert_eq!(value["state"]["admin-status"], json!("UP"));
}

#[tokio::test]
async fn operational_read_of_missing_container_is_empty() {
    let conn = connector();
    let path = "/goldstone-transponder:modules";
    let value = conn.get(path, strip(), View::Operational).await.unwrap();
    assert_eq!(value, json!({}));
    let path = "/goldstone-transponder:modules/module";
    let value = conn.get(path, strip(), View::Operational).await.unwrap();
    assert_eq!(value, json!([]));
}

#[tokio::test]
async fn pushed_operational_data_feeds_data_changes() {
    let conn = connector();
    let mut feed = conn
        .subscribe_data_change("/goldstone-interfaces:interfaces")
        .unwrap();

    let oper_status =
        "/goldstone-interfaces:interfaces/interface[name='e1']/state/oper-status";
    let mut sess = conn.new_session(View::Operational);
    sess.set(oper_status, json!("UP")).unwrap();
    sess.apply().await.unwrap();

    let change = feed.recv().await.unwrap();
    assert_eq!(change.view, View::Operational);
    let oper_status = DataPath::parse(oper_status).unwrap();
    assert!(change.paths.contains(&oper_status));

    let value = conn
        .get(&oper_status.to_string(), strip(), View::Operational)
        .await
        .unwrap();
    assert_eq!(value, json!("UP"));
}

#[tokio::test]
async fn rpc_and_notifications() {
    let conn = connector();
    let mut rpc_rx = conn.subscribe_rpc("/goldstone-telemetry:poll").unwrap();
    assert_eq!(
        conn.subscribe_rpc("/goldstone-telemetry:poll")
            .unwrap_err()
            .kind(),
        ErrorKind::Exists
    );
    tokio::spawn(async move {
        while let Some(request) = rpc_rx.recv().await {
            let _ = request.responder.send(Ok(request.input));
        }
    });
    let output = conn
        .rpc("/goldstone-telemetry:poll", json!({"id": 1}))
        .await
        .unwrap();
    assert_eq!(output, json!({"id": 1}));

    let mut notif_rx = conn
        .subscribe_notification("/goldstone-telemetry:telemetry-notify-event")
        .unwrap();
    conn.send_notification(
        "/goldstone-telemetry:telemetry-notify-event",
        json!({"type": "SYNC_RESPONSE", "request-id": 1}),
    )
    .unwrap();
    let notification = notif_rx.recv().await.unwrap();
    assert_eq!(notification.body["type"], json!("SYNC_RESPONSE"));

    let error = conn
        .send_notification(
            "/goldstone-telemetry:telemetry-notify-event",
            json!({"bogus": 1}),
        )
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn startup_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("goldstone-startup-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let open = || {
        let db = goldstone_datastore::db::init(&path).unwrap();
        let db = Arc::new(std::sync::Mutex::new(db));
        Connector::new(common::context(), Config::default(), Some(db))
            .unwrap()
    };

    let conn = open();
    let mut sess = conn.new_session(View::Running);
    sess.set(IF_ADMIN, json!("UP")).unwrap();
    sess.apply().await.unwrap();
    conn.copy_config(View::Running, View::Startup).await.unwrap();
    drop(conn);

    let conn = open();
    let value = conn.get(IF_ADMIN, strip(), View::Startup).await.unwrap();
    assert_eq!(value, json!("UP"));
    assert!(conn.get(IF_ADMIN, strip(), View::Running).await.is_err());
    conn.copy_config(View::Startup, View::Running).await.unwrap();
    let value = conn.get(IF_ADMIN, strip(), View::Running).await.unwrap();
    assert_eq!(value, json!("UP"));

    let error = conn
        .copy_config(View::Operational, View::Running)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unsupported);
    let _ = std::fs::remove_file(&path);
}
