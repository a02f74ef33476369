use vpswatch_agent::execution::CommandOutput;
use vpswatch_agent::LoginCycleReport;
use vpswatch_devkit::chat_stub::FailureKind;
use vpswatch_devkit::test_utils::{LOGINS_CHANNEL, MONITOR_PASSWORD, MONITOR_USER};
use vpswatch_devkit::{OutputBuilder, TestHarness};

fn alert_values(harness: &TestHarness) -> Vec<String> {
    harness
        .chat
        .sent_to(LOGINS_CHANNEL)
        .into_iter()
        .map(|embed| embed.fields[0].value.clone())
        .collect()
}

#[tokio::test]
async fn test_same_login_alerted_once_across_cycles() {
    let harness = TestHarness::new();
    let line = OutputBuilder::auth_line("root", "198.51.100.20", 101);
    harness.set_auth_tail(&[line.clone()]);
    let service = harness.service().await.unwrap();

    let first = service.run_login_cycle().await;
    assert_eq!(
        first,
        LoginCycleReport {
            candidates: 1,
            alerted: 1,
            skipped: 0,
            failed: 0
        }
    );

    for _ in 0..4 {
        let report = service.run_login_cycle().await;
        assert_eq!(report.alerted, 0);
        assert_eq!(report.skipped, 1);
    }

    harness.assert_login_alerts(1).unwrap();
    assert_eq!(alert_values(&harness), vec![format!("**Login Alert:** {line}")]);
    assert_eq!(service.reported_logins().await, 1);
}

#[tokio::test]
async fn test_new_logins_alerted_in_log_order() {
    let harness = TestHarness::new();
    let alice = OutputBuilder::auth_line("alice", "198.51.100.20", 101);
    let bob = OutputBuilder::auth_line("bob", "198.51.100.21", 102);
    harness.set_auth_tail(&[alice.clone(), bob.clone()]);
    let service = harness.service().await.unwrap();
    service.run_login_cycle().await;

    let carol = OutputBuilder::auth_line("carol", "198.51.100.22", 103);
    harness.set_auth_tail(&[alice.clone(), bob.clone(), carol.clone()]);
    let report = service.run_login_cycle().await;
    assert_eq!(report.alerted, 1);
    assert_eq!(report.skipped, 2);

    let values = alert_values(&harness);
    assert_eq!(values.len(), 3);
    assert!(values[0].contains("alice"));
    assert!(values[1].contains("bob"));
    assert!(values[2].contains("carol"));
}

#[tokio::test]
async fn test_own_username_never_alerted() {
    let harness = TestHarness::new();
    harness.set_auth_tail(&[
        OutputBuilder::auth_line(MONITOR_USER, "198.51.100.50", 101),
        OutputBuilder::auth_line("root", "198.51.100.20", 102),
        format!("weird line mentioning {MONITOR_USER} somewhere"),
    ]);
    let service = harness.service().await.unwrap();

    let report = service.run_login_cycle().await;
    assert_eq!(report.candidates, 1);
    let values = alert_values(&harness);
    assert_eq!(values.len(), 1);
    assert!(values.iter().all(|v| !v.contains(MONITOR_USER)));
}

#[tokio::test]
async fn test_self_ip_filter_and_fail_open() {
    let harness = TestHarness::new();
    let own = OutputBuilder::auth_line("deploy", "198.51.100.7", 101);
    let other = OutputBuilder::auth_line("root", "203.0.113.99", 102);
    harness.set_auth_tail(&[own.clone(), other.clone()]);
    harness.ip_lookup.set_ip(Some("198.51.100.7".parse().unwrap()));
    let service = harness.service().await.unwrap();

    service.run_login_cycle().await;
    assert_eq!(alert_values(&harness), vec![format!("**Login Alert:** {other}")]);

    // lookup down: the address filter is skipped, the cycle still runs
    harness.ip_lookup.set_ip(None);
    let report = service.run_login_cycle().await;
    assert_eq!(report.candidates, 2);
    assert_eq!(report.alerted, 1);
    harness.assert_login_alerts(2).unwrap();
}

#[tokio::test]
async fn test_sudo_password_written_to_pty() {
    let harness = TestHarness::new();
    harness.set_auth_tail(&[]);
    let service = harness.service().await.unwrap();

    service.run_login_cycle().await;

    let executed = harness.shell.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(
        executed[0].command,
        "sudo tail -n 20 /var/log/auth.log | grep 'Accepted'"
    );
    assert_eq!(executed[0].interactive_input.as_deref(), Some(MONITOR_PASSWORD));
    harness.assert_sessions_closed().unwrap();
}

#[tokio::test]
async fn test_transport_failure_reports_no_events() {
    let harness = TestHarness::new();
    harness.shell.fail_open(Some("no route to host"));
    let service = harness.service().await.unwrap();

    assert_eq!(service.run_login_cycle().await, LoginCycleReport::default());

    harness.shell.fail_open(None);
    harness
        .shell
        .respond_with("auth.log", Err("channel eof".to_string()));
    assert_eq!(service.run_login_cycle().await, LoginCycleReport::default());

    harness.shell.respond_with(
        "auth.log",
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: "sudo: a terminal is required".to_string(),
            exit_status: 2,
        }),
    );
    assert_eq!(service.run_login_cycle().await, LoginCycleReport::default());

    harness.assert_login_alerts(0).unwrap();
    harness.assert_sessions_closed().unwrap();
}

#[tokio::test]
async fn test_no_match_exit_code_is_not_an_error() {
    let harness = TestHarness::new();
    harness.shell.respond_with(
        "auth.log",
        Ok(CommandOutput {
            stdout: format!("[sudo] password for {MONITOR_USER}: \r\n"),
            stderr: String::new(),
            exit_status: 1,
        }),
    );
    let service = harness.service().await.unwrap();

    assert_eq!(service.run_login_cycle().await, LoginCycleReport::default());
}

#[tokio::test]
async fn test_failed_send_keeps_identity_in_ledger() {
    let harness = TestHarness::new();
    harness.set_auth_tail(&[OutputBuilder::auth_line("root", "198.51.100.20", 101)]);
    harness.chat.fail_sends(Some(FailureKind::Permission));
    let service = harness.service().await.unwrap();

    let report = service.run_login_cycle().await;
    assert_eq!(report.failed, 1);
    assert_eq!(service.reported_logins().await, 1);

    harness.chat.fail_sends(None);
    let report = service.run_login_cycle().await;
    assert_eq!(report.skipped, 1);
    harness.assert_login_alerts(0).unwrap();
}

#[tokio::test]
async fn test_echoed_credential_never_posted() {
    let harness = TestHarness::new();
    let line = OutputBuilder::auth_line("root", "198.51.100.20", 101);
    harness.shell.respond(
        "auth.log",
        format!("{MONITOR_PASSWORD}\r\n[sudo] password for {MONITOR_USER}: \r\n{line}\r\n"),
    );
    let service = harness.service().await.unwrap();

    let report = service.run_login_cycle().await;
    assert_eq!(report.candidates, 1);
    assert_eq!(alert_values(&harness), vec![format!("**Login Alert:** {line}")]);
    assert!(harness
        .chat
        .records()
        .iter()
        .all(|record| !format!("{record:?}").contains(MONITOR_PASSWORD)));
}
