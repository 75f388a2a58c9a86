use crate::integration::infrastructure::BridgeTestHarness;
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// A healthy server and a passing client give a passing verdict
#[tokio::test]
async fn test_passing_run() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let run = harness.run(&harness.options()).await?;
    info!("run finished in {:?}", run.elapsed);

    assert!(run.verdict.success, "transcript:\n{}", run.transcript);
    assert_eq!(run.verdict.exit_code, 0);
    assert_eq!(run.verdict.process_exit_code(), 0);

    run.assert_logged("HTTP Integration Test");
    run.assert_logged("--- STARTING [srv] ");
    run.assert_logged("--- STARTING [cli] ");
    run.assert_logged("Server is ready!");
    run.assert_logged("[srv] ");
    run.assert_logged("[cli] ");
    run.assert_logged("Client exited with code 0");
    run.assert_logged("--- Shutting down [srv] ---");
    run.assert_logged("[srv] stopped.");
    run.assert_logged("All tests passed!");

    // The stub server honours the interrupt, so no escalation happens
    assert!(!run.contains("did not shut down gracefully"));

    let teardown = run
        .time_between("Client exited with code 0", "[srv] stopped.")
        .expect("client exit and server stop are both logged");
    assert!(
        teardown < Duration::from_secs(3),
        "server took {:?} to stop after the client finished",
        teardown
    );
    Ok(())
}

/// A grandchild holding the client's output open does not stall the run
#[cfg(unix)]
#[tokio::test]
async fn test_client_background_child_does_not_block() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.client_binary = "/bin/sh".into();
    options.client_args = vec!["-c".to_string(), "sleep 8 & exit 0".to_string()];

    let run = harness.run(&options).await?;
    assert!(run.verdict.success, "transcript:\n{}", run.transcript);
    run.assert_logged("Client exited with code 0");
    assert!(
        run.elapsed < Duration::from_secs(6),
        "run waited {:?} on the client's background child",
        run.elapsed
    );
    Ok(())
}

/// The client starts only after the server reported ready
#[tokio::test]
async fn test_client_starts_after_readiness() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.server_args.push("--startup-delay-ms".to_string());
    options.server_args.push("1000".to_string());

    let run = harness.run(&options).await?;
    assert!(run.verdict.success, "transcript:\n{}", run.transcript);

    let ready = run.transcript.find("Server is ready!").expect("ready line");
    let client = run
        .transcript
        .find("--- STARTING [cli] ")
        .expect("client start line");
    assert!(ready < client, "client started before readiness");
    assert!(run.contains("Server not ready yet"));
    Ok(())
}

/// A non-zero client exit code becomes the verdict's exit code
#[tokio::test]
async fn test_client_exit_code_propagates() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.client_args.push("--exit-code".to_string());
    options.client_args.push("3".to_string());

    let run = harness.run(&options).await?;
    assert!(!run.verdict.success);
    assert_eq!(run.verdict.exit_code, 3);
    assert_eq!(run.verdict.process_exit_code(), 3);
    run.assert_logged("Client exited with code 3");
    run.assert_logged("client tests failed with exit code 3");

    // The server is still shut down after a failing client
    run.assert_logged("[srv] stopped.");
    assert!(!run.contains("All tests passed!"));
    Ok(())
}

/// Failing client checks fail the run
#[tokio::test]
async fn test_failing_client_checks() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let elsewhere = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.client_args = vec!["--url".to_string(), elsewhere.base_url()];

    let run = harness.run(&options).await?;
    assert!(!run.verdict.success);
    assert_eq!(run.verdict.exit_code, 1);
    run.assert_logged("FAIL");
    run.assert_logged("Client exited with code 1");
    Ok(())
}

/// Readiness can be probed on any path the server answers
#[tokio::test]
async fn test_custom_health_path() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.health_path = "/get".to_string();
    options.server_args.push("--no-health".to_string());

    let run = harness.run(&options).await?;
    assert!(run.verdict.success, "transcript:\n{}", run.transcript);
    run.assert_logged(&format!("{}/get", harness.base_url()));
    Ok(())
}

/// Shell launch mode passes arguments through unchanged
#[cfg(unix)]
#[tokio::test]
async fn test_shell_launch_mode() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.launch_mode = itest_bridge::LaunchMode::Shell;

    let run = harness.run(&options).await?;
    assert!(run.verdict.success, "transcript:\n{}", run.transcript);
    run.assert_logged("--- STARTING [srv] sh -c");
    run.assert_logged("--- STARTING [cli] sh -c");
    run.assert_logged("exec ");

    // `exec` makes the interrupt reach the server itself
    assert!(!run.contains("did not shut down gracefully"));
    assert!(run.elapsed < Duration::from_secs(30));
    Ok(())
}
