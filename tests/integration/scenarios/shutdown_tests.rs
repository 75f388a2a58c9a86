use crate::integration::infrastructure::BridgeTestHarness;
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// A server that ignores the interrupt is killed after the grace period
#[tokio::test]
async fn test_stubborn_server_is_killed() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.grace_period = Duration::from_secs(1);
    options.server_args.push("--ignore-interrupt".to_string());

    let run = harness.run(&options).await?;
    info!("run finished in {:?}", run.elapsed);

    // Escalation is a shutdown detail and never changes the verdict
    assert!(run.verdict.success, "transcript:\n{}", run.transcript);
    run.assert_logged("[srv] did not shut down gracefully within 1s, terminating...");
    run.assert_logged("[srv] stopped.");
    run.assert_logged("All tests passed!");
    Ok(())
}

/// A server that dies before answering fails the run without waiting out the timeout
#[tokio::test]
async fn test_crashing_server_fails_fast() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.startup_timeout = Duration::from_secs(30);
    options.server_args.push("--crash-after-ms".to_string());
    options.server_args.push("2000".to_string());

    let run = harness.run(&options).await?;
    assert!(!run.verdict.success);
    assert_ne!(run.verdict.process_exit_code(), 0);
    assert!(
        run.elapsed < Duration::from_secs(15),
        "crash was noticed only after {:?}",
        run.elapsed
    );

    run.assert_logged("before becoming ready");
    run.assert_logged("[srv] already terminated with exit code 1");
    assert!(!run.contains("--- STARTING [cli] "), "client must not run");
    Ok(())
}

/// A server that never answers hits the startup timeout and is still stopped
#[tokio::test]
async fn test_readiness_timeout() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.startup_timeout = Duration::from_secs(1);
    options.server_args.push("--startup-delay-ms".to_string());
    options.server_args.push("10000".to_string());

    let run = harness.run(&options).await?;
    assert!(!run.verdict.success);
    assert_eq!(run.verdict.exit_code, 1);
    assert!(run.elapsed < Duration::from_secs(8), "took {:?}", run.elapsed);

    run.assert_logged("server failed to start within 1s");
    run.assert_logged("--- Shutting down [srv] ---");
    run.assert_logged("[srv] stopped.");
    assert!(!run.contains("--- STARTING [cli] "), "client must not run");
    Ok(())
}

/// Missing binaries are reported before anything is launched
#[tokio::test]
async fn test_missing_binary_spawns_nothing() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let harness = BridgeTestHarness::new()?;
    let mut options = harness.options();
    options.server_binary = harness.temp_path().join("nonexistent");

    let run = harness.run(&options).await?;
    assert!(!run.verdict.success);
    assert_eq!(run.verdict.exit_code, 1);
    run.assert_logged("Server binary not found");
    assert!(!run.contains("STARTING"));
    assert!(!run.contains("Shutting down"));
    Ok(())
}
