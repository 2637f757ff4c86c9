use std::path::Path;
use std::process::Command;
use std::time::Duration;

use trustbridge_client::{BridgeClient, BridgeError, ClientConfig, ProxyProcess};
use trustbridge_engine::ProgramArtifact;
use trustbridge_model::ErrorKind;

const PROXY: &str = env!("CARGO_BIN_EXE_trustbridge-proxy");

fn start(dir: &Path) -> ProxyProcess {
    let working_dir = dir.to_string_lossy().into_owned();
    let artifact_dir = dir.join("programs").to_string_lossy().into_owned();
    ProxyProcess::spawn(
        Path::new(PROXY),
        [
            "serve",
            "--working-dir",
            working_dir.as_str(),
            "--artifact-dir",
            artifact_dir.as_str(),
            "--settle-delay-ms",
            "1",
            "--step-budget",
            "1000000",
        ],
    )
    .unwrap()
}

fn client(proxy: &ProxyProcess) -> BridgeClient {
    BridgeClient::with_config(
        proxy.channel(),
        ClientConfig::default().with_timeout(Duration::from_secs(20)),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn script_round_trip_through_the_binary() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = start(dir.path());
    let mut client = client(&proxy);

    let sum: i32 = client
        .with_parameter("a", &1)
        .with_parameter("b", &4)
        .execute_script_returning("return a + b;")
        .await
        .unwrap();
    assert_eq!(sum, 5);

    let words: Vec<String> = client
        .with_parameter("text", "c b a")
        .execute_script_returning("return Enumerable.Reverse(text.Split(\" \"));")
        .await
        .unwrap();
    assert_eq!(words, vec!["a", "b", "c"]);

    proxy.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_come_back_as_distinct_errors() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = start(dir.path());
    let mut client = client(&proxy);

    let error = client.execute_script("this does not parse").await.unwrap_err();
    match error {
        BridgeError::CompilationFailed { diagnostics } => assert!(!diagnostics.is_empty()),
        other => panic!("expected a compilation failure, got {:?}", other),
    }

    let error = client.execute_script("while (true) { }").await.unwrap_err();
    assert!(matches!(error, BridgeError::ExecutionFailed(e) if e.kind == ErrorKind::Execution));

    let error = client
        .with_parameter_typed("w", "Acme.Widget", "{}")
        .execute_script("return;")
        .await
        .unwrap_err();
    assert!(matches!(error, BridgeError::TypeResolution(_)));

    proxy.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn main_program_is_compiled_and_launched() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = start(dir.path());
    let mut client = client(&proxy);

    let marker = dir.path().join("ran.txt");
    let code = format!(
        "static int Main() {{ System.IO.File.WriteAllText(@\"{}\", \"done\"); return 0; }}",
        marker.display()
    );
    let result = client.execute_main_program(code).await.unwrap();
    assert!(result.compiled_successfully());

    let mut waited = Duration::ZERO;
    while !marker.exists() && waited < Duration::from_secs(10) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "done");

    // The launched program removes its artifact before running.
    let artifacts: Vec<_> = std::fs::read_dir(dir.path().join("programs"))
        .unwrap()
        .collect();
    assert!(artifacts.is_empty());

    proxy.shutdown().await.unwrap();
}

#[test]
fn run_subcommand_executes_an_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = ProgramArtifact::new(
        "static int Main() { Console.WriteLine(\"hello from main\"); return 7; }",
        vec!["System".to_string()],
        "Demo",
    );
    let path = artifact.write_to(dir.path()).unwrap();

    let output = Command::new(PROXY).arg("run").arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello from main\n");
    assert!(!path.exists());
}

#[test]
fn run_subcommand_reports_a_missing_artifact() {
    let output = Command::new(PROXY)
        .arg("run")
        .arg("/nonexistent/MainProgram.tbp")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}
