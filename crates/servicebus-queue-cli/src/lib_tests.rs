//! Tests for the servicebus-queue-cli library module.

use super::*;
use async_trait::async_trait;
use servicebus_queue::{LeasedJob, QueueName};
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Fake queue
// ============================================================================

#[derive(Default)]
struct FakeQueue {
    calls: Mutex<Vec<String>>,
    pending: Mutex<Option<Arc<FakeJob>>>,
    size: u64,
}

impl FakeQueue {
    fn with_message(job: Arc<FakeJob>) -> Self {
        Self {
            pending: Mutex::new(Some(job)),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeJob {
    queue: QueueName,
    deleted: AtomicBool,
    released: Mutex<Option<u64>>,
}

impl FakeJob {
    fn new() -> Self {
        Self {
            queue: QueueName::new("jobs".to_string()).unwrap(),
            deleted: AtomicBool::new(false),
            released: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LeasedJob for FakeJob {
    async fn delete(&self) -> Result<(), QueueError> {
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self, delay_seconds: u64) -> Result<(), QueueError> {
        *self.released.lock().unwrap() = Some(delay_seconds);
        Ok(())
    }

    fn attempts(&self) -> u32 {
        2
    }

    fn job_id(&self) -> &str {
        "m1"
    }

    fn raw_body(&self) -> &[u8] {
        b"hello"
    }

    fn queue(&self) -> &QueueName {
        &self.queue
    }

    fn connection_name(&self) -> &str {
        "servicebus"
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn is_released(&self) -> bool {
        self.released.lock().unwrap().is_some()
    }
}

/// Boxed handle that settles through a shared [`FakeJob`] so tests can inspect it
struct SharedJob(Arc<FakeJob>);

#[async_trait]
impl LeasedJob for SharedJob {
    async fn delete(&self) -> Result<(), QueueError> {
        self.0.delete().await
    }

    async fn release(&self, delay_seconds: u64) -> Result<(), QueueError> {
        self.0.release(delay_seconds).await
    }

    fn attempts(&self) -> u32 {
        self.0.attempts()
    }

    fn job_id(&self) -> &str {
        self.0.job_id()
    }

    fn raw_body(&self) -> &[u8] {
        self.0.raw_body()
    }

    fn queue(&self) -> &QueueName {
        self.0.queue()
    }

    fn connection_name(&self) -> &str {
        self.0.connection_name()
    }

    fn is_deleted(&self) -> bool {
        self.0.is_deleted()
    }

    fn is_released(&self) -> bool {
        self.0.is_released()
    }
}

#[async_trait]
impl JobQueue for FakeQueue {
    async fn push(
        &self,
        job: &JobDescriptor,
        queue: Option<&QueueName>,
    ) -> Result<(), QueueError> {
        self.calls.lock().unwrap().push(format!(
            "push {} {} {:?}",
            job.job,
            job.data,
            queue.map(|q| q.as_str())
        ));
        Ok(())
    }

    async fn push_raw(
        &self,
        payload: &str,
        _queue: Option<&QueueName>,
        headers: &[(String, String)],
    ) -> Result<(), QueueError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("push_raw {} {:?}", payload, headers));
        Ok(())
    }

    async fn later(
        &self,
        delay: Delay,
        job: &JobDescriptor,
        _queue: Option<&QueueName>,
    ) -> Result<(), QueueError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("later {:?} {}", delay, job.job));
        Ok(())
    }

    async fn pop(
        &self,
        _queue: Option<&QueueName>,
    ) -> Result<Option<Box<dyn LeasedJob>>, QueueError> {
        self.calls.lock().unwrap().push("pop".to_string());
        Ok(self
            .pending
            .lock()
            .unwrap()
            .take()
            .map(|job| Box::new(SharedJob(job)) as Box<dyn LeasedJob>))
    }

    async fn size(&self, _queue: Option<&QueueName>) -> Result<u64, QueueError> {
        Ok(self.size)
    }

    async fn clear(&self, _queue: Option<&QueueName>) -> Result<u64, QueueError> {
        self.calls.lock().unwrap().push("clear".to_string());
        Ok(self.size)
    }

    fn connection_name(&self) -> &str {
        "servicebus"
    }
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

async fn run(queue: &FakeQueue, args: &[&str]) -> Result<String, CliError> {
    let cli = parse(args);
    let mut out = Vec::new();
    execute_queue_command(cli.command, queue, cli.output, &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
}

// ============================================================================
// Parsing
// ============================================================================

mod parsing_tests {
    use super::*;

    /// Verify global options and push arguments parse
    #[test]
    fn test_cli_parsing() {
        let cli = parse(&[
            "sbq",
            "--connection",
            "mail",
            "-o",
            "json",
            "push",
            "--job",
            "SendMail",
            "--data",
            r#"{"to":"a@b.c"}"#,
            "--max-tries",
            "3",
        ]);

        assert_eq!(cli.connection.as_deref(), Some("mail"));
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Push { job, queue } => {
                let descriptor = job.descriptor();
                assert_eq!(descriptor.job, "SendMail");
                assert_eq!(descriptor.data["to"], "a@b.c");
                assert_eq!(descriptor.max_tries, Some(3));
                assert!(queue.is_none());
            }
            _ => panic!("Expected Push command"),
        }
    }

    /// Verify invalid JSON data and queue names are rejected by the parser
    #[test]
    fn test_invalid_values_rejected() {
        assert!(Cli::try_parse_from(["sbq", "push", "--job", "X", "--data", "{oops"]).is_err());
        assert!(Cli::try_parse_from(["sbq", "size", "--queue", "-bad"]).is_err());
        assert!(Cli::try_parse_from(["sbq", "push-raw", "{}", "--header", "novalue"]).is_err());
    }

    /// Verify later requires exactly one of delay and instant
    #[test]
    fn test_later_delay_arguments() {
        assert!(Cli::try_parse_from(["sbq", "later", "--job", "X"]).is_err());
        assert!(Cli::try_parse_from([
            "sbq",
            "later",
            "--job",
            "X",
            "--delay",
            "5",
            "--at",
            "2030-01-01T00:00:00Z"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["sbq", "later", "--job", "X", "--at", "2030-01-01T00:00:00Z"]).is_ok());
    }

    /// Verify pop cannot both delete and release
    #[test]
    fn test_pop_settlement_conflict() {
        assert!(Cli::try_parse_from(["sbq", "pop", "--delete", "--release", "5"]).is_err());
    }

    /// Verify defaults for global options
    #[test]
    fn test_defaults() {
        let cli = parse(&["sbq", "size"]);

        assert_eq!(cli.log_level, "warn");
        assert!(!cli.json_logs);
        assert_eq!(cli.output, OutputFormat::Text);
    }
}

// ============================================================================
// Queue commands
// ============================================================================

mod queue_command_tests {
    use super::*;

    /// Verify push forwards the descriptor and queue override
    #[tokio::test]
    async fn test_push() {
        let queue = FakeQueue::default();

        let out = run(
            &queue,
            &["sbq", "push", "--job", "Ping", "--queue", "other"],
        )
        .await
        .unwrap();

        assert_eq!(queue.calls(), vec![r#"push Ping {} Some("other")"#.to_string()]);
        assert_eq!(out, "pushed job=Ping\n");
    }

    /// Verify push-raw forwards payload and headers
    #[tokio::test]
    async fn test_push_raw() {
        let queue = FakeQueue::default();

        run(
            &queue,
            &["sbq", "push-raw", r#"{"a":1}"#, "--header", "X-Trace=abc"],
        )
        .await
        .unwrap();

        assert_eq!(
            queue.calls(),
            vec![r#"push_raw {"a":1} [("X-Trace", "abc")]"#.to_string()]
        );
    }

    /// Verify later passes the delay in seconds
    #[tokio::test]
    async fn test_later() {
        let queue = FakeQueue::default();

        run(&queue, &["sbq", "later", "--delay", "30", "--job", "Ping"])
            .await
            .unwrap();

        assert_eq!(queue.calls(), vec!["later Seconds(30) Ping".to_string()]);
    }

    /// Verify pop releases the message by default
    #[tokio::test]
    async fn test_pop_releases_by_default() {
        let job = Arc::new(FakeJob::new());
        let queue = FakeQueue::with_message(Arc::clone(&job));

        let out = run(&queue, &["sbq", "-o", "json", "pop"]).await.unwrap();

        assert_eq!(*job.released.lock().unwrap(), Some(0));
        assert!(!job.is_deleted());
        let record: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(record["result"], "popped");
        assert_eq!(record["id"], "m1");
        assert_eq!(record["attempts"], 2);
        assert_eq!(record["body"], "hello");
    }

    /// Verify pop can delete or release with a delay
    #[tokio::test]
    async fn test_pop_settlement_flags() {
        let job = Arc::new(FakeJob::new());
        let queue = FakeQueue::with_message(Arc::clone(&job));
        run(&queue, &["sbq", "pop", "--delete"]).await.unwrap();
        assert!(job.is_deleted());

        let job = Arc::new(FakeJob::new());
        let queue = FakeQueue::with_message(Arc::clone(&job));
        run(&queue, &["sbq", "pop", "--release", "45"]).await.unwrap();
        assert_eq!(*job.released.lock().unwrap(), Some(45));
    }

    /// Verify an empty queue is reported
    #[tokio::test]
    async fn test_pop_empty() {
        let queue = FakeQueue::default();

        let out = run(&queue, &["sbq", "pop"]).await.unwrap();

        assert_eq!(out, "empty\n");
    }

    /// Verify size output in both formats
    #[tokio::test]
    async fn test_size() {
        let queue = FakeQueue {
            size: 7,
            ..FakeQueue::default()
        };

        assert_eq!(run(&queue, &["sbq", "size"]).await.unwrap(), "size size=7\n");
        assert_eq!(
            run(&queue, &["sbq", "-o", "json", "size"]).await.unwrap(),
            "{\"result\":\"size\",\"size\":7}\n"
        );
    }

    /// Verify clear refuses to run without confirmation
    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let queue = FakeQueue {
            size: 3,
            ..FakeQueue::default()
        };

        let err = run(&queue, &["sbq", "clear"]).await.unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }));
        assert!(queue.calls().is_empty());

        let out = run(&queue, &["sbq", "clear", "--yes"]).await.unwrap();
        assert_eq!(out, "cleared deleted=3\n");
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration_tests {
    use super::*;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    /// Verify a YAML file loads and validates
    #[test]
    fn test_load_yaml_configuration() {
        let file = write_config(
            ".yaml",
            r#"
default: primary
connections:
  primary:
    namespace: contoso
    queue: jobs
    key_name: send-listen
    key: secret
"#,
        );

        let config = load_configuration(Some(file.path())).unwrap();

        let (name, primary) = config.get(None).unwrap();
        assert_eq!(name, "primary");
        assert_eq!(primary.namespace, "contoso");
        assert_eq!(primary.request_timeout_seconds, 30);
    }

    /// Verify a TOML file loads as well
    #[test]
    fn test_load_toml_configuration() {
        let file = write_config(
            ".toml",
            r#"
default = "servicebus"

[connections.servicebus]
namespace = "contoso"
queue = "jobs"
key_name = "send-listen"
key = "secret"
request_timeout_seconds = 10
"#,
        );

        let config = load_configuration(Some(file.path())).unwrap();

        assert_eq!(config.get(None).unwrap().1.request_timeout_seconds, 10);
    }

    /// Verify incomplete connections fail validation
    #[test]
    fn test_invalid_configuration_rejected() {
        let file = write_config(
            ".yaml",
            r#"
connections:
  servicebus:
    namespace: contoso
    queue: jobs
    key_name: send-listen
    key: ""
"#,
        );

        let err = load_configuration(Some(file.path())).unwrap_err();

        assert!(matches!(err, CliError::Queue(_)));
        assert_eq!(err.exit_code(), 1);
    }

    /// Verify a missing explicit file is an error
    #[test]
    fn test_missing_file_rejected() {
        let err = load_configuration(Some(Path::new("/nonexistent/sbq.yaml"))).unwrap_err();

        assert!(matches!(err, CliError::Configuration(_)));
    }

    /// Verify shown configuration never includes the key
    #[test]
    fn test_show_configuration_hides_key() {
        let config = QueueConnectionsConfig::default().with_connection(
            "servicebus",
            servicebus_queue::ServiceBusQueueConfig::new("contoso", "jobs", "send-listen", "hunter2"),
        );

        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let mut out = Vec::new();
            execute_config_command(&config, true, format, &mut out).unwrap();
            let text = String::from_utf8(out).unwrap();

            assert!(text.contains("contoso"), "{:?}: {}", format, text);
            assert!(!text.contains("hunter2"), "{:?}: {}", format, text);
        }

        let mut out = Vec::new();
        execute_config_command(&config, false, ConfigFormat::Yaml, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Configuration is valid: 1 connection(s), default 'servicebus'\n"
        );
    }
}
