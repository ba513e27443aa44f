// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end tests: the client engine against the server engine and the file
// spool, over an in-memory duplex pipe and over loopback TCP.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use lpd_core::config::{ClientConfig, ServerConfig};
use lpd_core::error::{LpdError, Result};
use lpd_core::types::Charset;
use lpd_protocol::{
    ClientProtocol, FileSpool, JobHook, LpdServer, QueueBackend, ServerProtocol, connect,
};

const PAYLOAD: &[u8] = b"%!PS-Adobe-3.0\nshowpage\n";

#[derive(Default)]
struct RecordingHook {
    runs: Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait]
impl JobHook for RecordingHook {
    async fn run(&self, queue: &str, job_path: &Path) -> Result<String> {
        self.runs
            .lock()
            .unwrap()
            .push((queue.to_string(), job_path.to_path_buf()));
        Ok(format!("printed {queue}\n"))
    }
}

struct Fixture {
    dir: TempDir,
    spool: FileSpool,
    hook: Arc<RecordingHook>,
}

impl Fixture {
    fn new(queues: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for queue in queues {
            std::fs::create_dir(dir.path().join(queue)).unwrap();
        }
        let hook = Arc::new(RecordingHook::default());
        let spool = FileSpool::new(dir.path(), Some(hook.clone() as Arc<dyn JobHook>));
        Self { dir, spool, hook }
    }

    fn jobs(&self, queue: &str) -> Vec<PathBuf> {
        let mut jobs: Vec<_> = std::fs::read_dir(self.dir.path().join(queue))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        jobs.sort();
        jobs
    }

    fn job_names(&self, queue: &str) -> Vec<String> {
        self.jobs(queue)
            .iter()
            .map(|job| job.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    async fn start_server(&self) -> LpdServer<FileSpool> {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            queue_folder: self.dir.path().to_path_buf(),
            client_connection_threads: 4,
            charset: Charset::Latin1,
            ..Default::default()
        };
        let mut server = LpdServer::new(config, self.spool.clone());
        server.start().await.unwrap();
        server
    }
}

fn client_config(server: &LpdServer<FileSpool>) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".into(),
        port: server.port(),
        charset: Charset::Latin1,
        client_host: "testhost".into(),
        user: Some("tester".into()),
        connect_timeout_secs: 5,
        ..Default::default()
    }
}

/// Submit one job over a fresh connection and close it.
async fn submit(config: &ClientConfig, queue: &str, name: &str, data: &[u8]) -> Result<()> {
    let mut client = connect(config).await?;
    let result = client.send_file(queue, name, data, data.len() as u64).await;
    client.finish().await?;
    result
}

/// Close the client side and wait for the server to close its side, which
/// it does once the command has been handled.
async fn finish_and_wait(mut client: lpd_protocol::TcpClient) {
    client.finish().await.unwrap();
    let (mut reader, _) = client.into_parts();
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

/// Wait until the server has finished with every connection.
async fn settle(server: &LpdServer<FileSpool>) {
    for _ in 0..200 {
        if server.active_connections() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connections did not finish");
}

#[tokio::test]
async fn duplex_round_trip_stores_job() {
    let fixture = Fixture::new(&["RAW"]);
    let (client_io, server_io) = tokio::io::duplex(1024);

    let session = fixture.spool.session();
    let server = tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(server_io);
        let mut protocol = ServerProtocol::new(BufReader::new(reader), writer, session);
        let result = protocol.handle().await;
        let (_, mut writer, _) = protocol.into_parts();
        writer.shutdown().await.unwrap();
        result
    });

    let (reader, writer) = tokio::io::split(client_io);
    let mut client = ClientProtocol::new(BufReader::new(reader), writer);
    client.set_client_host("testhost");
    client
        .send_file("RAW", "report.ps", PAYLOAD, PAYLOAD.len() as u64)
        .await
        .unwrap();
    client.finish().await.unwrap();
    server.await.unwrap().unwrap();

    let jobs = fixture.jobs("RAW");
    assert_eq!(jobs.len(), 1);
    assert_eq!(std::fs::read(jobs[0].join("dfA000testhost")).unwrap(), PAYLOAD);
    assert_eq!(
        std::fs::read(jobs[0].join("cfA000testhost")).unwrap(),
        b"Htesthost\nJreport.ps\nNreport.ps\n"
    );
    assert_eq!(fixture.hook.runs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn tcp_round_trip_in_both_orders() {
    let fixture = Fixture::new(&["RAW"]);
    let mut server = fixture.start_server().await;
    let mut config = client_config(&server);

    submit(&config, "RAW", "first", PAYLOAD).await.unwrap();
    config.send_data_first = true;
    submit(&config, "RAW", "second", PAYLOAD).await.unwrap();
    settle(&server).await;

    let jobs = fixture.jobs("RAW");
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert_eq!(std::fs::read(job.join("dfA000testhost")).unwrap(), PAYLOAD);
        let control = std::fs::read_to_string(job.join("cfA000testhost")).unwrap();
        assert!(control.starts_with("Htesthost\n"));
        assert!(control.ends_with("Ptester\n"));
    }

    let runs = fixture.hook.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|(queue, _)| queue == "RAW"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_queue_is_refused() {
    let fixture = Fixture::new(&["RAW"]);
    let mut server = fixture.start_server().await;
    let config = client_config(&server);

    let err = submit(&config, "PDF", "job", PAYLOAD).await.unwrap_err();
    assert!(matches!(
        err,
        LpdError::Nack {
            stage: "receive job",
            code: 1
        }
    ));
    settle(&server).await;
    assert!(fixture.jobs("RAW").is_empty());
    assert!(fixture.hook.runs.lock().unwrap().is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn queue_state_and_removal() {
    let fixture = Fixture::new(&["RAW"]);
    let mut server = fixture.start_server().await;
    let config = client_config(&server);

    submit(&config, "RAW", "one", PAYLOAD).await.unwrap();
    submit(&config, "RAW", "two", b"x").await.unwrap();
    settle(&server).await;
    let names = fixture.job_names("RAW");
    assert_eq!(names.len(), 2);

    let mut client = connect(&config).await.unwrap();
    let short = client.get_short_queue_state("RAW", None).await.unwrap();
    assert_eq!(short, format!("{}\n{}\n", names[0], names[1]));

    let mut client = connect(&config).await.unwrap();
    let long = client
        .get_long_queue_state("RAW", Some(names[1].as_str()))
        .await
        .unwrap();
    assert!(long.starts_with(&format!("{}\t", names[1])));
    assert!(long.contains("dfA000testhost (1 byte) "));
    assert_eq!(long.lines().count(), 1);

    let mut client = connect(&config).await.unwrap();
    let missing = client.get_short_queue_state("PDF", None).await.unwrap();
    assert_eq!(missing, "Queue PDF does not exist.");

    let mut client = connect(&config).await.unwrap();
    client.remove_jobs("RAW", Some(names[0].as_str())).await.unwrap();
    finish_and_wait(client).await;
    assert_eq!(fixture.job_names("RAW"), vec![names[1].clone()]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn print_waiting_jobs_runs_hook_per_job() {
    let fixture = Fixture::new(&["RAW"]);
    let mut server = fixture.start_server().await;
    let config = client_config(&server);

    submit(&config, "RAW", "one", PAYLOAD).await.unwrap();
    submit(&config, "RAW", "two", PAYLOAD).await.unwrap();
    settle(&server).await;
    fixture.hook.runs.lock().unwrap().clear();

    let mut client = connect(&config).await.unwrap();
    client.print_queue("RAW").await.unwrap();
    finish_and_wait(client).await;

    assert_eq!(fixture.hook.runs.lock().unwrap().len(), 2);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn short_source_discards_job() {
    let fixture = Fixture::new(&["RAW"]);
    let mut server = fixture.start_server().await;
    let mut config = client_config(&server);
    config.send_data_first = true;

    let mut client = connect(&config).await.unwrap();
    let err = client
        .send_file("RAW", "job", PAYLOAD, PAYLOAD.len() as u64 + 100)
        .await
        .unwrap_err();
    assert!(matches!(err, LpdError::ShortTransfer { .. }));
    drop(client);
    settle(&server).await;

    assert!(fixture.jobs("RAW").is_empty());
    assert!(fixture.hook.runs.lock().unwrap().is_empty());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_submissions_get_distinct_jobs() {
    let fixture = Fixture::new(&["RAW"]);
    let mut server = fixture.start_server().await;
    let config = client_config(&server);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let config = config.clone();
        tasks.push(tokio::spawn(async move {
            submit(&config, "RAW", &format!("job{i}"), PAYLOAD).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    settle(&server).await;

    assert_eq!(fixture.jobs("RAW").len(), 8);
    server.stop().await.unwrap();
}
