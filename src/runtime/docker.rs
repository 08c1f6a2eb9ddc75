use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use bollard::errors::Error as DockerError;
use futures::StreamExt;

use super::{ContainerDetails, ContainerSummary, Error, Result, RuntimeGateway, RuntimeStats};

/// Seconds a single runtime request may take.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Docker Engine API client speaking over the daemon's unix socket.
#[derive(Debug, Clone)]
pub struct DockerGateway {
    docker: Docker,
    socket_path: PathBuf,
}

impl DockerGateway {
    /// Creates a client for the daemon at `socket_path`.
    ///
    /// No connection is made until the first request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the client cannot be set up.
    pub fn connect(socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        let docker = Docker::connect_with_unix(
            &socket_path.to_string_lossy(),
            REQUEST_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|source| Error::Connect {
            path: socket_path.clone(),
            source,
        })?;
        log::debug!("Docker client set up for {}", socket_path.display());
        Ok(Self {
            docker,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Maps a client error of `request` onto the gateway's error.
///
/// A 404 only means "no such container" for requests addressing one.
fn classify(request: &str, name: Option<&str>, err: DockerError) -> Error {
    match (err, name) {
        (DockerError::DockerResponseServerError { status_code: 404, .. }, Some(name)) => {
            Error::NotFound {
                name: name.to_owned(),
            }
        }
        (
            DockerError::DockerResponseServerError {
                status_code,
                message,
            },
            _,
        ) => Error::Api {
            request: request.to_owned(),
            status: status_code,
            message,
        },
        (source, _) => Error::Request {
            request: request.to_owned(),
            source,
        },
    }
}

#[async_trait]
impl RuntimeGateway for DockerGateway {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| classify("list containers", None, err))?;
        Ok(containers.into_iter().map(ContainerSummary::from).collect())
    }

    async fn inspect(&self, name: &str, size: bool) -> Result<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(name, Some(InspectContainerOptions { size }))
            .await
            .map_err(|err| classify("inspect", Some(name), err))?;
        Ok(response.into())
    }

    async fn stats(&self, name: &str) -> Result<RuntimeStats> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let mut stream = std::pin::pin!(self.docker.stats(name, Some(options)));
        match stream.next().await {
            Some(Ok(stats)) => Ok(stats.into()),
            Some(Err(err)) => Err(classify("stats", Some(name), err)),
            None => Err(Error::Api {
                request: "stats".to_owned(),
                status: 0,
                message: format!("empty stats response for `{name}`"),
            }),
        }
    }

    async fn restart(&self, name: &str) -> Result<()> {
        log::debug!("Restarting container `{}`", name);
        self.docker
            .restart_container(name, None)
            .await
            .map_err(|err| classify("restart", Some(name), err))
    }
}

impl From<bollard::container::Stats> for RuntimeStats {
    fn from(value: bollard::container::Stats) -> Self {
        let (network_rx_bytes, network_tx_bytes) = value
            .networks
            .unwrap_or_default()
            .values()
            .fold((0, 0), |(rx, tx), net| (rx + net.rx_bytes, tx + net.tx_bytes));
        Self {
            cpu_total_usage: value.cpu_stats.cpu_usage.total_usage,
            system_cpu_usage: value.cpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpus: value
                .cpu_stats
                .online_cpus
                .and_then(|cpus| u32::try_from(cpus).ok())
                .unwrap_or(0),
            memory_usage: value.memory_stats.usage.unwrap_or(0),
            memory_limit: value.memory_stats.limit.unwrap_or(0),
            network_rx_bytes,
            network_tx_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serves exactly one canned HTTP response on a fresh socket.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (tempfile::TempDir, DockerGateway, tokio::task::JoinHandle<String>) {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (dir, DockerGateway::connect(socket).unwrap(), server)
    }

    #[tokio::test]
    async fn test_list_containers() {
        let (_dir, gateway, server) = serve_once(
            "200 OK",
            r#"[{"Id":"abc","Names":["/fluxpolkadot"],"State":"running"}]"#,
        )
        .await;

        let containers = gateway.list_containers(false).await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].names, ["/fluxpolkadot"]);
        assert!(containers[0].is_running());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET "));
        assert!(request.contains("/containers/json?"));
    }

    #[tokio::test]
    async fn test_inspect_with_size() {
        let (_dir, gateway, server) = serve_once(
            "200 OK",
            r#"{"Id":"abc","Name":"/fluxpolkadot","State":{"Running":true},"SizeRootFs":2048}"#,
        )
        .await;

        let details = gateway.inspect("fluxpolkadot", true).await.unwrap();
        assert!(details.is_running());
        assert_eq!(details.size_root_fs, Some(2048));

        let request = server.await.unwrap();
        assert!(request.contains("/containers/fluxpolkadot/json?size=true"));
    }

    #[tokio::test]
    async fn test_inspect_missing_container() {
        let (_dir, gateway, _server) =
            serve_once("404 Not Found", r#"{"message":"No such container: fluxgone"}"#).await;

        let err = gateway.inspect("fluxgone", false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_restart_daemon_error() {
        let (_dir, gateway, server) =
            serve_once("500 Internal Server Error", r#"{"message":"driver failed"}"#).await;

        let err = gateway.restart("fluxpolkadot").await.unwrap_err();
        match err {
            Error::Api { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "driver failed");
            }
            other => panic!("unexpected error: {other}"),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("POST "));
        assert!(request.contains("/containers/fluxpolkadot/restart"));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_not_not_found() {
        let gateway = DockerGateway::connect("/definitely/does/not/exist.sock").unwrap();
        let err = gateway.inspect("fluxpolkadot", false).await.unwrap_err();
        assert!(matches!(err, Error::Request { .. }));
    }
}
