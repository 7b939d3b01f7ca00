use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
#[cfg(test)]
use mockall::automock;
use kube::{
    api::{Api, AttachParams},
    Client,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::util::errors::{Error, Result, StdError};

/// A command to run inside one container of a member pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecRequest {
    pub pod: String,
    pub container: String,
    pub namespace: String,
    pub command: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs the command and waits for it to exit. A non-success exit is an error.
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutput>;
}

/// Runs commands through the pod exec subresource.
pub struct PodExecutor {
    client: Client,
}

impl PodExecutor {
    pub fn new(client: Client) -> Self {
        PodExecutor { client }
    }
}

fn exec_error(request: &ExecRequest, message: impl std::fmt::Display) -> Error {
    Error::StdError(StdError::ExecError(format!(
        "{}/{} `{}`: {}",
        request.namespace,
        request.pod,
        request.command.join(" "),
        message
    )))
}

#[async_trait]
impl CommandExecutor for PodExecutor {
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &request.namespace);
        let params = AttachParams::default()
            .container(request.container.clone())
            .stdout(true)
            .stderr(true);

        debug!(pod = %request.pod, command = ?request.command, "exec");
        let mut attached = pods
            .exec(&request.pod, request.command.clone(), &params)
            .await
            .map_err(|e| exec_error(&request, e))?;

        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_all(stdout_reader), read_all(stderr_reader));

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached.join().await.map_err(|e| exec_error(&request, e))?;

        match status {
            Some(s) if s.status.as_deref() == Some("Success") => Ok(ExecOutput { stdout, stderr }),
            Some(s) => Err(exec_error(
                &request,
                s.message.unwrap_or_else(|| "command failed".to_string()),
            )),
            None => Err(exec_error(&request, "no exit status reported")),
        }
    }
}

/// Reads a whole output stream. Bytes that are not valid UTF-8 are replaced, not dropped.
async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            warn!("failed to read exec output after {} bytes: {}", buf.len(), e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
