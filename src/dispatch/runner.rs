use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;

/// Exit status plus the child's combined stdout/stderr
#[derive(Debug)]
pub struct RunOutput {
    pub status: std::process::ExitStatus,
    pub output: String,
}

/// Process-execution capability consumed by the execution worker.
///
/// Retries and timeouts are outside this boundary.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<RunOutput>;
}

/// Runs the directive as a plain child process, no shell interpretation
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<RunOutput> {
        let out = Command::new(program).args(args).output().await?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(RunOutput {
            status: out.status,
            output,
        })
    }
}
