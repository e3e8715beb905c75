use std::sync::Arc;

use super::CommandRunner;
use super::DirectiveEntry;
use super::ExecutionResult;
use crate::ExecutionError;

/// Runs one directive to completion, isolating its failure from the engine
/// and from sibling workers.
pub struct ExecutionWorker {
    runner: Arc<dyn CommandRunner>,
}

impl ExecutionWorker {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Minimal directive grammar: whitespace split, first token is the
    /// executable, the rest are positional arguments. No quoting support.
    pub(crate) fn parse(raw: &str) -> Result<(String, Vec<String>), ExecutionError> {
        let mut tokens = raw.split_whitespace();
        let program = tokens
            .next()
            .ok_or(ExecutionError::EmptyDirective)?
            .to_string();
        Ok((program, tokens.map(str::to_string).collect()))
    }

    pub async fn execute(&self, directive: DirectiveEntry) -> ExecutionResult {
        let outcome = self.try_execute(&directive).await;
        ExecutionResult { directive, outcome }
    }

    async fn try_execute(
        &self,
        directive: &DirectiveEntry,
    ) -> Result<String, ExecutionError> {
        let (program, args) = Self::parse(&directive.raw)?;

        let run = self
            .runner
            .run(&program, &args)
            .await
            .map_err(|source| ExecutionError::Spawn {
                program: program.clone(),
                source,
            })?;

        if run.status.success() {
            Ok(run.output)
        } else {
            Err(ExecutionError::NonZeroExit {
                program,
                status: run.status,
                output: run.output,
            })
        }
    }
}
