use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::Agent;
use crate::CommandRunner;
use crate::CoordClient;
use crate::Coordination;
use crate::DispatchEngine;
use crate::EtcdBackend;
use crate::LeaseRegistrar;
use crate::PrefixWatcher;
use crate::ProcessRunner;
use crate::Result;
use crate::Settings;

/// Assembles an [`Agent`] from validated settings.
///
/// Defaults to the etcd-backed coordination client and the plain process
/// runner; both can be overridden, mainly for tests.
pub struct AgentBuilder {
    settings: Settings,
    shutdown: watch::Receiver<()>,
    client: Option<Arc<dyn Coordination>>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl AgentBuilder {
    pub fn new(settings: Settings, shutdown: watch::Receiver<()>) -> Self {
        Self {
            settings,
            shutdown,
            client: None,
            runner: None,
        }
    }

    pub fn coordination(mut self, client: Arc<dyn Coordination>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub async fn build(self) -> Result<Agent> {
        self.settings.validate()?;

        let client = match self.client {
            Some(client) => client,
            None => {
                info!(endpoints = ?self.settings.store.endpoints, "connecting to coordination store");
                let backend = EtcdBackend::connect(&self.settings.store).await?;
                Arc::new(CoordClient::new(backend)) as Arc<dyn Coordination>
            }
        };

        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(ProcessRunner) as Arc<dyn CommandRunner>);

        let registrar = LeaseRegistrar::new(Arc::clone(&client), &self.settings.node);
        let watcher = PrefixWatcher::new(Arc::clone(&client));
        let assignment_prefix = self.settings.node.assignment_prefix();
        let engine = DispatchEngine::new(Arc::clone(&client), assignment_prefix.clone(), runner);

        Ok(Agent {
            registrar,
            watcher,
            engine,
            assignment_prefix,
            shutdown: self.shutdown,
        })
    }
}
