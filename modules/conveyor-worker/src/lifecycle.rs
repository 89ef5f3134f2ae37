//! The supervisory loop for one worker process: withdraw, execute,
//! archive, report, sleep, repeat until out of lives or signalled.

use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use conveyor_client::{Buckets, WithdrawFilter};
use conveyor_common::{now, Site, Work, WorkStatus, Workspace};

use crate::execute;
use crate::notify;
use crate::registry::Registry;
use crate::shutdown::Shutdown;

pub struct LifecycleConfig {
    /// Buckets to withdraw from, tried in order each attempt.
    pub buckets: Vec<String>,
    pub site: Site,
    pub tags: Vec<String>,
    pub parents: Vec<String>,
    pub events: Vec<i64>,
    /// Static function override: replaces whatever executable the work carries.
    pub function: Option<String>,
    /// Static command override.
    pub command: Option<Vec<String>>,
    /// Attempts before exiting; -1 runs until signalled.
    pub lives: i64,
    pub sleep: Duration,
}

pub struct Lifecycle {
    config: LifecycleConfig,
    workspace: Workspace,
    registry: Registry,
    buckets: Buckets,
    shutdown: Shutdown,
}

impl Lifecycle {
    pub fn new(
        config: LifecycleConfig,
        workspace: Workspace,
        registry: Registry,
        buckets: Buckets,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            workspace,
            registry,
            buckets,
            shutdown,
        }
    }

    /// Run attempts until lives are exhausted or the exit flag is set.
    pub async fn run(&self) {
        let mut lives = self.config.lives;
        while lives != 0 && !self.shutdown.is_set() {
            self.attempt().await;
            lives -= 1;
            if lives != 0 && !self.shutdown.is_set() {
                debug!(seconds = self.config.sleep.as_secs(), "sleeping between attempts");
                self.shutdown.sleep(self.config.sleep).await;
            }
        }
        info!("lifecycle complete");
    }

    /// One pass of the attempt state machine. Returns true when a work was
    /// withdrawn and reported.
    pub async fn attempt(&self) -> bool {
        let work = match self.withdraw().await {
            Ok(Some(work)) => work,
            Ok(None) => {
                debug!("no work available");
                return false;
            }
            Err(err) => {
                // Nothing was dequeued; the queue is untouched.
                warn!(error = %err, "could not withdraw work");
                return false;
            }
        };
        let id = work.id.clone().unwrap_or_else(|| "unassigned".to_string());
        let span = info_span!("work", id = %id);
        self.process(work).instrument(span).await
    }

    /// Try each configured bucket (and parent filter) in order until one
    /// yields a work.
    async fn withdraw(&self) -> conveyor_client::Result<Option<Work>> {
        let parents: Vec<Option<String>> = if self.config.parents.is_empty() {
            vec![None]
        } else {
            self.config.parents.iter().cloned().map(Some).collect()
        };
        for bucket in &self.config.buckets {
            for parent in &parents {
                let filter = WithdrawFilter {
                    pipeline: bucket.clone(),
                    site: Some(self.config.site.to_string()),
                    tags: (!self.config.tags.is_empty()).then(|| self.config.tags.clone()),
                    event: (!self.config.events.is_empty()).then(|| self.config.events.clone()),
                    parent: parent.clone(),
                    ..WithdrawFilter::default()
                };
                if let Some(work) = self.buckets.withdraw(&filter).await? {
                    return Ok(Some(work));
                }
            }
        }
        Ok(None)
    }

    async fn process(&self, mut work: Work) -> bool {
        info!("work withdrawn");

        // A static override replaces whatever the work carries; the two
        // executables stay mutually exclusive.
        if let Some(function) = &self.config.function {
            work.command = None;
            work.function = Some(function.clone());
        } else if let Some(command) = &self.config.command {
            work.function = None;
            work.command = Some(command.clone());
        }

        if !work.has_executable() {
            error!("neither function nor command provided");
            work.status = WorkStatus::Failure;
        } else {
            if work.function.is_some() {
                execute::function(&self.registry, &mut work, &self.shutdown).await;
            } else {
                execute::command(&mut work, &self.shutdown).await;
            }
            let deadline = work.start.unwrap_or_else(now) + work.timeout as f64;
            if deadline < now() {
                error!(timeout = work.timeout, "work exceeded its deadline");
                work.status = WorkStatus::Failure;
            }
            // Archiver failures never flip the work status.
            conveyor_archive::run(&mut work, &self.workspace).await;
        }

        // The report must go out on every exit path once a work was
        // withdrawn; a dropped update would strand the row as running.
        notify::decorate(&mut work, &self.workspace);
        match self.buckets.update(std::slice::from_ref(&work)).await {
            Ok(_) => info!(status = %work.status, "work reported"),
            Err(err) => error!(error = %err, "could not report work update"),
        }
        true
    }
}
