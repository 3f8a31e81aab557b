//! Jobs: one asynchronous enumeration, print or wake-up operation.
//!
//! A job is bound to a single target item and process kind. Starting it
//! spawns a tokio task and returns immediately; the task always reports a
//! [`JobCompletion`] back on the controller's channel, whether the work
//! succeeded, failed, was cancelled or panicked.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use smbtree_core::{
    BrowseSettings, Credentials, ItemKey, NetworkError, NetworkItem, ProcessKind, Share,
};

use crate::convert::entries_to_items;
use crate::credentials::CredentialProvider;
use crate::enumerator::{DirectoryEnumerator, EnumerationRequest, PrintRequest};
use crate::error::{DiscoverError, Result};
use crate::{mimetype, wol};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lookup process that lists the children of `item`.
///
/// Plain files have no children and yield `None`.
pub fn lookup_process(item: &NetworkItem) -> Option<ProcessKind> {
    match item {
        NetworkItem::Network => Some(ProcessKind::LookupDomains),
        NetworkItem::Workgroup(_) => Some(ProcessKind::LookupDomainMembers),
        NetworkItem::Host(_) => Some(ProcessKind::LookupShares),
        NetworkItem::Share(_) => Some(ProcessKind::LookupFiles),
        NetworkItem::File(f) if f.is_directory => Some(ProcessKind::LookupFiles),
        NetworkItem::File(_) => None,
    }
}

#[derive(Debug, Clone)]
pub enum JobAction {
    Lookup,
    Print { file: PathBuf, copies: u32 },
    WakeUp { macs: Vec<String>, wait: Duration },
}

#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub target: NetworkItem,
    pub process: ProcessKind,
    /// 0 for user-initiated work, 1 for the credential retry.
    pub attempt: u8,
    /// Key of the item whose access-denied failure this job retries.
    pub retry_of: Option<ItemKey>,
    /// Lookup to resubmit once this one succeeds.
    pub follow_up: Option<NetworkItem>,
    pub action: JobAction,
    /// Used instead of the provider's credentials; set on the retry.
    pub credentials: Option<Credentials>,
    cancel: CancellationToken,
}

impl Job {
    fn new(target: NetworkItem, process: ProcessKind, action: JobAction) -> Self {
        Self {
            id: JobId::new(),
            target,
            process,
            attempt: 0,
            retry_of: None,
            follow_up: None,
            action,
            credentials: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A lookup of `target`'s children. Fails with `NotADirectory` for a
    /// plain file.
    pub fn lookup(target: NetworkItem) -> Result<Self> {
        let process = lookup_process(&target).ok_or(NetworkError::NotADirectory)?;
        Ok(Self::new(target, process, JobAction::Lookup))
    }

    pub fn print(share: Share, file: PathBuf, copies: u32) -> Self {
        Self::new(
            NetworkItem::Share(share),
            ProcessKind::PrintFile,
            JobAction::Print {
                file,
                copies: copies.max(1),
            },
        )
    }

    pub fn wake_up(macs: Vec<String>, wait: Duration) -> Self {
        Self::new(
            NetworkItem::Network,
            ProcessKind::WakeUp,
            JobAction::WakeUp { macs, wait },
        )
    }

    /// Mark this job as the credential retry for `original`.
    pub fn as_retry(mut self, original: ItemKey, follow_up: Option<NetworkItem>) -> Self {
        self.attempt = 1;
        self.retry_of = Some(original);
        self.follow_up = follow_up;
        self
    }

    /// Run with `credentials` whatever the provider or settings say.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub(crate) fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            scope: self.target.key(),
            process: self.process,
            cancel: self.cancel.clone(),
        }
    }

    /// Spawn the job. The returned handle cancels it.
    pub fn start(self, ctx: JobContext, done: mpsc::UnboundedSender<JobCompletion>) -> JobHandle {
        let handle = self.handle();

        tracing::debug!(
            job_id = %self.id,
            target = %self.target.address(),
            process = %self.process,
            attempt = self.attempt,
            "Job started"
        );
        tokio::spawn(self.run(ctx, done));
        handle
    }

    async fn run(self, ctx: JobContext, done: mpsc::UnboundedSender<JobCompletion>) {
        let mut work = tokio::spawn(execute(
            self.target.clone(),
            self.process,
            self.action.clone(),
            self.credentials.clone(),
            ctx,
        ));

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                // Dropping the work future kills any child process it owns.
                work.abort();
                JobOutcome::Cancelled
            }
            joined = &mut work => match joined {
                Ok(Ok(result)) => JobOutcome::Completed(result),
                Ok(Err(e)) => JobOutcome::Failed(e),
                Err(e) if e.is_cancelled() => JobOutcome::Cancelled,
                Err(e) => {
                    tracing::error!(job_id = %self.id, error = %e, "Job task panicked");
                    JobOutcome::Failed(NetworkError::Unknown("job task panicked".into()).into())
                }
            },
        };

        let completion = JobCompletion {
            id: self.id,
            target: self.target,
            process: self.process,
            attempt: self.attempt,
            retry_of: self.retry_of,
            follow_up: self.follow_up,
            action: self.action,
            outcome,
        };
        if done.send(completion).is_err() {
            tracing::debug!(job_id = %self.id, "Controller gone, completion dropped");
        }
    }
}

/// Collaborators a running job needs.
#[derive(Clone)]
pub struct JobContext {
    pub enumerator: Arc<dyn DirectoryEnumerator>,
    pub credentials: Arc<dyn CredentialProvider>,
    /// Settings as they were when the job was submitted.
    pub settings: BrowseSettings,
}

/// Controller-side handle to a running job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: JobId,
    pub scope: ItemKey,
    pub process: ProcessKind,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
pub enum JobResult {
    /// Children of the target, ready for reconciliation.
    Items(Vec<NetworkItem>),
    Printed,
    WokeUp,
}

#[derive(Debug)]
pub enum JobOutcome {
    Completed(JobResult),
    Failed(DiscoverError),
    Cancelled,
}

/// What a finished job reports back to the controller.
#[derive(Debug)]
pub struct JobCompletion {
    pub id: JobId,
    pub target: NetworkItem,
    pub process: ProcessKind,
    pub attempt: u8,
    pub retry_of: Option<ItemKey>,
    pub follow_up: Option<NetworkItem>,
    /// What the job did, so a retry can do it again.
    pub action: JobAction,
    pub outcome: JobOutcome,
}

impl JobCompletion {
    /// The target, when this job was refused access.
    pub fn access_denied_target(&self) -> Option<&NetworkItem> {
        match &self.outcome {
            JobOutcome::Failed(e) if e.is_access_denied() => Some(&self.target),
            _ => None,
        }
    }
}

async fn execute(
    target: NetworkItem,
    process: ProcessKind,
    action: JobAction,
    credentials: Option<Credentials>,
    ctx: JobContext,
) -> Result<JobResult> {
    match action {
        JobAction::Lookup => lookup(target, process, credentials, &ctx).await,
        JobAction::Print { file, copies } => print(target, file, copies, credentials, &ctx).await,
        JobAction::WakeUp { macs, wait } => {
            wol::wake_hosts(&macs).await?;
            tokio::time::sleep(wait).await;
            Ok(JobResult::WokeUp)
        }
    }
}

async fn lookup(
    mut target: NetworkItem,
    process: ProcessKind,
    explicit: Option<Credentials>,
    ctx: &JobContext,
) -> Result<JobResult> {
    let credentials = attach_credentials(&mut target, explicit, ctx).await;

    let max_master_browsers = match (&target, ctx.settings.large_network_neighborhood) {
        (NetworkItem::Network, true) => Some(1),
        _ => None,
    };
    let request = EnumerationRequest {
        address: target.address(),
        process,
        ip: target.ip(),
        credentials,
        max_master_browsers,
    };

    let entries = ctx.enumerator.enumerate(&request).await?;
    tracing::debug!(
        target = %request.address,
        process = %process,
        entries = entries.len(),
        "Enumeration returned"
    );

    let items = entries_to_items(&target, entries, ctx.enumerator.as_ref(), &ctx.settings).await;
    Ok(JobResult::Items(items))
}

async fn print(
    mut target: NetworkItem,
    file: PathBuf,
    copies: u32,
    explicit: Option<Credentials>,
    ctx: &JobContext,
) -> Result<JobResult> {
    let mimetype = mimetype::check_printable(&file).await?;
    attach_credentials(&mut target, explicit, ctx).await;

    let NetworkItem::Share(share) = target else {
        return Err(NetworkError::InvalidAddress.into());
    };
    if !share.is_printer() {
        return Err(NetworkError::InvalidAddress.into());
    }

    tracing::info!(
        printer = %share.unc(),
        file = %file.display(),
        mimetype = %mimetype,
        copies,
        "Printing file"
    );
    ctx.enumerator
        .print(&PrintRequest {
            share,
            file,
            copies,
        })
        .await?;
    Ok(JobResult::Printed)
}

/// Read credentials right before use unless the job or the target already
/// carries a login. Master browsers only get provider credentials when the
/// settings ask for it.
async fn attach_credentials(
    target: &mut NetworkItem,
    explicit: Option<Credentials>,
    ctx: &JobContext,
) -> Credentials {
    if let Some(credentials) = explicit.filter(|c| !c.is_empty()) {
        target.set_credentials(credentials.clone());
        return credentials;
    }
    match target.credentials() {
        Some(existing) if !existing.is_empty() => return existing.clone(),
        Some(_) => {}
        None if ctx.settings.master_browsers_require_auth => {}
        None => return Credentials::default(),
    }

    let credentials = ctx
        .credentials
        .read_credentials(target)
        .await
        .unwrap_or_default();
    target.set_credentials(credentials.clone());
    credentials
}
