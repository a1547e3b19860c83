//! Job dispatch and correlation.
//!
//! One job at a time: the dispatcher publishes a signed request, remembers its
//! id in the process-wide slot, and a background task watches the feedback
//! stream. Feedback whose `e` tag does not match the slot is dropped. A
//! `success` status triggers a point query for the paired result event, whose
//! content resolves the caller's pending future. Remote errors are surfaced as
//! log lines only; there is no retry, timeout, or cancellation.

use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ragchat_crypto::Envelope;
use ragchat_proto::{
    Event, Filter, JobRequest, JobStatus, KIND_JOB_FEEDBACK, Keys, is_job_feedback_kind,
    is_job_result_kind, pubkey_from_hex, result_kind_for,
};

use crate::error::RelayError;
use crate::pool::RelayPool;

/// The single in-flight job.
struct ActiveJob {
    id: String,
    result_kind: u16,
    envelope: Option<Arc<Envelope>>,
    resolve: oneshot::Sender<String>,
}

type JobSlot = Arc<Mutex<Option<ActiveJob>>>;

/// What a feedback event asks of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackAction {
    /// Not for the active job, or an unrecognized status.
    Ignore,
    /// Emit the content as a progress line.
    Progress,
    /// Emit the content as a remote error; the job stays pending.
    RemoteError,
    /// Terminal: fetch the paired result event.
    FetchResult,
}

/// Branch on a feedback event's correlation tag and status value.
fn classify_feedback(event: &Event, active_id: Option<&str>) -> FeedbackAction {
    // The subscription filters on the feedback kind, but relays are untrusted.
    if !is_job_feedback_kind(event.kind) {
        return FeedbackAction::Ignore;
    }
    let Some(job_ref) = event.tag_value("e") else {
        return FeedbackAction::Ignore;
    };
    if active_id != Some(job_ref) {
        return FeedbackAction::Ignore;
    }
    match event.tag_value("status").and_then(JobStatus::parse) {
        Some(JobStatus::Log) => FeedbackAction::Progress,
        Some(JobStatus::Error) => FeedbackAction::RemoteError,
        Some(JobStatus::Success) => FeedbackAction::FetchResult,
        None => FeedbackAction::Ignore,
    }
}

/// Event content, decrypted when the event is marked encrypted and a
/// conversation key is at hand. Failures pass the content through unchanged.
fn open_content(event: &Event, envelope: Option<&Envelope>) -> String {
    if !event.has_tag("encrypted") {
        return event.content.clone();
    }
    let Some(envelope) = envelope else {
        return event.content.clone();
    };
    match envelope.open_string(&event.content) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            debug!(event_id = %event.id, error = %e, "Decryption failed, passing content through");
            event.content.clone()
        }
    }
}

/// Dispatches jobs over the relay pool and correlates their responses.
pub struct JobDispatcher {
    pool: Arc<RelayPool>,
    keys: Keys,
    slot: JobSlot,
    listener: JoinHandle<()>,
}

impl JobDispatcher {
    /// Connect the pool, generate the per-process ephemeral keys, and start
    /// the persistent feedback subscription.
    pub async fn connect(relays: &[String]) -> Result<Self, RelayError> {
        let pool = Arc::new(RelayPool::connect(relays).await?);
        let keys = Keys::generate();
        info!(pubkey = %keys.public_hex(), "Generated ephemeral job keypair");

        let slot: JobSlot = Arc::new(Mutex::new(None));
        let mut subscription = pool
            .subscribe(vec![Filter::new().kind(KIND_JOB_FEEDBACK)])
            .await?;

        let listener_pool = Arc::clone(&pool);
        let listener_slot = Arc::clone(&slot);
        let listener = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handle_feedback(&listener_pool, &listener_slot, &event).await;
            }
            warn!("Feedback subscription ended");
        });

        Ok(Self {
            pool,
            keys,
            slot,
            listener,
        })
    }

    /// The ephemeral public key jobs are signed with.
    pub fn public_hex(&self) -> String {
        self.keys.public_hex()
    }

    /// Publish a job request and wait for its result.
    ///
    /// With a provider designated, the request's inputs and params are sealed
    /// for that provider's key and responses are opened with the same
    /// conversation key.
    ///
    /// Waits indefinitely; a newer `run_job` call displaces this one, in which
    /// case it resolves to `JobDisplaced`.
    pub async fn run_job(
        &self,
        request: &JobRequest,
        provider: Option<&str>,
    ) -> Result<String, RelayError> {
        let (template, envelope) = match provider {
            Some(provider_hex) => {
                let recipient = pubkey_from_hex(provider_hex)?;
                let envelope = Envelope::for_recipient(&self.keys.secret_key(), &recipient)?;
                let payload = serde_json::to_string(&request.payload_tags())
                    .map_err(ragchat_proto::ProtoError::Json)?;
                let sealed = envelope.seal(payload.as_bytes())?;
                (
                    request.to_sealed_template(sealed, provider_hex),
                    Some(Arc::new(envelope)),
                )
            }
            None => (request.to_template(), None),
        };

        let event = template.sign(&self.keys)?;
        let result_kind = result_kind_for(request.kind())?;

        let (resolve, pending) = oneshot::channel();
        {
            let mut slot = self.slot.lock().await;
            if let Some(displaced) = slot.replace(ActiveJob {
                id: event.id.clone(),
                result_kind,
                envelope,
                resolve,
            }) {
                warn!(job_id = %displaced.id, "Displacing in-flight job");
            }
        }

        debug!(job_id = %event.id, kind = event.kind, encrypted = provider.is_some(), "Dispatching job");
        if let Err(e) = self.pool.publish(&event).await {
            take_if_active(&self.slot, &event.id).await;
            return Err(e);
        }

        pending.await.map_err(|_| RelayError::JobDisplaced)
    }
}

/// Remove the active job only while it still owns the slot; a job displaced
/// by a newer request is left alone.
async fn take_if_active(slot: &Mutex<Option<ActiveJob>>, job_id: &str) -> Option<ActiveJob> {
    let mut guard = slot.lock().await;
    if guard.as_ref().is_some_and(|job| job.id == job_id) {
        guard.take()
    } else {
        None
    }
}

impl Drop for JobDispatcher {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// React to one feedback event.
async fn handle_feedback(pool: &RelayPool, slot: &Mutex<Option<ActiveJob>>, event: &Event) {
    let (active_id, result_kind, envelope) = {
        let guard = slot.lock().await;
        match guard.as_ref() {
            Some(job) => (job.id.clone(), job.result_kind, job.envelope.clone()),
            None => return,
        }
    };

    match classify_feedback(event, Some(active_id.as_str())) {
        FeedbackAction::Ignore => {
            debug!(event_id = %event.id, "Ignoring feedback event");
        }
        FeedbackAction::Progress => {
            let content = open_content(event, envelope.as_deref());
            info!(job_id = %active_id, %content, "Job progress");
        }
        FeedbackAction::RemoteError => {
            let content = open_content(event, envelope.as_deref());
            warn!(job_id = %active_id, %content, "Remote error");
        }
        FeedbackAction::FetchResult => {
            fetch_and_resolve(pool, slot, &active_id, result_kind, envelope.as_deref()).await;
        }
    }
}

/// Point-query the paired result event and resolve the pending job.
async fn fetch_and_resolve(
    pool: &RelayPool,
    slot: &Mutex<Option<ActiveJob>>,
    job_id: &str,
    result_kind: u16,
    envelope: Option<&Envelope>,
) {
    let filter = Filter::new().kind(result_kind).event(job_id).limit(1);
    debug!(job_id, result_kind, "Success reported; fetching result");

    let events = match pool.query(filter).await {
        Ok(events) => events,
        Err(e) => {
            warn!(job_id, error = %e, "Result query failed");
            return;
        }
    };
    let Some(result) = events.into_iter().next() else {
        warn!(job_id, "Success reported but no result event found");
        return;
    };
    if !is_job_result_kind(result.kind) {
        warn!(job_id, kind = result.kind, "Ignoring result with out-of-range kind");
        return;
    }

    let content = open_content(&result, envelope);
    // The slot may have been displaced while the query was in flight.
    if let Some(job) = take_if_active(slot, job_id).await {
        let _ = job.resolve.send(content);
    }
}
