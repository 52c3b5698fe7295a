//! Routes decoded events to their handlers.
//!
//! A single dispatcher drains the event queue in arrival order. `SUBSCRIBED`
//! is handled inline so nothing acts on an offer or update before the
//! framework ID is known; offers and updates then fan out to the worker pool.

use std::sync::Arc;

use mesos_proto::{Event, EventType, Subscribed};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::offers::handle_offer;
use super::pool::WorkerPool;
use super::state::{stopped, Assignment, DriverState, Shared, StopReason};
use super::update::handle_update;

pub(crate) async fn run(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<Event>,
    done: oneshot::Sender<StopReason>,
) {
    let mut pool = WorkerPool::new(shared.options.max_concurrent_handlers);
    let mut shutdown = shared.shutdown_signal();

    loop {
        let event = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    shared.request_stop(StopReason::StreamClosed);
                    break;
                }
            },
        };
        dispatch(&shared, &mut pool, event).await;
    }

    events.close();
    let mut discarded = 0usize;
    while events.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!(discarded, "Discarded queued events");
    }

    debug!(in_flight = pool.in_flight(), "Waiting for event handlers");
    pool.drain().await;

    shared.transition(DriverState::Stopped);
    let reason = shared.stop_reason();
    let counters = shared.counters();
    info!(
        reason = %reason,
        launched = counters.launched,
        finished = counters.finished,
        failed = counters.failed,
        "Driver stopped"
    );
    let _ = done.send(reason);
}

pub(crate) async fn dispatch(shared: &Arc<Shared>, pool: &mut WorkerPool, event: Event) {
    trace!(kind = %event.kind, "Dispatching event");

    match event.kind {
        EventType::Subscribed => match event.subscribed {
            Some(subscribed) => handle_subscribed(shared, subscribed),
            None => warn!("SUBSCRIBED event without payload"),
        },
        EventType::Offers => {
            if !accepting(shared, event.kind) {
                return;
            }
            let Some(offers) = event.offers else {
                warn!("OFFERS event without payload");
                return;
            };
            debug!(count = offers.offers.len(), "Received offers");
            for offer in offers.offers {
                let shared = Arc::clone(shared);
                pool.spawn(async move { handle_offer(&shared, offer).await }).await;
            }
        }
        EventType::Update => {
            if !accepting(shared, event.kind) {
                return;
            }
            let Some(update) = event.update else {
                warn!("UPDATE event without payload");
                return;
            };
            let shared = Arc::clone(shared);
            pool.spawn(async move { handle_update(&shared, update.status).await })
                .await;
        }
        EventType::Rescind => {
            if let Some(rescind) = event.rescind {
                info!(offer_id = %rescind.offer_id, "Offer rescinded");
            }
        }
        EventType::Message => {
            if let Some(message) = event.message {
                info!(
                    agent_id = %message.agent_id,
                    executor_id = %message.executor_id,
                    bytes = message.data.len(),
                    "Received executor message"
                );
            }
        }
        EventType::Failure => match event.failure {
            Some(failure) => match (&failure.agent_id, &failure.executor_id) {
                (Some(agent_id), Some(executor_id)) => warn!(
                    agent_id = %agent_id,
                    executor_id = %executor_id,
                    status = failure.status,
                    "Executor terminated"
                ),
                (Some(agent_id), None) => warn!(agent_id = %agent_id, "Agent lost"),
                _ => warn!(?failure, "Received failure"),
            },
            None => warn!("FAILURE event without payload"),
        },
        EventType::Error => {
            let message = event.error.map(|e| e.message).unwrap_or_default();
            error!(message = %message, "Master reported an error");
        }
        EventType::Heartbeat => debug!("Heartbeat"),
        EventType::Unknown => trace!("Ignoring event of unknown type"),
    }
}

fn handle_subscribed(shared: &Shared, subscribed: Subscribed) {
    let framework_id = subscribed.framework_id;
    match shared.assign_framework_id(framework_id.clone()) {
        Assignment::Assigned | Assignment::Unchanged => {}
        Assignment::Conflict => error!(
            framework_id = %framework_id,
            "Master assigned a different framework id; keeping the original"
        ),
    }

    if shared.transition(DriverState::Subscribed) {
        info!(
            framework_id = %framework_id,
            stream_id = shared.transport.stream_id().as_deref().unwrap_or(""),
            heartbeat_interval_seconds = subscribed.heartbeat_interval_seconds,
            "Subscribed"
        );
    }
}

/// Offers and updates are acted on once a framework id is assigned and until
/// a stop is requested. Events queued from a lost stream still count while
/// the driver resubscribes.
fn accepting(shared: &Shared, kind: EventType) -> bool {
    let state = shared.state();
    if shared.framework_id().is_some() && !state.is_stopping() {
        return true;
    }
    warn!(kind = %kind, state = %state, "Dropping event received before subscription");
    false
}
