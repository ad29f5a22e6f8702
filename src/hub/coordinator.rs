//! Single-task coordination loop owning the membership set.
//!
//! [`Hub`] serializes admit, remove and broadcast requests through one
//! `tokio::select!` loop fed by three bounded channels. Every request carries
//! an acknowledgement that the loop fires once the request has been applied,
//! and [`HubHandle`] waits for it before returning. Like a rendezvous
//! channel, a call that has returned has taken effect, so any request issued
//! afterwards observes it regardless of which channel it travels on.
//!
//! Broadcast fan-out never blocks: each member's outbound queue is offered
//! the payload with `try_send`, and a member whose queue is full is evicted
//! through the same path as an explicit removal.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::ConnectionId;

/// Capacity of each coordination channel. Senders also wait for the loop's
/// acknowledgement, so at most one request per caller is ever in flight.
const COORDINATION_CAPACITY: usize = 1;

/// A connection as seen by the hub: identity plus the producer side of its
/// outbound queue.
///
/// The hub holds the only sender of the queue, so dropping the `Member`
/// closes the queue and tells the connection's outbound duty to finish.
#[derive(Debug)]
pub struct Member {
    id: ConnectionId,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Utf8Bytes>,
}

impl Member {
    /// Creates a member from a connection's identity and outbound sender.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<Utf8Bytes>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            outbound,
        }
    }
}

/// A coordination request plus the signal fired once the loop applied it.
#[derive(Debug)]
struct Request<T> {
    body: T,
    done: oneshot::Sender<()>,
}

impl<T> Request<T> {
    fn new(body: T) -> (Self, oneshot::Receiver<()>) {
        let (done, applied) = oneshot::channel();
        (Self { body, done }, applied)
    }

    fn apply(self, handle: impl FnOnce(T)) {
        handle(self.body);
        // A dropped receiver just means the caller stopped waiting.
        let _ = self.done.send(());
    }
}

/// Point-in-time questions about membership, answered by the loop.
#[derive(Debug)]
enum MembershipQuery {
    Contains {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable handle used by connections and HTTP handlers to talk to the
/// coordination loop.
///
/// Each operation returns once the loop has applied it. Nothing is reported
/// back to the caller, and once the loop has stopped every operation is a
/// no-op.
#[derive(Debug, Clone)]
pub struct HubHandle {
    admit_tx: mpsc::Sender<Request<Member>>,
    remove_tx: mpsc::Sender<Request<ConnectionId>>,
    broadcast_tx: mpsc::Sender<Request<Utf8Bytes>>,
    query_tx: mpsc::Sender<MembershipQuery>,
}

impl HubHandle {
    /// Adds a member. Broadcasts issued after this returns will be offered
    /// to it; earlier ones will not.
    pub async fn admit(&self, member: Member) {
        if !submit(&self.admit_tx, member).await {
            tracing::debug!("hub stopped, admit ignored");
        }
    }

    /// Removes a member and closes its outbound queue.
    ///
    /// Removing an unknown or already removed connection is a no-op.
    pub async fn remove(&self, id: ConnectionId) {
        if !submit(&self.remove_tx, id).await {
            tracing::debug!(connection = %id, "hub stopped, remove ignored");
        }
    }

    /// Offers `payload` to every current member.
    pub async fn broadcast(&self, payload: Utf8Bytes) {
        if !submit(&self.broadcast_tx, payload).await {
            tracing::debug!("hub stopped, broadcast dropped");
        }
    }

    /// Returns `true` if `id` is a member at the instant the loop answers.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        let (reply, answer) = oneshot::channel();
        if self
            .query_tx
            .send(MembershipQuery::Contains { id, reply })
            .await
            .is_err()
        {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Returns the number of members at the instant the loop answers.
    pub async fn member_count(&self) -> usize {
        let (reply, answer) = oneshot::channel();
        if self
            .query_tx
            .send(MembershipQuery::Count { reply })
            .await
            .is_err()
        {
            return 0;
        }
        answer.await.unwrap_or(0)
    }
}

/// Sends `body` to the loop and waits until it has been applied. Returns
/// `false` if the loop is gone.
async fn submit<T>(tx: &mpsc::Sender<Request<T>>, body: T) -> bool {
    let (request, applied) = Request::new(body);
    if tx.send(request).await.is_err() {
        return false;
    }
    applied.await.is_ok()
}

/// The coordination loop and the membership set it owns.
#[derive(Debug)]
pub struct Hub {
    members: HashMap<ConnectionId, Member>,
    admit_rx: mpsc::Receiver<Request<Member>>,
    remove_rx: mpsc::Receiver<Request<ConnectionId>>,
    broadcast_rx: mpsc::Receiver<Request<Utf8Bytes>>,
    query_rx: mpsc::Receiver<MembershipQuery>,
}

impl Hub {
    /// Spawns the coordination loop on the current tokio runtime and returns
    /// a handle to it.
    ///
    /// The loop runs until every clone of the returned handle is dropped.
    #[must_use]
    pub fn spawn() -> HubHandle {
        let (hub, handle) = Self::new();
        tokio::spawn(hub.run());
        handle
    }

    fn new() -> (Self, HubHandle) {
        let (admit_tx, admit_rx) = mpsc::channel(COORDINATION_CAPACITY);
        let (remove_tx, remove_rx) = mpsc::channel(COORDINATION_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(COORDINATION_CAPACITY);
        let (query_tx, query_rx) = mpsc::channel(COORDINATION_CAPACITY);

        let hub = Self {
            members: HashMap::new(),
            admit_rx,
            remove_rx,
            broadcast_rx,
            query_rx,
        };
        let handle = HubHandle {
            admit_tx,
            remove_tx,
            broadcast_tx,
            query_tx,
        };
        (hub, handle)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(request) = self.admit_rx.recv() => {
                    request.apply(|member| self.admit(member));
                }
                Some(request) = self.remove_rx.recv() => {
                    request.apply(|id| self.remove(id));
                }
                Some(request) = self.broadcast_rx.recv() => {
                    request.apply(|payload| self.broadcast(&payload));
                }
                Some(query) = self.query_rx.recv() => self.answer(query),
                else => break,
            }
        }
        tracing::debug!(members = self.members.len(), "hub coordination loop stopped");
    }

    fn admit(&mut self, member: Member) {
        tracing::info!(
            connection = %member.id,
            remote_addr = %member.remote_addr,
            members = self.members.len().saturating_add(1),
            "client joined"
        );
        self.members.insert(member.id, member);
    }

    fn remove(&mut self, id: ConnectionId) {
        if let Some(member) = self.close_member(id) {
            tracing::info!(
                connection = %id,
                remote_addr = %member.remote_addr,
                members = self.members.len(),
                "client left"
            );
        }
    }

    fn broadcast(&mut self, payload: &Utf8Bytes) {
        let mut evicted = Vec::new();
        for (id, member) in &self.members {
            match member.outbound.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection = %id,
                        remote_addr = %member.remote_addr,
                        "outbound queue full, evicting slow client"
                    );
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        connection = %id,
                        "outbound queue already closed, evicting"
                    );
                    evicted.push(*id);
                }
            }
        }
        for id in evicted {
            self.close_member(id);
        }
        tracing::trace!(
            bytes = payload.as_str().len(),
            members = self.members.len(),
            "broadcast delivered"
        );
    }

    fn answer(&self, query: MembershipQuery) {
        // A dropped reply receiver just means the asker gave up.
        match query {
            MembershipQuery::Contains { id, reply } => {
                let _ = reply.send(self.members.contains_key(&id));
            }
            MembershipQuery::Count { reply } => {
                let _ = reply.send(self.members.len());
            }
        }
    }

    /// Removes `id` from the membership set. Dropping the returned member
    /// closes its outbound queue.
    fn close_member(&mut self, id: ConnectionId) -> Option<Member> {
        self.members.remove(&id)
    }
}
