use super::frame::{CorrelationId, Frame, FrameFilter};
use super::timer::DeadlineTimer;
use super::Transport;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Condvar, Mutex, Weak},
    time::{Duration, Instant},
};

/// Frames that matched a pending id but not its filter are kept this long for a later
/// [`ResponseRouter::expect`]
pub const HELD_FRAME_LIFETIME: Duration = Duration::from_secs(30);
pub const MAXIMUM_HELD_FRAMES: usize = 64;

pub type UnsolicitedObserver = Arc<dyn Fn(&Frame) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The id is still used by a pending request
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(CorrelationId),
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    /// No matching frame arrived before the deadline
    #[error("request {0} timed out")]
    Timeout(CorrelationId),
    #[error("request {0} was cancelled")]
    Cancelled(CorrelationId),
}

/// One outstanding command, before it is handed to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedRequest {
    pub id: CorrelationId,
    pub payload: Vec<u8>,
    pub filter: FrameFilter,
    pub timeout: Duration,
}

impl CorrelatedRequest {
    pub fn new(id: CorrelationId, payload: Vec<u8>, filter: FrameFilter, timeout: Duration) -> Self {
        CorrelatedRequest { id, payload, filter, timeout }
    }
}

#[derive(Debug, Default)]
enum ResultSlot {
    #[default]
    Empty,
    Fulfilled(Frame),
    TimedOut,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Default)]
struct Completion {
    slot: Mutex<ResultSlot>,
    resolved: Condvar,
}

impl Completion {
    /// Moves the slot out of `Empty`. Every later attempt is ignored and reports `false`.
    fn complete(&self, outcome: ResultSlot) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if !matches!(*slot, ResultSlot::Empty) {
            return false;
        }
        *slot = outcome;
        self.resolved.notify_all();
        true
    }
}

/// Returned by [`ResponseRouter::issue`] and [`ResponseRouter::expect`], consumed by
/// [`ResponseRouter::wait`]
#[derive(Debug)]
pub struct RequestHandle {
    id: CorrelationId,
    ticket: u64,
    deadline: Instant,
    completion: Arc<Completion>,
}

impl RequestHandle {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(*self.completion.slot.lock().unwrap(), ResultSlot::Empty)
    }
}

struct PendingRequest {
    ticket: u64,
    issued_at: Instant,
    deadline: Instant,
    filter: FrameFilter,
    completion: Arc<Completion>,
}

struct HeldFrame {
    received: Instant,
    frame: Frame,
}

#[derive(Clone, Copy)]
struct Expiry {
    id: CorrelationId,
    ticket: u64,
}

#[derive(Default)]
struct RouterState {
    pending: HashMap<CorrelationId, PendingRequest>,
    held: VecDeque<HeldFrame>,
    next_id: CorrelationId,
    next_ticket: u64,
    shut_down: bool,
    closed: Option<String>,
}

impl RouterState {
    fn prune_held(&mut self, now: Instant) {
        self.held.retain(|h| now.duration_since(h.received) < HELD_FRAME_LIFETIME);
    }

    fn remove_if_current(&mut self, id: CorrelationId, ticket: u64) -> Option<PendingRequest> {
        match self.pending.get(&id) {
            Some(p) if p.ticket == ticket => self.pending.remove(&id),
            _ => None,
        }
    }
}

/// Matches inbound frames to the requests waiting for them.
///
/// The pending table is only ever touched inside short critical sections; sending and waiting
/// happen outside of them. Slots are completed while the table lock is held, so the lock order
/// is always table first, then slot.
pub struct ResponseRouter {
    transport: Arc<dyn Transport>,
    state: Mutex<RouterState>,
    timer: DeadlineTimer<Expiry>,
    observer: Mutex<Option<UnsolicitedObserver>>,
}

impl ResponseRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new_cyclic(|router: &Weak<ResponseRouter>| {
            let router = router.clone();
            let timer = DeadlineTimer::spawn(move |expiry: Expiry| {
                if let Some(router) = router.upgrade() {
                    router.expire(expiry);
                }
            });

            ResponseRouter {
                transport,
                state: Mutex::new(RouterState::default()),
                timer,
                observer: Mutex::new(None),
            }
        })
    }

    /// Registers the callback that sees every frame no pending request claims. The callback
    /// runs without any router lock held and may replace itself.
    pub fn set_unsolicited_observer(&self, observer: impl Fn(&Frame) + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Arc::new(observer));
    }

    /// Next id from a wrapping counter that is not currently pending
    pub fn allocate_id(&self) -> CorrelationId {
        let mut state = self.state.lock().unwrap();
        let mut id = state.next_id;
        for _ in 0..=CorrelationId::MAX {
            id = state.next_id;
            state.next_id = state.next_id.wrapping_add(1);
            if !state.pending.contains_key(&id) {
                break;
            }
        }
        id
    }

    /// Stores the request as pending, then sends its payload exactly once
    pub fn issue(&self, request: CorrelatedRequest) -> Result<RequestHandle, RouterError> {
        let handle = {
            let mut state = self.state.lock().unwrap();
            self.ensure_open(&state, request.id)?;
            // frames held for an earlier request with this id are stale now
            state.held.retain(|h| h.frame.correlation_id() != Some(request.id));
            self.register(&mut state, request.id, request.filter, request.timeout)?
        };

        log::debug!("Issuing request {} ({} bytes)", request.id, request.payload.len());
        if let Err(e) = self.transport.send(&request.payload) {
            log::error!("Could not send request {}: {e}", request.id);
            let mut state = self.state.lock().unwrap();
            if let Some(pending) = state.remove_if_current(handle.id, handle.ticket) {
                pending.completion.complete(ResultSlot::Failed(e.to_string()));
            }
            return Err(RouterError::TransportUnavailable(e.to_string()));
        }

        Ok(handle)
    }

    /// Waits for another frame with `id` without sending anything. Frames held back for this
    /// id are checked first.
    pub fn expect(
        &self,
        id: CorrelationId,
        filter: FrameFilter,
        timeout: Duration,
    ) -> Result<RequestHandle, RouterError> {
        let mut state = self.state.lock().unwrap();
        if state.shut_down {
            return Err(RouterError::Cancelled(id));
        }
        if state.pending.contains_key(&id) {
            return Err(RouterError::DuplicateCorrelationId(id));
        }

        let now = Instant::now();
        state.prune_held(now);
        let held = state.held.iter().position(|h| {
            h.frame.correlation_id() == Some(id)
                && h.frame.kind().is_some_and(|kind| filter.accepts(&kind))
        });
        if let Some(frame) = held.and_then(|index| state.held.remove(index)) {
            log::debug!("Request {id} is served from a held frame");
            let completion = Arc::new(Completion::default());
            completion.complete(ResultSlot::Fulfilled(frame.frame));
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            return Ok(RequestHandle { id, ticket, deadline: now + timeout, completion });
        }

        self.ensure_open(&state, id)?;
        self.register(&mut state, id, filter, timeout)
    }

    /// Blocks until the request is resolved. Never blocks frame delivery.
    pub fn wait(&self, handle: RequestHandle) -> Result<Frame, RouterError> {
        let mut slot = handle.completion.slot.lock().unwrap();
        loop {
            match &*slot {
                ResultSlot::Fulfilled(frame) => return Ok(frame.clone()),
                ResultSlot::TimedOut => return Err(RouterError::Timeout(handle.id)),
                ResultSlot::Cancelled => return Err(RouterError::Cancelled(handle.id)),
                ResultSlot::Failed(reason) => {
                    return Err(RouterError::TransportUnavailable(reason.clone()))
                }
                ResultSlot::Empty => {}
            }

            let now = Instant::now();
            if now >= handle.deadline {
                // the timer normally gets here first; this only covers a late timer thread
                drop(slot);
                self.expire(Expiry { id: handle.id, ticket: handle.ticket });
                slot = handle.completion.slot.lock().unwrap();
                continue;
            }

            slot = handle.completion.resolved.wait_timeout(slot, handle.deadline - now).unwrap().0;
        }
    }

    /// [`Self::issue`] followed by [`Self::wait`]
    pub fn execute(&self, request: CorrelatedRequest) -> Result<Frame, RouterError> {
        let handle = self.issue(request)?;
        self.wait(handle)
    }

    /// Routes one inbound frame. Called by the single frame reader.
    pub fn deliver(&self, frame: Frame) {
        let (Some(id), Some(kind)) = (frame.correlation_id(), frame.kind()) else {
            self.report_unsolicited(&frame);
            return;
        };

        let mut state = self.state.lock().unwrap();
        let Some(accepted) = state.pending.get(&id).map(|pending| pending.filter.accepts(&kind)) else {
            drop(state);
            self.report_unsolicited(&frame);
            return;
        };

        if accepted {
            if let Some(pending) = state.pending.remove(&id) {
                log::debug!("Request {id} fulfilled after {:?}", pending.issued_at.elapsed());
                pending.completion.complete(ResultSlot::Fulfilled(frame));
            }
            return;
        }

        state.prune_held(Instant::now());
        if state.held.len() >= MAXIMUM_HELD_FRAMES {
            if let Some(dropped) = state.held.pop_front() {
                log::warn!("Held frame buffer full, dropping {:?}", dropped.frame);
            }
        }
        log::debug!("Holding {kind:?} for request {id}, its filter rejects it");
        state.held.push_back(HeldFrame { received: Instant::now(), frame });
    }

    /// Cancels a single request. Has no effect once the request is resolved.
    pub fn cancel(&self, handle: &RequestHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(pending) = state.remove_if_current(handle.id, handle.ticket) {
            pending.completion.complete(ResultSlot::Cancelled);
        }
    }

    /// Teardown: every pending request resolves as cancelled and later requests are refused.
    /// Safe to call any number of times.
    pub fn cancel_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.shut_down = true;
        state.held.clear();

        let cancelled = state
            .pending
            .drain()
            .filter(|(_, pending)| pending.completion.complete(ResultSlot::Cancelled))
            .count();
        if cancelled > 0 {
            log::warn!("Cancelled {cancelled} pending requests");
        }
        drop(state);

        self.timer.stop();
    }

    /// The link is gone. Pending requests fail and later requests are refused.
    pub fn close(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.lock().unwrap();
        if state.closed.is_some() {
            return;
        }
        log::error!("Link closed: {reason}");

        for (_, pending) in state.pending.drain() {
            pending.completion.complete(ResultSlot::Failed(reason.clone()));
        }
        state.closed = Some(reason);
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn held_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.prune_held(Instant::now());
        state.held.len()
    }

    fn ensure_open(&self, state: &RouterState, id: CorrelationId) -> Result<(), RouterError> {
        if state.shut_down {
            return Err(RouterError::Cancelled(id));
        }
        match &state.closed {
            Some(reason) => Err(RouterError::TransportUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn register(
        &self,
        state: &mut RouterState,
        id: CorrelationId,
        filter: FrameFilter,
        timeout: Duration,
    ) -> Result<RequestHandle, RouterError> {
        if state.pending.contains_key(&id) {
            return Err(RouterError::DuplicateCorrelationId(id));
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let issued_at = Instant::now();
        let deadline = issued_at + timeout;
        let completion = Arc::new(Completion::default());

        state.pending.insert(
            id,
            PendingRequest { ticket, issued_at, deadline, filter, completion: completion.clone() },
        );
        self.timer.schedule(deadline, Expiry { id, ticket });

        Ok(RequestHandle { id, ticket, deadline, completion })
    }

    fn expire(&self, expiry: Expiry) {
        let mut state = self.state.lock().unwrap();
        if let Some(pending) = state.remove_if_current(expiry.id, expiry.ticket) {
            if pending.completion.complete(ResultSlot::TimedOut) {
                log::warn!(
                    "Request {} timed out after {:?}",
                    expiry.id,
                    pending.deadline.duration_since(pending.issued_at)
                );
            }
        }
    }

    fn report_unsolicited(&self, frame: &Frame) {
        log::warn!("Unsolicited frame: {frame:?}");
        let observer = self.observer.lock().unwrap().clone();
        if let Some(observer) = observer {
            observer(frame);
        }
    }
}
