use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::Instant,
};

/// A single background thread that hands each scheduled item back to a callback once its
/// deadline has passed. Runs independently of the link reader, so a stalled link never delays
/// expiry.
pub struct DeadlineTimer<T> {
    shared: Arc<TimerShared<T>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

struct TimerShared<T> {
    state: Mutex<TimerState<T>>,
    wakeup: Condvar,
}

struct TimerState<T> {
    queue: BinaryHeap<Reverse<Entry<T>>>,
    next_sequence: u64,
    stopped: bool,
}

struct Entry<T> {
    deadline: Instant,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.sequence).cmp(&(other.deadline, other.sequence))
    }
}

impl<T: Send + 'static> DeadlineTimer<T> {
    pub fn spawn(on_expire: impl Fn(T) + Send + 'static) -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                next_sequence: 0,
                stopped: false,
            }),
            wakeup: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let thread = thread::spawn(move || run(&thread_shared, on_expire));

        DeadlineTimer { shared, thread: Mutex::new(Some(thread)) }
    }

    pub fn schedule(&self, deadline: Instant, item: T) {
        let mut state = self.shared.state.lock().unwrap();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.queue.push(Reverse(Entry { deadline, sequence, item }));
        self.shared.wakeup.notify_one();
    }

    /// Number of entries that have not expired yet
    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the thread and waits for it, unless called from inside the expiry callback
    pub fn stop(&self) {
        self.signal_stop();
        let Some(thread) = self.thread.lock().unwrap().take() else {
            return;
        };
        if thread.thread().id() != thread::current().id() {
            let _ = thread.join();
        }
    }
}

impl<T> DeadlineTimer<T> {
    fn signal_stop(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.stopped = true;
        state.queue.clear();
        self.shared.wakeup.notify_all();
    }
}

impl<T> Drop for DeadlineTimer<T> {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

fn run<T>(shared: &TimerShared<T>, on_expire: impl Fn(T)) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if state.stopped {
            return;
        }

        let now = Instant::now();
        let next_deadline = state.queue.peek().map(|Reverse(entry)| entry.deadline);
        match next_deadline {
            None => {
                state = shared.wakeup.wait(state).unwrap();
            }
            Some(deadline) if deadline > now => {
                state = shared.wakeup.wait_timeout(state, deadline - now).unwrap().0;
            }
            Some(_) => {
                if let Some(Reverse(entry)) = state.queue.pop() {
                    drop(state);
                    on_expire(entry.item);
                    state = shared.state.lock().unwrap();
                }
            }
        }
    }
}
