//! Mailbox Module - cross-VM message passing
//!
//! Spec.md §4.8: each VM owns a bounded inbox. `send_message` deep-copies
//! the value (and everything it transitively points to) into the
//! receiver's heap while holding the receiver's allocation lock, so the
//! receiver's own collector can never run mid-copy and see a half-written
//! graph. Delivery order is FIFO per sender; a single shared queue gives
//! that for free since within one sender, sends are serialized by the
//! sender's own single-threaded VM loop.
//!
//! Grounded on `fgc::error`'s `From<PoisonError<T>>` conversion, which
//! only makes sense for a `std::sync` lock — so the inbox queue uses
//! `std::sync::{Mutex, Condvar}` rather than `parking_lot` here, reserving
//! `parking_lot::ReentrantMutex` (no poisoning, needs none) for the
//! allocation lock in [`crate::vm`].

use crate::error::{fatal, FatalKind, Result, RtError};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// How long a blocking receive waits between re-checks of the inbox. The
/// wait is timed rather than infinite so a receiver can still observe
/// process-level shutdown signals without a dedicated wakeup channel.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One queued message: the sender's VM id and the deep-copied value,
/// already living in the receiver's heap by the time it's enqueued.
#[derive(Clone, Copy)]
pub struct MailboxEntry {
    pub sender: u64,
    pub value: Value,
}

/// A VM's bounded inbox.
pub struct Mailbox {
    queue: Mutex<VecDeque<MailboxEntry>>,
    not_empty: Condvar,
    capacity: usize,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Mailbox {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue an already-deep-copied message. Fatal "Inbox full" per
    /// spec.md §7 if the receiver never drains — there is no backpressure
    /// mechanism at this layer, matching the reference RTS.
    pub fn enqueue(&self, entry: MailboxEntry) -> Result<()> {
        let mut queue = self.queue.lock()?;
        if queue.len() >= self.capacity {
            fatal(FatalKind::InboxFull);
        }
        queue.push_back(entry);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Non-blocking check: is a message (optionally from a specific
    /// sender) currently waiting?
    pub fn check(&self, from: Option<u64>) -> Result<bool> {
        let queue = self.queue.lock()?;
        Ok(match from {
            Some(sender) => queue.iter().any(|e| e.sender == sender),
            None => !queue.is_empty(),
        })
    }

    /// Block until a message (optionally from a specific sender) is
    /// available, then pop and return it. Re-polls on a timer rather than
    /// waiting once, so a `recv_from` call isn't woken by an unrelated
    /// sender's notify and left waiting forever.
    pub fn recv(&self, from: Option<u64>) -> Result<MailboxEntry> {
        let mut queue = self.queue.lock()?;
        loop {
            let pos = match from {
                Some(sender) => queue.iter().position(|e| e.sender == sender),
                None => {
                    if queue.is_empty() {
                        None
                    } else {
                        Some(0)
                    }
                }
            };
            if let Some(pos) = pos {
                return Ok(queue.remove(pos).expect("position came from this queue"));
            }
            let (guard, _timeout) = self
                .not_empty
                .wait_timeout(queue, RECV_POLL_INTERVAL)
                .map_err(|_| RtError::LockPoisoned("mailbox condvar".to_string()))?;
            queue = guard;
        }
    }

    /// Lock the inbox for the duration of `f`, exposing `*mut Value`
    /// pointers into each pending entry's payload so the collector can
    /// treat not-yet-received messages as roots (spec.md §4.2). `f` must
    /// run the whole collection, not just snapshot the pointers — releasing
    /// this lock before the scavenge finishes would let a concurrent
    /// `enqueue`/`recv` invalidate them mid-collection.
    pub(crate) fn with_roots_mut<T>(&self, f: impl FnOnce(&[*mut Value]) -> T) -> T {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let slots = queue.make_contiguous();
        let ptrs: Vec<*mut Value> = slots.iter_mut().map(|entry| &mut entry.value as *mut Value).collect();
        f(&ptrs)
    }

    /// Non-blocking pop; fatal "No messages waiting" per spec.md §7 if
    /// called when [`Mailbox::check`] would have returned `false`. Exposed
    /// separately from `recv` because the reference API distinguishes a
    /// polling receive (caller already checked) from a blocking one.
    pub fn try_recv(&self, from: Option<u64>) -> Result<MailboxEntry> {
        let mut queue = self.queue.lock()?;
        let pos = match from {
            Some(sender) => queue.iter().position(|e| e.sender == sender),
            None => {
                if queue.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
        };
        match pos {
            Some(pos) => Ok(queue.remove(pos).expect("position came from this queue")),
            None => fatal(FatalKind::NoMessagesWaiting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_check_and_recv() {
        let mailbox = Mailbox::new(4);
        assert!(!mailbox.check(None).unwrap());
        mailbox
            .enqueue(MailboxEntry {
                sender: 1,
                value: Value::int(7),
            })
            .unwrap();
        assert!(mailbox.check(None).unwrap());
        let entry = mailbox.try_recv(None).unwrap();
        assert_eq!(entry.sender, 1);
        assert_eq!(entry.value.as_int(), 7);
    }

    #[test]
    fn fifo_per_sender_ordering() {
        let mailbox = Mailbox::new(8);
        for n in 0..3 {
            mailbox
                .enqueue(MailboxEntry {
                    sender: 1,
                    value: Value::int(n),
                })
                .unwrap();
        }
        for n in 0..3 {
            let entry = mailbox.try_recv(Some(1)).unwrap();
            assert_eq!(entry.value.as_int(), n);
        }
    }

    #[test]
    fn check_from_specific_sender_ignores_others() {
        let mailbox = Mailbox::new(8);
        mailbox
            .enqueue(MailboxEntry {
                sender: 2,
                value: Value::int(1),
            })
            .unwrap();
        assert!(!mailbox.check(Some(1)).unwrap());
        assert!(mailbox.check(Some(2)).unwrap());
    }

    #[test]
    fn recv_blocks_until_message_arrives() {
        use std::sync::Arc;
        use std::thread;

        let mailbox = Arc::new(Mailbox::new(4));
        let sender = mailbox.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            sender
                .enqueue(MailboxEntry {
                    sender: 9,
                    value: Value::int(42),
                })
                .unwrap();
        });

        let entry = mailbox.recv(None).unwrap();
        assert_eq!(entry.value.as_int(), 42);
        handle.join().unwrap();
    }
}
