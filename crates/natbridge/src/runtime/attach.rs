//! Thread attachment to the managed runtime.
//!
//! A native thread must be attached before it can run managed code. The
//! first forwarded call on a thread attaches it; the attachment persists
//! until the thread exits, when the thread-local destructor detaches it.

use crate::runtime::bridge::{Bridge, Shared};
use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

thread_local! {
    static ATTACHMENTS: RefCell<Vec<Attachment>> = const { RefCell::new(Vec::new()) };
}

struct Attachment {
    bridge_id: u64,
    bridge: Weak<Shared>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if let Some(shared) = self.bridge.upgrade() {
            shared.attached_threads.fetch_sub(1, Ordering::AcqRel);
            natbridge_log::debug!("thread detached from bridge {}", self.bridge_id);
        }
    }
}

impl Bridge {
    /// Attaches the calling thread if it is not attached yet.
    ///
    /// Returns `true` if this call performed the attachment.
    pub fn ensure_attached(&self) -> bool {
        let id = self.shared.id;
        ATTACHMENTS
            .try_with(|attachments| {
                let mut attachments = attachments.borrow_mut();
                if attachments.iter().any(|a| a.bridge_id == id) {
                    return false;
                }
                attachments.push(Attachment {
                    bridge_id: id,
                    bridge: Arc::downgrade(&self.shared),
                });
                self.shared.attached_threads.fetch_add(1, Ordering::AcqRel);
                natbridge_log::debug!(
                    "thread {:?} attached to bridge {id}",
                    std::thread::current().id()
                );
                true
            })
            .unwrap_or(false)
    }

    /// Returns whether the calling thread is attached.
    #[must_use]
    pub fn is_current_thread_attached(&self) -> bool {
        let id = self.shared.id;
        ATTACHMENTS
            .try_with(|attachments| attachments.borrow().iter().any(|a| a.bridge_id == id))
            .unwrap_or(false)
    }

    /// Returns the number of threads currently attached.
    #[must_use]
    pub fn attached_thread_count(&self) -> usize {
        self.shared.attached_threads.load(Ordering::Acquire)
    }
}
