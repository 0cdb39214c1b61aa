use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::DEFAULT_CONTENT_RESPONSES;

/// A content-authority verdict for a URN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentResponse {
    Allowed,
    Blocked,
}

struct Responses {
    order: VecDeque<String>,
    data: HashMap<String, ContentResponse>,
}

/// Count-bounded FIFO cache of content responses.
pub struct ContentResponseCache {
    inner: RwLock<Responses>,
    capacity: usize,
    len: AtomicUsize,
}

impl ContentResponseCache {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Responses {
                order: VecDeque::new(),
                data: HashMap::new(),
            }),
            capacity,
            len: AtomicUsize::new(0),
        })
    }

    /// Records a response, replacing any earlier one for the same URN.
    pub fn insert(&self, urn: &str, response: ContentResponse) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.write();
        if inner.data.insert(urn.to_string(), response).is_none() {
            inner.order.push_back(urn.to_string());
        }
        while inner.data.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.data.remove(&oldest);
        }
        self.len.store(inner.data.len(), Ordering::Release);
    }

    pub fn get(&self, urn: &str) -> Option<ContentResponse> {
        self.inner.read().data.get(urn).copied()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ContentResponseCache {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Responses {
                order: VecDeque::new(),
                data: HashMap::new(),
            }),
            capacity: DEFAULT_CONTENT_RESPONSES,
            len: AtomicUsize::new(0),
        }
    }
}
