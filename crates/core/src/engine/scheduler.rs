//! Request queue with fingerprint de-duplication.

use sha2::{Digest, Sha256};
use std::collections::{BinaryHeap, HashSet};

use crate::request::CrawlRequest;

/// Stable fingerprint of a request: method, canonical URL and body.
pub fn fingerprint(request: &CrawlRequest) -> String {
    let mut url = request.url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(request.method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_str().as_bytes());
    hasher.update(b"\n");
    if let Some(body) = &request.body {
        hasher.update(body.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

struct Queued {
    priority: i32,
    seq: u64,
    request: CrawlRequest,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher priority first, then earlier insertion.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending requests of one job run.
#[derive(Default)]
pub struct Scheduler {
    queue: BinaryHeap<Queued>,
    seen: HashSet<String>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request. Returns `false` when it duplicates one seen before
    /// and does not set `dont_filter`.
    pub fn enqueue(&mut self, request: CrawlRequest) -> bool {
        let fp = fingerprint(&request);
        if !self.seen.insert(fp) && !request.dont_filter {
            return false;
        }

        self.queue.push(Queued {
            priority: request.priority,
            seq: self.next_seq,
            request,
        });
        self.next_seq += 1;
        true
    }

    pub fn next_request(&mut self) -> Option<CrawlRequest> {
        self.queue.pop().map(|queued| queued.request)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
