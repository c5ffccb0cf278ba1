//! Outstanding radio requests
//!
//! Every operation against the radio is keyed by an 8-bit transaction id and
//! moves Pending -> Sent -> Finished/Aborted. The coordinator dispatches all
//! Pending entries on a tick, the adapter's `requestFinished` callback
//! advances Sent entries, and Finished/Aborted entries are pruned on the
//! next tick. There are no retries.

use std::collections::BTreeMap;

use crate::adapter::BindDestination;
use crate::device::IeeeAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Sent,
    Finished,
    Aborted,
}

/// What a queued entry will do when dispatched
#[derive(Clone)]
pub enum RequestKind {
    Binding {
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        dst: BindDestination,
        unbind: bool,
    },
    Data {
        ieee: IeeeAddress,
        endpoint_id: u8,
        cluster_id: u16,
        data: Vec<u8>,
        label: Option<String>,
    },
    Remove {
        ieee: IeeeAddress,
    },
    Lqi {
        ieee: IeeeAddress,
    },
    Interview {
        ieee: IeeeAddress,
    },
}

impl RequestKind {
    /// The device a request belongs to
    #[must_use]
    pub fn ieee(&self) -> IeeeAddress {
        match self {
            Self::Binding { ieee, .. }
            | Self::Data { ieee, .. }
            | Self::Remove { ieee }
            | Self::Lqi { ieee }
            | Self::Interview { ieee } => *ieee,
        }
    }
}

pub struct Request {
    pub kind: RequestKind,
    pub status: RequestStatus,
    /// Device name at enqueue time, for log lines after the device is gone
    pub device_name: String,
}

/// FIFO of outstanding requests keyed by transaction id
#[derive(Default)]
pub struct RequestQueue {
    requests: BTreeMap<u8, Request>,
    next_id: u8,
}

impl RequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// The transaction id the next enqueue will take; also used for ZCL
    /// transaction sequencing inside request payloads
    #[must_use]
    pub fn current_id(&self) -> u8 {
        self.next_id
    }

    /// Queue a request under the next free transaction id
    pub fn enqueue(&mut self, kind: RequestKind, device_name: String) -> u8 {
        // Never reuse an id that is still outstanding; a callback keyed on
        // it must stay unambiguous
        while self.requests.contains_key(&self.next_id) {
            self.next_id = self.next_id.wrapping_add(1);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.requests.insert(
            id,
            Request {
                kind,
                status: RequestStatus::Pending,
                device_name,
            },
        );

        id
    }

    /// Snapshot of all Pending entries in id order
    #[must_use]
    pub fn pending(&self) -> Vec<(u8, RequestKind, String)> {
        self.requests
            .iter()
            .filter(|(_, request)| request.status == RequestStatus::Pending)
            .map(|(id, request)| (*id, request.kind.clone(), request.device_name.clone()))
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: u8) -> Option<&Request> {
        self.requests.get(&id)
    }

    pub fn set_status(&mut self, id: u8, status: RequestStatus) {
        if let Some(request) = self.requests.get_mut(&id) {
            request.status = status;
        }
    }

    /// Whether an interview for this device is already queued. Sent entries
    /// do not count: their radio round-trip re-drives the interview through
    /// a fresh request.
    #[must_use]
    pub fn has_interview(&self, ieee: IeeeAddress) -> bool {
        self.requests.values().any(|request| {
            matches!(request.kind, RequestKind::Interview { ieee: i } if i == ieee)
                && request.status == RequestStatus::Pending
        })
    }

    /// Drop every Finished/Aborted entry
    pub fn prune(&mut self) {
        self.requests.retain(|_, request| {
            request.status != RequestStatus::Finished && request.status != RequestStatus::Aborted
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ieee() -> IeeeAddress {
        IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn test_ids_advance_and_wrap() {
        let mut queue = RequestQueue::new();

        for expected in 0..=255u8 {
            let id = queue.enqueue(RequestKind::Lqi { ieee: ieee() }, "test".into());
            assert_eq!(id, expected);
            queue.set_status(id, RequestStatus::Finished);
            queue.prune();
        }

        // Wrapped around
        assert_eq!(
            queue.enqueue(RequestKind::Lqi { ieee: ieee() }, "test".into()),
            0
        );
    }

    #[test]
    fn test_no_duplicate_outstanding_ids() {
        let mut queue = RequestQueue::new();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            let id = queue.enqueue(RequestKind::Lqi { ieee: ieee() }, "test".into());
            assert!(seen.insert(id), "id {id} reused while outstanding");

            if seen.len() > 200 {
                break;
            }
        }
    }

    #[test]
    fn test_prune_keeps_pending_and_sent() {
        let mut queue = RequestQueue::new();

        let a = queue.enqueue(RequestKind::Lqi { ieee: ieee() }, "a".into());
        let b = queue.enqueue(RequestKind::Lqi { ieee: ieee() }, "b".into());
        let c = queue.enqueue(RequestKind::Lqi { ieee: ieee() }, "c".into());

        queue.set_status(a, RequestStatus::Sent);
        queue.set_status(b, RequestStatus::Aborted);
        queue.set_status(c, RequestStatus::Finished);
        queue.prune();

        assert!(queue.get(a).is_some());
        assert!(queue.get(b).is_none());
        assert!(queue.get(c).is_none());
    }
}
