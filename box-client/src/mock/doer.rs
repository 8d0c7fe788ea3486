use crate::connection::{Connection, PendingReply};
use crate::error::TransportError;
use crate::protocol::{CallRequest, Response};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

enum Scripted {
    Reply(Result<Response, TransportError>),
    Hang,
}

/// Connection that answers from a queue of scripted replies
///
/// An exhausted queue answers with [`TransportError::Disconnected`].
#[derive(Default)]
pub struct MockConnection {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CallRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Response>) -> Self {
        let conn = Self::new();
        for reply in replies {
            conn.push_reply(reply);
        }
        conn
    }

    pub fn push_reply(&self, reply: Response) {
        lock(&self.replies).push_back(Scripted::Reply(Ok(reply)));
    }

    pub fn push_transport_error(&self, err: TransportError) {
        lock(&self.replies).push_back(Scripted::Reply(Err(err)));
    }

    /// Next request never gets a reply
    pub fn push_hang(&self) {
        lock(&self.replies).push_back(Scripted::Hang);
    }

    /// Requests submitted so far, in submission order
    pub fn requests(&self) -> Vec<CallRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining_replies(&self) -> usize {
        lock(&self.replies).len()
    }
}

impl Connection for MockConnection {
    fn submit(&self, request: CallRequest) -> PendingReply {
        let function = request.function().to_string();
        lock(&self.requests).push(request);

        match lock(&self.replies).pop_front() {
            Some(Scripted::Reply(result)) => PendingReply::ready(function, result),
            Some(Scripted::Hang) => PendingReply::new(function, std::future::pending()),
            None => PendingReply::ready(
                function,
                Err(TransportError::disconnected("mock connection has no scripted reply")),
            ),
        }
    }
}
