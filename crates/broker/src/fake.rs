// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fakes for the publish seams.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::publish::{DeadLetterSink, Publisher};
use crate::BrokerError;

/// Records published messages; can be scripted to fail.
#[derive(Default)]
pub struct FakePublisher {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
    calls: Mutex<usize>,
    fail_next: Mutex<usize>,
    fail_calls: Mutex<std::collections::HashSet<usize>>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail with a transient error.
    pub fn fail_next(&self, n: usize) {
        *self.fail_next.lock() = n;
    }

    /// Make the `n`th publish call (1-based, counted over the fake's
    /// lifetime) fail. Useful for partial-failure scripts.
    pub fn fail_call(&self, n: usize) {
        self.fail_calls.lock().insert(n);
    }

    /// All `(routing_key, payload)` pairs published so far.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.messages.lock().clone()
    }

    /// Routing keys only, in publish order.
    pub fn routing_keys(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    /// Decode every payload published under `routing_key`.
    pub fn payloads_for(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        {
            let mut fail = self.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(BrokerError::Unconfirmed { routing_key: routing_key.to_string() });
            }
        }
        if self.fail_calls.lock().remove(&call) {
            return Err(BrokerError::Unconfirmed { routing_key: routing_key.to_string() });
        }
        self.messages.lock().push((routing_key.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Records dead-lettered payloads with their error tags.
#[derive(Default)]
pub struct FakeDeadLetter {
    rejected: Mutex<Vec<(Vec<u8>, String, String)>>,
}

impl FakeDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejected(&self) -> Vec<(Vec<u8>, String, String)> {
        self.rejected.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.rejected.lock().iter().map(|(_, tag, _)| tag.clone()).collect()
    }
}

#[async_trait]
impl DeadLetterSink for FakeDeadLetter {
    async fn reject(
        &self,
        payload: &[u8],
        error_tag: &str,
        detail: &str,
    ) -> Result<(), BrokerError> {
        self.rejected.lock().push((payload.to_vec(), error_tag.to_string(), detail.to_string()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
