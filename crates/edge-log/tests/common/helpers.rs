// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Local sink writer whose output the test can inspect.
#[derive(Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .expect("lock poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedOutput {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("lock poisoned").clone();
        String::from_utf8(bytes)
            .expect("local sink wrote invalid utf-8")
            .lines()
            .map(str::to_string)
            .collect()
    }
}
