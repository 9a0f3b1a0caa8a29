// Copyright 2025 GridLink Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Serialize;

/// Connection-level invocation counters with interval shadows.
#[derive(Debug, Default)]
pub struct InvocationCounters {
    completed: u64,
    last_completed: u64,
    aborted: u64,
    last_aborted: u64,
    errored: u64,
    last_errored: u64,
}

/// Counters for invocations completed, aborted, and errored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvocationTotals {
    pub completed: u64,
    pub aborted: u64,
    pub errored: u64,
}

impl InvocationCounters {
    pub fn record(&mut self, abort: bool, error: bool) {
        self.completed += 1;
        if abort {
            self.aborted += 1;
        }
        if error {
            self.errored += 1;
        }
    }

    /// Lifetime totals.
    pub fn totals(&self) -> InvocationTotals {
        InvocationTotals {
            completed: self.completed,
            aborted: self.aborted,
            errored: self.errored,
        }
    }

    /// Totals since this method was last called; resets the shadows.
    pub fn interval_totals(&mut self) -> InvocationTotals {
        let totals = InvocationTotals {
            completed: self.completed - self.last_completed,
            aborted: self.aborted - self.last_aborted,
            errored: self.errored - self.last_errored,
        };
        self.last_completed = self.completed;
        self.last_aborted = self.aborted;
        self.last_errored = self.errored;
        totals
    }
}
