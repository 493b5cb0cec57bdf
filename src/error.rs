// Copyright 2025 RustFS Team
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

//! Failure classification shared by every reconcile loop.
//!
//! A [`ReconcileError`] is either worth retrying soon (`Transient`) or needs an
//! operator to fix something first (`Unrecoverable`). Errors gathered during a
//! single pass are joined into an `Aggregate`, which is transient only when all
//! of its members are.

use snafu::Snafu;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReconcileError {
    #[snafu(display("{source}"))]
    Transient { source: BoxError },

    #[snafu(display("{source}"))]
    Unrecoverable { source: BoxError },

    #[snafu(display("{}", join_messages(errors)))]
    Aggregate { errors: Vec<ReconcileError> },
}

fn join_messages(errors: &[ReconcileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    pub fn transient(source: impl Into<BoxError>) -> Self {
        ReconcileError::Transient {
            source: source.into(),
        }
    }

    pub fn unrecoverable(source: impl Into<BoxError>) -> Self {
        ReconcileError::Unrecoverable {
            source: source.into(),
        }
    }

    /// Collapses collected errors: `None` when empty, the error itself when
    /// there is exactly one.
    pub fn aggregate(mut errors: Vec<ReconcileError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ReconcileError::Aggregate { errors }),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Transient { .. } => true,
            ReconcileError::Unrecoverable { .. } => false,
            ReconcileError::Aggregate { errors } => errors.iter().all(Self::is_transient),
        }
    }
}
