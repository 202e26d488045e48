//
// Copyright 2025 The Project Oak Authors
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
//

//! Verifies the artifacts attached to an OCI subject.
//!
//! [`executor::Executor`] resolves the subject, walks the graph of referrers
//! exposed by the configured stores, runs the matching verifiers on every
//! attachment and asks the policy for a verdict at each node of the
//! resulting tree.
//!
//! Reference stores, verifiers and policies live in [`store`],
//! [`verifiers`], [`plugin`] and [`policy`]; [`config`] and [`registry`]
//! assemble them from a configuration file.

pub mod adapters;
mod aggregate;
pub mod call;
pub mod config;
pub mod digest;
mod dispatch;
pub mod executor;
pub mod plugin;
pub mod policy;
pub mod registry;
pub mod store;
mod traversal;
pub mod verifiers;

pub use adapters::{AdapterProvider, AdapterSet, ScopedAdapters, StaticAdapters};
pub use executor::{Executor, ExecutorConfig, ExecutorError, VerifyParameters};
