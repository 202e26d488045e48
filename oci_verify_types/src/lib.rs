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

//! Contracts consumed by the verification executor and the result model it
//! produces.
//!
//! The executor only ever talks to stores, verifiers and policies through the
//! traits defined here, so concrete implementations (on-disk layouts,
//! out-of-process plugins, signature schemes) can live anywhere.

pub mod descriptor;
pub mod outcome;
pub mod policy;
pub mod reference;
pub mod report;
pub mod store;
pub mod verifier;

pub use descriptor::{AttachmentDescriptor, ReferenceManifest};
pub use outcome::VerificationOutcome;
pub use policy::{AggregationItem, ErrorContext, NestedVerdict, Policy, PolicyError};
pub use reference::SubjectReference;
pub use report::{StoreFailure, StructuralMarker, VerificationNode, VerificationReport};
pub use store::{AdapterTimeout, ListPage, ReferrerStore};
pub use verifier::Verifier;
