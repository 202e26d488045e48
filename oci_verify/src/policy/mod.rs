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

//! Built-in [`Policy`](oci_verify_types::Policy) implementations.

mod config_policy;
mod permissive;
mod strict;

pub use config_policy::{ArtifactPolicy, ConfigPolicy, ConfigPolicySettings, DEFAULT_POLICY_KEY};
pub use permissive::PermissivePolicy;
pub use strict::StrictPolicy;
