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

use oci_verify_types::{
    AggregationItem, Policy, PolicyError, VerificationNode, VerificationOutcome,
};

/// Asks the policy for the verdict of a node: its own outcomes first, then
/// the verdicts of its children, both in their original order.
pub(crate) fn aggregate(
    policy: &dyn Policy,
    outcomes: &[VerificationOutcome],
    children: &[VerificationNode],
) -> Result<bool, PolicyError> {
    let items: Vec<AggregationItem> = outcomes
        .iter()
        .cloned()
        .map(AggregationItem::Outcome)
        .chain(children.iter().map(|child| AggregationItem::Nested(child.verdict())))
        .collect();
    policy.overall_verify_result(&items)
}
