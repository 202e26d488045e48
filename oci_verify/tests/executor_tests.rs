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

use core::time::Duration;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use googletest::prelude::*;
use mockall::{mock, Sequence};
use oci_verify::{
    policy::{ArtifactPolicy, ConfigPolicy, PermissivePolicy, StrictPolicy},
    store::MemoryStore,
    AdapterSet, Executor, ExecutorConfig, ExecutorError, ScopedAdapters, StaticAdapters,
    VerifyParameters,
};
use oci_verify_types::{
    outcome::{VERIFIER_EXECUTION_FAILED, VERIFIER_TIMEOUT},
    policy::error_outcome,
    AggregationItem, AttachmentDescriptor, ErrorContext, ListPage, Policy, PolicyError,
    ReferenceManifest, ReferrerStore, StructuralMarker, SubjectReference, VerificationOutcome,
    VerificationReport, Verifier,
};

const SIGNATURE: &str = "application/vnd.example.signature";
const SBOM: &str = "application/spdx+json";
const MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

fn digest(n: u8) -> String {
    format!("sha256:{}", format!("{n:02x}").repeat(32))
}

fn subject_ref() -> String {
    format!("localhost:5000/app@{}", digest(0xaa))
}

fn attachment(n: u8, artifact_type: &str) -> AttachmentDescriptor {
    AttachmentDescriptor::new(&digest(n), artifact_type, MANIFEST, 512)
}

/// The subject with a single signature attached.
fn signed_store() -> MemoryStore {
    MemoryStore::new("memory").with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE))
}

enum Behavior {
    Pass,
    Fail,
    Error,
    Sleep(Duration),
}

struct FakeVerifier {
    name: String,
    artifact_type: String,
    nested: Vec<String>,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl FakeVerifier {
    fn new(name: &str, artifact_type: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            artifact_type: artifact_type.to_string(),
            nested: Vec::new(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn with_nested(name: &str, artifact_type: &str, nested: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            artifact_type: artifact_type.to_string(),
            nested: vec![nested.to_string()],
            behavior: Behavior::Pass,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for FakeVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn verifier_type(&self) -> &str {
        "fake"
    }

    fn can_verify(&self, descriptor: &AttachmentDescriptor) -> bool {
        descriptor.artifact_type == self.artifact_type
    }

    async fn verify(
        &self,
        _subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        _store: &dyn ReferrerStore,
    ) -> anyhow::Result<VerificationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Pass => Ok(VerificationOutcome::success(
                &self.name,
                "fake",
                format!("{} ok", descriptor.digest),
            )),
            Behavior::Fail => Ok(VerificationOutcome::failure(&self.name, "fake", "rejected")
                .with_error_reason("REJECTED")),
            Behavior::Error => anyhow::bail!("backend unavailable"),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(VerificationOutcome::success(&self.name, "fake", "late"))
            }
        }
    }

    fn nested_artifact_types(&self) -> &[String] {
        &self.nested
    }
}

/// A store that fails every call.
struct FailingStore;

#[async_trait]
impl ReferrerStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn resolve_subject(&self, _: &SubjectReference) -> anyhow::Result<AttachmentDescriptor> {
        anyhow::bail!("registry unavailable")
    }

    async fn list_attachments(
        &self,
        _: &SubjectReference,
        _: &[String],
        _: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        anyhow::bail!("registry unavailable")
    }

    async fn fetch_manifest(
        &self,
        _: &SubjectReference,
        _: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest> {
        anyhow::bail!("registry unavailable")
    }

    async fn fetch_blob(&self, _: &SubjectReference, _: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("registry unavailable")
    }
}

/// A store whose listing never finishes in time.
struct StalledStore;

#[async_trait]
impl ReferrerStore for StalledStore {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn resolve_subject(&self, _: &SubjectReference) -> anyhow::Result<AttachmentDescriptor> {
        anyhow::bail!("not supported")
    }

    async fn list_attachments(
        &self,
        _: &SubjectReference,
        _: &[String],
        _: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ListPage::default())
    }

    async fn fetch_manifest(
        &self,
        _: &SubjectReference,
        _: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest> {
        anyhow::bail!("not supported")
    }

    async fn fetch_blob(&self, _: &SubjectReference, _: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("not supported")
    }
}

mock! {
    TestPolicy {}

    impl Policy for TestPolicy {
        fn kind(&self) -> &'static str;
        fn verify_needed(
            &self,
            subject: &SubjectReference,
            descriptor: &AttachmentDescriptor,
        ) -> bool;
        fn continue_verify_on_failure(
            &self,
            subject: &SubjectReference,
            descriptor: &AttachmentDescriptor,
            outcome: &VerificationOutcome,
        ) -> bool;
        fn error_to_verify_result(
            &self,
            context: &ErrorContext,
            error: &anyhow::Error,
        ) -> VerificationOutcome;
        fn overall_verify_result(&self, items: &[AggregationItem]) -> Result<bool, PolicyError>;
    }
}

fn all_pass(items: &[AggregationItem]) -> Result<bool, PolicyError> {
    Ok(!items.is_empty() && items.iter().all(AggregationItem::is_success))
}

fn executor(adapters: AdapterSet) -> Executor {
    executor_with(adapters, ExecutorConfig::default())
}

fn executor_with(adapters: AdapterSet, config: ExecutorConfig) -> Executor {
    Executor::new(Arc::new(StaticAdapters::new(adapters)), config)
}

async fn verify(executor: &Executor) -> VerificationReport {
    executor.verify_subject(&VerifyParameters::new(&subject_ref())).await.unwrap()
}

#[tokio::test]
async fn zero_attachments_defer_to_policy() {
    for verdict in [true, false] {
        let mut policy = MockTestPolicy::new();
        policy.expect_kind().return_const("mock");
        policy
            .expect_overall_verify_result()
            .withf(|items| items.is_empty())
            .times(1)
            .returning(move |_| Ok(verdict));
        let adapters =
            AdapterSet::new(Arc::new(policy)).with_store(Arc::new(MemoryStore::new("memory")));

        let report = verify(&executor(adapters)).await;

        assert_that!(report.is_success(), eq(verdict));
        assert_that!(report.root.verifier_reports, is_empty());
        assert_that!(report.root.nested_results, is_empty());
    }
}

#[tokio::test]
async fn zero_attachments_under_builtin_policies() {
    let store = Arc::new(MemoryStore::new("memory"));

    let strict =
        verify(&executor(AdapterSet::new(Arc::new(StrictPolicy)).with_store(store.clone()))).await;
    let permissive =
        verify(&executor(AdapterSet::new(Arc::new(PermissivePolicy)).with_store(store))).await;

    assert_that!(strict.is_success(), eq(false));
    assert_that!(permissive.is_success(), eq(true));
}

#[tokio::test]
async fn single_signature_passes() {
    let store = signed_store();
    let verifier = FakeVerifier::new("sig", SIGNATURE, Behavior::Pass);
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(verifier.clone());

    let report = verify(&executor(adapters)).await;

    assert_that!(report.is_success(), eq(true));
    assert_that!(report.subject_digest, eq(&digest(0xaa)));
    assert_that!(report.root.subject, eq(&subject_ref()));
    assert_that!(report.root.nested_results.len(), eq(1));
    let child = &report.root.nested_results[0];
    assert_that!(child.subject, eq(&format!("localhost:5000/app@{}", digest(0xbb))));
    assert_that!(child.is_success, eq(true));
    assert_that!(child.nested_results, is_empty());
    assert_that!(child.verifier_reports.len(), eq(1));
    assert_that!(child.verifier_reports[0].verifier_name, eq("sig"));
    assert_that!(verifier.calls(), eq(1));
}

#[tokio::test]
async fn stops_after_first_failure_when_policy_says_so() {
    let store = signed_store();
    let first = FakeVerifier::new("first", SIGNATURE, Behavior::Fail);
    let second = FakeVerifier::new("second", SIGNATURE, Behavior::Pass);
    let mut policy = MockTestPolicy::new();
    policy.expect_kind().return_const("mock");
    policy.expect_verify_needed().return_const(true);
    policy.expect_continue_verify_on_failure().times(1).return_const(false);
    policy.expect_overall_verify_result().returning(all_pass);
    let adapters = AdapterSet::new(Arc::new(policy))
        .with_store(Arc::new(store))
        .with_verifier(first.clone())
        .with_verifier(second.clone());

    let report = verify(&executor(adapters)).await;

    assert_that!(report.is_success(), eq(false));
    let child = &report.root.nested_results[0];
    assert_that!(child.verifier_reports.len(), eq(1));
    assert_that!(child.verifier_reports[0].verifier_name, eq("first"));
    assert_that!(second.calls(), eq(0));
}

#[tokio::test]
async fn keeps_going_when_policy_allows() {
    let store = signed_store();
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("first", SIGNATURE, Behavior::Fail))
        .with_verifier(FakeVerifier::new("second", SIGNATURE, Behavior::Pass));

    let report = verify(&executor(adapters)).await;

    let names: Vec<&str> = report.root.nested_results[0]
        .verifier_reports
        .iter()
        .map(|outcome| outcome.verifier_name.as_str())
        .collect();
    assert_that!(names, eq(&vec!["first", "second"]));
}

#[tokio::test]
async fn unneeded_attachments_are_absent() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE))
        .with_referrer(&digest(0xaa), attachment(0xcc, SBOM));
    let mut policy = MockTestPolicy::new();
    policy.expect_kind().return_const("mock");
    policy
        .expect_verify_needed()
        .returning(|_, descriptor| descriptor.artifact_type == SIGNATURE);
    policy.expect_overall_verify_result().returning(all_pass);
    let sbom = FakeVerifier::new("sbom", SBOM, Behavior::Pass);
    let adapters = AdapterSet::new(Arc::new(policy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass))
        .with_verifier(sbom.clone());

    let report = verify(&executor(adapters)).await;

    let digests: Vec<String> =
        report.root.walk().skip(1).map(|node| node.subject.clone()).collect();
    assert_that!(digests, eq(&vec![format!("localhost:5000/app@{}", digest(0xbb))]));
    assert_that!(sbom.calls(), eq(0));
}

#[tokio::test]
async fn verifier_errors_go_through_policy() {
    let store = signed_store();
    let mut policy = MockTestPolicy::new();
    policy.expect_kind().return_const("mock");
    policy.expect_verify_needed().return_const(true);
    policy.expect_continue_verify_on_failure().return_const(true);
    policy
        .expect_error_to_verify_result()
        .withf(|context, _| context.verifier_name == "sig")
        .times(1)
        .returning(error_outcome);
    policy.expect_overall_verify_result().returning(all_pass);
    let adapters = AdapterSet::new(Arc::new(policy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Error));

    let report = verify(&executor(adapters)).await;

    let outcome = &report.root.nested_results[0].verifier_reports[0];
    assert_that!(outcome.is_success, eq(false));
    assert_that!(outcome.error_reason.as_deref(), some(eq(VERIFIER_EXECUTION_FAILED)));
    assert_that!(outcome.message, contains_substring("backend unavailable"));
}

#[tokio::test]
async fn error_is_converted_before_asking_to_continue() {
    let store = signed_store();
    let broken = FakeVerifier::new("broken", SIGNATURE, Behavior::Error);
    let healthy = FakeVerifier::new("healthy", SIGNATURE, Behavior::Pass);
    let mut sequence = Sequence::new();
    let mut policy = MockTestPolicy::new();
    policy.expect_kind().return_const("mock");
    policy.expect_verify_needed().return_const(true);
    policy
        .expect_error_to_verify_result()
        .withf(|context, _| context.verifier_name == "broken")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(error_outcome);
    policy
        .expect_continue_verify_on_failure()
        .withf(|_, _, outcome| {
            outcome.verifier_name == "broken"
                && outcome.error_reason.as_deref() == Some(VERIFIER_EXECUTION_FAILED)
        })
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(false);
    policy.expect_overall_verify_result().returning(all_pass);
    let adapters = AdapterSet::new(Arc::new(policy))
        .with_store(Arc::new(store))
        .with_verifier(broken.clone())
        .with_verifier(healthy.clone());

    let report = verify(&executor(adapters)).await;

    let child = &report.root.nested_results[0];
    assert_that!(child.verifier_reports.len(), eq(1));
    assert_that!(child.verifier_reports[0].verifier_name, eq("broken"));
    assert_that!(broken.calls(), eq(1));
    assert_that!(healthy.calls(), eq(0));
}

#[tokio::test]
async fn aggregation_sees_outcomes_then_children_in_order() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xcc, SIGNATURE))
        .with_referrer(&digest(0xbb), attachment(0xdd, SIGNATURE));
    let mut policy = MockTestPolicy::new();
    policy.expect_kind().return_const("mock");
    policy.expect_verify_needed().return_const(true);
    policy
        .expect_overall_verify_result()
        .withf(|items| {
            let (cc, dd) = (digest(0xcc), digest(0xdd));
            matches!(
                items,
                [
                    AggregationItem::Outcome(first),
                    AggregationItem::Outcome(second),
                    AggregationItem::Nested(left),
                    AggregationItem::Nested(right),
                ] if first.verifier_name == "licenses"
                    && second.verifier_name == "provenance"
                    && left.subject.ends_with(&cc)
                    && left.artifact_type == SIGNATURE
                    && right.subject.ends_with(&dd)
            )
        })
        .times(1)
        .returning(all_pass);
    policy.expect_overall_verify_result().withf(|items| items.len() != 4).returning(all_pass);
    let adapters = AdapterSet::new(Arc::new(policy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("licenses", SBOM, SIGNATURE))
        .with_verifier(FakeVerifier::new("provenance", SBOM, Behavior::Pass))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));

    let report = verify(&executor(adapters)).await;

    assert_that!(report.is_success(), eq(true));
    assert_that!(report.root.nested_results[0].nested_results.len(), eq(2));
}

#[tokio::test]
async fn nested_signature_on_sbom() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xcc, SIGNATURE));
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SIGNATURE))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));

    let report = verify(&executor(adapters)).await;

    assert_that!(report.is_success(), eq(true));
    let sbom = &report.root.nested_results[0];
    assert_that!(sbom.is_success, eq(true));
    assert_that!(sbom.nested_results.len(), eq(1));
    let signature = &sbom.nested_results[0];
    assert_that!(signature.subject, eq(&format!("localhost:5000/app@{}", digest(0xcc))));
    assert_that!(signature.is_success, eq(true));
    assert_that!(signature.verifier_reports[0].verifier_name, eq("sig"));
}

#[tokio::test]
async fn nested_types_limit_what_is_listed() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xcc, SIGNATURE))
        .with_referrer(&digest(0xbb), attachment(0xdd, "application/sarif+json"));
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SIGNATURE));

    let report = verify(&executor(adapters)).await;

    let sbom = &report.root.nested_results[0];
    assert_that!(sbom.nested_results.len(), eq(1));
    assert_that!(sbom.nested_results[0].subject, contains_substring(digest(0xcc)));
}

#[tokio::test]
async fn cycles_are_marked_and_terminate() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xaa, SIGNATURE));
    let signature = FakeVerifier::new("sig", SIGNATURE, Behavior::Pass);
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SIGNATURE))
        .with_verifier(signature.clone());

    let report = verify(&executor(adapters)).await;

    let cyclic = &report.root.nested_results[0].nested_results[0];
    assert_that!(cyclic.marker, some(eq(StructuralMarker::Cycle)));
    assert_that!(cyclic.verifier_reports, is_empty());
    assert_that!(cyclic.nested_results, is_empty());
    assert_that!(signature.calls(), eq(0));
}

#[tokio::test]
async fn cycles_fail_under_strict_policy() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xbb, SBOM));
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SBOM));

    let report = verify(&executor(adapters)).await;

    assert_that!(report.is_success(), eq(false));
    let cyclic = &report.root.nested_results[0].nested_results[0];
    assert_that!(cyclic.marker, some(eq(StructuralMarker::Cycle)));
    assert_that!(cyclic.is_success, eq(false));
}

#[tokio::test]
async fn depth_limit_is_marked() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xcc, SIGNATURE));
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SIGNATURE))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));
    let config = ExecutorConfig { max_depth: 1, ..Default::default() };

    let report = verify(&executor_with(adapters, config)).await;

    let sbom = &report.root.nested_results[0];
    assert_that!(sbom.marker, some(eq(StructuralMarker::DepthLimit)));
    assert_that!(sbom.verifier_reports.len(), eq(1));
    assert_that!(sbom.nested_results, is_empty());
}

#[tokio::test]
async fn children_keep_listing_order_across_pages() {
    let store = MemoryStore::new("memory")
        .with_page_size(1)
        .with_referrer(&digest(0xaa), attachment(0x03, SIGNATURE))
        .with_referrer(&digest(0xaa), attachment(0x01, SIGNATURE))
        .with_referrer(&digest(0xaa), attachment(0x02, SIGNATURE));
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));

    let report = verify(&executor(adapters)).await;

    let children: Vec<String> =
        report.root.nested_results.iter().map(|node| node.subject.clone()).collect();
    let expected: Vec<String> =
        [0x03, 0x01, 0x02].iter().map(|n| format!("localhost:5000/app@{}", digest(*n))).collect();
    assert_that!(children, eq(&expected));
}

#[tokio::test]
async fn repeated_runs_produce_identical_reports() {
    let store = MemoryStore::new("memory")
        .with_page_size(2)
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xaa), attachment(0xcc, SIGNATURE))
        .with_referrer(&digest(0xaa), attachment(0xdd, SIGNATURE))
        .with_referrer(&digest(0xbb), attachment(0xee, SIGNATURE));
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SIGNATURE))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));
    let executor = executor(adapters);

    let mut first = verify(&executor).await;
    let mut second = verify(&executor).await;
    first.duration_millis = 0;
    second.duration_millis = 0;

    assert_that!(second, eq(&first));
}

#[tokio::test]
async fn duplicate_attachments_are_kept_per_store() {
    let first =
        MemoryStore::new("first").with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE));
    let second =
        MemoryStore::new("second").with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE));
    let verifier = FakeVerifier::new("sig", SIGNATURE, Behavior::Pass);
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(first))
        .with_store(Arc::new(second))
        .with_verifier(verifier.clone());

    let report = verify(&executor(adapters)).await;

    assert_that!(report.root.nested_results.len(), eq(2));
    assert_that!(verifier.calls(), eq(2));
}

#[tokio::test]
async fn failing_store_is_recorded_and_skipped() {
    let store = signed_store();
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(FailingStore))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));

    let report = verify(&executor(adapters)).await;

    assert_that!(report.is_success(), eq(true));
    assert_that!(report.root.nested_results.len(), eq(1));
    assert_that!(report.root.store_errors.len(), eq(1));
    assert_that!(report.root.store_errors[0].store, eq("failing"));
    assert_that!(report.root.store_errors[0].message, contains_substring("registry unavailable"));
}

#[tokio::test]
async fn listing_fails_when_every_store_fails() {
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy)).with_store(Arc::new(FailingStore));

    let result = executor(adapters).verify_subject(&VerifyParameters::new(&subject_ref())).await;

    assert_that!(result, err(matches_pattern!(ExecutorError::Listing { .. })));
}

#[tokio::test]
async fn resolves_tags_through_stores_in_order() {
    let store = MemoryStore::new("memory")
        .with_tag("v1", attachment(0xaa, ""))
        .with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE));
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(FailingStore))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));

    let report = executor(adapters)
        .verify_subject(&VerifyParameters::new("localhost:5000/app:v1"))
        .await
        .unwrap();

    assert_that!(report.root.subject, eq("localhost:5000/app:v1"));
    assert_that!(report.subject_digest, eq(&digest(0xaa)));
    assert_that!(report.is_success(), eq(true));
}

#[tokio::test]
async fn unresolvable_subject_is_fatal() {
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy))
        .with_store(Arc::new(FailingStore))
        .with_store(Arc::new(MemoryStore::new("memory")));

    let result = executor(adapters)
        .verify_subject(&VerifyParameters::new("localhost:5000/app:v1"))
        .await;

    let failures = match result {
        Err(ExecutorError::Resolution { failures, .. }) => failures,
        other => panic!("expected a resolution error, got {other:?}"),
    };
    let stores: Vec<&str> = failures.iter().map(|failure| failure.store.as_str()).collect();
    assert_that!(stores, eq(&vec!["failing", "memory"]));
}

#[tokio::test]
async fn rejects_invalid_reference() {
    let adapters =
        AdapterSet::new(Arc::new(PermissivePolicy)).with_store(Arc::new(MemoryStore::new("m")));

    let result = executor(adapters).verify_subject(&VerifyParameters::new("app@sha256:zz")).await;

    assert_that!(result, err(matches_pattern!(ExecutorError::InvalidReference { .. })));
}

#[tokio::test]
async fn requires_a_store() {
    let result = executor(AdapterSet::new(Arc::new(PermissivePolicy)))
        .verify_subject(&VerifyParameters::new(&subject_ref()))
        .await;

    assert_that!(matches!(result, Err(ExecutorError::NoStoresConfigured)), eq(true));
}

#[tokio::test]
async fn policy_errors_abort_the_request() {
    let store = signed_store();
    let mut policy = MockTestPolicy::new();
    policy.expect_kind().return_const("mock");
    policy.expect_verify_needed().return_const(true);
    policy
        .expect_overall_verify_result()
        .returning(|_| Err(PolicyError::Evaluation("no rule for signature".to_string())));
    let adapters = AdapterSet::new(Arc::new(policy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass));

    let result = executor(adapters).verify_subject(&VerifyParameters::new(&subject_ref())).await;

    assert_that!(result, err(matches_pattern!(ExecutorError::Policy(anything()))));
}

#[tokio::test(start_paused = true)]
async fn slow_verifier_times_out() {
    let store = signed_store();
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::new(
            "sig",
            SIGNATURE,
            Behavior::Sleep(Duration::from_secs(60)),
        ));
    let config = ExecutorConfig { adapter_timeout: Duration::from_secs(1), ..Default::default() };

    let report = verify(&executor_with(adapters, config)).await;

    assert_that!(report.is_success(), eq(false));
    let outcome = &report.root.nested_results[0].verifier_reports[0];
    assert_that!(outcome.error_reason.as_deref(), some(eq(VERIFIER_TIMEOUT)));
}

#[tokio::test(start_paused = true)]
async fn request_deadline_discards_partial_results() {
    let store = signed_store();
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy))
        .with_store(Arc::new(store))
        .with_store(Arc::new(StalledStore));
    let config = ExecutorConfig {
        request_timeout: Duration::from_secs(5),
        adapter_timeout: Duration::from_secs(7200),
        ..Default::default()
    };

    let result = executor_with(adapters, config)
        .verify_subject(&VerifyParameters::new(&subject_ref()))
        .await;

    assert_that!(result, err(matches_pattern!(ExecutorError::DeadlineExceeded { .. })));
}

#[tokio::test]
async fn config_policy_accepts_any_passing_signature() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE))
        .with_referrer(&digest(0xaa), attachment(0xcc, SIGNATURE));
    let policy = ConfigPolicy::new(BTreeMap::from([(SIGNATURE.to_string(), ArtifactPolicy::Any)]))
        .unwrap();
    let verifier = Arc::new(DigestVerifier { accepted: digest(0xcc) });
    let adapters =
        AdapterSet::new(Arc::new(policy)).with_store(Arc::new(store)).with_verifier(verifier);

    let report = verify(&executor(adapters)).await;

    let verdicts: Vec<bool> =
        report.root.nested_results.iter().map(|node| node.is_success).collect();
    assert_that!(verdicts, eq(&vec![false, true]));
    assert_that!(report.is_success(), eq(true));
}

/// Accepts a single attachment digest.
struct DigestVerifier {
    accepted: String,
}

#[async_trait]
impl Verifier for DigestVerifier {
    fn name(&self) -> &str {
        "digest"
    }

    fn verifier_type(&self) -> &str {
        "digest"
    }

    fn can_verify(&self, _: &AttachmentDescriptor) -> bool {
        true
    }

    async fn verify(
        &self,
        _: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        _: &dyn ReferrerStore,
    ) -> anyhow::Result<VerificationOutcome> {
        Ok(if descriptor.digest == self.accepted {
            VerificationOutcome::success("digest", "digest", "accepted")
        } else {
            VerificationOutcome::failure("digest", "digest", "not accepted")
        })
    }
}

#[tokio::test]
async fn scopes_select_adapter_sets() {
    let default_store =
        MemoryStore::new("default").with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE));
    let tenant_store = MemoryStore::new("tenant");
    let provider = ScopedAdapters::new();
    provider.set_default(
        AdapterSet::new(Arc::new(StrictPolicy))
            .with_store(Arc::new(default_store))
            .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Pass)),
    );
    provider.set_scope(
        "tenant-b",
        AdapterSet::new(Arc::new(PermissivePolicy)).with_store(Arc::new(tenant_store)),
    );
    let executor = Executor::new(Arc::new(provider), ExecutorConfig::default());

    let default = executor.verify_subject(&VerifyParameters::new(&subject_ref())).await.unwrap();
    let tenant = executor
        .verify_subject(&VerifyParameters::new(&subject_ref()).with_scope("tenant-b"))
        .await
        .unwrap();
    let unknown = executor
        .verify_subject(&VerifyParameters::new(&subject_ref()).with_scope("tenant-c"))
        .await;

    assert_that!(default.root.nested_results.len(), eq(1));
    assert_that!(tenant.root.nested_results, is_empty());
    assert_that!(tenant.is_success(), eq(true));
    assert_that!(matches!(unknown, Err(ExecutorError::UnknownScope(Some(_)))), eq(true));
}

#[tokio::test]
async fn artifact_type_filter_applies_to_root() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SIGNATURE))
        .with_referrer(&digest(0xaa), attachment(0xcc, SBOM));
    let adapters = AdapterSet::new(Arc::new(PermissivePolicy)).with_store(Arc::new(store));

    let report = executor(adapters)
        .verify_subject(
            &VerifyParameters::new(&subject_ref()).with_artifact_types(vec![SBOM.to_string()]),
        )
        .await
        .unwrap();

    assert_that!(report.root.nested_results.len(), eq(1));
    assert_that!(report.root.nested_results[0].subject, contains_substring(digest(0xcc)));
    assert_that!(report.artifact_types, eq(&vec![SBOM.to_string()]));
}

#[tokio::test]
async fn report_json_has_recursive_shape() {
    let store = MemoryStore::new("memory")
        .with_referrer(&digest(0xaa), attachment(0xbb, SBOM))
        .with_referrer(&digest(0xbb), attachment(0xcc, SIGNATURE));
    let adapters = AdapterSet::new(Arc::new(StrictPolicy))
        .with_store(Arc::new(store))
        .with_verifier(FakeVerifier::with_nested("sbom", SBOM, SIGNATURE))
        .with_verifier(FakeVerifier::new("sig", SIGNATURE, Behavior::Fail));

    let report = verify(&executor(adapters)).await;
    let json = serde_json::to_value(&report).unwrap();
    let decoded: VerificationReport = serde_json::from_value(json.clone()).unwrap();

    assert_that!(serde_json::to_value(&decoded).unwrap(), eq(&json));
    assert_that!(json["isSuccess"], eq(&serde_json::json!(false)));
    let signature = &json["nestedResults"][0]["nestedResults"][0];
    assert_that!(
        signature["verifierReports"][0],
        eq(&serde_json::json!({
            "name": "sig",
            "isSuccess": false,
            "message": "rejected",
            "errorReason": "REJECTED",
        }))
    );
    assert_that!(signature.get("marker"), none());
}
