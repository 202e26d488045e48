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
use std::path::Path;

use googletest::prelude::*;
use oci_verify::{
    config::{Config, ConfigError, ExecutorSettings},
    registry::AdapterRegistry,
    AdapterProvider, ExecutorConfig,
};

const JSON_CONFIG: &str = r#"{
    "executor": {"requestTimeoutMillis": 10000, "maxDepth": 3},
    "stores": [
        {"name": "local", "type": "oci-layout", "path": "layout", "cacheTtlSeconds": 30,
         "cacheCapacity": 64}
    ],
    "verifiers": [
        {"name": "licenses", "type": "sbom", "disallowedLicenses": ["GPL-3.0-only"]}
    ],
    "policy": {"type": "config", "artifactVerificationPolicies": {"default": "all"}},
    "scopes": {
        "audit": {
            "stores": [{"name": "local", "type": "oci-layout", "path": "layout"}],
            "policy": {"type": "permissive"}
        }
    }
}"#;

const TOML_CONFIG: &str = r#"
[executor]
adapterTimeoutMillis = 2000

[[stores]]
name = "local"
type = "oci-layout"
path = "layout"

[[verifiers]]
name = "sbom"
disallowedLicenses = ["AGPL-3.0-only"]

[policy]
type = "strict"
"#;

fn origin() -> &'static Path {
    Path::new("config.json")
}

#[test]
fn parses_json_with_defaults() {
    let config = Config::from_json(JSON_CONFIG, origin()).unwrap();

    assert_that!(
        config.executor_config(),
        eq(&ExecutorConfig {
            request_timeout: Duration::from_secs(10),
            max_depth: 3,
            ..Default::default()
        })
    );
    assert_that!(config.adapters.stores[0].type_name(), eq("oci-layout"));
    assert_that!(config.adapters.stores[0].cache_ttl_seconds, some(eq(30)));
    assert_that!(config.adapters.stores[0].cache_capacity, some(eq(64)));
    assert_that!(config.adapters.policy.kind, eq("config"));
    assert_that!(config.scopes.len(), eq(1));
}

#[test]
fn parses_toml() {
    let config = Config::from_toml(TOML_CONFIG, Path::new("config.toml")).unwrap();

    assert_that!(config.executor.adapter_timeout_millis, eq(2000));
    assert_that!(
        config.executor.request_timeout_millis,
        eq(ExecutorSettings::default().request_timeout_millis)
    );
    assert_that!(config.adapters.verifiers[0].type_name(), eq("sbom"));
    assert_that!(config.adapters.policy.kind, eq("strict"));
}

#[test]
fn load_picks_format_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verify.toml");
    std::fs::write(&path, TOML_CONFIG).unwrap();

    let config = Config::load(&path).unwrap();

    assert_that!(config.adapters.policy.kind, eq("strict"));
}

#[test]
fn load_reports_missing_file() {
    let result = Config::load(Path::new("/nonexistent/oci-verify.json"));

    assert_that!(result, err(matches_pattern!(ConfigError::Read { .. })));
}

#[test]
fn missing_policy_is_a_parse_error() {
    let result = Config::from_json(r#"{"stores": []}"#, origin());

    assert_that!(result, err(matches_pattern!(ConfigError::Parse { .. })));
}

#[test]
fn builds_default_and_scoped_sets() {
    let config = Config::from_json(JSON_CONFIG, origin()).unwrap();

    let provider = config.build_provider(&AdapterRegistry::default(), Path::new("/srv")).unwrap();

    let default = provider.adapters(None).unwrap();
    assert_that!(default.policy.kind(), eq("config"));
    assert_that!(default.stores.len(), eq(1));
    assert_that!(default.stores[0].name(), eq("local"));
    assert_that!(default.verifiers[0].name(), eq("licenses"));
    let audit = provider.adapters(Some("audit")).unwrap();
    assert_that!(audit.policy.kind(), eq("permissive"));
    assert_that!(audit.verifiers.len(), eq(0));
    assert_that!(provider.adapters(Some("other")).is_none(), eq(true));
}

#[test]
fn duplicate_names_are_rejected() {
    let config = Config::from_json(
        r#"{
            "stores": [
                {"name": "local", "type": "oci-layout", "path": "a"},
                {"name": "local", "type": "oci-layout", "path": "b"}
            ],
            "policy": {"type": "strict"}
        }"#,
        origin(),
    )
    .unwrap();

    let result = config.build(&AdapterRegistry::default(), Path::new("."));

    assert_that!(result, err(matches_pattern!(ConfigError::Duplicate { .. })));
}

#[test]
fn unknown_types_are_rejected() {
    let config = Config::from_json(
        r#"{
            "stores": [{"name": "remote", "type": "registry"}],
            "policy": {"type": "strict"}
        }"#,
        origin(),
    )
    .unwrap();

    let result = config.build(&AdapterRegistry::default(), Path::new("."));

    assert_that!(result, err(matches_pattern!(ConfigError::UnknownType { .. })));
}

#[test]
fn invalid_policy_settings_are_surfaced() {
    let config = Config::from_json(
        r#"{"policy": {"type": "config", "artifactVerificationPolicies": {}}}"#,
        origin(),
    )
    .unwrap();

    let result = config.build(&AdapterRegistry::default(), Path::new("."));

    assert_that!(result, err(matches_pattern!(ConfigError::Policy(anything()))));
}
