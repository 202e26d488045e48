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

use core::{fmt, str::FromStr};

use oci_spec::distribution::{ParseError, Reference};

/// Identifies the artifact under evaluation: a repository plus either a tag
/// or a content digest.
///
/// Once a reference carries a digest it is considered resolved, and every
/// lookup made on its behalf keys on the digest rather than the tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectReference {
    inner: Reference,
}

impl SubjectReference {
    pub fn parse(reference: &str) -> Result<Self, ParseError> {
        Reference::from_str(reference).map(|inner| Self { inner })
    }

    pub fn registry(&self) -> &str {
        self.inner.registry()
    }

    pub fn repository(&self) -> &str {
        self.inner.repository()
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.tag()
    }

    pub fn digest(&self) -> Option<&str> {
        self.inner.digest()
    }

    pub fn is_resolved(&self) -> bool {
        self.digest().is_some()
    }

    /// Returns a reference to the object with `digest` in the same
    /// repository. The tag is dropped.
    pub fn with_digest(&self, digest: &str) -> Self {
        Self {
            inner: Reference::with_digest(
                self.registry().to_string(),
                self.repository().to_string(),
                digest.to_string(),
            ),
        }
    }
}

impl FromStr for SubjectReference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.whole())
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    const DIGEST: &str = "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

    #[test]
    fn parses_digest_reference() {
        let reference =
            SubjectReference::parse(&format!("localhost:5000/team/app@{DIGEST}")).unwrap();

        assert_that!(reference.registry(), eq("localhost:5000"));
        assert_that!(reference.repository(), eq("team/app"));
        assert_that!(reference.digest(), some(eq(DIGEST)));
        assert_that!(reference.is_resolved(), eq(true));
    }

    #[test]
    fn tag_reference_is_unresolved() {
        let reference = SubjectReference::parse("localhost:5000/team/app:v1").unwrap();

        assert_that!(reference.tag(), some(eq("v1")));
        assert_that!(reference.is_resolved(), eq(false));
    }

    #[test]
    fn with_digest_keeps_repository_and_drops_tag() {
        let reference = SubjectReference::parse("localhost:5000/team/app:v1").unwrap();

        let resolved = reference.with_digest(DIGEST);

        assert_that!(resolved.repository(), eq("team/app"));
        assert_that!(resolved.tag(), none());
        assert_that!(resolved.to_string(), eq(&format!("localhost:5000/team/app@{DIGEST}")));
    }

    #[test]
    fn rejects_malformed_reference() {
        assert_that!(SubjectReference::parse("localhost:5000/app@sha256:abc"), err(anything()));
    }
}
