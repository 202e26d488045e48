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

use sha2::{Digest, Sha256};

pub const SHA256_PREFIX: &str = "sha256:";

/// Computes the OCI digest string (`sha256:<hex>`) of `content`.
pub fn sha256_digest(content: &[u8]) -> String {
    format!("{SHA256_PREFIX}{}", hex::encode(Sha256::digest(content)))
}

/// Returns the hex part of a `sha256:` digest, checking that it is well
/// formed.
pub fn sha256_hex(digest: &str) -> anyhow::Result<&str> {
    let hex_part = digest
        .strip_prefix(SHA256_PREFIX)
        .ok_or_else(|| anyhow::anyhow!("unsupported digest algorithm in {digest}"))?;
    if hex_part.len() != 64 || !hex_part.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        anyhow::bail!("malformed digest {digest}");
    }
    Ok(hex_part)
}

/// Fails unless `content` hashes to `expected`.
pub fn verify_digest(expected: &str, content: &[u8]) -> anyhow::Result<()> {
    sha256_hex(expected)?;
    let actual = sha256_digest(content);
    if actual != expected {
        anyhow::bail!("digest mismatch: expected {expected}, got {actual}");
    }
    Ok(())
}
