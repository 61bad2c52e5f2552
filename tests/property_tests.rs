//! Property-based tests for identities and union resolution.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Digests are kept verbatim and split into algorithm and value
//! - Malformed digests are always rejected
//! - Union resolution never coerces an unknown discriminant
//! - Ingestion is idempotent for arbitrary tag sets

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use provgraph::models::{
    ArtifactOrPackage, ArtifactRecord, AttestationPayload, Digest, IngestBatch, NodeKind, Purl,
    resolve_str,
};
use provgraph::{Backend, Error, InMemoryBackend, IngestBackend, QueryContext};

proptest! {
    /// Property: a well-formed digest keeps its text exactly.
    #[test]
    fn prop_digest_preserves_string(algorithm in "[a-z0-9]{1,12}", value in "[a-f0-9]{1,64}") {
        let text = format!("{algorithm}:{value}");
        let digest = Digest::new(text.clone()).unwrap();
        prop_assert_eq!(digest.as_str(), text.as_str());
        prop_assert_eq!(digest.algorithm(), algorithm.as_str());
        prop_assert_eq!(digest.value(), value.as_str());
        prop_assert_eq!(digest.to_string(), text);
    }

    /// Property: a digest without a separator is rejected.
    #[test]
    fn prop_digest_without_separator_rejected(s in "[a-z0-9]{0,40}") {
        let err = Digest::new(s).unwrap_err();
        prop_assert_eq!(err.code(), "INVALID_IDENTITY");
    }

    /// Property: a digest with an empty side is rejected.
    #[test]
    fn prop_digest_with_empty_part_rejected(s in "[a-z0-9]{1,20}", leading in any::<bool>()) {
        let text = if leading { format!(":{s}") } else { format!("{s}:") };
        prop_assert!(matches!(Digest::new(text), Err(Error::InvalidIdentity { .. })), "expected InvalidIdentity");
    }

    /// Property: a digest with a second separator is rejected.
    #[test]
    fn prop_digest_with_extra_separator_rejected(a in "[a-z]{1,8}", b in "[a-z]{1,8}", c in "[a-z]{1,8}") {
        prop_assert!(Digest::new(format!("{a}:{b}:{c}")).is_err(), "expected error");
    }

    /// Property: any undeclared `__typename` fails resolution as unknown.
    #[test]
    fn prop_unknown_typename_never_coerced(name in "[A-Za-z]{1,16}") {
        prop_assume!(name != "Artifact" && name != "Package");
        let json = format!(r#"{{"__typename":"{name}","digest":"sha256:abc"}}"#);
        let err = resolve_str::<ArtifactOrPackage>(&json).unwrap_err();
        let is_unknown = matches!(err, Error::UnknownVariant { ref found, .. } if *found == name);
        prop_assert!(is_unknown);
    }

    /// Property: a declared discriminant resolves to its own variant.
    #[test]
    fn prop_package_typename_resolves_to_package(name in "[a-z]{1,12}", version in "[0-9]{1,3}") {
        let purl = format!("pkg:npm/{name}@{version}");
        let json = format!(r#"{{"__typename":"Package","purl":"{purl}"}}"#);
        let (kind, resolved) = resolve_str::<ArtifactOrPackage>(&json).unwrap();
        prop_assert_eq!(kind, NodeKind::Package);
        let package = resolved.as_package().unwrap();
        prop_assert_eq!(&package.purl, &Purl::new(purl).unwrap());
    }

    /// Property: re-ingesting the same batch leaves the graph unchanged.
    #[test]
    fn prop_ingest_is_idempotent(tags in prop::collection::vec("[a-z]{1,6}", 0..6)) {
        let backend = InMemoryBackend::new();
        let ctx = QueryContext::new();
        let batch = IngestBatch::new()
            .with_artifact(ArtifactRecord::new("sha256:abc").unwrap().with_tags(tags));

        backend.ingest(&ctx, &batch).unwrap();
        let first = backend.artifacts(&ctx).unwrap();
        backend.ingest(&ctx, &batch).unwrap();
        prop_assert_eq!(first, backend.artifacts(&ctx).unwrap());
    }
}

#[test]
fn test_payload_without_typename_is_unknown_variant() {
    let err = resolve_str::<AttestationPayload>(r#"{"invocation":{}}"#).unwrap_err();
    assert!(matches!(err, Error::UnknownVariant { union: "AttestationPayload", .. }));
}
