use recipe_offline_proto::*;
use std::io::ErrorKind;

mod common;
use common::sample_entries;

#[test]
fn every_entry_decodes_to_itself() {
    for entry in sample_entries() {
        let blob = encode_entry(&entry).unwrap();
        assert_eq!(&blob[0..4], &RCSN_MAGIC);
        assert_eq!(decode_entry(&blob).unwrap(), entry);
    }
}

#[test]
fn single_entry_blob_keeps_binary_body_intact() {
    let entry = sample_entries().remove(1);
    let blob = encode_entry(&entry).unwrap();

    let decoded = decode_entry(&blob).unwrap();
    assert_eq!(decoded.response.body, vec![0x3c, 0x73, 0x76, 0x67, 0x00, 0xff, 0x3e]);
    assert_eq!(decoded.request.vary.len(), 2);
    assert_eq!(decoded.request.vary[1], ("accept-language".to_string(), None));
    assert_eq!(decoded.stored_at, 1_760_000_000_500);
}

#[test]
fn header_carries_the_storage_time() {
    let entry = sample_entries().remove(0);
    let blob = encode_entry(&entry).unwrap();

    let mut created_at = [0u8; 8];
    created_at.copy_from_slice(&blob[8..16]);
    assert_eq!(u64::from_be_bytes(created_at), entry.stored_at);
    assert!(blob[16..HEADER_SIZE].iter().all(|b| *b == 0));
}

#[test]
fn wrong_magic_is_invalid_data() {
    let mut blob = encode_entry(&sample_entries()[0]).unwrap();
    blob[0] = b'X';

    let err = decode_entry(&blob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn unsupported_version_is_invalid_data() {
    let mut blob = encode_entry(&sample_entries()[0]).unwrap();
    blob[4..8].copy_from_slice(&7u32.to_be_bytes());

    let err = decode_entry(&blob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(err.to_string().contains("Unsupported RCSN version"));
}

#[test]
fn header_only_blob_has_no_entry() {
    let mut blob = vec![0u8; HEADER_SIZE];
    blob[0..4].copy_from_slice(&RCSN_MAGIC);
    blob[4..8].copy_from_slice(&RCSN_VERSION.to_be_bytes());

    let err = decode_entry(&blob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn short_blob_is_unexpected_eof() {
    let blob = encode_entry(&sample_entries()[0]).unwrap();

    let err = decode_entry(&blob[..10]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn truncated_entry_is_an_error() {
    let blob = encode_entry(&sample_entries()[0]).unwrap();
    let truncated = &blob[..blob.len() - 3];

    let err = decode_entry(truncated).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    assert!(err.to_string().contains("Entry truncated"));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut blob = encode_entry(&sample_entries()[0]).unwrap();
    blob.extend_from_slice(&[0, 0, 0]);

    let err = decode_entry(&blob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(err.to_string().contains("3 trailing bytes"));
}

#[test]
fn oversized_length_prefix_is_rejected() {
    let mut blob = encode_entry(&sample_entries()[0]).unwrap();
    blob[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&(MAX_ENTRY_SIZE + 1).to_be_bytes());

    let err = decode_entry(&blob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn response_kind_names_match_browser_types() {
    assert_eq!(ResponseKind::Basic.as_str(), "basic");
    assert_eq!(ResponseKind::Cors.as_str(), "cors");
    assert_eq!(ResponseKind::Opaque.as_str(), "opaque");
    assert_eq!(ResponseKind::OpaqueRedirect.as_str(), "opaqueredirect");
}
