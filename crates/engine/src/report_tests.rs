// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tb_core::Reading;

fn sample_readings(count: u32) -> Vec<Reading> {
    (1..=count)
        .map(|i| Reading::with_id(0x5001, 100 + i, i as i32, i))
        .collect()
}

fn sample_list(count: u32) -> ListReport {
    ListReport {
        format: ReportFormat::HashedList,
        device_id: 0x1234,
        report_id: 77,
        sent_timestamp: 500,
        origin_streamer: 2,
        selector: 0x5FFF,
        readings: sample_readings(count),
    }
}

#[test]
fn individual_report_layout() {
    let reading = Reading::with_id(0x5001, 42, -5, 9);
    let bytes = IndividualReport::new(0xCAFE, reading).encode();

    assert_eq!(bytes.len(), INDIVIDUAL_REPORT_LEN);
    assert_eq!(bytes[0], 0);
    assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0x5001);
    assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 0xCAFE);
    assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 42);
    assert_eq!(i32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), -5);
    assert_eq!(u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 9);
}

#[test]
fn list_report_length_tracks_reading_count() {
    let bytes = sample_list(3).encode(&HashOnlySigner, SignatureKind::HashOnly).unwrap();
    assert_eq!(
        bytes.len(),
        LIST_REPORT_HEADER_LEN + 3 * LIST_REPORT_READING_LEN + LIST_REPORT_FOOTER_LEN
    );
}

#[test]
fn list_report_footer_carries_id_range() {
    let bytes = sample_list(5).encode(&HashOnlySigner, SignatureKind::HashOnly).unwrap();

    let footer = &bytes[bytes.len() - LIST_REPORT_FOOTER_LEN..];
    let lowest = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let highest = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);

    assert_eq!(lowest, 1);
    assert_eq!(highest, 5);
}

#[test]
fn hash_footer_authenticates_the_body() {
    let bytes = sample_list(2).encode(&HashOnlySigner, SignatureKind::HashOnly).unwrap();

    let body_len = bytes.len() - 16;
    let expected = truncated_hash(&bytes[..body_len]);
    assert_eq!(&bytes[body_len..], &expected);
}

#[test]
fn tampering_breaks_the_hash() {
    let mut bytes = sample_list(2).encode(&HashOnlySigner, SignatureKind::HashOnly).unwrap();

    // Flip one value byte in the first reading record
    bytes[LIST_REPORT_HEADER_LEN + 12] ^= 0xFF;

    let body_len = bytes.len() - 16;
    let recomputed = truncated_hash(&bytes[..body_len]);
    assert_ne!(&bytes[body_len..], &recomputed);
}

#[test]
fn header_records_streamer_and_count() {
    let bytes = sample_list(4).encode(&HashOnlySigner, SignatureKind::HashOnly).unwrap();

    assert_eq!(bytes[0], 1, "hashed list format code");
    assert_eq!(bytes[1], 2, "origin streamer");
    assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 0x5FFF);
    assert_eq!(u16::from_le_bytes([bytes[16], bytes[17]]), 4, "reading count");
}
