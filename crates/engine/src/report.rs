// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Binary report encodings.
//!
//! Two wire formats leave the device: a 20-byte individual reading packet
//! and a list report made of a 20-byte header, 16-byte reading records and
//! a 24-byte footer carrying the id range and a 16-byte authentication
//! block.  The authentication block is a truncated SHA-256 over the
//! preceding bytes for hashed lists; signed lists delegate the block to a
//! [`ReportSigner`].

use crate::streamer::ReportFormat;
use crate::EngineError;
use sha2::{Digest, Sha256};
use tb_core::Reading;

pub const INDIVIDUAL_REPORT_LEN: usize = 20;
pub const LIST_REPORT_HEADER_LEN: usize = 20;
pub const LIST_REPORT_READING_LEN: usize = 16;
pub const LIST_REPORT_FOOTER_LEN: usize = 24;

/// Report format codes on the wire.
const FORMAT_INDIVIDUAL: u8 = 0;
const FORMAT_HASHED_LIST: u8 = 1;
const FORMAT_SIGNED_LIST_USER: u8 = 2;
const FORMAT_SIGNED_LIST_DEVICE: u8 = 3;

/// Which primitive authenticates a report footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// Truncated SHA-256, no key.
    HashOnly,
    UserKey,
    DeviceKey,
}

/// Produces the 16-byte authentication block for a report.
///
/// The engine computes hash-only footers itself; key-based signing is the
/// embedder's business.
pub trait ReportSigner {
    fn sign(&self, kind: SignatureKind, report: &[u8]) -> Result<[u8; 16], EngineError>;
}

/// Signer that can only produce hash-only footers.  Key-based requests
/// fail, which keeps unsigned devices honest about their capabilities.
#[derive(Debug, Default, Clone)]
pub struct HashOnlySigner;

/// Truncated SHA-256 over the report body.
pub fn truncated_hash(data: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

impl ReportSigner for HashOnlySigner {
    fn sign(&self, kind: SignatureKind, report: &[u8]) -> Result<[u8; 16], EngineError> {
        match kind {
            SignatureKind::HashOnly => Ok(truncated_hash(report)),
            SignatureKind::UserKey | SignatureKind::DeviceKey => Err(EngineError::SigningFailed(
                "no signing key available".to_string(),
            )),
        }
    }
}

/// A report carrying exactly one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualReport {
    pub device_id: u32,
    pub reading: Reading,
}

impl IndividualReport {
    pub fn new(device_id: u32, reading: Reading) -> Self {
        IndividualReport { device_id, reading }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(INDIVIDUAL_REPORT_LEN);
        bytes.push(FORMAT_INDIVIDUAL);
        bytes.push(0);
        bytes.extend_from_slice(&self.reading.stream.to_le_bytes());
        bytes.extend_from_slice(&self.device_id.to_le_bytes());
        bytes.extend_from_slice(&self.reading.raw_time.to_le_bytes());
        bytes.extend_from_slice(&self.reading.value.to_le_bytes());
        bytes.extend_from_slice(&self.reading.id_or_zero().to_le_bytes());
        bytes
    }
}

/// A report carrying a batch of readings with an authenticated footer.
#[derive(Debug, Clone, PartialEq)]
pub struct ListReport {
    pub format: ReportFormat,
    pub device_id: u32,
    pub report_id: u32,
    pub sent_timestamp: u32,
    pub origin_streamer: u8,
    /// Encoded selector of the originating streamer.
    pub selector: u16,
    pub readings: Vec<Reading>,
}

impl ListReport {
    fn format_code(&self) -> u8 {
        match self.format {
            ReportFormat::Individual => FORMAT_INDIVIDUAL,
            ReportFormat::HashedList => FORMAT_HASHED_LIST,
            ReportFormat::SignedListUserKey => FORMAT_SIGNED_LIST_USER,
            ReportFormat::SignedListDeviceKey => FORMAT_SIGNED_LIST_DEVICE,
        }
    }

    /// Lowest and highest reading ids contained in the report.
    fn id_range(&self) -> (u32, u32) {
        let mut lowest = u32::MAX;
        let mut highest = 0;

        for reading in &self.readings {
            let id = reading.id_or_zero();
            if id < lowest {
                lowest = id;
            }
            if id > highest {
                highest = id;
            }
        }

        if self.readings.is_empty() {
            (0, 0)
        } else {
            (lowest, highest)
        }
    }

    pub fn encode(
        &self,
        signer: &dyn ReportSigner,
        kind: SignatureKind,
    ) -> Result<Vec<u8>, EngineError> {
        let total = LIST_REPORT_HEADER_LEN
            + self.readings.len() * LIST_REPORT_READING_LEN
            + LIST_REPORT_FOOTER_LEN;

        let mut bytes = Vec::with_capacity(total);

        // header
        bytes.push(self.format_code());
        bytes.push(self.origin_streamer);
        bytes.extend_from_slice(&self.selector.to_le_bytes());
        bytes.extend_from_slice(&self.device_id.to_le_bytes());
        bytes.extend_from_slice(&self.report_id.to_le_bytes());
        bytes.extend_from_slice(&self.sent_timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.readings.len() as u16).to_le_bytes());
        let flags: u16 = match kind {
            SignatureKind::HashOnly => 0,
            SignatureKind::UserKey => 1,
            SignatureKind::DeviceKey => 2,
        };
        bytes.extend_from_slice(&flags.to_le_bytes());

        // reading records
        for reading in &self.readings {
            bytes.extend_from_slice(&reading.stream.to_le_bytes());
            bytes.extend_from_slice(&0u16.to_le_bytes());
            bytes.extend_from_slice(&reading.id_or_zero().to_le_bytes());
            bytes.extend_from_slice(&reading.raw_time.to_le_bytes());
            bytes.extend_from_slice(&reading.value.to_le_bytes());
        }

        // footer: id range plus the authentication block over everything
        // written so far including the range
        let (lowest, highest) = self.id_range();
        bytes.extend_from_slice(&lowest.to_le_bytes());
        bytes.extend_from_slice(&highest.to_le_bytes());

        let auth = signer.sign(kind, &bytes)?;
        bytes.extend_from_slice(&auth);

        debug_assert_eq!(bytes.len(), total);
        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
