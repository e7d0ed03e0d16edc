// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Streamers: policy objects that package readings into reports.
//!
//! A streamer watches a selector through a buffered walker and, when
//! triggered, drains accumulated readings into a report destined for a
//! slot.  Automatic streamers trigger whenever they have data; manual
//! ones must be marked first.

use crate::report::{
    IndividualReport, ListReport, ReportSigner, SignatureKind, LIST_REPORT_FOOTER_LEN,
    LIST_REPORT_HEADER_LEN, LIST_REPORT_READING_LEN,
};
use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tb_core::{DataStreamSelector, SlotId};
use tb_storage::{SensorLog, SharedWalker, StorageError};

/// How a streamer packages its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// One reading per report.
    Individual,
    /// A batch of readings with a hash footer.
    HashedList,
    /// A hashed list signed with the user key.
    SignedListUserKey,
    /// A hashed list signed with the device key.
    SignedListDeviceKey,
}

impl ReportFormat {
    pub fn requires_id(&self) -> bool {
        !matches!(self, ReportFormat::Individual)
    }

    pub fn requires_signing(&self) -> bool {
        matches!(
            self,
            ReportFormat::SignedListUserKey | ReportFormat::SignedListDeviceKey
        )
    }

    pub(crate) fn signature_kind(&self) -> SignatureKind {
        match self {
            ReportFormat::SignedListUserKey => SignatureKind::UserKey,
            ReportFormat::SignedListDeviceKey => SignatureKind::DeviceKey,
            _ => SignatureKind::HashOnly,
        }
    }
}

/// The serializable configuration of a streamer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerSpec {
    pub selector: DataStreamSelector,
    pub dest: SlotId,
    pub format: ReportFormat,
    pub automatic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_other: Option<usize>,
}

/// A built report plus the bookkeeping the caller needs to acknowledge it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerReport {
    pub bytes: Vec<u8>,
    pub num_readings: u32,
    /// Highest reading id contained in the report.
    pub highest_id: u32,
}

/// A streamer registered with a sensor graph.
pub struct DataStreamer {
    pub selector: DataStreamSelector,
    pub dest: SlotId,
    pub format: ReportFormat,
    pub automatic: bool,
    /// Forward reference to an earlier streamer this one fires alongside.
    pub with_other: Option<usize>,
    /// Index assigned at registration.
    pub index: usize,
    walker: Option<SharedWalker>,
}

impl DataStreamer {
    pub fn from_spec(spec: StreamerSpec, index: usize) -> Self {
        DataStreamer {
            selector: spec.selector,
            dest: spec.dest,
            format: spec.format,
            automatic: spec.automatic,
            with_other: spec.with_other,
            index,
            walker: None,
        }
    }

    pub fn spec(&self) -> StreamerSpec {
        StreamerSpec {
            selector: self.selector,
            dest: self.dest,
            format: self.format,
            automatic: self.automatic,
            with_other: self.with_other,
        }
    }

    /// Attach this streamer to a sensor log, creating its walker.  An
    /// existing walker is discarded.
    pub fn link_to_storage(&mut self, log: &mut SensorLog) -> Result<(), EngineError> {
        if let Some(walker) = self.walker.take() {
            log.destroy_walker(&walker);
        }

        self.walker = Some(log.create_walker(self.selector, true)?);
        Ok(())
    }

    /// Whether any readings are waiting in this streamer.
    pub fn has_data(&self) -> bool {
        self.walker
            .as_ref()
            .map(|walker| walker.lock().count() > 0)
            .unwrap_or(false)
    }

    /// Whether this streamer should generate a report right now.
    pub fn triggered(&self, manual: bool) -> bool {
        if !self.automatic && !manual {
            return false;
        }

        self.has_data()
    }

    /// Drain readings from the walker into a report.
    ///
    /// List formats drain up to the capacity implied by `max_size`;
    /// partial drains are fine once at least one reading is included.
    pub fn build_report(
        &mut self,
        device_id: u32,
        max_size: usize,
        device_uptime: u32,
        report_id: Option<u32>,
        signer: &dyn ReportSigner,
    ) -> Result<StreamerReport, EngineError> {
        let walker = self.walker.as_ref().ok_or(EngineError::StreamerNotLinked)?;

        if self.format.requires_id() && report_id.is_none() {
            return Err(EngineError::MissingReportId);
        }

        match self.format {
            ReportFormat::Individual => {
                let reading = walker.lock().pop()?;
                let highest_id = reading.id_or_zero();
                let report = IndividualReport::new(device_id, reading);

                Ok(StreamerReport {
                    bytes: report.encode(),
                    num_readings: 1,
                    highest_id,
                })
            }
            ReportFormat::HashedList
            | ReportFormat::SignedListUserKey
            | ReportFormat::SignedListDeviceKey => {
                let overhead = LIST_REPORT_HEADER_LEN + LIST_REPORT_FOOTER_LEN;
                let max_readings = max_size.saturating_sub(overhead) / LIST_REPORT_READING_LEN;
                if max_readings == 0 {
                    return Err(EngineError::ReportTooSmall(max_size));
                }

                let mut readings = Vec::new();
                let mut highest_id = 0;
                {
                    let mut guard = walker.lock();
                    while readings.len() < max_readings {
                        match guard.pop() {
                            Ok(reading) => {
                                if reading.id_or_zero() > highest_id {
                                    highest_id = reading.id_or_zero();
                                }
                                readings.push(reading);
                            }
                            Err(StorageError::StreamEmpty(_)) => break,
                            Err(err) => return Err(err.into()),
                        }
                    }
                }

                if readings.is_empty() {
                    return Err(EngineError::Storage(StorageError::StreamEmpty(
                        self.selector,
                    )));
                }

                let report = ListReport {
                    format: self.format,
                    device_id,
                    report_id: report_id.unwrap_or(0),
                    sent_timestamp: device_uptime,
                    origin_streamer: self.index as u8,
                    selector: self.selector.encode(),
                    readings,
                };

                let num_readings = report.readings.len() as u32;
                let bytes = report.encode(signer, self.format.signature_kind())?;

                Ok(StreamerReport {
                    bytes,
                    num_readings,
                    highest_id,
                })
            }
        }
    }
}

impl fmt::Display for DataStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let manual = if self.automatic { "" } else { "manual " };
        let security = match self.format {
            ReportFormat::SignedListUserKey => "signed ",
            ReportFormat::SignedListDeviceKey => "device-signed ",
            _ => "",
        };
        let realtime = if self.format == ReportFormat::Individual {
            "realtime "
        } else {
            ""
        };

        write!(f, "{}{}{}streamer on {}", manual, security, realtime, self.selector)?;

        if !self.dest.is_controller() {
            write!(f, " to {}", self.dest)?;
        }

        if let Some(other) = self.with_other {
            write!(f, " with streamer {}", other)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "streamer_tests.rs"]
mod tests;
