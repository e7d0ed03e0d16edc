// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The stream manager: builds reports from triggered streamers.
//!
//! After every graph input the manager asks the graph which streamers
//! are ready, builds one report per ready streamer, and queues the built
//! reports for the embedder to collect.  A streamer stays marked
//! in-progress until the embedder acknowledges its report, and is not
//! rebuilt while in progress.

use std::collections::{HashSet, VecDeque};
use tb_core::SlotId;
use tb_engine::{HashOnlySigner, ReportFormat, SensorGraph, StreamerReport};
use tracing::{debug, warn};

/// Largest report the basic streaming subsystem will assemble.
pub const MAX_REPORT_SIZE: usize = 3 * 64 * 1024;

/// A report ready for the embedder to transport.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltReport {
    pub streamer: usize,
    pub dest: SlotId,
    pub format: ReportFormat,
    pub num_readings: u32,
    pub highest_id: u32,
    pub bytes: Vec<u8>,
}

/// Basic streaming subsystem state.
pub struct StreamManager {
    in_progress: HashSet<usize>,
    reports: VecDeque<BuiltReport>,
    next_report_id: u32,
    signer: HashOnlySigner,
}

impl StreamManager {
    pub fn new() -> Self {
        StreamManager {
            in_progress: HashSet::new(),
            reports: VecDeque::new(),
            next_report_id: 1,
            signer: HashOnlySigner,
        }
    }

    pub fn in_progress(&self) -> &HashSet<usize> {
        &self.in_progress
    }

    /// Check streamers and build a report for each one that triggered.
    pub fn check_and_build(&mut self, graph: &mut SensorGraph, device_id: u32, uptime: u32) {
        let ready = graph.check_streamers(&self.in_progress);

        for index in ready {
            let Some(streamer) = graph.streamer_mut(index) else {
                continue;
            };

            let report_id = if streamer.format.requires_id() {
                let id = self.next_report_id;
                self.next_report_id += 1;
                Some(id)
            } else {
                None
            };

            let dest = streamer.dest;
            let format = streamer.format;

            match streamer.build_report(device_id, MAX_REPORT_SIZE, uptime, report_id, &self.signer)
            {
                Ok(StreamerReport {
                    bytes,
                    num_readings,
                    highest_id,
                }) => {
                    debug!(index, num_readings, highest_id, "built streamer report");
                    self.in_progress.insert(index);
                    self.reports.push_back(BuiltReport {
                        streamer: index,
                        dest,
                        format,
                        num_readings,
                        highest_id,
                        bytes,
                    });
                }
                Err(err) => {
                    warn!(index, error = %err, "failed to build streamer report");
                }
            }
        }
    }

    /// Acknowledge a previously built report, allowing its streamer to
    /// fire again.
    pub fn acknowledge(&mut self, streamer: usize) {
        self.in_progress.remove(&streamer);
    }

    /// Drain every queued report.
    pub fn take_reports(&mut self) -> Vec<BuiltReport> {
        self.reports.drain(..).collect()
    }

    pub fn clear_to_reset(&mut self) {
        self.in_progress.clear();
        self.reports.clear();
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        StreamManager::new()
    }
}
