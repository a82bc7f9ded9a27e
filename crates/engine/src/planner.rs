// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detection planner.

use vigil_core::PlannedDetection;
use vigil_wire::Detections;

/// Derive the detection plan for one execution record.
///
/// Pure: flattens the two-level `{type: {platform: config}}` map into one
/// plan entry per platform. An empty or missing map is a valid execution
/// with no tasks. Output is sorted by `(detection_type, detection_platform)`
/// so replays produce identical task sequences.
pub fn plan(detections: &Detections, default_max_retries: i32) -> Vec<PlannedDetection> {
    let mut out: Vec<PlannedDetection> = detections
        .iter()
        .flat_map(|(detection_type, platforms)| {
            platforms.iter().map(|(platform, config)| PlannedDetection {
                detection_type: *detection_type,
                detection_platform: platform.clone(),
                detection_config: config.clone(),
                max_retries: default_max_retries,
            })
        })
        .collect();
    out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    out
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
