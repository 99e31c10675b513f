//! Correlation integration tests.
//!
//! These build container and log sequences in memory, so they need no
//! fixture files.

use rtc_correlate::{
    AlignState, AssembledFrameInfo, ContainerFrameRecord, DecodedFrameLogRecord, FrameType,
    PictureType, SyncError, UnmatchedReason, correlate, is_match, next_state,
};

fn frame(index: usize, size: u64) -> ContainerFrameRecord {
    ContainerFrameRecord {
        index,
        pts: Some(index as i64 * 3000),
        time: Some(index as f64 / 30.0),
        relative_time: Some(index as f64 / 30.0),
        size,
        width: 640,
        height: 480,
        key_frame: index == 0,
        picture_type: if index == 0 { PictureType::I } else { PictureType::P },
        is_corrupt: false,
    }
}

fn record(position: u64, size: u64) -> DecodedFrameLogRecord {
    let first = position * 10;
    let last = first + 2;
    DecodedFrameLogRecord {
        ts: 1_000_000 + position * 33_333,
        relative_time: position * 33_333,
        first,
        last,
        qp: 30,
        width: 640,
        height: 480,
        frame_type: if position == 0 { FrameType::Key } else { FrameType::Delta },
        assembled: Some(AssembledFrameInfo {
            first,
            last,
            encoded_bufsz: size,
            num_pkt_exp: 3,
            num_pkt_recv: 3,
            num_nack: 0,
            max_nack: 0,
        }),
    }
}

fn frames(sizes: &[u64]) -> Vec<ContainerFrameRecord> {
    sizes.iter().enumerate().map(|(index, &size)| frame(index, size)).collect()
}

fn records(sizes: &[u64]) -> Vec<DecodedFrameLogRecord> {
    sizes
        .iter()
        .enumerate()
        .map(|(position, &size)| record(position as u64, size))
        .collect()
}

fn states(correlation: &rtc_correlate::Correlation) -> Vec<SyncError> {
    correlation.records.iter().map(|row| row.sync_error).collect()
}

// ── is_match / next_state ──────────────────────────────────────────

#[test]
fn match_requires_size_and_dimensions() {
    let container = frame(0, 1200);
    let log = record(0, 1200);
    assert!(is_match(&container, &log));

    let mut resized = container.clone();
    resized.width = 320;
    assert!(!is_match(&resized, &log));

    let mut other_size = container.clone();
    other_size.size = 1201;
    assert!(!is_match(&other_size, &log));
}

#[test]
fn match_requires_assembled_record() {
    let container = frame(0, 1200);
    let mut log = record(0, 1200);
    log.assembled = None;
    assert!(!is_match(&container, &log));
}

#[test]
fn missing_assembled_takes_priority() {
    let container = frames(&[100, 200, 300]);
    let mut log = records(&[100, 200, 300]);
    log[0].assembled = None;

    assert_eq!(next_state(&container, &log, 0, 0), AlignState::MissingAssembled);
}

#[test]
fn container_resync_preferred_over_log_resync() {
    // Both lookaheads succeed at (0, 0): c=[A,B,A], l=[B,A,B].
    let container = frames(&[111, 222, 111]);
    let log = records(&[222, 111, 222]);

    assert_eq!(next_state(&container, &log, 0, 0), AlignState::ResyncContainer);
}

#[test]
fn lookahead_past_end_is_no_match() {
    let container = frames(&[100, 200]);
    let log = records(&[999, 100]);

    // (0, 1) matches but (1, 2) is out of range.
    assert_eq!(next_state(&container, &log, 0, 0), AlignState::HardMismatch);
}

// ── correlate ──────────────────────────────────────────────────────

#[test]
fn identical_sequences_fully_match() {
    let container = frames(&[100, 200, 300, 400, 500]);
    let log = records(&[100, 200, 300, 400, 500]);

    let correlation = correlate(&container, &log);

    assert_eq!(correlation.records.len(), 5);
    assert!(correlation.records.iter().all(|row| row.is_matched()));
    for (position, row) in correlation.records.iter().enumerate() {
        assert_eq!(row.container_index, Some(position));
        assert_eq!(row.log_index, Some(position));
    }
    assert_eq!(correlation.summary.matched, 5);
    assert_eq!(correlation.summary.mismatch_ratio(), 0.0);
}

#[test]
fn extra_container_frame_is_skipped() {
    let container = frames(&[100, 200, 999, 300, 400]);
    let log = records(&[100, 200, 300, 400]);

    let correlation = correlate(&container, &log);

    assert_eq!(
        states(&correlation),
        vec![
            SyncError::None,
            SyncError::None,
            SyncError::ExtraFrame,
            SyncError::None,
            SyncError::None,
        ]
    );
    let extra = &correlation.records[2];
    assert_eq!(extra.container_index, Some(2));
    assert!(extra.log.is_none());
    assert_eq!(extra.reason, Some(UnmatchedReason::ExtraFrame));

    let realigned = &correlation.records[3];
    assert_eq!(realigned.container_index, Some(3));
    assert_eq!(realigned.log_index, Some(2));
    assert_eq!(correlation.summary.container_extra, 1);
}

#[test]
fn duplicated_container_frame_is_reported_once() {
    let container = frames(&[100, 200, 200, 300, 400]);
    let log = records(&[100, 200, 300, 400]);

    let correlation = correlate(&container, &log);

    assert_eq!(correlation.records.len(), 5);
    assert_eq!(correlation.records[2].sync_error, SyncError::ExtraFrame);
    assert_eq!(correlation.records[2].container_index, Some(2));
    assert_eq!(correlation.summary.matched, log.len());
}

#[test]
fn extra_log_record_is_skipped() {
    let container = frames(&[100, 200, 300, 400]);
    let log = records(&[100, 200, 999, 300, 400]);

    let correlation = correlate(&container, &log);

    assert_eq!(
        states(&correlation),
        vec![
            SyncError::None,
            SyncError::None,
            SyncError::ExtraLog,
            SyncError::None,
            SyncError::None,
        ]
    );
    let extra = &correlation.records[2];
    assert!(extra.container.is_none());
    assert_eq!(extra.log_index, Some(2));
    assert_eq!(extra.reason, Some(UnmatchedReason::ExtraLog));
    assert_eq!(correlation.summary.log_extra, 1);
}

#[test]
fn record_without_assembled_is_reported_log_only() {
    let container = frames(&[100, 200, 300]);
    let mut log = records(&[100, 555, 200, 300]);
    log[1].assembled = None;

    let correlation = correlate(&container, &log);

    assert_eq!(correlation.records.len(), 4);
    let missing = &correlation.records[1];
    assert_eq!(missing.sync_error, SyncError::ExtraLog);
    assert_eq!(missing.reason, Some(UnmatchedReason::ExtraLogNoAssembled));
    assert!(missing.container.is_none());
    assert_eq!(correlation.summary.log_no_assembled, 1);
    assert_eq!(correlation.summary.matched, 3);
}

#[test]
fn hard_mismatch_advances_both_cursors() {
    let container = frames(&[100, 200, 300]);
    let log = records(&[100, 555, 300]);

    let correlation = correlate(&container, &log);

    assert_eq!(
        states(&correlation),
        vec![SyncError::None, SyncError::Mismatch, SyncError::None]
    );
    let mismatch = &correlation.records[1];
    assert_eq!(mismatch.container_index, Some(1));
    assert_eq!(mismatch.log_index, Some(1));
    assert_eq!(correlation.summary.container_mismatch, 1);
    assert_eq!(correlation.summary.log_mismatch, 1);
}

#[test]
fn container_tail_is_flushed() {
    let container = frames(&[100, 200, 300]);
    let log = records(&[100]);

    let correlation = correlate(&container, &log);

    assert_eq!(
        states(&correlation),
        vec![SyncError::None, SyncError::Tail, SyncError::Tail]
    );
    assert!(correlation.records[1..].iter().all(|row| {
        row.log.is_none() && row.reason == Some(UnmatchedReason::ExtraFrameTail)
    }));
    assert_eq!(correlation.summary.container_tail, 2);
}

#[test]
fn log_tail_is_flushed() {
    let container = frames(&[100]);
    let log = records(&[100, 200, 300]);

    let correlation = correlate(&container, &log);

    assert_eq!(correlation.records.len(), 3);
    assert!(correlation.records[1..].iter().all(|row| {
        row.container.is_none() && row.reason == Some(UnmatchedReason::ExtraLogTail)
    }));
    assert_eq!(correlation.summary.log_tail, 2);
}

#[test]
fn empty_inputs_produce_no_rows() {
    let correlation = correlate(&[], &[]);
    assert!(correlation.records.is_empty());
    assert_eq!(correlation.summary.output_rows, 0);

    let only_container = correlate(&frames(&[100, 200]), &[]);
    assert_eq!(only_container.summary.container_tail, 2);

    let only_log = correlate(&[], &records(&[100, 200]));
    assert_eq!(only_log.summary.log_tail, 2);
}

// ── Invariants over a mixed run ────────────────────────────────────

fn mixed_inputs() -> (Vec<ContainerFrameRecord>, Vec<DecodedFrameLogRecord>) {
    let container = frames(&[100, 200, 999, 300, 400, 500, 600, 700, 800, 900]);
    let mut log = records(&[100, 200, 300, 400, 444, 500, 600, 650, 800, 900, 1000]);
    log[6].assembled = None;
    (container, log)
}

#[test]
fn every_input_frame_appears_exactly_once() {
    let (container, log) = mixed_inputs();
    let correlation = correlate(&container, &log);

    let mut container_seen = vec![0; container.len()];
    let mut log_seen = vec![0; log.len()];
    for row in &correlation.records {
        if let Some(i) = row.container_index {
            container_seen[i] += 1;
        }
        if let Some(j) = row.log_index {
            log_seen[j] += 1;
        }
    }

    assert!(container_seen.iter().all(|&count| count == 1), "{container_seen:?}");
    assert!(log_seen.iter().all(|&count| count == 1), "{log_seen:?}");
}

#[test]
fn cursors_never_move_backwards() {
    let (container, log) = mixed_inputs();
    let correlation = correlate(&container, &log);

    let container_order: Vec<usize> = correlation
        .records
        .iter()
        .filter_map(|row| row.container_index)
        .collect();
    let log_order: Vec<usize> = correlation
        .records
        .iter()
        .filter_map(|row| row.log_index)
        .collect();

    assert!(container_order.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(log_order.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn matched_rows_are_content_equal() {
    let (container, log) = mixed_inputs();
    let correlation = correlate(&container, &log);

    for row in correlation.records.iter().filter(|row| row.is_matched()) {
        let (Some(frame), Some(record)) = (&row.container, &row.log) else {
            panic!("matched row without both sides: {row:?}");
        };
        assert!(is_match(frame, record));
    }
}

#[test]
fn summary_accounts_for_every_row() {
    let (container, log) = mixed_inputs();
    let correlation = correlate(&container, &log);
    let summary = correlation.summary;

    assert_eq!(summary.output_rows, correlation.records.len());
    assert_eq!(summary.container_frames, container.len());
    assert_eq!(summary.log_frames, log.len());
    assert_eq!(summary.matched + summary.container_unmatched(), container.len());
    assert_eq!(summary.matched + summary.log_unmatched(), log.len());
    assert_eq!(
        correlation.unmatched_container().count(),
        summary.container_unmatched()
    );
    assert_eq!(correlation.unmatched_log().count(), summary.log_unmatched());

    let text = summary.to_string();
    assert!(text.contains("Matched: "), "{text}");
}

#[test]
fn correlation_is_deterministic() {
    let (container, log) = mixed_inputs();
    let first = correlate(&container, &log);
    let second = correlate(&container, &log);

    assert_eq!(first.records, second.records);
    assert_eq!(first.summary, second.summary);
}

#[test]
fn sync_error_labels() {
    assert_eq!(SyncError::None.to_string(), "none");
    assert_eq!(SyncError::ExtraFrame.to_string(), "extra_frame");
    assert_eq!(SyncError::ExtraLog.to_string(), "extra_log");
    assert_eq!(SyncError::Mismatch.to_string(), "mismatch");
    assert_eq!(SyncError::Tail.to_string(), "tail");
}
