// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lapin::types::{FieldArray, FieldTable};

fn props_with(headers: FieldTable) -> BasicProperties {
    BasicProperties::default().with_headers(headers)
}

#[test]
fn fresh_delivery_counts_zero() {
    assert_eq!(delivery_attempts(&BasicProperties::default(), false), 0);
}

#[test]
fn redelivered_flag_counts_one() {
    assert_eq!(delivery_attempts(&BasicProperties::default(), true), 1);
}

#[test]
fn quorum_delivery_count_header_wins() {
    let mut headers = FieldTable::default();
    headers.insert("x-delivery-count".into(), AMQPValue::LongLongInt(4));
    assert_eq!(delivery_attempts(&props_with(headers), true), 4);
}

#[test]
fn death_counts_are_summed() {
    let mut first = FieldTable::default();
    first.insert("count".into(), AMQPValue::LongLongInt(2));
    let mut second = FieldTable::default();
    second.insert("count".into(), AMQPValue::LongLongInt(3));

    let mut headers = FieldTable::default();
    headers.insert(
        "x-death".into(),
        AMQPValue::FieldArray(FieldArray::from(vec![
            AMQPValue::FieldTable(first),
            AMQPValue::FieldTable(second),
        ])),
    );
    assert_eq!(delivery_attempts(&props_with(headers), true), 5);
}

#[test]
fn malformed_death_header_falls_back_to_flag() {
    let mut headers = FieldTable::default();
    headers.insert("x-death".into(), AMQPValue::LongString("not an array".into()));
    assert_eq!(delivery_attempts(&props_with(headers), true), 1);
    assert_eq!(delivery_attempts(&props_with(FieldTable::default()), false), 0);
}

#[test]
fn dispositions_compare() {
    assert_eq!(Disposition::Ack, Disposition::Ack);
    assert_ne!(Disposition::Ack, Disposition::Requeue);
    let a = Disposition::DeadLetter { tag: "malformed", detail: "x".into() };
    let b = Disposition::DeadLetter { tag: "malformed", detail: "x".into() };
    assert_eq!(a, b);
}
