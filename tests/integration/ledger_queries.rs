//! Point-in-time queries, copy-on-write frames and builder discard

use super::test_utils::{pipeline, spawn, strike, unit_at, Unit};
use annal::{
    DescriptorInput, FrameId, InterruptionPhase, LedgerError, ParamValue, TransactionDescriptor,
};
use std::sync::Arc;

#[test]
fn test_past_positions_never_change() {
    let pipeline = pipeline();
    // Four strikes deal at most 24 damage, so `a` survives every roll.
    let a = spawn(&pipeline, 100, 0);
    let b = spawn(&pipeline, 100, 0);
    let before = pipeline.ledger().tip();
    let snapshot = pipeline.ledger().get(a, before).unwrap();

    for _ in 0..4 {
        pipeline.submit(strike(b, a)).unwrap();
    }

    assert_eq!(pipeline.ledger().get(a, before).unwrap(), snapshot);
    assert_eq!(unit_at(pipeline.ledger(), a, before), Unit { hp: 100, armor: 0 });
    let hp = unit_at(pipeline.ledger(), a, pipeline.ledger().tip()).hp;
    assert!((76..=96).contains(&hp));
}

#[test]
fn test_untouched_handles_share_their_version() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let b = spawn(&pipeline, 10, 0);
    let born_b = pipeline.ledger().tip();

    pipeline
        .submit(
            DescriptorInput::new("heal")
                .with_target(a)
                .with_param("amount", ParamValue::Int(5)),
        )
        .unwrap();
    let tip = pipeline.ledger().tip();

    let frame = pipeline.ledger().frame(tip).unwrap();
    assert!(frame.mentions(a));
    assert!(!frame.mentions(b));
    assert!(Arc::ptr_eq(
        &pipeline.ledger().get(b, tip).unwrap(),
        &pipeline.ledger().get(b, born_b).unwrap()
    ));
}

#[test]
fn test_destroyed_handle_is_not_found_afterwards() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let alive_at = pipeline.ledger().tip();
    let report = pipeline
        .submit(DescriptorInput::new("kill").with_target(a))
        .unwrap();
    let gone_at = report.final_frame.unwrap();

    assert!(pipeline.ledger().get(a, alive_at).is_ok());
    assert!(matches!(
        pipeline.ledger().get(a, gone_at),
        Err(LedgerError::NotFound { .. })
    ));
    assert!(pipeline.ledger().latest(a).is_err());
    assert!(!pipeline.ledger().live_handles(gone_at).unwrap().contains(&a));
}

#[test]
fn test_descriptor_lookup() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let b = spawn(&pipeline, 10, 0);
    let report = pipeline.submit(strike(a, b)).unwrap();

    let cause = pipeline.ledger().descriptor(report.final_frame.unwrap()).unwrap();
    let descriptor = cause.as_transaction().unwrap();
    assert_eq!(descriptor.action(), "strike");
    assert_eq!(descriptor.phase, InterruptionPhase::None);
    let damage = descriptor.output.get("damage").and_then(ParamValue::as_int).unwrap();
    assert!((1..=6).contains(&damage));
}

#[test]
fn test_discard_leaves_no_trace() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger();
    let tip = ledger.tip();
    let digest = ledger.digest(tip).unwrap();
    let live = ledger.live_handles(tip).unwrap();

    let mut builder = ledger.open_builder(tip).unwrap();
    builder.stage(a).unwrap().payload = vec![0xff];
    let scratch = builder.create("unit".into(), vec![]).unwrap();
    assert!(ledger.is_build_in_progress());
    builder.discard();

    assert!(!ledger.is_build_in_progress());
    assert_eq!(ledger.tip(), tip);
    assert_eq!(ledger.digest(tip).unwrap(), digest);
    assert_eq!(ledger.live_handles(tip).unwrap(), live);
    assert!(ledger.latest(scratch).is_err());
    assert_eq!(unit_at(ledger, a, tip), Unit { hp: 10, armor: 0 });

    // The discarded handle is burned, not reissued.
    let next = spawn(&pipeline, 1, 0);
    assert!(next.raw() > scratch.raw());
}

#[test]
fn test_builder_on_stale_parent() {
    let pipeline = pipeline();
    spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger();
    assert!(matches!(
        ledger.open_builder(FrameId::GENESIS),
        Err(LedgerError::StaleProposal(_))
    ));

    let builder = ledger.open_builder(ledger.tip()).unwrap();
    let id = builder
        .commit(
            TransactionDescriptor::new(DescriptorInput::new("noop")),
            InterruptionPhase::None,
        )
        .unwrap();
    assert!(ledger.frame(id).unwrap().objects().is_empty());
}

#[test]
fn test_unknown_action_is_stale() {
    let pipeline = pipeline();
    let result = pipeline.submit(DescriptorInput::new("dance"));
    assert!(matches!(result, Err(LedgerError::StaleProposal(_))));
    assert_eq!(pipeline.ledger().tip(), FrameId::GENESIS);
}
