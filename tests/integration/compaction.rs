//! Compaction through the public API

use super::test_utils::{pipeline, spawn, strike, unit_at};
use annal::compaction::CompactionConfig;
use annal::{
    Compactor, DescriptorInput, DropKinds, FrameId, InterruptionPhase, LedgerError, RetainAll,
    TransactionDescriptor,
};

#[test]
fn test_compaction_preserves_retained_reads() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 100, 0);
    let b = spawn(&pipeline, 100, 0);
    for _ in 0..6 {
        pipeline.submit(strike(a, b)).unwrap();
    }
    let ledger = pipeline.ledger();
    let through = FrameId::new(5);
    let expected: Vec<_> = (5..=ledger.tip().position())
        .map(|p| unit_at(ledger, b, FrameId::new(p)))
        .collect();
    let tip_digest = ledger.digest(ledger.tip()).unwrap();

    assert_eq!(ledger.compact(through, &RetainAll).unwrap(), through);

    assert_eq!(ledger.origin(), through);
    let after: Vec<_> = (5..=ledger.tip().position())
        .map(|p| unit_at(ledger, b, FrameId::new(p)))
        .collect();
    assert_eq!(after, expected);
    // Frames after the boundary are untouched.
    assert_eq!(ledger.digest(ledger.tip()).unwrap(), tip_digest);
    assert!(matches!(
        ledger.get(b, FrameId::new(4)),
        Err(LedgerError::Compacted { .. })
    ));
    assert!(ledger.descriptor(through).unwrap().is_boundary());
}

#[test]
fn test_dropped_kinds_are_not_found() {
    let pipeline = pipeline();
    let unit = spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger();

    let mut builder = ledger.open_builder(ledger.tip()).unwrap();
    let effect = builder.create("effect".into(), vec![1]).unwrap();
    builder
        .commit(
            TransactionDescriptor::new(DescriptorInput::new("enchant").with_target(unit)),
            InterruptionPhase::None,
        )
        .unwrap();
    spawn(&pipeline, 5, 0);

    let through = FrameId::new(2);
    ledger.compact(through, &DropKinds::new(["effect"])).unwrap();

    let boundary = ledger.descriptor(through).unwrap();
    let archive = boundary.as_archive().unwrap();
    assert_eq!(archive.retained, 1);
    assert_eq!(archive.dropped, 1);
    assert!(ledger.get(unit, through).is_ok());
    assert!(matches!(
        ledger.get(effect, ledger.tip()),
        Err(LedgerError::NotFound { .. })
    ));
}

#[test]
fn test_boundary_carries_no_destroyed_objects() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let b = spawn(&pipeline, 10, 0);
    pipeline
        .submit(DescriptorInput::new("kill").with_target(a))
        .unwrap();
    let ledger = pipeline.ledger();
    let tip = ledger.tip();

    ledger.compact(tip, &RetainAll).unwrap();
    let boundary = ledger.frame(tip).unwrap();
    assert_eq!(boundary.objects().keys().copied().collect::<Vec<_>>(), vec![b]);
    assert!(boundary.objects().values().all(|o| !o.is_destroyed()));
}

#[test]
fn test_amend_boundary_only_while_at_tip() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger();
    ledger.compact(ledger.tip(), &RetainAll).unwrap();

    let amendment = ledger.amend_boundary().unwrap();
    let seeded = amendment.create("unit".into(), vec![7]).unwrap();
    assert!(matches!(
        ledger.open_builder(ledger.tip()),
        Err(LedgerError::BuilderAlreadyOpen)
    ));
    amendment.finish();

    assert_eq!(ledger.latest(seeded).unwrap().payload, vec![7]);
    assert!(ledger.latest(a).is_ok());
    assert!(matches!(
        ledger.amend_boundary(),
        Err(LedgerError::BoundarySealed(_))
    ));
}

#[test]
fn test_compact_past_tip_fails() {
    let pipeline = pipeline();
    spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger();
    assert!(ledger.compact(FrameId::new(9), &RetainAll).is_err());
    assert_eq!(ledger.origin(), FrameId::GENESIS);
}

#[test]
fn test_compactor_threshold() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 100, 0);
    let b = spawn(&pipeline, 100, 0);
    let compactor = Compactor::from_config(CompactionConfig {
        enabled: true,
        max_retained_frames: 8,
        keep_recent: 3,
        drop_kinds: Vec::new(),
    });

    assert_eq!(compactor.maybe_compact(pipeline.ledger()).unwrap(), None);
    for _ in 0..8 {
        pipeline.submit(strike(a, b)).unwrap();
    }
    let tip = pipeline.ledger().tip();
    let through = compactor.maybe_compact(pipeline.ledger()).unwrap().unwrap();
    assert_eq!(through.position(), tip.position() - 3);
    assert_eq!(pipeline.ledger().origin(), through);

    // Retained history keeps growing from the new boundary.
    pipeline.submit(strike(a, b)).unwrap();
    assert!(pipeline.ledger().get(b, pipeline.ledger().tip()).is_ok());
}
