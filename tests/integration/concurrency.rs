//! Single writer, many readers

use super::test_utils::{pipeline, shield_reactor, spawn, strike, unit_at, Combat};
use annal::{
    DescriptorInput, FrameId, InterruptionPhase, Ledger, LedgerError, Pipeline,
    TransactionDescriptor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

#[test]
fn test_second_thread_cannot_open_builder() {
    let pipeline = pipeline();
    spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger().clone();

    let builder = ledger.open_builder(ledger.tip()).unwrap();
    let remote = ledger.clone();
    let result = thread::spawn(move || remote.open_builder(remote.tip()).map(|_| ()))
        .join()
        .unwrap();
    assert!(matches!(result, Err(LedgerError::BuilderAlreadyOpen)));
    assert!(result.unwrap_err().is_defect());
    builder.discard();

    let remote = ledger.clone();
    let id = thread::spawn(move || {
        let builder = remote.open_builder(remote.tip())?;
        builder.commit(
            TransactionDescriptor::new(DescriptorInput::new("noop")),
            InterruptionPhase::None,
        )
    })
    .join()
    .unwrap()
    .unwrap();
    assert_eq!(ledger.tip(), id);
}

#[test]
fn test_readers_proceed_while_builder_open() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger().clone();
    let pinned = ledger.tip();

    let mut builder = ledger.open_builder(pinned).unwrap();
    builder.stage(a).unwrap().payload = vec![];

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = ledger.clone();
            thread::spawn(move || unit_at(&reader, a, pinned))
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap().hp, 10);
    }
    builder.discard();
}

#[test]
fn test_submission_blocks_other_writers() {
    let pipeline = pipeline();
    spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger().clone();

    let session = ledger.begin_submission().unwrap();
    let remote = ledger.clone();
    let result = thread::spawn(move || remote.begin_submission().map(|_| ()))
        .join()
        .unwrap();
    assert!(matches!(result, Err(LedgerError::ConcurrentAppendInProgress)));

    // Re-entry on the owning thread nests.
    let nested = ledger.begin_submission().unwrap();
    assert_eq!(nested.depth(), 2);
    drop(nested);
    drop(session);
    assert!(!ledger.is_build_in_progress());
}

#[test]
fn test_published_tip_signals_new_frames() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 50, 0);
    let b = spawn(&pipeline, 50, 0);
    let ledger = pipeline.ledger().clone();
    let start = ledger.published_tip();

    let (tx, rx) = mpsc::channel();
    let watcher = ledger.clone();
    let handle = thread::spawn(move || {
        let mut seen = start;
        while seen.position() < start.position() + 3 {
            let tip = watcher.published_tip();
            if tip != seen {
                // Every published position is fully readable.
                assert!(watcher.descriptor(tip).is_ok());
                seen = tip;
            }
            thread::yield_now();
        }
        tx.send(seen).unwrap();
    });

    for _ in 0..3 {
        pipeline.submit(strike(a, b)).unwrap();
    }
    let seen = rx.recv().unwrap();
    handle.join().unwrap();
    assert_eq!(seen, FrameId::new(start.position() + 3));
    assert_eq!(ledger.published_tip(), ledger.tip());
}

#[test]
fn test_published_frames_are_final() {
    let pipeline = Pipeline::new(Ledger::new().unwrap(), Combat).with_reactor(shield_reactor);
    let armored = spawn(&pipeline, 100, 2);
    let bare = spawn(&pipeline, 100, 0);
    let ledger = pipeline.ledger().clone();
    let done = Arc::new(AtomicBool::new(false));

    let watcher = {
        let ledger = ledger.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seen = Vec::new();
            let mut last = ledger.published_tip();
            while !done.load(Ordering::Acquire) {
                let tip = ledger.published_tip();
                assert!(tip >= last, "published tip moved from {} back to {}", last, tip);
                seen.push((tip, ledger.digest(tip).unwrap()));
                last = tip;
                thread::yield_now();
            }
            seen
        })
    };

    for _ in 0..5 {
        // Quiet strikes collapse; the first blow on the bare unit is shielded.
        pipeline.submit(strike(bare, armored)).unwrap();
        pipeline.submit(strike(armored, bare)).unwrap();
    }
    done.store(true, Ordering::Release);

    let seen = watcher.join().unwrap();
    assert!(!seen.is_empty());
    for (at, digest) in seen {
        assert_eq!(ledger.digest(at).unwrap(), digest);
    }
    assert_eq!(ledger.published_tip(), ledger.tip());
}

#[test]
fn test_pending_frames_hidden_from_other_threads() {
    let pipeline = pipeline();
    let a = spawn(&pipeline, 10, 0);
    let ledger = pipeline.ledger().clone();
    let settled = ledger.tip();

    let session = ledger.begin_submission().unwrap();
    pipeline
        .submit(DescriptorInput::new("heal").with_target(a))
        .unwrap();
    assert_eq!(ledger.tip(), settled.next());

    let remote = ledger.clone();
    let (tip, hp) = thread::spawn(move || {
        let tip = remote.tip();
        (tip, unit_at(&remote, a, tip).hp)
    })
    .join()
    .unwrap();
    assert_eq!(tip, settled);
    assert_eq!(hp, 10);

    drop(session);
    assert_eq!(ledger.published_tip(), settled.next());
    assert_eq!(unit_at(&ledger, a, ledger.tip()).hp, 11);
}
