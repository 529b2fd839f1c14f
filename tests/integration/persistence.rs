//! Saving and loading through both stores

use super::test_utils::{shield_reactor, spawn, strike, unit_at, Combat};
use annal::store::{
    encode_archive, FileLedgerStore, LedgerArchive, LedgerStore, SledLedgerStore,
};
use annal::{FrameId, Ledger, LedgerError, Pipeline, RetainAll, Replayer};
use tempfile::TempDir;

fn played_ledger() -> Ledger {
    let pipeline = Pipeline::new(Ledger::new().unwrap(), Combat).with_reactor(shield_reactor);
    let a = spawn(&pipeline, 40, 0);
    let b = spawn(&pipeline, 40, 0);
    for _ in 0..3 {
        pipeline.submit(strike(a, b)).unwrap();
        pipeline.submit(strike(b, a)).unwrap();
    }
    pipeline.ledger().clone()
}

fn assert_same(loaded: &Ledger, original: &Ledger) {
    assert_eq!(loaded.origin(), original.origin());
    assert_eq!(loaded.tip(), original.tip());
    assert_eq!(loaded.next_handle_watermark(), original.next_handle_watermark());
    let mut at = original.origin();
    while at <= original.tip() {
        assert_eq!(loaded.digest(at).unwrap(), original.digest(at).unwrap());
        at = at.next();
    }
}

fn stores(dir: &TempDir) -> Vec<Box<dyn LedgerStore>> {
    vec![
        Box::new(FileLedgerStore::new(dir.path().join("ledger.bin"))),
        Box::new(SledLedgerStore::new(dir.path().join("ledger.sled")).unwrap()),
    ]
}

#[test]
fn test_round_trip_both_stores() {
    let dir = TempDir::new().unwrap();
    let original = played_ledger();
    for store in stores(&dir) {
        assert!(store.load().unwrap().is_none());
        store.save(&original).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_same(&loaded, &original);
        assert!(Replayer::new(&Combat, 0).verify(&loaded).is_ok());
    }
}

#[test]
fn test_compacted_ledger_round_trip() {
    let dir = TempDir::new().unwrap();
    let original = played_ledger();
    let stores = stores(&dir);
    for store in &stores {
        // Save the full history first so the compacted save must shrink it.
        store.save(&original).unwrap();
    }
    original.compact(FrameId::new(4), &RetainAll).unwrap();
    for store in &stores {
        store.save(&original).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_same(&loaded, &original);
        assert!(matches!(
            loaded.get(annal::Handle::from_raw(1), FrameId::new(3)),
            Err(LedgerError::Compacted { .. })
        ));
    }
}

#[test]
fn test_loaded_ledger_keeps_growing() {
    let dir = TempDir::new().unwrap();
    let store = FileLedgerStore::new(dir.path().join("ledger.bin"));
    store.save(&played_ledger()).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert!(matches!(
        loaded.amend_boundary(),
        Err(LedgerError::BoundarySealed(_))
    ));
    let watermark = loaded.next_handle_watermark();
    let pipeline = Pipeline::new(loaded, Combat);
    let fresh = spawn(&pipeline, 5, 0);
    assert_eq!(fresh.raw(), watermark);
    assert_eq!(unit_at(pipeline.ledger(), fresh, pipeline.ledger().tip()).hp, 5);

    store.save(pipeline.ledger()).unwrap();
    assert_same(&store.load().unwrap().unwrap(), pipeline.ledger());
}

#[test]
fn test_corrupt_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.bin");
    let mut archive = LedgerArchive::capture(&played_ledger());
    archive.frames.swap(2, 3);
    std::fs::write(&path, encode_archive(&archive).unwrap()).unwrap();

    let result = FileLedgerStore::new(&path).load();
    assert!(matches!(result, Err(LedgerError::CorruptLedger(_))));

    std::fs::write(&path, b"\x01\x00\x00\x00garbage").unwrap();
    assert!(matches!(
        FileLedgerStore::new(&path).load(),
        Err(LedgerError::StorageError(_))
    ));
}
